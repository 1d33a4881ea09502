use validator::ValidationError;

use crate::utils::url::parse_target_url;

/// Validates that a URL string is properly formatted and uses http/https
pub fn validate_url(url_str: &str) -> Result<(), ValidationError> {
    parse_target_url(url_str).map(|_| ()).map_err(|e| {
        let mut err = ValidationError::new("url");
        err.message = Some(e.to_string().into());
        err
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        // Valid URLs
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://example.com/path?query=value").is_ok());

        // Invalid URLs
        assert!(validate_url("not-a-url").is_err());
        assert!(validate_url("ftp://example.com").is_err()); // Not http/https
    }

    #[test]
    fn test_validation_message() {
        let err = validate_url("ftp://example.com").unwrap_err();
        assert!(err.message.unwrap().contains("http or https"));
    }
}
