use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("Invalid URL format: {0}")]
    Malformed(String),

    #[error("URL scheme must be http or https, got '{0}'")]
    UnsupportedScheme(String),

    #[error("URL must have a host")]
    MissingHost,

    #[error("URL does not contain a short key")]
    MissingKey,
}

/// Parses a URL submitted for shortening.
///
/// Only absolute `http`/`https` URLs with a host are accepted.
pub fn parse_target_url(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Malformed(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
    }

    if url.host().is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Joins the service base URL and a short key into a full short URL
pub fn compose_short_url(base_url: &str, short_key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), short_key)
}

/// Extracts the short key from a full short URL (its last non-empty path segment)
pub fn extract_short_key(short_url: &str) -> Result<String, UrlError> {
    let url = Url::parse(short_url.trim()).map_err(|e| UrlError::Malformed(e.to_string()))?;

    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(str::to_string)
        .ok_or(UrlError::MissingKey)
}

/// Accepts either a bare short key or a full short URL and returns the key
pub fn normalize_short_key(input: &str) -> String {
    let input = input.trim();
    extract_short_key(input).unwrap_or_else(|_| input.trim_matches('/').to_string())
}
