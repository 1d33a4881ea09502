pub mod short_key;
pub mod url;

pub use short_key::generate_short_key;
