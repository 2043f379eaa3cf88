//! Source URL handling: validation and canonical media ID extraction.

mod url;

pub use url::{extract_media_id, validate_source_url};
