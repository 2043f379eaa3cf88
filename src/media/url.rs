//! Validation and canonicalization of submitted source URLs.
//!
//! The media ID is the stable dedup key: the shortcode after /p/, /reel/ or
//! /reels/, the numeric ID for stories, or a UUIDv5 of the whole URL as a
//! last resort.

use crate::identify::models::{ErrorKind, IdentifyError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// URL shapes that look like Instagram but can never carry media audio.
    static ref UNSUPPORTED_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"/reels/audio/").unwrap(),
        Regex::new(r"/explore/").unwrap(),
        Regex::new(r"/accounts/").unwrap(),
    ];

    /// Accepted submission shapes.
    static ref SUPPORTED_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)^https?://(www\.)?instagram\.com/(p|reel|reels|stories)/[\w-]+").unwrap(),
        Regex::new(r"(?i)^https?://(www\.)?instagram\.com/[\w.]+/(p|reel)/[\w-]+").unwrap(),
    ];

    /// Capture groups for the canonical media ID.
    static ref MEDIA_ID_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"instagram\.com/(?:p|reel|reels)/([A-Za-z0-9_-]+)").unwrap(),
        Regex::new(r"instagram\.com/stories/[^/]+/(\d+)").unwrap(),
    ];
}

/// Validate a submitted URL against the known supported shapes.
///
/// Unsupported shapes are rejected before the supported check so that e.g.
/// `/reels/audio/` does not slip through as a reel.
pub fn validate_source_url(url: &str) -> Result<(), IdentifyError> {
    for pattern in UNSUPPORTED_PATTERNS.iter() {
        if pattern.is_match(url) {
            return Err(IdentifyError::new(
                ErrorKind::InvalidUrl,
                "This URL type is not supported. Please provide a direct reel URL \
                 (e.g. https://www.instagram.com/reels/ABC123/)",
            ));
        }
    }

    if SUPPORTED_PATTERNS.iter().any(|p| p.is_match(url)) {
        Ok(())
    } else {
        Err(IdentifyError::new(
            ErrorKind::InvalidUrl,
            "Invalid URL. Please provide a valid Instagram Reel, Post, or Story URL.",
        ))
    }
}

/// Extract the canonical media ID from a source URL.
///
/// Falls back to a UUIDv5 of the URL for valid URLs whose shape carries no
/// extractable shortcode.
pub fn extract_media_id(url: &str) -> String {
    for pattern in MEDIA_ID_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(url) {
            if let Some(id) = captures.get(1) {
                return id.as_str().to_string();
            }
        }
    }
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, url.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_reel_urls() {
        for url in [
            "https://www.instagram.com/reel/ABC123/",
            "https://instagram.com/reels/xyz_-42/",
            "http://www.instagram.com/p/C4FooBar/",
            "https://www.instagram.com/stories/someuser/31415926535/",
            "https://www.instagram.com/some.user/reel/ABC123/",
        ] {
            assert!(validate_source_url(url).is_ok(), "{url} should be valid");
        }
    }

    #[test]
    fn test_unsupported_shapes_rejected() {
        for url in [
            "https://www.instagram.com/reels/audio/123456789/",
            "https://www.instagram.com/explore/tags/music/",
            "https://www.instagram.com/accounts/login/",
        ] {
            let err = validate_source_url(url).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidUrl, "{url} should be rejected");
        }
    }

    #[test]
    fn test_non_instagram_rejected() {
        for url in [
            "https://www.youtube.com/watch?v=abc",
            "https://www.instagram.com/someuser/",
            "not a url at all",
        ] {
            assert!(validate_source_url(url).is_err(), "{url} should be rejected");
        }
    }

    #[test]
    fn test_extract_media_id_reel() {
        assert_eq!(
            extract_media_id("https://www.instagram.com/reel/ABC123/"),
            "ABC123"
        );
        assert_eq!(
            extract_media_id("https://instagram.com/reels/xyz_-42/?igsh=tracking"),
            "xyz_-42"
        );
        assert_eq!(
            extract_media_id("https://www.instagram.com/p/C4FooBar/"),
            "C4FooBar"
        );
    }

    #[test]
    fn test_extract_media_id_story() {
        assert_eq!(
            extract_media_id("https://www.instagram.com/stories/someuser/31415926535/"),
            "31415926535"
        );
    }

    #[test]
    fn test_extract_media_id_fallback_is_stable() {
        let url = "https://www.instagram.com/tv/oddball/";
        let a = extract_media_id(url);
        let b = extract_media_id(url);
        assert_eq!(a, b);
        // Different URLs get different fallback IDs.
        assert_ne!(a, extract_media_id("https://www.instagram.com/tv/other/"));
    }

    #[test]
    fn test_same_media_id_across_url_variants() {
        // /reel/ and /reels/ for the same shortcode dedup to one key.
        assert_eq!(
            extract_media_id("https://www.instagram.com/reel/ABC123/"),
            extract_media_id("https://instagram.com/reels/ABC123/")
        );
    }
}
