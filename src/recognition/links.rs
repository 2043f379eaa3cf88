//! Pure extraction of streaming links and artwork from a [`TrackMatch`].
//!
//! Each extraction is a function from the provider schema to an optional
//! string; callers fall back to the empty string when a link is absent.

use super::{HubAction, TrackMatch};

const SPOTIFY_SCHEME: &str = "spotify:";
const SPOTIFY_SEARCH_SCHEME: &str = "spotify:search:";

/// Apple Music deep link: the first `uri`-typed action under an
/// `applemusic` provider option.
pub fn apple_music_link(track: &TrackMatch) -> Option<String> {
    track
        .hub
        .options
        .iter()
        .filter(|option| option.providername.as_deref() == Some("applemusic"))
        .flat_map(|option| option.actions.iter())
        .find_map(uri_action)
}

/// Spotify link: the first `spotify:`-scheme action URI under a `SPOTIFY`
/// provider entry. Search URIs are converted to a web search URL; other
/// Spotify URIs carry no usable web link.
pub fn spotify_link(track: &TrackMatch) -> Option<String> {
    let uri = track
        .hub
        .providers
        .iter()
        .filter(|provider| provider.provider_type.as_deref() == Some("SPOTIFY"))
        .flat_map(|provider| provider.actions.iter())
        .filter_map(|action| action.uri.as_deref())
        .find(|uri| uri.starts_with(SPOTIFY_SCHEME))?;

    let search_term = uri.strip_prefix(SPOTIFY_SEARCH_SCHEME)?;
    Some(format!(
        "https://open.spotify.com/search/{}",
        urlencoding::encode(search_term)
    ))
}

/// Artwork URL, preferring cover art over the background image.
pub fn artwork(track: &TrackMatch) -> Option<String> {
    non_empty(track.images.coverart.as_deref())
        .or_else(|| non_empty(track.images.background.as_deref()))
}

fn uri_action(action: &HubAction) -> Option<String> {
    if action.action_type.as_deref() == Some("uri") {
        non_empty(action.uri.as_deref())
    } else {
        None
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(|v| v.to_string())
}
