// URL classification: single video vs. playlist vs. invalid
//
// Pure string matching, no network access. A playlist indicator wins over a
// single-video shape, so `watch?v=<id>&list=<id>` is a playlist: links shared
// from inside a playlist download the playlist, and the user can still pick
// a subset of members.

use lazy_static::lazy_static;
use regex::Regex;

use super::models::UrlClassification;

lazy_static! {
    /// Anything that looks like `[scheme://]host.tld[:port]/path`
    static ref URL_SHAPE_RE: Regex = Regex::new(
        r"(?i)^(https?://)?[a-z0-9-]+(\.[a-z0-9-]+)*\.[a-z]{2,}(:\d+)?/\S*$"
    ).unwrap();

    /// Watch-page form `/watch?...v=<id>` and `/shorts/<id>`
    static ref WATCH_RE: Regex = Regex::new(
        r"(?i)^(https?://)?[^/\s]+/(watch\?([^#\s]*&)?v=|shorts/)[A-Za-z0-9_-]{11}([&?#/]\S*)?$"
    ).unwrap();

    /// Short-link form `youtu.be/<id>`
    static ref SHORT_LINK_RE: Regex = Regex::new(
        r"(?i)^(https?://)?(www\.)?youtu\.be/[A-Za-z0-9_-]{11}([&?#/]\S*)?$"
    ).unwrap();

    /// `playlist?list=<id>`, `/playlist/<id>` or a `list=<id>` query parameter
    static ref COLLECTION_RE: Regex = Regex::new(
        r"(?i)(playlist\?list=|[?&]list=|/playlist/)[A-Za-z0-9_-]+"
    ).unwrap();
}

/// Classify a user-supplied URL.
pub fn classify(url: &str) -> UrlClassification {
    let url = url.trim();
    if url.is_empty() || !URL_SHAPE_RE.is_match(url) {
        return UrlClassification::Invalid;
    }

    if is_collection(url) {
        UrlClassification::Collection
    } else if WATCH_RE.is_match(url) || SHORT_LINK_RE.is_match(url) {
        UrlClassification::SingleItem
    } else {
        UrlClassification::Invalid
    }
}

/// True when the URL carries any playlist indicator
pub fn is_collection(url: &str) -> bool {
    COLLECTION_RE.is_match(url)
}
