#![forbid(unsafe_code)]

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static PLAYLIST_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://(?:www\.)?youtube\.com/playlist\?list=([a-zA-Z0-9\-_]+)$")
        .expect("playlist link pattern is valid")
});

/// Extracts the playlist id from a `https://[www.]youtube.com/playlist?list=<id>`
/// link. Surrounding whitespace is ignored; anything else is `InvalidUrl`.
pub fn playlist_id_from_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    PLAYLIST_LINK
        .captures(trimmed)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| Error::InvalidUrl(trimmed.to_string()))
}

/// Parses every link, keeping the ids of valid ones and the errors of the rest
/// without stopping at the first failure.
pub fn playlist_ids_from_links<'a, I>(links: I) -> (Vec<String>, Vec<Error>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ids = Vec::new();
    let mut errors = Vec::new();
    for link in links {
        match playlist_id_from_url(link) {
            Ok(id) => ids.push(id),
            Err(err) => errors.push(err),
        }
    }
    (ids, errors)
}
