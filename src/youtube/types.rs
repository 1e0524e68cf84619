#![forbid(unsafe_code)]

//! Subsets of the YouTube Data API v3 resources this tool reads and writes.
//!
//! Field names follow the API's camelCase JSON so the structs can be decoded
//! straight from responses and stored in sessions unchanged.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Thumbnail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnippet {
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub snippet: ChannelSnippet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSnippet {
    pub title: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistContentDetails {
    #[serde(default)]
    pub item_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<PlaylistSnippet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_details: Option<PlaylistContentDetails>,
}

impl Playlist {
    pub fn title(&self) -> &str {
        self.snippet
            .as_ref()
            .map(|snippet| snippet.title.as_str())
            .unwrap_or_default()
    }

    pub fn channel_id(&self) -> &str {
        self.snippet
            .as_ref()
            .map(|snippet| snippet.channel_id.as_str())
            .unwrap_or_default()
    }

    /// Number of items reported by `contentDetails`, zero when the part is
    /// missing.
    pub fn item_count(&self) -> u64 {
        self.content_details
            .as_ref()
            .map(|details| details.item_count)
            .unwrap_or(0)
    }

    /// URL of the medium thumbnail, empty when the playlist has none.
    pub fn thumbnail_url(&self) -> &str {
        self.snippet
            .as_ref()
            .and_then(|snippet| snippet.thumbnails.as_ref())
            .and_then(|thumbnails| thumbnails.medium.as_ref())
            .map(|thumbnail| thumbnail.url.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemSnippet {
    #[serde(default)]
    pub playlist_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub snippet: PlaylistItemSnippet,
}

impl PlaylistItem {
    /// Builds the insert payload that appends the same video to `playlist_id`.
    pub fn copy_into(&self, playlist_id: &str) -> PlaylistItem {
        PlaylistItem {
            id: String::new(),
            snippet: PlaylistItemSnippet {
                playlist_id: playlist_id.to_string(),
                title: String::new(),
                resource_id: self.snippet.resource_id.clone(),
            },
        }
    }
}

/// One page of a `*.list` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

pub fn playlist_ids(playlists: &[Playlist]) -> Vec<String> {
    playlists.iter().map(|playlist| playlist.id.clone()).collect()
}

/// Sums the reported item counts of every playlist.
pub fn count_items(playlists: &[Playlist]) -> u64 {
    playlists.iter().map(Playlist::item_count).sum()
}
