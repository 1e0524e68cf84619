#![forbid(unsafe_code)]

//! Everything that talks to, or describes, the YouTube side: playlist links,
//! OAuth2, the Data API client and its resource types.

pub mod auth;
pub mod client;
#[cfg(test)]
pub(crate) mod mock;
pub mod types;
pub mod url;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
pub use auth::{AccessType, OAuthConfig, OAuthFlow, OAuthToken};
pub use client::{YouTubeClient, YouTubeClientFactory};
pub use types::{Channel, Playlist, PlaylistItem};

/// Operations of the Data API used by the copy flows. Pagination is handled
/// by implementors; callers always receive complete lists.
#[async_trait]
pub trait YouTubeService: Send + Sync {
    /// Channel of the authenticated user.
    async fn channel_of_mine(&self) -> Result<Channel>;

    /// Playlists with the given ids, in the order the API returns them.
    async fn playlists_by_ids(&self, ids: &[String]) -> Result<Vec<Playlist>>;

    async fn playlist_by_id(&self, id: &str) -> Result<Playlist> {
        self.playlists_by_ids(&[id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("playlist {id}")))
    }

    async fn playlists_of_channel(&self, channel_id: &str) -> Result<Vec<Playlist>>;

    /// Items of every playlist, concatenated in playlist order.
    async fn playlist_items_of_playlists(&self, playlist_ids: &[String])
    -> Result<Vec<PlaylistItem>>;

    /// Appends copies of `items` to `playlist_id`, one insert call per item.
    async fn insert_playlist_items(&self, playlist_id: &str, items: &[PlaylistItem]) -> Result<()>;
}

/// Builds an authenticated per-user service from a session token.
pub trait ServiceFactory: Send + Sync {
    fn user_service(&self, token: OAuthToken) -> Arc<dyn YouTubeService>;
}
