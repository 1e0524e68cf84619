#![forbid(unsafe_code)]

//! In-memory YouTube and OAuth doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::auth::{AccessType, OAuthFlow, OAuthToken};
use super::types::{
    Channel, ChannelSnippet, Playlist, PlaylistContentDetails, PlaylistItem, PlaylistItemSnippet,
    PlaylistSnippet, ResourceId, Thumbnail, Thumbnails,
};
use super::{ServiceFactory, YouTubeService};
use crate::error::{Error, Result};

pub(crate) fn playlist(id: &str, title: &str, channel_id: &str, item_count: u64) -> Playlist {
    Playlist {
        id: id.to_string(),
        snippet: Some(PlaylistSnippet {
            title: title.to_string(),
            channel_id: channel_id.to_string(),
            channel_title: String::new(),
            thumbnails: Some(Thumbnails {
                medium: Some(Thumbnail {
                    url: format!("https://i.ytimg.com/{id}/mqdefault.jpg"),
                }),
                ..Thumbnails::default()
            }),
        }),
        content_details: Some(PlaylistContentDetails { item_count }),
    }
}

pub(crate) fn video_item(playlist_id: &str, video_id: &str) -> PlaylistItem {
    PlaylistItem {
        id: format!("{playlist_id}-{video_id}"),
        snippet: PlaylistItemSnippet {
            playlist_id: playlist_id.to_string(),
            title: format!("video {video_id}"),
            resource_id: ResourceId {
                kind: "youtube#video".to_string(),
                video_id: Some(video_id.to_string()),
            },
        },
    }
}

pub(crate) fn token(access_token: &str) -> OAuthToken {
    OAuthToken {
        access_token: access_token.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: None,
        expiry: None,
    }
}

/// Holds the first insert call that brings the total to `after` items until
/// [`InsertGate::release`] is called.
pub(crate) struct InsertGate {
    after: usize,
    tripped: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl InsertGate {
    /// Resolves once an insert call is parked at the gate.
    pub(crate) async fn wait_reached(&self) {
        self.reached.notified().await;
    }

    pub(crate) fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
pub(crate) struct MockYouTube {
    channel: Channel,
    playlists: Vec<Playlist>,
    items: HashMap<String, Vec<PlaylistItem>>,
    fail_after: Option<usize>,
    gate: Option<Arc<InsertGate>>,
    inserted: Mutex<Vec<PlaylistItem>>,
}

impl MockYouTube {
    pub(crate) fn new(channel_id: &str) -> Self {
        Self {
            channel: Channel {
                id: channel_id.to_string(),
                snippet: ChannelSnippet {
                    title: format!("channel {channel_id}"),
                    ..ChannelSnippet::default()
                },
            },
            ..Self::default()
        }
    }

    /// Registers a playlist with `item_count` generated videos.
    pub(crate) fn with_playlist(mut self, id: &str, title: &str, owner: &str, item_count: u64) -> Self {
        let items = (0..item_count)
            .map(|n| video_item(id, &format!("{id}-v{n}")))
            .collect();
        self.playlists.push(playlist(id, title, owner, item_count));
        self.items.insert(id.to_string(), items);
        self
    }

    /// Makes every insert past the first `count` successful ones fail.
    pub(crate) fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Parks the insert call that reaches `count` inserted items.
    pub(crate) fn pausing_after(mut self, count: usize) -> (Self, Arc<InsertGate>) {
        let gate = Arc::new(InsertGate {
            after: count,
            tripped: AtomicBool::new(false),
            reached: Notify::new(),
            release: Notify::new(),
        });
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub(crate) fn inserted(&self) -> Vec<PlaylistItem> {
        self.inserted.lock().clone()
    }
}

#[async_trait]
impl YouTubeService for MockYouTube {
    async fn channel_of_mine(&self) -> Result<Channel> {
        Ok(self.channel.clone())
    }

    async fn playlists_by_ids(&self, ids: &[String]) -> Result<Vec<Playlist>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.playlists.iter().find(|playlist| &playlist.id == id))
            .cloned()
            .collect())
    }

    async fn playlists_of_channel(&self, channel_id: &str) -> Result<Vec<Playlist>> {
        Ok(self
            .playlists
            .iter()
            .filter(|playlist| playlist.channel_id() == channel_id)
            .cloned()
            .collect())
    }

    async fn playlist_items_of_playlists(
        &self,
        playlist_ids: &[String],
    ) -> Result<Vec<PlaylistItem>> {
        let mut items = Vec::new();
        for id in playlist_ids {
            let found = self
                .items
                .get(id)
                .ok_or_else(|| Error::not_found(format!("playlist {id}")))?;
            items.extend(found.iter().cloned());
        }
        Ok(items)
    }

    async fn insert_playlist_items(&self, playlist_id: &str, items: &[PlaylistItem]) -> Result<()> {
        let total = {
            let mut inserted = self.inserted.lock();
            for item in items {
                if self.fail_after.is_some_and(|limit| inserted.len() >= limit) {
                    return Err(Error::Api {
                        status: 403,
                        message: "quotaExceeded".to_string(),
                    });
                }
                inserted.push(item.copy_into(playlist_id));
            }
            inserted.len()
        };
        if let Some(gate) = &self.gate
            && total >= gate.after
            && !gate.tripped.swap(true, Ordering::SeqCst)
        {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        Ok(())
    }
}

/// Hands the same mock to every session and remembers which tokens asked.
pub(crate) struct MockFactory {
    service: Arc<MockYouTube>,
    tokens: Mutex<Vec<OAuthToken>>,
}

impl MockFactory {
    pub(crate) fn new(service: Arc<MockYouTube>) -> Self {
        Self {
            service,
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn tokens(&self) -> Vec<OAuthToken> {
        self.tokens.lock().clone()
    }
}

impl ServiceFactory for MockFactory {
    fn user_service(&self, token: OAuthToken) -> Arc<dyn YouTubeService> {
        self.tokens.lock().push(token);
        self.service.clone()
    }
}

/// Accepts any code except `"bad"` and issues `token-<code>`.
pub(crate) struct MockOAuth;

#[async_trait]
impl OAuthFlow for MockOAuth {
    fn auth_code_url(&self, state: &str, access: AccessType) -> String {
        let access = match access {
            AccessType::Online => "online",
            AccessType::Offline => "offline",
        };
        format!("https://accounts.example/o/oauth2/auth?access_type={access}&state={state}")
    }

    async fn exchange(&self, code: &str) -> Result<OAuthToken> {
        if code == "bad" {
            return Err(Error::Api {
                status: 400,
                message: "invalid_grant".to_string(),
            });
        }
        Ok(token(&format!("token-{code}")))
    }
}
