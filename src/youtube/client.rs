#![forbid(unsafe_code)]

//! Blocking `ureq` client for the YouTube Data API v3.
//!
//! Every public call hops onto tokio's blocking pool so request handlers and
//! copy jobs never stall the async workers while waiting on Google.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::auth::{OAuthConfig, OAuthToken};
use super::types::{Channel, Page, Playlist, PlaylistItem};
use super::{ServiceFactory, YouTubeService};
use crate::error::{Error, Result};

pub const API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

const LIST_PARTS: &str = "snippet,id,contentDetails";
const INSERT_PARTS: &str = "snippet";
const MAX_RESULTS: &str = "50";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct YouTubeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    agent: ureq::Agent,
    base_url: String,
    token: Mutex<OAuthToken>,
    oauth: Option<OAuthConfig>,
}

impl YouTubeClient {
    /// Creates a client for one user. With `oauth` set, an expired access
    /// token is refreshed transparently before the next call.
    pub fn new(token: OAuthToken, oauth: Option<OAuthConfig>) -> Self {
        Self::with_base_url(API_BASE_URL, token, oauth)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: OAuthToken,
        oauth: Option<OAuthConfig>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            inner: Arc::new(ClientInner {
                agent,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                token: Mutex::new(token),
                oauth,
            }),
        }
    }

    /// Current token, including any refresh performed since construction.
    pub fn token(&self) -> OAuthToken {
        self.inner.token.lock().clone()
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ClientInner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || call(&inner))
            .await
            .map_err(|err| Error::Task(err.to_string()))?
    }
}

impl ClientInner {
    fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock();
        if token.is_expired()
            && let Some(oauth) = &self.oauth
        {
            *token = oauth.refresh_blocking(&token)?;
        }
        Ok(token.access_token.clone())
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/{resource}", self.base_url)
    }

    fn get<T: DeserializeOwned>(&self, resource: &str, query: &[(&str, &str)]) -> Result<T> {
        let access_token = self.access_token()?;
        let mut request = self
            .agent
            .get(&self.endpoint(resource))
            .set("Authorization", &format!("Bearer {access_token}"));
        for (key, value) in query {
            request = request.query(key, value);
        }
        Ok(request.call()?.into_json()?)
    }

    fn post<B: Serialize>(&self, resource: &str, query: &[(&str, &str)], body: &B) -> Result<()> {
        let access_token = self.access_token()?;
        let mut request = self
            .agent
            .post(&self.endpoint(resource))
            .set("Authorization", &format!("Bearer {access_token}"));
        for (key, value) in query {
            request = request.query(key, value);
        }
        request.send_json(body)?;
        Ok(())
    }

    fn list<T: DeserializeOwned>(&self, resource: &str, filter: (&str, &str)) -> Result<Vec<T>> {
        collect_pages(|page_token| {
            let mut query = vec![
                ("part", LIST_PARTS),
                ("maxResults", MAX_RESULTS),
                filter,
            ];
            if let Some(token) = page_token {
                query.push(("pageToken", token));
            }
            self.get(resource, &query)
        })
    }
}

/// Drains a paginated listing by following `nextPageToken` until it runs out.
pub fn collect_pages<T, F>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<&str>) -> Result<Page<T>>,
{
    let mut items = Vec::new();
    let mut next: Option<String> = None;
    loop {
        let page = fetch(next.as_deref())?;
        items.extend(page.items);
        match page.next_page_token {
            Some(token) if !token.is_empty() => next = Some(token),
            _ => return Ok(items),
        }
    }
}

#[async_trait]
impl YouTubeService for YouTubeClient {
    async fn channel_of_mine(&self) -> Result<Channel> {
        self.blocking(|inner| {
            let page: Page<Channel> =
                inner.get("channels", &[("part", LIST_PARTS), ("mine", "true")])?;
            page.items
                .into_iter()
                .next()
                .ok_or_else(|| Error::not_found("channel: mine"))
        })
        .await
    }

    async fn playlists_by_ids(&self, ids: &[String]) -> Result<Vec<Playlist>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join(",");
        self.blocking(move |inner| inner.list("playlists", ("id", joined.as_str())))
            .await
    }

    async fn playlists_of_channel(&self, channel_id: &str) -> Result<Vec<Playlist>> {
        let channel_id = channel_id.to_string();
        self.blocking(move |inner| inner.list("playlists", ("channelId", channel_id.as_str())))
            .await
    }

    async fn playlist_items_of_playlists(
        &self,
        playlist_ids: &[String],
    ) -> Result<Vec<PlaylistItem>> {
        let playlist_ids = playlist_ids.to_vec();
        self.blocking(move |inner| {
            let mut items = Vec::new();
            for playlist_id in &playlist_ids {
                let page: Vec<PlaylistItem> =
                    inner.list("playlistItems", ("playlistId", playlist_id.as_str()))?;
                debug!(playlist_id = %playlist_id, count = page.len(), "fetched playlist items");
                items.extend(page);
            }
            Ok(items)
        })
        .await
    }

    async fn insert_playlist_items(&self, playlist_id: &str, items: &[PlaylistItem]) -> Result<()> {
        let bodies: Vec<PlaylistItem> = items.iter().map(|item| item.copy_into(playlist_id)).collect();
        self.blocking(move |inner| {
            for body in &bodies {
                inner.post("playlistItems", &[("part", INSERT_PARTS)], body)?;
            }
            Ok(())
        })
        .await
    }
}

/// Production [`ServiceFactory`]: one [`YouTubeClient`] per session token.
#[derive(Clone)]
pub struct YouTubeClientFactory {
    oauth: OAuthConfig,
    base_url: String,
}

impl YouTubeClientFactory {
    pub fn new(oauth: OAuthConfig) -> Self {
        Self {
            oauth,
            base_url: API_BASE_URL.to_string(),
        }
    }
}

impl ServiceFactory for YouTubeClientFactory {
    fn user_service(&self, token: OAuthToken) -> Arc<dyn YouTubeService> {
        Arc::new(YouTubeClient::with_base_url(
            self.base_url.clone(),
            token,
            Some(self.oauth.clone()),
        ))
    }
}
