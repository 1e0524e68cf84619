#![forbid(unsafe_code)]

//! In-memory, cookie-keyed session store and the axum extractor built on it.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{
    SessionDeleter, SessionDestroyer, SessionGetter, SessionIdentifier, SessionSaver,
    SessionSetter,
};
use crate::error::{Error, Result};

pub const SESSION_COOKIE: &str = "session_id";
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    sessions: RwLock<HashMap<String, StoredSession>>,
    ttl: Duration,
}

struct StoredSession {
    data: HashMap<String, Value>,
    expires_at: Instant,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                sessions: RwLock::new(HashMap::new()),
                ttl,
            }),
        }
    }

    /// Returns the live session named by the cookie, or a fresh one with a new
    /// id. Unknown ids are never adopted.
    pub fn load(&self, cookie_id: Option<&str>) -> Session {
        if let Some(id) = cookie_id {
            let now = Instant::now();
            let found = self.inner.sessions.read().get(id).map(|stored| {
                (stored.expires_at > now).then(|| stored.data.clone())
            });
            match found {
                Some(Some(data)) => return Session::existing(id.to_string(), data, self.clone()),
                Some(None) => {
                    self.inner.sessions.write().remove(id);
                }
                None => {}
            }
        }
        Session::fresh(self.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `data` under `id` and drops every expired session on the way.
    fn put(&self, id: &str, data: HashMap<String, Value>) {
        let now = Instant::now();
        let stored = StoredSession {
            data,
            expires_at: now + self.inner.ttl,
        };
        let mut sessions = self.inner.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        let swept = before - sessions.len();
        if swept > 0 {
            debug!(swept, "dropped expired sessions");
        }
        sessions.insert(id.to_string(), stored);
    }

    fn remove(&self, id: &str) {
        self.inner.sessions.write().remove(id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CookieUpdate {
    Unchanged,
    Refresh,
    Expire,
}

/// One request's view of a session. Changes stay local until [`SessionSaver::save`].
pub struct Session {
    id: String,
    data: HashMap<String, Value>,
    store: SessionStore,
    cookie: CookieUpdate,
}

impl Session {
    fn existing(id: String, data: HashMap<String, Value>, store: SessionStore) -> Self {
        Self {
            id,
            data,
            store,
            cookie: CookieUpdate::Unchanged,
        }
    }

    fn fresh(store: SessionStore) -> Self {
        Self::existing(Uuid::new_v4().to_string(), HashMap::new(), store)
    }

    /// `Set-Cookie` value the response must carry, if the cookie changed.
    pub fn cookie_header(&self) -> Option<HeaderValue> {
        match self.cookie {
            CookieUpdate::Unchanged => None,
            CookieUpdate::Refresh => HeaderValue::from_str(&format!(
                "{SESSION_COOKIE}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
                self.id,
                self.store.inner.ttl.as_secs()
            ))
            .ok(),
            CookieUpdate::Expire => Some(HeaderValue::from_static(
                "session_id=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax",
            )),
        }
    }
}

impl SessionGetter for Session {
    fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl SessionSetter for Session {
    fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }
}

impl SessionDeleter for Session {
    fn delete(&mut self, key: &str) {
        self.data.remove(key);
    }
}

impl SessionSaver for Session {
    fn save(&mut self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid("session has no id"));
        }
        self.store.put(&self.id, self.data.clone());
        self.cookie = CookieUpdate::Refresh;
        Ok(())
    }
}

impl SessionDestroyer for Session {
    /// Drops the stored record and continues under a new id, so a later save
    /// in the same request never revives the old cookie.
    fn destroy(&mut self) -> Result<()> {
        self.store.remove(&self.id);
        self.data.clear();
        self.id = Uuid::new_v4().to_string();
        self.cookie = CookieUpdate::Expire;
        Ok(())
    }
}

impl SessionIdentifier for Session {
    fn id(&self) -> &str {
        &self.id
    }
}

impl<S> FromRequestParts<S> for Session
where
    SessionStore: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let store = SessionStore::from_ref(state);
        let id = session_id_from_headers(&parts.headers);
        Ok(store.load(id.as_deref()))
    }
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|raw| cookie_value(raw, SESSION_COOKIE))
}

fn cookie_value(raw: &str, needle: &str) -> Option<String> {
    raw.split(';').find_map(|entry| {
        let (name, value) = entry.split_once('=')?;
        if name.trim() != needle {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}
