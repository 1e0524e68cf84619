#![forbid(unsafe_code)]

//! Typed access to the values a browser session carries between requests.
//!
//! Sessions are modelled as small capability traits so helpers ask only for
//! what they touch; [`store::Session`] implements all of them.

pub mod store;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::youtube::{Channel, OAuthToken, Playlist, ServiceFactory, YouTubeService};

pub use store::{SESSION_COOKIE, Session, SessionStore};

pub const TOKEN_KEY: &str = "youtube_token";
pub const AUTH_STATE_KEY: &str = "auth_state";
pub const CHANNEL_KEY: &str = "user_channel";
pub const SOURCE_PLAYLISTS_KEY: &str = "source_playlists";

pub trait SessionGetter {
    fn get(&self, key: &str) -> Option<&Value>;
}

pub trait SessionSetter {
    fn set(&mut self, key: &str, value: Value);
}

pub trait SessionDeleter {
    fn delete(&mut self, key: &str);
}

pub trait SessionSaver {
    fn save(&mut self) -> Result<()>;
}

pub trait SessionDestroyer {
    fn destroy(&mut self) -> Result<()>;
}

pub trait SessionIdentifier {
    fn id(&self) -> &str;
}

pub trait SessionManager:
    SessionGetter + SessionSetter + SessionDeleter + SessionSaver + SessionDestroyer + SessionIdentifier
{
}

impl<T> SessionManager for T where
    T: SessionGetter
        + SessionSetter
        + SessionDeleter
        + SessionSaver
        + SessionDestroyer
        + SessionIdentifier
{
}

/// Whether a setter persists the session itself or leaves it to the caller,
/// which is useful when several values change in one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveMode {
    #[default]
    Immediate,
    Deferred,
}

pub fn save_session<S: SessionSaver + ?Sized>(session: &mut S, mode: SaveMode) -> Result<()> {
    match mode {
        SaveMode::Immediate => session.save(),
        SaveMode::Deferred => Ok(()),
    }
}

fn decode<T: DeserializeOwned, S: SessionGetter + ?Sized>(
    session: &S,
    key: &str,
) -> Option<Result<T>> {
    session.get(key).map(|value| {
        T::deserialize(value).map_err(|err| Error::invalid(format!("session value {key}: {err}")))
    })
}

fn encode<T: Serialize, S: SessionSetter + ?Sized>(session: &mut S, key: &str, value: &T) -> Result<()> {
    session.set(key, serde_json::to_value(value)?);
    Ok(())
}

pub fn get_token<S: SessionGetter + ?Sized>(session: &S) -> Result<OAuthToken> {
    decode(session, TOKEN_KEY).unwrap_or_else(|| Err(Error::not_found("token in the session")))
}

pub fn set_token<S>(session: &mut S, token: &OAuthToken, mode: SaveMode) -> Result<()>
where
    S: SessionSetter + SessionSaver + ?Sized,
{
    if token.access_token.is_empty() {
        return Err(Error::invalid("token has no access token"));
    }
    encode(session, TOKEN_KEY, token)?;
    save_session(session, mode)
}

/// True when `state` is non-empty and equals the stored auth state.
pub fn compare_auth_state<S: SessionGetter + ?Sized>(session: &S, state: &str) -> bool {
    if state.is_empty() {
        return false;
    }
    session.get(AUTH_STATE_KEY).and_then(Value::as_str) == Some(state)
}

/// Stores the pending OAuth state; an empty state removes it.
pub fn set_auth_state<S>(session: &mut S, state: &str, mode: SaveMode) -> Result<()>
where
    S: SessionSetter + SessionDeleter + SessionSaver + ?Sized,
{
    if state.is_empty() {
        session.delete(AUTH_STATE_KEY);
    } else {
        session.set(AUTH_STATE_KEY, Value::String(state.to_string()));
    }
    save_session(session, mode)
}

/// Returns the cached channel, fetching and caching it on first use.
pub async fn get_channel<S>(session: &mut S, service: &dyn YouTubeService) -> Result<Channel>
where
    S: SessionGetter + SessionSetter + SessionSaver + Send + ?Sized,
{
    if let Some(cached) = decode::<Channel, _>(&*session, CHANNEL_KEY) {
        return cached;
    }
    let channel = service.channel_of_mine().await?;
    debug!(channel_id = %channel.id, "caching user channel");
    encode(session, CHANNEL_KEY, &channel)?;
    session.save()?;
    Ok(channel)
}

/// Selected source playlists. A malformed record reads as no selection.
pub fn get_source_playlists<S: SessionGetter + ?Sized>(session: &S) -> Option<Vec<Playlist>> {
    decode(session, SOURCE_PLAYLISTS_KEY).and_then(Result::ok)
}

/// Replaces the selection; `None` removes it altogether.
pub fn set_source_playlists<S>(
    session: &mut S,
    playlists: Option<&[Playlist]>,
    mode: SaveMode,
) -> Result<()>
where
    S: SessionSetter + SessionDeleter + SessionSaver + ?Sized,
{
    match playlists {
        Some(playlists) => encode(session, SOURCE_PLAYLISTS_KEY, &playlists)?,
        None => session.delete(SOURCE_PLAYLISTS_KEY),
    }
    save_session(session, mode)
}

/// API client authenticated with the session's token.
pub fn user_service<S: SessionGetter + ?Sized>(
    session: &S,
    factory: &dyn ServiceFactory,
) -> Result<Arc<dyn YouTubeService>> {
    Ok(factory.user_service(get_token(session)?))
}
