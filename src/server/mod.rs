#![forbid(unsafe_code)]

//! HTML front end: sign in with Google, pick source playlists, start and watch
//! a copy.

mod assets;
mod handlers;
mod templates;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::FromRef;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::Error;
use crate::progress::ProgressRegistry;
use crate::session::SessionStore;
use crate::youtube::{OAuthFlow, ServiceFactory};

/// Shared state handed to every handler.
///
/// * `registry` tracks running copies by session id.
/// * `sessions` backs the [`crate::session::Session`] extractor.
/// * `oauth` and `services` are trait objects so tests can run without Google.
#[derive(Clone)]
pub struct AppState {
    pub registry: ProgressRegistry,
    pub sessions: SessionStore,
    pub oauth: Arc<dyn OAuthFlow>,
    pub services: Arc<dyn ServiceFactory>,
}

impl AppState {
    pub fn new(oauth: Arc<dyn OAuthFlow>, services: Arc<dyn ServiceFactory>) -> Self {
        Self {
            registry: ProgressRegistry::new(),
            sessions: SessionStore::new(),
            oauth,
            services,
        }
    }
}

impl FromRef<AppState> for SessionStore {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/auth", get(handlers::auth))
        .route("/destroy", get(handlers::destroy))
        .route("/add", post(handlers::add))
        .route("/delete", post(handlers::delete))
        .route("/copy", post(handlers::copy))
        .route("/stop", get(handlers::stop))
        .route("/static/{*path}", get(assets::serve))
        .layer(CompressionLayer::new())
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the front end on `addr` until Ctrl+C.
pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("web server listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running web server")?;

    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on the handler; Ctrl+C still ends the process.
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

/// Failure of a page handler, rendered as plain text.
#[derive(Debug)]
pub(crate) struct PageError {
    status: StatusCode,
    message: String,
}

impl PageError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for PageError {
    fn from(err: Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        warn!(status = self.status.as_u16(), message = %self.message, "request failed");
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.message,
        )
            .into_response()
    }
}

pub(crate) type PageResult<T> = Result<T, PageError>;
