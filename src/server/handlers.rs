#![forbid(unsafe_code)]

use std::collections::HashMap;

use axum::extract::{Form, Query, State};
use axum::http::header::SET_COOKIE;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{AppState, PageResult, templates};
use crate::copy::{CopyJob, spawn as spawn_copy};
use crate::error::Error;
use crate::progress::CopyProgress;
use crate::session::{
    self, SaveMode, Session, SessionDestroyer, SessionIdentifier, get_source_playlists,
    set_source_playlists,
};
use crate::youtube::auth::generate_state;
use crate::youtube::types::count_items;
use crate::youtube::url::playlist_ids_from_links;
use crate::youtube::{AccessType, Playlist};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuthQuery {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AddForm {
    #[serde(default)]
    links: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CopyForm {
    #[serde(default, rename = "destination-playlist")]
    destination: String,
}

/// Attaches the session cookie, when it changed, to `response`.
fn respond(session: &Session, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if let Some(cookie) = session.cookie_header() {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

fn home(session: &Session) -> Response {
    respond(session, Redirect::to("/"))
}

pub(crate) async fn index(State(state): State<AppState>, mut session: Session) -> PageResult<Response> {
    match session::get_token(&session) {
        Ok(_) => {}
        Err(err) if err.is_not_found() => return require_auth(&state, &mut session),
        Err(err) => return Err(err.into()),
    }

    let service = session::user_service(&session, state.services.as_ref())?;
    let channel = session::get_channel(&mut session, service.as_ref()).await?;

    let page = match state.registry.get(session.id()) {
        Ok(progress) => {
            let sources = get_source_playlists(&session)
                .ok_or_else(|| Error::not_found("source playlists in the user session"))?;
            templates::progress_page(&channel, &progress, &sources)
        }
        Err(err) if err.is_not_found() => {
            let own = service.playlists_of_channel(&channel.id).await?;
            let sources = get_source_playlists(&session).unwrap_or_default();
            templates::index_page(&channel, &own, &sources)
        }
        Err(err) => return Err(err.into()),
    };
    Ok(respond(&session, Html(page)))
}

/// Starts over with a clean session and a new OAuth state.
fn require_auth(state: &AppState, session: &mut Session) -> PageResult<Response> {
    session.destroy()?;
    let auth_state = generate_state();
    session::set_auth_state(session, &auth_state, SaveMode::Immediate)?;
    let link = state.oauth.auth_code_url(&auth_state, AccessType::Online);
    Ok(respond(session, Html(templates::require_auth_page(&link))))
}

pub(crate) async fn auth(
    State(state): State<AppState>,
    mut session: Session,
    Query(query): Query<AuthQuery>,
) -> PageResult<Response> {
    if !session::compare_auth_state(&session, &query.state) {
        return Err(Error::invalid("auth state does not match the session").into());
    }
    if query.code.is_empty() {
        return Err(Error::invalid("authorization code is empty").into());
    }
    let token = state.oauth.exchange(&query.code).await?;
    session::set_auth_state(&mut session, "", SaveMode::Deferred)?;
    session::set_token(&mut session, &token, SaveMode::Immediate)?;
    info!(session_id = session.id(), "user signed in");
    Ok(home(&session))
}

pub(crate) async fn destroy(State(state): State<AppState>, mut session: Session) -> PageResult<Response> {
    state.registry.delete(session.id());
    session.destroy()?;
    Ok(home(&session))
}

pub(crate) async fn add(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<AddForm>,
) -> PageResult<Response> {
    let links = form.links.split('\n').filter(|line| !line.trim().is_empty());
    let (ids, errors) = playlist_ids_from_links(links);
    for err in &errors {
        debug!(error = %err, "skipping link");
    }
    if ids.is_empty() {
        return Ok(home(&session));
    }

    let service = session::user_service(&session, state.services.as_ref())?;
    let added = service.playlists_by_ids(&ids).await?;
    let mut playlists = get_source_playlists(&session).unwrap_or_default();
    playlists.extend(added);
    set_source_playlists(&mut session, Some(playlists.as_slice()), SaveMode::Immediate)?;
    Ok(home(&session))
}

/// Removes the playlists whose `delete_<index>` checkbox is on.
pub(crate) async fn delete(
    mut session: Session,
    Form(form): Form<HashMap<String, String>>,
) -> PageResult<Response> {
    let remaining = get_source_playlists(&session).map(|playlists| {
        playlists
            .into_iter()
            .enumerate()
            .filter(|(index, _)| {
                form.get(&format!("delete_{index}")).map(String::as_str) != Some("on")
            })
            .map(|(_, playlist)| playlist)
            .collect::<Vec<Playlist>>()
    });
    set_source_playlists(&mut session, remaining.as_deref(), SaveMode::Immediate)?;
    Ok(home(&session))
}

pub(crate) async fn copy(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<CopyForm>,
) -> PageResult<Response> {
    let sources = get_source_playlists(&session).unwrap_or_default();
    if sources.is_empty() {
        return Err(Error::invalid("no source playlists selected").into());
    }
    if form.destination.is_empty() {
        return Err(Error::invalid("destination playlist is empty").into());
    }

    let service = session::user_service(&session, state.services.as_ref())?;
    let destination = service.playlist_by_id(&form.destination).await?;
    let channel = session::get_channel(&mut session, service.as_ref()).await?;
    if destination.channel_id() != channel.id {
        return Err(Error::invalid(format!("playlist {} is not yours", destination.id)).into());
    }

    let session_id = session.id().to_string();
    let end = count_items(&sources);
    info!(
        session_id = %session_id,
        destination = %destination.id,
        sources = sources.len(),
        end,
        "starting copy"
    );
    let cancel = CancellationToken::new();
    state
        .registry
        .start(&session_id, CopyProgress::new(destination, end), cancel.clone())?;
    spawn_copy(CopyJob {
        session_id,
        service,
        registry: state.registry.clone(),
        sources,
        cancel,
    });
    Ok(home(&session))
}

pub(crate) async fn stop(State(state): State<AppState>, mut session: Session) -> PageResult<Response> {
    state.registry.delete(session.id());
    set_source_playlists(&mut session, None, SaveMode::Immediate)?;
    Ok(home(&session))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::server::router;
    use crate::session::{AUTH_STATE_KEY, SessionGetter, SessionSaver, SessionStore};
    use crate::youtube::mock::{MockFactory, MockOAuth, MockYouTube, token};

    struct Harness {
        state: AppState,
        service: Arc<MockYouTube>,
        app: Router,
    }

    fn library() -> MockYouTube {
        MockYouTube::new("UC1")
            .with_playlist("MINE", "My mix", "UC1", 0)
            .with_playlist("PL1", "First", "UCX", 3)
            .with_playlist("PL2", "Second", "UCY", 2)
            .with_playlist("PL3", "Third", "UCZ", 4)
    }

    fn harness() -> Harness {
        harness_with(library())
    }

    fn harness_with(service: MockYouTube) -> Harness {
        let service = Arc::new(service);
        let state = AppState::new(Arc::new(MockOAuth), Arc::new(MockFactory::new(service.clone())));
        let app = router(state.clone());
        Harness { state, service, app }
    }

    impl Harness {
        /// Stores a signed-in session and returns its cookie.
        fn signed_in(&self, selection: &[&str]) -> String {
            let mut session = self.state.sessions.load(None);
            session::set_token(&mut session, &token("user-token"), SaveMode::Deferred).unwrap();
            if !selection.is_empty() {
                let playlists: Vec<Playlist> = selection
                    .iter()
                    .map(|id| crate::youtube::mock::playlist(id, id, "UCX", 1))
                    .collect();
                set_source_playlists(&mut session, Some(playlists.as_slice()), SaveMode::Deferred).unwrap();
            }
            session.save().unwrap();
            format!("session_id={}", session.id())
        }

        fn session(&self, cookie: &str) -> Session {
            self.state.sessions.load(cookie.strip_prefix("session_id="))
        }

        fn selection(&self, cookie: &str) -> Vec<String> {
            get_source_playlists(&self.session(cookie))
                .unwrap_or_default()
                .into_iter()
                .map(|playlist| playlist.id)
                .collect()
        }

        async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
            let mut request = Request::builder().uri(uri);
            if let Some(cookie) = cookie {
                request = request.header(COOKIE, cookie);
            }
            self.app
                .clone()
                .oneshot(request.body(Body::empty()).unwrap())
                .await
                .unwrap()
        }

        async fn post(&self, uri: &str, cookie: &str, fields: &[(&str, &str)]) -> Response {
            let body = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields)
                .finish();
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header(COOKIE, cookie)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap();
            self.app.clone().oneshot(request).await.unwrap()
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn assert_redirect_home(response: &Response) {
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/");
    }

    fn cookie_from(response: &Response) -> String {
        let header = response.headers()[SET_COOKIE].to_str().unwrap();
        header.split(';').next().unwrap().to_string()
    }

    fn link(id: &str) -> String {
        format!("https://www.youtube.com/playlist?list={id}")
    }

    #[tokio::test]
    async fn anonymous_visit_renders_sign_in_and_stores_state() {
        let h = harness();
        let response = h.get("/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = cookie_from(&response);
        let body = body_text(response).await;

        let session = h.session(&cookie);
        let state = session.get(AUTH_STATE_KEY).and_then(|v| v.as_str()).unwrap().to_string();
        assert!(body.contains(&format!("state={state}")));
        assert!(body.contains("access_type=online"));
    }

    #[tokio::test]
    async fn anonymous_visits_do_not_pile_up_expired_sessions() {
        let mut state = AppState::new(
            Arc::new(MockOAuth),
            Arc::new(MockFactory::new(Arc::new(library()))),
        );
        state.sessions = SessionStore::with_ttl(Duration::ZERO);
        let app = router(state.clone());
        for _ in 0..200 {
            let request = Request::builder().uri("/").body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert!(state.sessions.len() <= 1);
    }

    #[tokio::test]
    async fn auth_callback_stores_token_and_clears_state() {
        let h = harness();
        let cookie = cookie_from(&h.get("/", None).await);
        let state = h
            .session(&cookie)
            .get(AUTH_STATE_KEY)
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string();

        let response = h.get(&format!("/auth?state={state}&code=abc"), Some(&cookie)).await;
        assert_redirect_home(&response);

        let session = h.session(&cookie);
        assert_eq!(session::get_token(&session).unwrap().access_token, "token-abc");
        assert!(session.get(AUTH_STATE_KEY).is_none());
    }

    #[tokio::test]
    async fn auth_callback_rejects_wrong_state_or_empty_code() {
        let h = harness();
        let cookie = cookie_from(&h.get("/", None).await);
        let state = h
            .session(&cookie)
            .get(AUTH_STATE_KEY)
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string();

        let response = h.get("/auth?state=forged&code=abc", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = h.get(&format!("/auth?state={state}&code="), Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("code"));

        assert!(session::get_token(&h.session(&cookie)).is_err());
    }

    #[tokio::test]
    async fn signed_in_index_lists_own_playlists() {
        let h = harness();
        let cookie = h.signed_in(&["PL1"]);
        let response = h.get("/", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("channel UC1"));
        assert!(body.contains("My mix"));
        assert!(body.contains("delete_0"));
    }

    #[tokio::test]
    async fn adding_links_appends_to_selection() {
        let h = harness();
        let cookie = h.signed_in(&[]);

        let links = format!("{}\n{}\n", link("PL1"), link("PL2"));
        assert_redirect_home(&h.post("/add", &cookie, &[("links", &links)]).await);
        assert_eq!(h.selection(&cookie), vec!["PL1", "PL2"]);

        assert_redirect_home(&h.post("/add", &cookie, &[("links", &link("PL3"))]).await);
        assert_eq!(h.selection(&cookie), vec!["PL1", "PL2", "PL3"]);
    }

    #[tokio::test]
    async fn adding_only_invalid_links_changes_nothing() {
        let h = harness();
        let cookie = h.signed_in(&["PL1"]);
        let response = h
            .post("/add", &cookie, &[("links", "not a link\nhttps://example.com")])
            .await;
        assert_redirect_home(&response);
        assert_eq!(h.selection(&cookie), vec!["PL1"]);
    }

    #[tokio::test]
    async fn delete_removes_checked_indexes() {
        let h = harness();
        let cookie = h.signed_in(&["PL1", "PL2", "PL3"]);
        let response = h
            .post("/delete", &cookie, &[("delete_0", "on"), ("delete_2", "on")])
            .await;
        assert_redirect_home(&response);
        assert_eq!(h.selection(&cookie), vec!["PL2"]);
    }

    #[tokio::test]
    async fn copy_runs_in_background_and_index_shows_progress() {
        let h = harness();
        let cookie = h.signed_in(&["PL1", "PL2"]);
        let response = h
            .post("/copy", &cookie, &[("destination-playlist", "MINE")])
            .await;
        assert_redirect_home(&response);

        let session_id = h.session(&cookie).id().to_string();
        let mut finished = false;
        for _ in 0..100 {
            if h.state.registry.get(&session_id).unwrap().is_finished() {
                finished = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(finished, "copy did not finish");
        let progress = h.state.registry.get(&session_id).unwrap();
        assert_eq!((progress.count, progress.end), (5, 5));
        assert_eq!(h.service.inserted().len(), 5);

        let body = body_text(h.get("/", Some(&cookie)).await).await;
        assert!(body.contains("http-equiv=\"refresh\""));
        assert!(body.contains("5 / 5"));
    }

    #[tokio::test]
    async fn copy_into_foreign_playlist_is_rejected() {
        let h = harness();
        let cookie = h.signed_in(&["PL1"]);
        let response = h
            .post("/copy", &cookie, &[("destination-playlist", "PL2")])
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("is not yours"));
        assert!(h.state.registry.is_empty());
    }

    #[tokio::test]
    async fn copy_without_selection_is_rejected() {
        let h = harness();
        let cookie = h.signed_in(&[]);
        let response = h
            .post("/copy", &cookie, &[("destination-playlist", "MINE")])
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(h.state.registry.is_empty());
    }

    #[tokio::test]
    async fn stop_cancels_running_copy_and_clears_selection() {
        let (service, gate) = library().pausing_after(1);
        let h = harness_with(service);
        let cookie = h.signed_in(&["PL1", "PL2"]);
        let response = h
            .post("/copy", &cookie, &[("destination-playlist", "MINE")])
            .await;
        assert_redirect_home(&response);

        tokio::time::timeout(Duration::from_secs(5), gate.wait_reached())
            .await
            .unwrap();
        assert_redirect_home(&h.get("/stop", Some(&cookie)).await);
        gate.release();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(h.state.registry.is_empty());
        assert_eq!(h.service.inserted().len(), 5);
        assert!(get_source_playlists(&h.session(&cookie)).is_none());
    }

    #[tokio::test]
    async fn second_copy_replaces_the_running_one() {
        let (service, gate) = library().pausing_after(1);
        let h = harness_with(service);
        let cookie = h.signed_in(&["PL1", "PL2"]);
        let session_id = h.session(&cookie).id().to_string();
        h.post("/copy", &cookie, &[("destination-playlist", "MINE")]).await;
        tokio::time::timeout(Duration::from_secs(5), gate.wait_reached())
            .await
            .unwrap();

        assert_redirect_home(&h.post("/copy", &cookie, &[("destination-playlist", "MINE")]).await);
        gate.release();
        for _ in 0..100 {
            if h.state.registry.get(&session_id).unwrap().is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let progress = h.state.registry.get(&session_id).unwrap();
        assert_eq!((progress.count, progress.end), (5, 5));
        assert_eq!(h.service.inserted().len(), 10);
    }

    #[tokio::test]
    async fn destroy_drops_session_and_expires_cookie() {
        let h = harness();
        let cookie = h.signed_in(&["PL1"]);
        let response = h.get("/destroy", Some(&cookie)).await;
        assert_redirect_home(&response);
        let header = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(header.contains("Max-Age=0"));
        assert!(h.state.sessions.is_empty());
    }

    #[tokio::test]
    async fn static_assets_are_served_with_mime_type() {
        let h = harness();
        let response = h.get("/static/style.css", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE].to_str().unwrap().starts_with("text/css"));

        assert_eq!(h.get("/static/missing.js", None).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(h.get("/static/", None).await.status(), StatusCode::NOT_FOUND);
    }
}
