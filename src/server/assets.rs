#![forbid(unsafe_code)]

//! Static files compiled into the binary.

use axum::extract::Path;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use mime_guess::MimeGuess;

const STYLE_CSS: &[u8] = include_bytes!("../../static/style.css");

static ASSETS: &[(&str, &[u8])] = &[("style.css", STYLE_CSS)];

fn lookup(path: &str) -> Option<&'static [u8]> {
    ASSETS
        .iter()
        .find(|(name, _)| *name == path)
        .map(|(_, body)| *body)
}

pub(crate) async fn serve(Path(path): Path<String>) -> Response {
    let Some(body) = lookup(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mime = MimeGuess::from_path(&path).first_or_octet_stream();
    ([(header::CONTENT_TYPE, mime.to_string())], body).into_response()
}
