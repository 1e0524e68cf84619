#![forbid(unsafe_code)]

//! Server-rendered pages. Markup is small enough to build with `format!`;
//! every interpolated value goes through [`encode_minimal`].

use std::fmt::Write;

use htmlescape::encode_minimal;

use crate::progress::CopyProgress;
use crate::youtube::types::count_items;
use crate::youtube::{Channel, Playlist};

/// Seconds between reloads of the progress page.
const PROGRESS_REFRESH_SECS: u32 = 5;

fn layout(title: &str, head_extra: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
{head_extra}<title>{title}</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<main>
{body}
</main>
</body>
</html>
"#,
        title = encode_minimal(title),
    )
}

fn channel_header(channel: &Channel) -> String {
    format!(
        r#"<header><h1>Playlists copy</h1><p class="channel">Signed in as <strong>{}</strong> · <a href="/destroy">Sign out</a></p></header>"#,
        encode_minimal(&channel.snippet.title)
    )
}

fn playlist_card(playlist: &Playlist) -> String {
    let thumbnail = playlist.thumbnail_url();
    let image = if thumbnail.is_empty() {
        String::new()
    } else {
        format!(r#"<img src="{}" alt="">"#, encode_minimal(thumbnail))
    };
    format!(
        r#"{image}<a href="https://www.youtube.com/playlist?list={id}">{title}</a> <span class="count">{count} items</span>"#,
        id = encode_minimal(&playlist.id),
        title = encode_minimal(playlist.title()),
        count = playlist.item_count(),
    )
}

pub(crate) fn require_auth_page(auth_link: &str) -> String {
    let body = format!(
        r#"<header><h1>Playlists copy</h1></header>
<section class="auth">
<p>Merge public YouTube playlists into one of your own.</p>
<a class="button" href="{}">Sign in with Google</a>
</section>"#,
        encode_minimal(auth_link)
    );
    layout("Playlists copy", "", &body)
}

pub(crate) fn index_page(channel: &Channel, own: &[Playlist], sources: &[Playlist]) -> String {
    let mut body = channel_header(channel);

    body.push_str(
        r#"
<section>
<h2>Add source playlists</h2>
<form method="post" action="/add">
<textarea name="links" rows="5" placeholder="https://www.youtube.com/playlist?list=..."></textarea>
<button type="submit">Add</button>
</form>
</section>"#,
    );

    body.push_str("\n<section>\n<h2>Selected playlists</h2>\n");
    if sources.is_empty() {
        body.push_str("<p class=\"empty\">Nothing selected yet.</p>\n");
    } else {
        body.push_str("<form method=\"post\" action=\"/delete\">\n<ul class=\"playlists\">\n");
        for (index, playlist) in sources.iter().enumerate() {
            let _ = writeln!(
                body,
                r#"<li><label><input type="checkbox" name="delete_{index}"> {}</label></li>"#,
                playlist_card(playlist)
            );
        }
        let _ = write!(
            body,
            "</ul>\n<p class=\"total\">Total: {} items</p>\n<button type=\"submit\">Remove checked</button>\n</form>\n",
            count_items(sources)
        );
    }
    body.push_str("</section>\n");

    body.push_str("<section>\n<h2>Copy into</h2>\n");
    if own.is_empty() {
        body.push_str("<p class=\"empty\">Your channel has no playlists.</p>\n");
    } else {
        body.push_str(
            "<form method=\"post\" action=\"/copy\">\n<select name=\"destination-playlist\">\n",
        );
        for playlist in own {
            let _ = writeln!(
                body,
                r#"<option value="{}">{} ({} items)</option>"#,
                encode_minimal(&playlist.id),
                encode_minimal(playlist.title()),
                playlist.item_count()
            );
        }
        body.push_str("</select>\n<button type=\"submit\">Start copying</button>\n</form>\n");
    }
    body.push_str("</section>");

    layout("Playlists copy", "", &body)
}

pub(crate) fn progress_page(channel: &Channel, progress: &CopyProgress, sources: &[Playlist]) -> String {
    let mut body = channel_header(channel);
    let status = if progress.is_finished() {
        "Done"
    } else {
        "Copying"
    };
    let _ = write!(
        body,
        r#"
<section class="progress">
<h2>{status} into {destination}</h2>
<progress max="100" value="{percent}"></progress>
<p>{count} / {end} items ({percent}%)</p>
<a class="button" href="/stop">{action}</a>
</section>
<section>
<h2>From</h2>
<ul class="playlists">
"#,
        destination = playlist_card(&progress.destination),
        percent = progress.percent(),
        count = progress.count,
        end = progress.end,
        action = if progress.is_finished() { "Start over" } else { "Stop" },
    );
    for playlist in sources {
        let _ = writeln!(body, "<li>{}</li>", playlist_card(playlist));
    }
    let _ = write!(
        body,
        "</ul>\n<p class=\"total\">Total: {} items</p>\n</section>",
        count_items(sources)
    );

    let refresh = format!("<meta http-equiv=\"refresh\" content=\"{PROGRESS_REFRESH_SECS}\">\n");
    layout("Copying playlists", &refresh, &body)
}
