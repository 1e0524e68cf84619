#![forbid(unsafe_code)]

//! Interactive terminal flow: sign in once, then copy playlists by pasting
//! their links.

use std::io::{BufRead, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::copy::BATCH_SIZE;
use crate::error::{Error, Result};
use crate::youtube::auth::{save_token, token_cache_file, token_from_file};
use crate::youtube::types::playlist_ids;
use crate::youtube::url::playlist_id_from_url;
use crate::youtube::{AccessType, OAuthConfig, OAuthFlow, OAuthToken, YouTubeClient, YouTubeService};

/// OAuth `state` used by the terminal flow, where no session exists to hold a
/// random one.
pub const CLI_AUTH_STATE: &str = "state-token";

/// Signs in with the cached token (or a fresh one), copies the playlists the
/// user enters and returns the number of inserted items.
pub async fn run<R, W>(
    config_dir: &Path,
    oauth: OAuthConfig,
    input: &mut R,
    output: &mut W,
) -> Result<u64>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let cache = token_cache_file(config_dir)?;
    let token = obtain_token(&cache, &oauth, input, output).await?;
    let client = YouTubeClient::new(token.clone(), Some(oauth));
    let copied = copy_playlists(&client, input, output).await;

    let current = client.token();
    if current != token {
        debug!(path = %cache.display(), "storing refreshed token");
        save_token(&cache, &current)?;
    }
    copied
}

/// Loads the token cached at `cache`, or walks the user through the consent
/// page and caches the result.
pub async fn obtain_token<R, W>(
    cache: &Path,
    oauth: &dyn OAuthFlow,
    input: &mut R,
    output: &mut W,
) -> Result<OAuthToken>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    match token_from_file(cache) {
        Ok(token) => return Ok(token),
        Err(err) => debug!(path = %cache.display(), error = %err, "no usable cached token"),
    }

    let link = oauth.auth_code_url(CLI_AUTH_STATE, AccessType::Offline);
    writeln!(
        output,
        "Go to the following link in your browser then type the authorization code: \n{link}"
    )?;
    output.flush()?;
    let code = read_line(input)?.unwrap_or_default();
    if code.is_empty() {
        return Err(Error::invalid("authorization code is empty"));
    }

    let token = oauth.exchange(&code).await?;
    writeln!(output, "Saving credential file to: {}", cache.display())?;
    save_token(cache, &token)?;
    Ok(token)
}

/// Prompts for the destination and the sources, then inserts every source
/// item into the destination in batches.
pub async fn copy_playlists<R, W>(
    service: &dyn YouTubeService,
    input: &mut R,
    output: &mut W,
) -> Result<u64>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let channel = service.channel_of_mine().await?;
    info!(channel = %channel.snippet.title, id = %channel.id, "your channel");

    write!(output, "Enter destination playlist url: ")?;
    output.flush()?;
    let raw = read_line(input)?.unwrap_or_default();
    let destination_id = playlist_id_from_url(&raw)?;
    let destination = service.playlist_by_id(&destination_id).await?;
    if destination.channel_id() != channel.id {
        return Err(Error::invalid(format!("playlist {destination_id} is not yours")));
    }
    info!(playlist = %destination.title(), id = %destination.id, "selected destination playlist");

    writeln!(output, "Enter source playlists (empty line for stop): ")?;
    output.flush()?;
    let mut source_ids = Vec::new();
    while let Some(line) = read_line(input)? {
        if line.is_empty() {
            break;
        }
        match playlist_id_from_url(&line) {
            Ok(id) => source_ids.push(id),
            Err(err) => writeln!(output, "{err}")?,
        }
    }

    let sources = service.playlists_by_ids(&source_ids).await?;
    info!(count = sources.len(), "selected playlists");
    let items = service
        .playlist_items_of_playlists(&playlist_ids(&sources))
        .await?;
    let total = items.len();
    info!(count = total, "found videos");

    info!("start inserting");
    let mut copied = 0;
    for batch in items.chunks(BATCH_SIZE) {
        service.insert_playlist_items(&destination.id, batch).await?;
        copied += batch.len();
        info!(copied, total, "inserted videos");
    }
    Ok(copied as u64)
}

/// Next line without its line ending; `None` at end of input.
fn read_line<R: BufRead + ?Sized>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
