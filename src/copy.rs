#![forbid(unsafe_code)]

//! Background job that appends every item of the source playlists to the
//! destination recorded in the session's progress entry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::progress::ProgressRegistry;
use crate::youtube::YouTubeService;
use crate::youtube::types::{Playlist, playlist_ids};

/// Items inserted between two progress updates.
pub const BATCH_SIZE: usize = 10;

/// Hard limit for a single copy.
pub const COPY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub struct CopyJob {
    pub session_id: String,
    pub service: Arc<dyn YouTubeService>,
    pub registry: ProgressRegistry,
    pub sources: Vec<Playlist>,
    pub cancel: CancellationToken,
}

pub fn spawn(job: CopyJob) -> JoinHandle<()> {
    tokio::spawn(run(job))
}

/// Runs the copy until it completes, fails, times out or is cancelled.
/// Failures are logged and end the job; the progress entry keeps the count of
/// the last finished batch.
pub async fn run(job: CopyJob) {
    let _release = job.cancel.clone().drop_guard();
    let cancel = job.cancel.clone();
    let session_id = job.session_id.as_str();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(session_id, "copy cancelled");
            return;
        }
        outcome = tokio::time::timeout(COPY_TIMEOUT, copy_items(&job)) => outcome,
    };

    match outcome {
        Ok(Ok(Some(copied))) => info!(session_id, copied, "copy finished"),
        Ok(Ok(None)) => debug!(session_id, "copy cancelled"),
        Ok(Err(err)) => warn!(session_id, error = %err, "copy stopped"),
        Err(_) => warn!(session_id, "copy timed out"),
    }
}

/// Returns the final count, or `None` once the job's token is cancelled.
async fn copy_items(job: &CopyJob) -> Result<Option<u64>> {
    let items = job
        .service
        .playlist_items_of_playlists(&playlist_ids(&job.sources))
        .await?;

    let total = items.len() as u64;
    let started = job.registry.update_live(&job.session_id, &job.cancel, |progress| {
        let estimated = progress.end;
        progress.end = total;
        (progress.destination.id.clone(), estimated)
    })?;
    let Some((destination, estimated)) = started else {
        return Ok(None);
    };
    if estimated != total {
        debug!(session_id = %job.session_id, estimated, total, "corrected total");
    }

    let mut copied = 0;
    for batch in items.chunks(BATCH_SIZE) {
        job.service.insert_playlist_items(&destination, batch).await?;
        let delta = batch.len() as u64;
        let advanced = job.registry.update_live(&job.session_id, &job.cancel, |progress| {
            progress.count += delta;
            progress.count
        })?;
        match advanced {
            Some(count) => copied = count,
            None => return Ok(None),
        }
    }
    Ok(Some(copied))
}
