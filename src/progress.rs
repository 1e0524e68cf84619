#![forbid(unsafe_code)]

//! Process-wide table of running copies, keyed by session id.
//!
//! Handlers create and delete records, copy jobs update them, and page renders
//! read them. Cancellation tokens of running jobs live in a side table next to
//! the records so `delete` can stop a job without the record carrying it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::youtube::Playlist;

/// Lifetime stamped on a record when it is first stored.
pub const PROGRESS_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct CopyProgress {
    pub destination: Playlist,
    /// Items copied so far.
    pub count: u64,
    /// Expected total; starts as the sum of reported item counts and is
    /// corrected once the items are listed.
    pub end: u64,
    pub expire: Option<DateTime<Utc>>,
}

impl CopyProgress {
    pub fn new(destination: Playlist, end: u64) -> Self {
        Self {
            destination,
            count: 0,
            end,
            expire: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.count >= self.end
    }

    /// Whole percentage done, capped at 100.
    pub fn percent(&self) -> u64 {
        if self.end == 0 {
            return 100;
        }
        (self.count.saturating_mul(100) / self.end).min(100)
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct ProgressRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    tables: Mutex<Tables>,
    clock: Clock,
}

#[derive(Default)]
struct Tables {
    progress: HashMap<String, CopyProgress>,
    cancels: HashMap<String, CancellationToken>,
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tables: Mutex::new(Tables::default()),
                clock,
            }),
        }
    }

    pub fn get(&self, id: &str) -> Result<CopyProgress> {
        self.inner
            .tables
            .lock()
            .progress
            .get(id)
            .cloned()
            .ok_or_else(|| missing(id))
    }

    /// Stores `progress` under `id`, stamping `expire` when it is unset.
    pub fn set(&self, id: &str, progress: CopyProgress) -> Result<()> {
        let progress = self.stamped(id, progress)?;
        self.inner
            .tables
            .lock()
            .progress
            .insert(id.to_string(), progress);
        Ok(())
    }

    /// Stores a fresh record and binds the token of the job that will fill it
    /// in one step, cancelling the job previously bound to `id`. A stale job
    /// can never touch the new record.
    pub fn start(&self, id: &str, progress: CopyProgress, token: CancellationToken) -> Result<()> {
        let progress = self.stamped(id, progress)?;
        let mut tables = self.inner.tables.lock();
        tables.progress.insert(id.to_string(), progress);
        if let Some(previous) = tables.cancels.insert(id.to_string(), token) {
            debug!(session_id = id, "replacing running copy");
            previous.cancel();
        }
        Ok(())
    }

    fn stamped(&self, id: &str, mut progress: CopyProgress) -> Result<CopyProgress> {
        if id.is_empty() {
            return Err(Error::invalid("progress id is empty"));
        }
        if progress.expire.is_none() {
            progress.expire = Some((self.inner.clock)() + Duration::seconds(PROGRESS_TTL_SECS));
        }
        Ok(progress)
    }

    pub fn set_end(&self, id: &str, end: u64) -> Result<()> {
        let mut tables = self.inner.tables.lock();
        let progress = tables.progress.get_mut(id).ok_or_else(|| missing(id))?;
        progress.end = end;
        Ok(())
    }

    /// Adds `delta` to the copied count and returns the new count.
    pub fn increment(&self, id: &str, delta: u64) -> Result<u64> {
        let mut tables = self.inner.tables.lock();
        let progress = tables.progress.get_mut(id).ok_or_else(|| missing(id))?;
        progress.count += delta;
        Ok(progress.count)
    }

    /// Applies `update` to the record unless `token` is cancelled. Cancelling
    /// happens under the same lock, so a stopped job never writes again.
    /// `Ok(None)` reports a cancelled token.
    pub fn update_live<T>(
        &self,
        id: &str,
        token: &CancellationToken,
        update: impl FnOnce(&mut CopyProgress) -> T,
    ) -> Result<Option<T>> {
        let mut tables = self.inner.tables.lock();
        if token.is_cancelled() {
            return Ok(None);
        }
        let progress = tables.progress.get_mut(id).ok_or_else(|| missing(id))?;
        Ok(Some(update(progress)))
    }

    /// Associates the token of a running copy with `id`. A token already bound
    /// to the same id is cancelled.
    pub fn bind_cancel(&self, id: &str, token: CancellationToken) {
        let mut tables = self.inner.tables.lock();
        if let Some(previous) = tables.cancels.insert(id.to_string(), token) {
            debug!(session_id = id, "replacing running copy");
            previous.cancel();
        }
    }

    /// Cancels the bound copy, if any, and drops the record. Unknown ids are
    /// ignored.
    pub fn delete(&self, id: &str) {
        let mut tables = self.inner.tables.lock();
        tables.progress.remove(id);
        if let Some(token) = tables.cancels.remove(id) {
            token.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.tables.lock().progress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn missing(id: &str) -> Error {
    Error::not_found(format!("progress for {id} session"))
}
