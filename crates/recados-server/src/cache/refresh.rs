//! Background repair of stale cache keys.
//!
//! A pass raises the store's `refreshing` flag, so readers go straight to
//! the repository while it runs. Each stale key is deleted again and
//! reloaded from the repository. A key is cleared from the stale set only if
//! nobody re-marked it during the pass.

use std::sync::Arc;
use std::time::Duration;

use recados_storage::{CacheError, DynCacheStore, DynNoteRepository, StorageError};
use tokio::task::JoinHandle;

use super::notes::{CacheKey, NoteCache};

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    /// Keys reloaded from the repository.
    pub refilled: usize,
    /// Keys deleted with nothing to reload.
    pub evicted: usize,
    /// Keys still stale when the pass ended.
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another pass held the flag.
    Skipped,
    Completed(RefreshReport),
}

enum Repaired {
    Refilled,
    Evicted,
}

/// Lowers the flag when the pass ends, including on panic or cancellation.
struct RefreshingGuard(DynCacheStore);

impl Drop for RefreshingGuard {
    fn drop(&mut self) {
        self.0.set_refreshing(false);
    }
}

pub struct CacheRefresher {
    cache: Arc<NoteCache>,
    notes: DynNoteRepository,
}

impl CacheRefresher {
    pub fn new(cache: Arc<NoteCache>, notes: DynNoteRepository) -> Self {
        Self { cache, notes }
    }

    pub async fn run_pass(&self) -> RefreshOutcome {
        let store = self.cache.store().clone();
        if store.set_refreshing(true) {
            tracing::debug!("refresh pass already running, skipping");
            crate::metrics::record_refresh_pass("skipped");
            return RefreshOutcome::Skipped;
        }
        let _guard = RefreshingGuard(store);

        let mut report = RefreshReport::default();
        for (key, entry) in self.cache.stale_entries() {
            match self.repair(&key, entry.owner_id).await {
                Ok(repaired) => {
                    if !self.cache.resolve(&key, entry.seq) {
                        continue;
                    }
                    match repaired {
                        Repaired::Refilled => report.refilled += 1,
                        Repaired::Evicted => report.evicted += 1,
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "stale key not repaired, will retry");
                }
            }
        }
        report.remaining = self.cache.stale_len();

        if report.remaining > 0 {
            crate::metrics::record_refresh_pass("partial");
        } else {
            crate::metrics::record_refresh_pass("completed");
        }
        if report.refilled + report.evicted + report.remaining > 0 {
            tracing::info!(
                refilled = report.refilled,
                evicted = report.evicted,
                remaining = report.remaining,
                "cache refresh pass finished"
            );
        }
        RefreshOutcome::Completed(report)
    }

    async fn repair(&self, key: &str, owner_id: i64) -> Result<Repaired, RefreshError> {
        let ticket = self.cache.ticket();
        self.cache.evict(key).await?;

        match CacheKey::parse(key) {
            Some(CacheKey::Note(uid)) => {
                match self.notes.find_by_uid_and_owner(&uid, owner_id).await? {
                    Some(note) => {
                        self.cache.refill_note(&note, ticket).await?;
                        Ok(Repaired::Refilled)
                    }
                    None => Ok(Repaired::Evicted),
                }
            }
            Some(CacheKey::Notes(owner)) => {
                let notes = self.notes.find_all_by_owner(owner).await?;
                self.cache.refill_notes(owner, &notes, ticket).await?;
                Ok(Repaired::Refilled)
            }
            None => Ok(Repaired::Evicted),
        }
    }

    /// Runs a pass every `interval` until the handle is aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.run_pass().await;
            }
        })
    }
}
