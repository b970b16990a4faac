use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::types::{ApplicationId, CacheStats, Flag, Snapshot};

/// Holds the live merged snapshot for all applications.
///
/// The refresh task is the only writer; query paths take the read lock and
/// never observe a snapshot mid-replacement. The write lock is held only for
/// the in-memory swap, never across an await point.
pub struct FlagCache {
    snapshot: RwLock<Snapshot>,
    started_at: Instant,
    // Initially false and set to true once any snapshot (seeded from disk or
    // fetched live) has been applied.
    ready: AtomicBool,
}

impl FlagCache {
    pub fn new() -> Self {
        FlagCache {
            snapshot: RwLock::new(Snapshot::default()),
            started_at: Instant::now(),
            ready: AtomicBool::new(false),
        }
    }

    /// Returns the cached flags for an application, in upstream order.
    /// An application with no cached data yields an empty list.
    pub fn flags_for(&self, app: ApplicationId) -> Vec<Flag> {
        self.snapshot
            .read()
            .applications
            .get(&app)
            .cloned()
            .unwrap_or_default()
    }

    pub fn names_for(&self, app: ApplicationId) -> HashSet<String> {
        self.snapshot
            .read()
            .applications
            .get(&app)
            .map(|flags| flags.iter().map(|flag| flag.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Applies a refreshed snapshot atomically. Applications missing from
    /// the update keep their previous flags: a failed fetch must not erase
    /// data cached by an earlier cycle.
    pub fn apply(&self, update: Snapshot) {
        let mut guard = self.snapshot.write();
        for (app, flags) in update.applications {
            guard.applications.insert(app, flags);
        }
        if update.last_fetch.is_some() {
            guard.last_fetch = update.last_fetch;
        }
        drop(guard);

        self.ready.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.snapshot.read();
        CacheStats {
            uptime_secs: self.started_at.elapsed().as_secs(),
            last_fetch: guard.last_fetch,
            cache_size: guard.applications.values().map(Vec::len).sum(),
        }
    }
}

impl Default for FlagCache {
    fn default() -> Self {
        Self::new()
    }
}
