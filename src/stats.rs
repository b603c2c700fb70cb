//! Allocation and queue diagnostics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only and are
//! never used for synchronization. `bytes_live` and `arena_used` are the two
//! counters the embedder contract exposes for RAM budgeting; the rest break
//! the same numbers down for debugging.
//!
//! Obtain a [`Snapshot`] with [`snapshot()`]. Individual counter loads are
//! atomic but the snapshot as a whole is not globally consistent; for
//! monitoring that is always sufficient.

use core::sync::atomic::{AtomicU32, Ordering};

pub(crate) struct Stats {
    /// Bytes currently held by live slab blocks (payloads only).
    pub bytes_live: AtomicU32,
    /// Bump-cursor high-water mark of the arena, in bytes.
    pub arena_used: AtomicU32,
    /// Calls to `pool::obtain`.
    pub obtain_count: AtomicU32,
    /// Calls to `pool::release`.
    pub release_count: AtomicU32,
    /// Obtains served from a pool free list instead of arena growth.
    pub pool_reuse_count: AtomicU32,
    /// Handles appended to the deferred settle queue.
    pub defer_enqueued: AtomicU32,
    /// Handles settled by `defer_run`.
    pub defer_drained: AtomicU32,
}

impl Stats {
    const fn new() -> Self {
        Self {
            bytes_live: AtomicU32::new(0),
            arena_used: AtomicU32::new(0),
            obtain_count: AtomicU32::new(0),
            release_count: AtomicU32::new(0),
            pool_reuse_count: AtomicU32::new(0),
            defer_enqueued: AtomicU32::new(0),
            defer_drained: AtomicU32::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time copy of all diagnostics counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    /// Bytes currently held by live slab blocks (payloads only).
    pub bytes_live: u32,
    /// Bump-cursor high-water mark of the arena, in bytes.
    pub arena_used: u32,
    /// Calls to `pool::obtain`.
    pub obtain_count: u32,
    /// Calls to `pool::release`.
    pub release_count: u32,
    /// Obtains served from a pool free list instead of arena growth.
    pub pool_reuse_count: u32,
    /// Handles appended to the deferred settle queue.
    pub defer_enqueued: u32,
    /// Handles settled by `defer_run`.
    pub defer_drained: u32,
}

/// Load every counter with `Relaxed` ordering.
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        bytes_live: s.bytes_live.load(Ordering::Relaxed),
        arena_used: s.arena_used.load(Ordering::Relaxed),
        obtain_count: s.obtain_count.load(Ordering::Relaxed),
        release_count: s.release_count.load(Ordering::Relaxed),
        pool_reuse_count: s.pool_reuse_count.load(Ordering::Relaxed),
        defer_enqueued: s.defer_enqueued.load(Ordering::Relaxed),
        defer_drained: s.defer_drained.load(Ordering::Relaxed),
    }
}

#[cfg(any(test, feature = "testing"))]
pub(crate) fn reset() {
    let s = &STATS;
    s.bytes_live.store(0, Ordering::Relaxed);
    s.arena_used.store(0, Ordering::Relaxed);
    s.obtain_count.store(0, Ordering::Relaxed);
    s.release_count.store(0, Ordering::Relaxed);
    s.pool_reuse_count.store(0, Ordering::Relaxed);
    s.defer_enqueued.store(0, Ordering::Relaxed);
    s.defer_drained.store(0, Ordering::Relaxed);
}
