//! Test-only lifecycle helpers.
//!
//! The arena, pool table, deferred queue and counters are process
//! singletons, so scenarios must not interleave and each one starts from
//! power-on state. Hold [`serial`] for the whole test body, call [`reset`]
//! first, and make sure every handle is dropped before the next reset.

use std::sync::{Mutex, MutexGuard};

use crate::{arena, defer_queue, pool, stats};

static SERIAL: Mutex<()> = Mutex::new(());

/// Take the scenario lock. Survives a poisoned lock so one failing test
/// does not cascade.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// Return the arena, pool table, deferred queue and counters to their
/// power-on state. Outstanding handles become invalid; drop them first.
pub fn reset() {
    defer_queue::reset();
    pool::reset();
    arena::reset();
    stats::reset();
}
