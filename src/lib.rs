#![no_std]

//! rtpromise: JavaScript-style promise chains for heapless embedded targets.
//!
//! Firmware on a few KB of RAM cannot afford a heap or stack-captured
//! coroutines, but still needs to express "wait for the timer, then do X,
//! retry on failure" without hand-written state machines. This crate layers
//! that on three tiers:
//! - A fixed-region bump arena (never frees) backing everything.
//! - Size-indexed slab pools recycling equal-sized blocks through intrusive
//!   free lists, with a refcount per block.
//! - Promise nodes chained forward-strong/backward-weak, driven by
//!   `resolve`/`reject` and composed with `then`/`fail`/`always`/`bypass`.
//!
//! Interrupt handlers never touch the core directly; they enqueue handles on
//! the deferred settle queue, which the main loop drains with [`defer_run`].
//!
//! # Usage
//!
//! ```ignore
//! use rtpromise::{new_promise, defer_attach, defer_run};
//!
//! let step = new_promise(|d| arm_timer(d.clone()))
//!     .then(|| led_on())
//!     .fail(|| led_off());
//!
//! // ISR:       defer_attach(&handle);
//! // main loop: loop { service_io(); defer_run(); }
//! ```

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod arena;
pub mod carrier;
pub mod defer_queue;
pub mod handle;
pub mod list;
mod macros;
pub mod offset;
pub mod pool;
pub mod promise;
pub mod stats;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Build-time constants generated from `rtpromise.toml` by `build.rs`.
pub mod config {
    include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));
}

pub use carrier::ThenResult;
pub use defer_queue::{defer_attach, defer_attach_reject, defer_run};
pub use handle::Handle;
pub use promise::{Defer, Promise, Status, new_promise, reject, while_};

/// Halt on an unrecoverable condition: arena exhaustion or a broken
/// structural invariant.
///
/// On a hosted build this panics so the failure surfaces as a test
/// diagnostic; on target there is nothing to unwind into, so it parks the
/// core.
pub fn fatal(msg: &str) -> ! {
    cfg_if::cfg_if! {
        if #[cfg(any(test, feature = "std"))] {
            panic!("rtpromise fatal: {}", msg);
        } else {
            let _ = msg;
            loop {
                core::hint::spin_loop();
            }
        }
    }
}
