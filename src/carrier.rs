//! Callback carriers: the in-slab storage for `then`/`fail` continuations.
//!
//! Each continuation is type-erased behind the [`Carrier`] trait and stored
//! in its own slab block sized to the closure's captures, so every distinct
//! capture shape gets its own pool and nothing touches a heap. What a
//! carrier does with its closure's return value is decided by
//! [`ThenResult`]: a `()`-returning callback prepares its node as resolved
//! (which is also how a reject callback recovers the chain), while a
//! `Defer`-returning callback splices the returned chain in place of its
//! node.

use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};

use crate::invariant;
use crate::pool;
use crate::promise::{self, Defer};

/// A stored continuation. `call` either returns the node's own handle
/// (meaning "use the status I prepared") or a handle to a chain that now
/// stands in for the node.
pub(crate) trait Carrier {
    fn call(&mut self, own: &Defer) -> Defer;
}

/// Owning pointer to a type-erased carrier living in a slab block.
pub(crate) struct CarrierBox {
    ptr: NonNull<dyn Carrier>,
}

impl CarrierBox {
    fn new<C: Carrier + 'static>(carrier: C) -> Self {
        invariant!(
            align_of::<C>() <= crate::config::WORD_SIZE,
            "carrier over-aligned for the arena"
        );
        let raw = pool::obtain(size_of::<C>()) as *mut C;
        unsafe {
            raw.write(carrier);
            pool::add_ref(raw as *mut u8);
        }
        let wide: *mut dyn Carrier = raw;
        Self {
            ptr: unsafe { NonNull::new_unchecked(wide) },
        }
    }

    pub(crate) fn call(&mut self, own: &Defer) -> Defer {
        unsafe { self.ptr.as_mut().call(own) }
    }
}

impl Drop for CarrierBox {
    fn drop(&mut self) {
        let wide = self.ptr.as_ptr();
        let thin = wide as *mut u8;
        unsafe {
            if pool::dec_ref(thin) {
                ptr::drop_in_place(wide);
                pool::release(thin);
            }
        }
    }
}

/// What a `then`-family callback may hand back, and how that outcome is fed
/// into the chain. Implemented for `()` (side-effect callbacks) and
/// [`Defer`] (callbacks that continue into another chain).
pub trait ThenResult {
    #[doc(hidden)]
    fn complete(self, own: &Defer) -> Defer;
}

impl ThenResult for () {
    fn complete(self, own: &Defer) -> Defer {
        own.get().prepare_resolve();
        own.clone()
    }
}

impl ThenResult for Defer {
    fn complete(self, own: &Defer) -> Defer {
        if self.is_null() {
            crate::fatal("callback returned a null handle");
        }
        promise::splice_chain(own, &self);
        self
    }
}

struct RunCarrier<F> {
    func: F,
}

impl<F, R> Carrier for RunCarrier<F>
where
    F: FnMut() -> R,
    R: ThenResult,
{
    fn call(&mut self, own: &Defer) -> Defer {
        (self.func)().complete(own)
    }
}

/// Wrap a callback into a freshly allocated carrier block.
pub(crate) fn make<F, R>(func: F) -> CarrierBox
where
    F: FnMut() -> R + 'static,
    R: ThenResult,
{
    CarrierBox::new(RunCarrier { func })
}
