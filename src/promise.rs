//! Promise nodes, chains, and the resolution protocol.
//!
//! A node is one link in an asynchronous flow: a status machine plus an
//! optional resolve and reject continuation. Nodes form a doubly-linked,
//! acyclic chain with asymmetric ownership — the forward link is a strong
//! [`Handle`], the backward link a bare arena offset cleared by the
//! predecessor's destructor. Settling a node walks the chain forward,
//! firing each successor's carrier at most once, splicing in any chain a
//! carrier returns, and stopping at the first node that is still pending.
//!
//! Callbacks must not panic; the walk assumes they return.

use core::cell::Cell;

use crate::carrier::{self, CarrierBox, ThenResult};
use crate::config::OffsetRepr;
use crate::handle::Handle;
use crate::invariant;
use crate::offset::{self, NULL_OFFSET};

/// Node lifecycle. Status only ever advances: `Init -> Resolved -> Finished`
/// or `Init -> Rejected -> Finished`, never backwards and never between the
/// settled pair.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    /// Pending: the suspended computation this node represents.
    Init = 0,
    /// Settled successfully; forward drive pending or impossible.
    Resolved = 1,
    /// Settled with failure.
    Rejected = 2,
    /// Carriers consumed; terminal.
    Finished = 3,
}

/// A single link in an asynchronous chain.
pub struct Promise {
    /// Strong forward link; owns the successor.
    next: Cell<Defer>,
    /// Weak backward link; valid while the predecessor lives.
    prev: Cell<OffsetRepr>,
    status: Cell<Status>,
    resolved_cb: Cell<Option<CarrierBox>>,
    rejected_cb: Cell<Option<CarrierBox>>,
    /// Driver-visible label (timer, irq, ...) for debugging.
    #[cfg(feature = "debug")]
    tag: Cell<u8>,
}

/// Refcounted handle to a promise node — the type user code passes around.
pub type Defer = Handle<Promise>;

impl Promise {
    pub(crate) fn alloc(
        resolved_cb: Option<CarrierBox>,
        rejected_cb: Option<CarrierBox>,
    ) -> Defer {
        Handle::alloc(Promise {
            next: Cell::new(Defer::null()),
            prev: Cell::new(NULL_OFFSET),
            status: Cell::new(Status::Init),
            resolved_cb: Cell::new(resolved_cb),
            rejected_cb: Cell::new(rejected_cb),
            #[cfg(feature = "debug")]
            tag: Cell::new(0),
        })
    }

    /// Current lifecycle state.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Mark resolved, but only from `Init`; settled nodes are immutable.
    pub(crate) fn prepare_resolve(&self) {
        if self.status.get() == Status::Init {
            self.status.set(Status::Resolved);
        }
    }

    /// Mark rejected, but only from `Init`.
    pub(crate) fn prepare_reject(&self) {
        if self.status.get() == Status::Init {
            self.status.set(Status::Rejected);
        }
    }

    #[cfg(feature = "debug")]
    pub fn set_tag(&self, tag: u8) {
        self.tag.set(tag);
    }

    #[cfg(feature = "debug")]
    pub fn tag(&self) -> u8 {
        self.tag.get()
    }

    fn next_clone(&self) -> Defer {
        let next = self.next.take();
        let clone = next.clone();
        self.next.set(next);
        clone
    }

    fn next_raw(&self) -> *mut Promise {
        let next = self.next.take();
        let ptr = next.as_ptr();
        self.next.set(next);
        ptr
    }

    fn prev_raw(&self) -> *mut Promise {
        offset::from_offset(self.prev.get()) as *mut Promise
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        // The backward link is weak: it must not dangle once we are gone.
        let next = self.next.take();
        if !next.is_null() {
            next.get().prev.set(NULL_OFFSET);
        }
        // Dropping `next` here releases the forward reference; teardown
        // cascades down the chain.
    }
}

impl Handle<Promise> {
    /// Current status of the node. The handle must be non-null.
    pub fn status(&self) -> Status {
        self.get().status()
    }

    /// Settle this node as resolved and drive the chain forward. A no-op on
    /// anything but a pending node.
    pub fn resolve(&self) {
        invariant!(!self.is_null(), "resolve on null handle");
        let p = self.get();
        p.prepare_resolve();
        if p.status.get() == Status::Resolved {
            self.call_next();
        }
    }

    /// Settle this node as rejected and drive the chain forward. A no-op on
    /// anything but a pending node.
    pub fn reject(&self) {
        invariant!(!self.is_null(), "reject on null handle");
        let p = self.get();
        p.prepare_reject();
        if p.status.get() == Status::Rejected {
            self.call_next();
        }
    }

    /// Drive the settled status into the successors.
    ///
    /// Walks strictly forward, consuming one carrier per step, until a node
    /// without a successor or one still pending is reached. Returns the
    /// first carrier's result (the tail of `self` after a `then` on a
    /// settled node), or the current successor when nothing was driven.
    fn call_next(&self) -> Defer {
        match self.drive_step() {
            None => self.get().next_clone(),
            Some(first) => {
                let mut cur = first.clone();
                while !cur.is_null() {
                    match cur.drive_step() {
                        Some(next) => cur = next,
                        None => break,
                    }
                }
                first
            }
        }
    }

    /// Fire the successor's carrier for this node's settled status.
    /// Returns `None` when there is nothing to drive.
    fn drive_step(&self) -> Option<Defer> {
        let p = self.get();
        let status = p.status.get();
        if status != Status::Resolved && status != Status::Rejected {
            return None;
        }
        let next = p.next_clone();
        if next.is_null() {
            return None;
        }
        // The carrier may splice this node out of the chain; keep it alive
        // for the rest of the step.
        let _keep = self.clone();
        p.status.set(Status::Finished);
        let result = if status == Status::Resolved {
            next.run_resolved_carrier()
        } else {
            next.run_rejected_carrier()
        };
        next.clear_callbacks();
        Some(result)
    }

    /// Absent resolve carriers pass the resolution through unchanged.
    fn run_resolved_carrier(&self) -> Defer {
        match self.get().resolved_cb.take() {
            Some(mut c) => c.call(self),
            None => {
                self.get().prepare_resolve();
                self.clone()
            }
        }
    }

    /// Absent reject carriers propagate the rejection; present ones either
    /// recover (unit callbacks) or splice their returned chain.
    fn run_rejected_carrier(&self) -> Defer {
        match self.get().rejected_cb.take() {
            Some(mut c) => c.call(self),
            None => {
                self.get().prepare_reject();
                self.clone()
            }
        }
    }

    fn clear_callbacks(&self) {
        let p = self.get();
        drop(p.resolved_cb.take());
        drop(p.rejected_cb.take());
    }

    /// Make `child` this node's successor and drive if already settled.
    ///
    /// Single-successor contract: if a successor already exists the new
    /// child displaces it — the old branch's backward link is cleared and
    /// it survives only through handles the user still holds. The most
    /// recently attached chain is the one a settle drives.
    fn attach_child(&self, child: Defer) -> Defer {
        invariant!(!self.is_null(), "then on null handle");
        let p = self.get();
        let old = p.next.take();
        if !old.is_null() {
            old.get().prev.set(NULL_OFFSET);
        }
        drop(old);
        child
            .get()
            .prev
            .set(offset::to_offset(self.as_ptr() as *mut u8));
        p.next.set(child);
        self.call_next()
    }

    /// Chain a resolve continuation. `on_resolved` may return `()` or a
    /// [`Defer`] whose chain then stands in for the new node. Returns the
    /// tail of `self` after the operation; if `self` is already settled the
    /// continuation fires before `then` returns.
    pub fn then<F, R>(&self, on_resolved: F) -> Defer
    where
        F: FnMut() -> R + 'static,
        R: ThenResult,
    {
        self.attach_child(Promise::alloc(Some(carrier::make(on_resolved)), None))
    }

    /// Chain a resolve and a reject continuation onto one node.
    pub fn then_or<F1, R1, F2, R2>(&self, on_resolved: F1, on_rejected: F2) -> Defer
    where
        F1: FnMut() -> R1 + 'static,
        R1: ThenResult,
        F2: FnMut() -> R2 + 'static,
        R2: ThenResult,
    {
        self.attach_child(Promise::alloc(
            Some(carrier::make(on_resolved)),
            Some(carrier::make(on_rejected)),
        ))
    }

    /// Chain a reject continuation. A unit callback recovers the chain: the
    /// node continues as resolved after it runs.
    pub fn fail<F, R>(&self, on_rejected: F) -> Defer
    where
        F: FnMut() -> R + 'static,
        R: ThenResult,
    {
        self.attach_child(Promise::alloc(None, Some(carrier::make(on_rejected))))
    }

    /// Run `on_always` on either outcome; both outcomes continue as
    /// resolved afterwards.
    pub fn always<F, R>(&self, on_always: F) -> Defer
    where
        F: FnMut() -> R + Clone + 'static,
        R: ThenResult,
    {
        self.then_or(on_always.clone(), on_always)
    }

    /// Run `on_bypass` on either outcome but preserve the rejection flow:
    /// the reject branch re-issues `reject()` after the side effect, so a
    /// rejection stays a rejection downstream. Composes as "observe, don't
    /// handle".
    pub fn bypass<F>(&self, on_bypass: F) -> Defer
    where
        F: FnMut() + Clone + 'static,
    {
        let mut on_rejected = on_bypass.clone();
        let mut on_resolved = on_bypass;
        self.then_or(
            move || on_resolved(),
            move || {
                on_rejected();
                reject()
            },
        )
    }

    /// Locate the frontier of the chain: the earliest node still pending.
    ///
    /// From a pending node, walks backwards to the first pending node after
    /// a settled predecessor (or the chain root). From a settled node,
    /// walks forward to the next pending node. Null when the chain has no
    /// pending node in that direction.
    pub fn find_pending(&self) -> Defer {
        if self.is_null() {
            return Defer::null();
        }
        if self.get().status.get() == Status::Init {
            let mut p = self.as_ptr();
            loop {
                let prev = unsafe { (*p).prev_raw() };
                if prev.is_null() {
                    return unsafe { Handle::clone_raw(p) };
                }
                if unsafe { (*prev).status.get() } != Status::Init {
                    return unsafe { (*prev).next_clone() };
                }
                p = prev;
            }
        } else {
            let mut p = self.as_ptr();
            loop {
                let next = unsafe { (*p).next_raw() };
                if next.is_null() {
                    return Defer::null();
                }
                if unsafe { (*next).status.get() } == Status::Init {
                    return unsafe { (*p).next_clone() };
                }
                p = next;
            }
        }
    }

    /// Reject whatever [`find_pending`](Self::find_pending) locates; the
    /// way a driver cancels a chain without knowing its shape.
    pub fn reject_pending(&self) {
        let pending = self.find_pending();
        if !pending.is_null() {
            pending.reject();
        }
    }
}

/// Walk `prev` links to the root of the chain containing `d`.
fn get_head(d: &Defer) -> Defer {
    let mut p = d.as_ptr();
    loop {
        let prev = unsafe { (*p).prev_raw() };
        if prev.is_null() {
            break;
        }
        p = prev;
    }
    unsafe { Handle::clone_raw(p) }
}

/// Walk `next` links to the end of the chain containing `d`.
fn get_tail(d: &Defer) -> Defer {
    let mut p = d.as_ptr();
    loop {
        let next = unsafe { (*p).next_raw() };
        if next.is_null() {
            break;
        }
        p = next;
    }
    unsafe { Handle::clone_raw(p) }
}

/// Replace `own` in its chain by the whole chain containing `chain`.
///
/// `own` is a node whose carrier returned `chain`: its predecessor adopts
/// the chain's head (one strong reference moves there), the chain's tail
/// inherits `own`'s former successor, and `own` drops out, alive only
/// through outstanding handles.
pub(crate) fn splice_chain(own: &Defer, chain: &Defer) {
    let head = get_head(chain);
    let tail = get_tail(chain);
    invariant!(
        head.as_ptr() != own.as_ptr(),
        "splice would link a chain into itself"
    );

    let o = own.get();
    let prev = o.prev_raw();
    if prev.is_null() {
        crate::fatal("splice without a predecessor");
    }
    let prev = unsafe { &*prev };

    let old_next = o.next.take();

    head.get().prev.set(o.prev.get());
    o.prev.set(NULL_OFFSET);
    let displaced = prev.next.replace(head.clone());
    invariant!(
        displaced.as_ptr() == own.as_ptr(),
        "splice: chain edges out of sync"
    );
    drop(displaced);

    let t = tail.get();
    invariant!(t.next_raw().is_null(), "splice: tail already has a successor");
    if !old_next.is_null() {
        old_next
            .get()
            .prev
            .set(offset::to_offset(tail.as_ptr() as *mut u8));
    }
    t.next.set(old_next);
}

/// Allocate a fresh pending node, run `f` with its handle synchronously,
/// and hand the node back.
pub fn new_promise<F: FnOnce(&Defer)>(f: F) -> Defer {
    let d = Promise::alloc(None, None);
    f(&d);
    d
}

/// A promise already settled to reject: attaching any continuation fires
/// its reject path immediately.
pub fn reject() -> Defer {
    new_promise(|d| d.reject())
}

/// Loop `f` while it keeps resolving: each resolution re-arms `f` on a
/// fresh node. The tail continuation is built lazily per iteration, so
/// stack growth per iteration is O(1) and steady-state slab usage is
/// bounded by one iteration's worth of nodes.
pub fn while_<F>(f: F) -> Defer
where
    F: FnMut(&Defer) + Clone + 'static,
{
    let again = f.clone();
    let mut body = f;
    new_promise(move |d| body(d)).then(move || while_(again.clone()))
}
