//! Deferred settle queue: the one safe path from interrupt context into
//! the promise core.
//!
//! Producers (ISRs, timer ticks) never invoke callbacks or allocator
//! routines; they append a handle with [`defer_attach`] and the board main
//! loop drains the queue with [`defer_run`] after servicing I/O. Each entry
//! is an ordinary slab cell holding the handle; the cell's *block header*
//! list node is what links it into the queue, so no separate queue node
//! type exists.
//!
//! The append splice is O(1) under the queue lock; on a single-core target
//! the embedder masks interrupts around [`defer_attach`] so the lock never
//! contends (see [`crate::sync`]).

use core::mem::size_of;

use crate::arena;
use crate::handle::Handle;
use crate::list::ListNode;
use crate::pool::BlockHeader;
use crate::promise::Defer;
use crate::stat_inc;
use crate::sync::SpinMutex;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Settle {
    Resolve,
    Reject,
}

struct QueueCell {
    target: Defer,
    action: Settle,
}

struct DeferList {
    sentinel: *mut ListNode,
}

// SAFETY: the sentinel targets arena memory; the list is only touched under
// the enclosing SpinMutex.
unsafe impl Send for DeferList {}

static QUEUE: SpinMutex<DeferList> = SpinMutex::new(DeferList {
    sentinel: core::ptr::null_mut(),
});

fn sentinel_of(list: &mut DeferList) -> *mut ListNode {
    if list.sentinel.is_null() {
        let node = arena::allocate(size_of::<ListNode>()) as *mut ListNode;
        unsafe { ListNode::init(node) };
        list.sentinel = node;
    }
    list.sentinel
}

/// Enqueue `target` to be resolved on the next [`defer_run`] pass.
/// Callable from interrupt context. Null handles are ignored.
pub fn defer_attach(target: &Defer) {
    attach_with(target, Settle::Resolve);
}

/// Enqueue `target` to be rejected on the next [`defer_run`] pass.
/// Callable from interrupt context. Null handles are ignored.
pub fn defer_attach_reject(target: &Defer) {
    attach_with(target, Settle::Reject);
}

fn attach_with(target: &Defer, action: Settle) {
    if target.is_null() {
        return;
    }
    let cell = Handle::alloc(QueueCell {
        target: target.clone(),
        action,
    });
    // The queue keeps the cell's reference until the drain adopts it back.
    let raw = cell.into_raw();
    let link = unsafe { BlockHeader::link_of(BlockHeader::from_payload(raw as *mut u8)) };

    let mut queue = QUEUE.lock();
    let sentinel = sentinel_of(&mut queue);
    unsafe { (*sentinel).move_to(link) }; // FIFO: append at the tail
    stat_inc!(defer_enqueued);
}

/// Drain the queue, settling each entry exactly once in FIFO order.
///
/// Only the entries present when the drain starts are processed: the tail
/// is snapshotted at entry, so work a callback enqueues runs on the *next*
/// pass. Draining to quiescence instead would let a self-re-arming chain
/// starve the main loop.
pub fn defer_run() {
    let snapshot = {
        let mut queue = QUEUE.lock();
        let sentinel = sentinel_of(&mut queue);
        if unsafe { (*sentinel).is_empty() } {
            return;
        }
        unsafe { (*sentinel).prev_ptr() }
    };
    loop {
        let (cell, at_snapshot) = {
            let mut queue = QUEUE.lock();
            let sentinel = sentinel_of(&mut queue);
            if unsafe { (*sentinel).is_empty() } {
                return;
            }
            let node = unsafe { (*sentinel).next_ptr() };
            unsafe { (*node).detach() };
            let payload =
                unsafe { BlockHeader::payload_of(BlockHeader::from_link(node)) } as *mut QueueCell;
            let cell = unsafe { Handle::<QueueCell>::from_raw(payload) };
            (cell, node == snapshot)
        };
        let target = cell.get().target.clone();
        let action = cell.get().action;
        drop(cell);
        match action {
            Settle::Resolve => target.resolve(),
            Settle::Reject => target.reject(),
        }
        stat_inc!(defer_drained);
        if at_snapshot {
            return;
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub(crate) fn reset() {
    QUEUE.lock().sentinel = core::ptr::null_mut();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::new_promise;
    use crate::testing;
    use core::cell::RefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    #[test]
    fn drain_settles_in_fifo_order() {
        let _guard = testing::serial();
        testing::reset();
        {
            let events: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
            let mut handles = Vec::new();
            for i in 0..3u32 {
                let ev = Rc::clone(&events);
                let mut held = Defer::null();
                let head = new_promise(|d| held = d.clone());
                head.then(move || ev.borrow_mut().push(i));
                defer_attach(&held);
                handles.push(head);
            }
            assert!(events.borrow().is_empty());
            defer_run();
            assert_eq!(*events.borrow(), [0, 1, 2]);
        }
    }

    #[test]
    fn reject_entries_fire_the_reject_path() {
        let _guard = testing::serial();
        testing::reset();
        {
            let hit = Rc::new(RefCell::new(false));
            let ev = Rc::clone(&hit);
            let mut held = Defer::null();
            let head = new_promise(|d| held = d.clone());
            head.fail(move || *ev.borrow_mut() = true);
            defer_attach_reject(&held);
            defer_run();
            assert!(*hit.borrow());
        }
    }

    #[test]
    fn work_enqueued_while_draining_waits_for_the_next_pass() {
        let _guard = testing::serial();
        testing::reset();
        {
            let counter = Rc::new(RefCell::new(0u32));
            // The callback re-arms itself: a quiescence drain would spin
            // forever, a snapshot drain runs exactly one step per pass.
            fn arm(counter: &Rc<RefCell<u32>>) {
                let counter2 = Rc::clone(counter);
                let mut held = Defer::null();
                let head = new_promise(|d| held = d.clone());
                head.then(move || {
                    *counter2.borrow_mut() += 1;
                    arm(&counter2);
                });
                // The queue cell's reference keeps the chain alive.
                defer_attach(&held);
            }
            arm(&counter);
            defer_run();
            assert_eq!(*counter.borrow(), 1);
            defer_run();
            assert_eq!(*counter.borrow(), 2);
            defer_run();
            assert_eq!(*counter.borrow(), 3);
        }
    }

    #[test]
    fn empty_drain_is_a_no_op() {
        let _guard = testing::serial();
        testing::reset();
        defer_run();
        defer_run();
    }

    #[test]
    fn null_handles_are_ignored() {
        let _guard = testing::serial();
        testing::reset();
        defer_attach(&Defer::null());
        defer_run();
        assert_eq!(crate::stats::snapshot().defer_enqueued, 0);
    }
}
