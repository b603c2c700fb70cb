//! Intrusive circular doubly-linked list with offset-encoded links.
//!
//! The building block under both the pool free lists and the deferred
//! settle queue. A node carries two [`OffsetRepr`] links instead of
//! pointers; a fresh node is linked to itself, which doubles as the empty
//! state. `attach` and `detach` share one primitive, [`ListNode::toggle_connect`],
//! which swaps the edges between two nodes and is therefore its own
//! inverse.
//!
//! Nodes must live inside the arena (the links are arena offsets) and are
//! manipulated through raw pointers; the well-formedness invariant is that
//! `x.next.prev == x` and `x.prev.next == x` for every node at all times.

use core::cell::Cell;

use crate::config::OffsetRepr;
use crate::offset;

#[repr(C)]
pub struct ListNode {
    prev: Cell<OffsetRepr>,
    next: Cell<OffsetRepr>,
}

impl ListNode {
    /// A node with poisoned links, for embedding into a struct that is
    /// written before [`ListNode::init`] runs on the field.
    pub(crate) const fn unlinked() -> ListNode {
        ListNode {
            prev: Cell::new(offset::NULL_OFFSET),
            next: Cell::new(offset::NULL_OFFSET),
        }
    }

    /// Make `this` a list of one: both links refer back to the node.
    ///
    /// # Safety
    ///
    /// `this` must point into the arena and be valid for writes.
    pub unsafe fn init(this: *mut ListNode) {
        let own = offset::to_offset(this as *mut u8);
        unsafe {
            this.write(ListNode {
                prev: Cell::new(own),
                next: Cell::new(own),
            });
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut ListNode {
        self as *const ListNode as *mut ListNode
    }

    #[inline]
    pub(crate) fn prev_ptr(&self) -> *mut ListNode {
        offset::from_offset(self.prev.get()) as *mut ListNode
    }

    #[inline]
    pub(crate) fn next_ptr(&self) -> *mut ListNode {
        offset::from_offset(self.next.get()) as *mut ListNode
    }

    #[inline]
    fn set_prev(&self, node: *mut ListNode) {
        self.prev.set(offset::to_offset(node as *mut u8));
    }

    #[inline]
    fn set_next(&self, node: *mut ListNode) {
        self.next.set(offset::to_offset(node as *mut u8));
    }

    /// Swap the edges between two lists. Calling it twice with the same
    /// arguments restores the original topology, which is why connect and
    /// disconnect share this implementation.
    ///
    /// # Safety
    ///
    /// Both nodes and their current neighbours must be initialised list
    /// nodes in the arena.
    pub unsafe fn toggle_connect(a: *mut ListNode, b: *mut ListNode) {
        unsafe {
            let prev_a = (*a).prev_ptr();
            let prev_b = (*b).prev_ptr();
            (*prev_a).set_next(b);
            (*prev_b).set_next(a);
            (*a).set_prev(prev_b);
            (*b).set_prev(prev_a);
        }
    }

    /// Splice the list containing `other` into this one, immediately after
    /// `self`. O(1).
    ///
    /// # Safety
    ///
    /// `other` must be an initialised list node in the arena, not already
    /// reachable from `self`.
    pub unsafe fn attach(&self, other: *mut ListNode) {
        unsafe { Self::toggle_connect(self.as_ptr(), other) };
    }

    /// Remove `self` from its current list, leaving it self-linked. O(1).
    ///
    /// # Safety
    ///
    /// `self`'s neighbours must be initialised list nodes in the arena.
    pub unsafe fn detach(&self) {
        unsafe { Self::toggle_connect(self.as_ptr(), self.next_ptr()) };
    }

    /// Detach `node` from wherever it is and insert it immediately before
    /// `self`. With `self` a sentinel this is a tail append. O(1).
    ///
    /// # Safety
    ///
    /// `node` and the neighbours of both nodes must be initialised list
    /// nodes in the arena.
    pub unsafe fn move_to(&self, node: *mut ListNode) {
        unsafe {
            let n = &*node;
            (*n.prev_ptr()).set_next(n.next_ptr());
            (*n.next_ptr()).set_prev(n.prev_ptr());

            n.set_next(self.as_ptr());
            n.set_prev(self.prev_ptr());
            (*self.prev_ptr()).set_next(node);
            self.set_prev(node);
        }
    }

    /// True iff the node is alone in its list.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.next_ptr() == self.as_ptr()
    }
}
