//! Size-indexed slab pools: equal-sized blocks recycled through intrusive
//! free lists, one pool per distinct (word-rounded) object size.
//!
//! Every block starts with a [`BlockHeader`]: the free-list node, an offset
//! back to the owning pool, and a 16-bit reference count. The payload sits
//! immediately after the header, so header and payload resolve to each
//! other in constant time. A block on a free list always has refcount 0; a
//! block with refcount >= 1 is never on one.
//!
//! `obtain` pops the pool's free-list head or grows the pool from the
//! arena; `release` appends the header back at the free-list tail. The
//! refcounting entry points are what [`crate::handle::Handle`] and the
//! callback carriers build on.

use core::cell::Cell;
use core::mem::size_of;
use core::ptr;

use crate::arena::{self, round_word};
use crate::config::{MAX_POOLS, OffsetRepr};
use crate::invariant;
use crate::list::ListNode;
use crate::offset;
use crate::sync::SpinMutex;
use crate::{stat_add, stat_inc, stat_sub};

/// Fixed-layout preamble in front of every slab payload.
///
/// The list node must stay the first field: a free-list link pointer is the
/// header pointer.
#[repr(C)]
pub struct BlockHeader {
    link: ListNode,
    pool: Cell<OffsetRepr>,
    ref_count: Cell<u16>,
}

/// Bytes between a header and its payload.
pub const HEADER_SIZE: usize = round_word(size_of::<BlockHeader>());

impl BlockHeader {
    /// The payload managed by `header`.
    #[inline]
    pub unsafe fn payload_of(header: *mut BlockHeader) -> *mut u8 {
        unsafe { (header as *mut u8).add(HEADER_SIZE) }
    }

    /// Recover the header in front of `payload`.
    #[inline]
    pub unsafe fn from_payload(payload: *mut u8) -> *mut BlockHeader {
        unsafe { (payload as *mut u8).sub(HEADER_SIZE) as *mut BlockHeader }
    }

    /// The header's free-list node (its first field).
    #[inline]
    pub unsafe fn link_of(header: *mut BlockHeader) -> *mut ListNode {
        header as *mut ListNode
    }

    /// Recover a header from its free-list node.
    #[inline]
    pub unsafe fn from_link(link: *mut ListNode) -> *mut BlockHeader {
        link as *mut BlockHeader
    }
}

/// Per-size singleton: the free list plus the payload size it serves.
/// Lives in the arena so the free-list sentinel can be offset-encoded.
pub struct Pool {
    free: ListNode,
    size: usize,
}

#[derive(Clone, Copy)]
struct PoolEntry {
    size: usize,
    pool: *mut Pool,
}

struct PoolTable {
    entries: [PoolEntry; MAX_POOLS],
    len: usize,
}

// SAFETY: the raw pool pointers target arena memory that is never reclaimed;
// the table is only accessed under the enclosing SpinMutex.
unsafe impl Send for PoolTable {}

const EMPTY_ENTRY: PoolEntry = PoolEntry {
    size: 0,
    pool: ptr::null_mut(),
};

static POOLS: SpinMutex<PoolTable> = SpinMutex::new(PoolTable {
    entries: [EMPTY_ENTRY; MAX_POOLS],
    len: 0,
});

impl PoolTable {
    fn lookup_or_create(&mut self, size: usize) -> *mut Pool {
        for entry in self.entries.iter().take(self.len) {
            if entry.size == size {
                return entry.pool;
            }
        }
        if self.len == MAX_POOLS {
            crate::fatal("pool table full");
        }
        let pool = arena::allocate(size_of::<Pool>()) as *mut Pool;
        unsafe {
            pool.write(Pool {
                free: ListNode::unlinked(),
                size,
            });
            ListNode::init(&raw mut (*pool).free);
        }
        self.entries[self.len] = PoolEntry { size, pool };
        self.len += 1;
        pool
    }
}

/// Claim a block whose payload holds at least `size` bytes. Reuses the
/// owning pool's free-list head when possible, otherwise grows from the
/// arena. The returned block has refcount 0; callers construct the payload
/// and then take a reference via [`add_ref`].
pub fn obtain(size: usize) -> *mut u8 {
    let size = round_word(size);
    stat_inc!(obtain_count);
    stat_add!(bytes_live, size);

    let mut table = POOLS.lock();
    let pool = table.lookup_or_create(size);
    unsafe {
        if (*pool).free.is_empty() {
            let header = arena::allocate(HEADER_SIZE + size) as *mut BlockHeader;
            header.write(BlockHeader {
                link: ListNode::unlinked(),
                pool: Cell::new(offset::to_offset(pool as *mut u8)),
                ref_count: Cell::new(0),
            });
            ListNode::init(BlockHeader::link_of(header));
            BlockHeader::payload_of(header)
        } else {
            stat_inc!(pool_reuse_count);
            let link = (*pool).free.next_ptr();
            (*link).detach();
            BlockHeader::payload_of(BlockHeader::from_link(link))
        }
    }
}

/// Return a block to its pool's free list.
///
/// # Safety
///
/// `payload` must come from [`obtain`], its refcount must be 0, and its
/// contents must already be dropped.
pub unsafe fn release(payload: *mut u8) {
    let _table = POOLS.lock();
    unsafe {
        let header = BlockHeader::from_payload(payload);
        let pool = offset::from_offset((*header).pool.get()) as *mut Pool;
        invariant!(!pool.is_null(), "release: block without a pool");
        invariant!((*header).ref_count.get() == 0, "release: block still referenced");
        (*pool).free.move_to(BlockHeader::link_of(header));
        stat_inc!(release_count);
        stat_sub!(bytes_live, (*pool).size);
    }
}

/// Add one reference to the block behind `payload`. Null is a no-op.
///
/// # Safety
///
/// A non-null `payload` must come from [`obtain`] and still be live.
pub unsafe fn add_ref(payload: *mut u8) {
    if payload.is_null() {
        return;
    }
    unsafe {
        let header = BlockHeader::from_payload(payload);
        (*header).ref_count.set((*header).ref_count.get() + 1);
    }
}

/// Remove one reference. Returns true when the count reached zero, in which
/// case the caller must drop the payload in place and [`release`] it.
/// Null is a no-op.
///
/// # Safety
///
/// A non-null `payload` must come from [`obtain`] with refcount > 0.
pub unsafe fn dec_ref(payload: *mut u8) -> bool {
    if payload.is_null() {
        return false;
    }
    unsafe {
        let header = BlockHeader::from_payload(payload);
        let rc = (*header).ref_count.get();
        invariant!(rc > 0, "refcount underflow");
        (*header).ref_count.set(rc - 1);
        rc == 1
    }
}

/// Current reference count of a live block.
///
/// # Safety
///
/// `payload` must come from [`obtain`].
#[cfg(any(test, feature = "testing"))]
pub(crate) unsafe fn ref_count_of(payload: *mut u8) -> u16 {
    unsafe { (*BlockHeader::from_payload(payload)).ref_count.get() }
}

#[cfg(any(test, feature = "testing"))]
pub(crate) fn reset() {
    POOLS.lock().len = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn obtain_reuses_released_blocks() {
        let _guard = testing::serial();
        testing::reset();

        let a = obtain(24);
        unsafe {
            add_ref(a);
            assert!(dec_ref(a));
            release(a);
        }
        let b = obtain(24);
        assert_eq!(a, b, "same-size obtain should recycle the freed block");
        unsafe {
            add_ref(b);
            assert!(dec_ref(b));
            release(b);
        }
    }

    #[test]
    fn sizes_round_to_shared_pools() {
        let _guard = testing::serial();
        testing::reset();

        let a = obtain(1);
        unsafe {
            add_ref(a);
            assert!(dec_ref(a));
            release(a);
        }
        // Any size rounding to the same word count hits the same pool.
        let b = obtain(crate::config::WORD_SIZE);
        assert_eq!(a, b);
        unsafe {
            add_ref(b);
            assert!(dec_ref(b));
            release(b);
        }
    }

    #[test]
    fn distinct_sizes_use_distinct_blocks() {
        let _guard = testing::serial();
        testing::reset();

        let a = obtain(8);
        let b = obtain(64);
        assert_ne!(a, b);
        unsafe {
            release(a);
            release(b);
        }
    }

    #[test]
    fn released_block_is_on_exactly_one_free_list() {
        let _guard = testing::serial();
        testing::reset();

        let a = obtain(16);
        unsafe {
            release(a);
            let header = BlockHeader::from_payload(a);
            let link = BlockHeader::link_of(header);
            let pool = offset::from_offset((*header).pool.get()) as *mut Pool;
            // Walk the pool's ring once; the block must appear exactly once.
            let sentinel = (*pool).free.as_ptr();
            let mut seen = 0;
            let mut node = (*sentinel).next_ptr();
            let mut steps = 0;
            while node != sentinel {
                if node == link {
                    seen += 1;
                }
                node = (*node).next_ptr();
                steps += 1;
                assert!(steps < 64, "free list does not cycle back");
            }
            assert_eq!(seen, 1);
            assert_eq!(ref_count_of(a), 0);
        }
    }

    #[test]
    fn refcounts_track_add_and_dec() {
        let _guard = testing::serial();
        testing::reset();

        let p = obtain(32);
        unsafe {
            add_ref(p);
            add_ref(p);
            assert_eq!(ref_count_of(p), 2);
            assert!(!dec_ref(p));
            assert!(dec_ref(p));
            release(p);
        }
    }

    #[test]
    fn live_bytes_balance_out() {
        let _guard = testing::serial();
        testing::reset();

        let before = crate::stats::snapshot().bytes_live;
        let p = obtain(40);
        assert!(crate::stats::snapshot().bytes_live > before);
        unsafe { release(p) };
        assert_eq!(crate::stats::snapshot().bytes_live, before);
    }
}
