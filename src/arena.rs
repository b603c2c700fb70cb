//! Fixed-region bump arena: the sole backing store for every dynamic object.
//!
//! A static word-aligned byte region of [`ARENA_SIZE`](crate::config::ARENA_SIZE)
//! bytes is carved by a monotonically advancing cursor and never freed.
//! Block lifetime is managed entirely at the slab layer ([`crate::pool`]);
//! the arena is only where pools grow. Running out of region is fatal —
//! there is no heap to fall back to.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::Ordering;

use crate::config::{ARENA_SIZE, WORD_SIZE};
use crate::fatal;
use crate::sync::SpinMutex;

const ARENA_WORDS: usize = ARENA_SIZE / WORD_SIZE;

/// The backing region. An array of `usize` words so the base address is
/// word-aligned by construction.
struct Region(UnsafeCell<MaybeUninit<[usize; ARENA_WORDS]>>);

// SAFETY: all mutation happens through `allocate`, which hands out disjoint
// sub-ranges under the cursor lock.
unsafe impl Sync for Region {}

static REGION: Region = Region(UnsafeCell::new(MaybeUninit::uninit()));

/// Next free byte, relative to [`base`].
static CURSOR: SpinMutex<usize> = SpinMutex::new(0);

/// Round a byte count up to a whole number of words.
pub(crate) const fn round_word(n: usize) -> usize {
    (n + WORD_SIZE - 1) & !(WORD_SIZE - 1)
}

/// First byte of the region.
pub fn base() -> *mut u8 {
    REGION.0.get() as *mut u8
}

/// Total capacity in bytes.
pub fn capacity() -> usize {
    ARENA_SIZE
}

/// Bytes handed out so far. Monotone; doubles as the high-water mark.
pub fn used() -> usize {
    *CURSOR.lock()
}

/// Whether `ptr` lies inside the region.
pub(crate) fn contains(ptr: *const u8) -> bool {
    let base = base() as usize;
    let p = ptr as usize;
    p >= base && p < base + ARENA_SIZE
}

/// Hand out `size` contiguous bytes, word-aligned. Never fails softly:
/// exhausting the region halts via [`fatal`].
pub fn allocate(size: usize) -> *mut u8 {
    let size = round_word(size);
    let mut used = CURSOR.lock();
    if ARENA_SIZE - *used < size {
        fatal("arena exhausted");
    }
    let ptr = unsafe { base().add(*used) };
    *used += size;
    crate::stats::STATS
        .arena_used
        .store(*used as u32, Ordering::Relaxed);
    ptr
}

#[cfg(any(test, feature = "testing"))]
pub(crate) fn reset() {
    *CURSOR.lock() = 0;
}
