//! Compressed pointers: arena addresses as small word indices.
//!
//! Every dynamic object lives in the arena, so a link field does not need a
//! full pointer — a word index into the region is enough. The width of
//! [`OffsetRepr`](crate::config::OffsetRepr) is picked at build time as the
//! narrowest unsigned integer that can index every word; on a 32-bit MCU
//! with the default 2 KiB region that is a `u16` instead of a 4-byte
//! pointer, which is what keeps promise nodes small.

use crate::arena;
use crate::config::{OffsetRepr, WORD_SHIFT, WORD_SIZE};
use crate::invariant;

/// The all-ones encoding is reserved for null.
pub const NULL_OFFSET: OffsetRepr = OffsetRepr::MAX;

/// Encode a pointer. Null maps to [`NULL_OFFSET`]; anything else must be a
/// word-aligned address inside the arena, or the handle is corrupt.
pub fn to_offset(ptr: *mut u8) -> OffsetRepr {
    if ptr.is_null() {
        return NULL_OFFSET;
    }
    invariant!(arena::contains(ptr), "offset encode: pointer outside arena");
    let delta = ptr as usize - arena::base() as usize;
    invariant!(delta % WORD_SIZE == 0, "offset encode: unaligned pointer");
    (delta >> WORD_SHIFT) as OffsetRepr
}

/// Decode an offset back into a pointer. [`NULL_OFFSET`] maps to null.
pub fn from_offset(off: OffsetRepr) -> *mut u8 {
    if off == NULL_OFFSET {
        core::ptr::null_mut()
    } else {
        unsafe { arena::base().add((off as usize) << WORD_SHIFT) }
    }
}
