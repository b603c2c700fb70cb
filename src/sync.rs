//! Lightweight synchronization for the global allocator and queue state.
//!
//! `std::sync::Mutex` is unavailable in no_std and allocates, so a simple
//! test-and-set spinlock wrapper is used instead. The core itself is
//! single-threaded cooperative: the arena cursor and pool table are only
//! ever touched from the main execution context, and the deferred queue's
//! append side is the one path entered from interrupt context. On hosted
//! test builds the lock provides real mutual exclusion between test
//! threads; on a single-core target every critical section here is O(1)
//! and the embedder masks interrupts around `defer_attach`, so the lock is
//! uncontended by construction.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// A mutex backed by a test-and-set spinlock. Does not allocate and can be
/// used in a `static`.
pub struct SpinMutex<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

impl<T> SpinMutex<T> {
    pub const fn new(val: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(val),
        }
    }

    #[inline]
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        if self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_slow();
        }
        SpinMutexGuard { mutex: self }
    }

    #[cold]
    fn lock_slow(&self) {
        loop {
            // Spin read-only while held; avoids hammering the cache line.
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    #[inline]
    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

unsafe impl<T: Send> Send for SpinMutex<T> {}
unsafe impl<T: Send> Sync for SpinMutex<T> {}

/// RAII guard for [`SpinMutex`]. Unlocks on drop.
pub struct SpinMutexGuard<'a, T> {
    mutex: &'a SpinMutex<T>,
}

impl<T> Deref for SpinMutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for SpinMutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for SpinMutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_roundtrip() {
        let mutex = SpinMutex::new(42u64);
        {
            let guard = mutex.lock();
            assert_eq!(*guard, 42);
        }
        {
            let mut guard = mutex.lock();
            *guard = 100;
        }
        assert_eq!(*mutex.lock(), 100);
    }

    #[test]
    fn guard_releases_on_drop() {
        let mutex = SpinMutex::new(0u32);
        drop(mutex.lock());
        // A second lock would spin forever if the first guard leaked.
        *mutex.lock() += 1;
        assert_eq!(*mutex.lock(), 1);
    }
}
