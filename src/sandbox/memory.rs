//! Per-thread heap accounting for sandboxed runs
//!
//! The process allocator forwards to [`System`] and, on threads that have
//! opened a [`MemoryScope`], keeps a running total of live bytes and its
//! peak. Threads without an open scope pay one thread-local read per call.
//!
//! # Safety
//!
//! - alloc/dealloc/realloc are forwarded to `System` unchanged
//! - Bookkeeping touches only const-initialised thread-local `Cell`s, which
//!   never allocate and have no destructor

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

/// Counting wrapper around the system allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingAllocator;

#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator;

struct Usage {
    active: Cell<bool>,
    live: Cell<isize>,
    peak: Cell<isize>,
}

thread_local! {
    static USAGE: Usage = const {
        Usage {
            active: Cell::new(false),
            live: Cell::new(0),
            peak: Cell::new(0),
        }
    };
}

#[inline]
fn record(delta: isize) {
    let _ = USAGE.try_with(|usage| {
        if usage.active.get() {
            let live = usage.live.get().saturating_add(delta);
            usage.live.set(live);
            if live > usage.peak.get() {
                usage.peak.set(live);
            }
        }
    });
}

unsafe impl GlobalAlloc for TrackingAllocator {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record(layout.size() as isize);
        }
        ptr
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record(layout.size() as isize);
        }
        ptr
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        record(-(layout.size() as isize));
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            record(new_size as isize - layout.size() as isize);
        }
        new_ptr
    }
}

/// Live-byte accounting for the current thread, active until dropped.
///
/// Memory freed inside the scope that was allocated before it counts
/// against the total, so `live` may go negative; `peak` never does.
#[derive(Debug)]
pub struct MemoryScope {
    // Bound to the opening thread
    _not_send: std::marker::PhantomData<*const ()>,
}

impl MemoryScope {
    /// Start counting on this thread from zero
    pub fn open() -> Self {
        USAGE.with(|usage| {
            usage.live.set(0);
            usage.peak.set(0);
            usage.active.set(true);
        });
        Self {
            _not_send: std::marker::PhantomData,
        }
    }

    /// Bytes allocated and not yet freed since the scope opened
    pub fn live_bytes(&self) -> usize {
        live_bytes()
    }

    /// Highest live total seen since the scope opened
    pub fn peak_bytes(&self) -> usize {
        USAGE.with(|usage| usage.peak.get().max(0) as usize)
    }
}

impl Drop for MemoryScope {
    fn drop(&mut self) {
        let _ = USAGE.try_with(|usage| usage.active.set(false));
    }
}

/// Live bytes of the open scope on this thread, zero when none is open
pub fn live_bytes() -> usize {
    USAGE
        .try_with(|usage| {
            if usage.active.get() {
                usage.live.get().max(0) as usize
            } else {
                0
            }
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_live_and_peak() {
        let scope = MemoryScope::open();
        let held = std::hint::black_box(vec![0u8; 1 << 20]);
        assert!(scope.live_bytes() >= 1 << 20);

        drop(held);
        assert!(scope.live_bytes() < 1 << 20);
        assert!(scope.peak_bytes() >= 1 << 20);
    }

    #[test]
    fn test_inactive_without_scope() {
        let _held = std::hint::black_box(vec![0u8; 1 << 20]);
        assert_eq!(live_bytes(), 0);

        let scope = MemoryScope::open();
        drop(scope);
        let _more = std::hint::black_box(vec![0u8; 1 << 20]);
        assert_eq!(live_bytes(), 0);
    }

    #[test]
    fn test_other_threads_not_counted() {
        let scope = MemoryScope::open();
        std::thread::spawn(|| {
            let held = vec![0u8; 4 << 20];
            drop(std::hint::black_box(held));
        })
        .join()
        .unwrap();
        assert!(scope.peak_bytes() < 4 << 20);
    }
}
