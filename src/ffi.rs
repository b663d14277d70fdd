//! C-ABI exports for external linking (e.g. from a C trace driver).
//!
//! Gated behind `features = ["ffi"]`. All entry points share one heap over
//! a static 20 MiB arena, serialised by the lock in [`LockedSegAlloc`].
//! Nothing is logged while that lock is held.

use crate::allocator::{LockedSegAlloc, SegAlloc};
use crate::checker::Violation;
use crate::config::AllocConfig;
use crate::platform::StaticRegion;
use core::ffi::c_int;

const ARENA_WORDS: usize = (20 << 20) / 8;

/// Violations `segalloc_checkheap` keeps for logging; the rest are counted.
const REPORTED_VIOLATIONS: usize = 16;

static mut ARENA: [u64; ARENA_WORDS] = [0; ARENA_WORDS];

static ALLOC: LockedSegAlloc<StaticRegion> = LockedSegAlloc::new(SegAlloc::new(
    StaticRegion::from_words(&raw mut ARENA),
    AllocConfig::new(),
));

/// Lay out the heap ahead of the first allocation. Returns 0 on success,
/// -1 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn segalloc_init() -> c_int {
    let result = ALLOC.lock().init();
    match result {
        Ok(()) => 0,
        Err(err) => {
            log::error!("segalloc_init: {err}");
            -1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn segalloc_malloc(size: usize) -> *mut u8 {
    ALLOC.lock().allocate(size)
}

/// # Safety
///
/// `ptr` must be null or a live pointer returned by this module.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn segalloc_free(ptr: *mut u8) {
    unsafe { ALLOC.lock().release(ptr) }
}

/// # Safety
///
/// `ptr` must be null or a live pointer returned by this module.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn segalloc_realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    unsafe { ALLOC.lock().resize(ptr, size) }
}

#[unsafe(no_mangle)]
pub extern "C" fn segalloc_calloc(count: usize, size: usize) -> *mut u8 {
    ALLOC.lock().zero_allocate(count, size)
}

#[unsafe(no_mangle)]
pub extern "C" fn segalloc_usable_size(ptr: *const u8) -> usize {
    ALLOC.lock().usable_size(ptr)
}

/// Run the consistency checker, logging violations against the caller's
/// `line`. Returns the number of violations found.
#[unsafe(no_mangle)]
pub extern "C" fn segalloc_checkheap(line: c_int) -> c_int {
    let mut kept = [None::<Violation>; REPORTED_VIOLATIONS];
    let report = ALLOC.lock().check_heap_with(|violation| {
        if let Some(slot) = kept.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(violation);
        }
    });
    for violation in kept.iter().flatten() {
        log::error!("checkheap (line {line}): {violation}");
    }
    if report.violations > REPORTED_VIOLATIONS {
        log::error!(
            "checkheap (line {line}): {} more violation(s)",
            report.violations - REPORTED_VIOLATIONS
        );
    }
    c_int::try_from(report.violations).unwrap_or(c_int::MAX)
}
