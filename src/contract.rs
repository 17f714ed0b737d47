//! Fatal contract violations.
//!
//! Misuse of the counting protocol is a caller bug, not a recoverable
//! error. Every such case funnels through `violated`, which panics by
//! default and aborts when built with the `abort_on_misuse` feature.

use core::fmt;

#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn violated(args: fmt::Arguments<'_>) -> ! {
    if cfg!(feature = "abort_on_misuse") {
        log::error!("contract violation: {}", args);
        std::process::abort();
    }
    panic!("contract violation: {}", args);
}

/// Counts above this are treated as overflow; the process aborts rather
/// than risk a wrapped count freeing live memory.
pub(crate) const MAX_COUNT: usize = isize::MAX as usize;

#[cold]
#[inline(never)]
pub(crate) fn overflow() -> ! {
    log::error!("reference count overflow");
    std::process::abort();
}
