//! Deferred-init storage for one value.
//!
//! A `Slot<T>` is raw, correctly aligned space whose contents are built
//! and torn down independently of the slot's own allocation. The slot
//! itself enforces nothing in release builds; the owner pairs
//! `construct`/`destruct` exactly once per life. Debug builds track the
//! live state and panic on a double construct or destruct.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicBool, Ordering};

pub(crate) struct Slot<T> {
    stor: UnsafeCell<MaybeUninit<T>>,
    #[cfg(debug_assertions)]
    live: AtomicBool,
}

impl<T> Slot<T> {
    /// Empty slot. Const so it can be written in place.
    pub(crate) const fn new() -> Self {
        Self {
            stor: UnsafeCell::new(MaybeUninit::uninit()),
            #[cfg(debug_assertions)]
            live: AtomicBool::new(false),
        }
    }

    /// Move `value` into the slot.
    ///
    /// # Safety
    /// The slot must be empty and nobody else may be accessing it.
    pub(crate) unsafe fn construct(&self, value: T) {
        #[cfg(debug_assertions)]
        {
            let was = self.live.swap(true, Ordering::Relaxed);
            assert!(!was, "slot constructed twice");
        }
        unsafe { (*self.stor.get()).write(value) };
    }

    /// Pointer to the payload. Only dereferenceable while constructed.
    #[inline]
    pub(crate) fn get(&self) -> NonNull<T> {
        // UnsafeCell::get never returns null.
        unsafe { NonNull::new_unchecked(self.stor.get().cast::<T>()) }
    }

    /// Run the payload's destructor, leaving the slot empty.
    ///
    /// # Safety
    /// The slot must hold a value and no reference to it may be live.
    pub(crate) unsafe fn destruct(&self) {
        #[cfg(debug_assertions)]
        {
            let was = self.live.swap(false, Ordering::Relaxed);
            assert!(was, "slot destructed while empty");
        }
        unsafe { core::ptr::drop_in_place(self.get().as_ptr()) };
    }

    #[cfg(all(test, debug_assertions))]
    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }
}
