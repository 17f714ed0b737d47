//! The dual-counter allocation: one payload slot plus two counters.
//!
//! - The *object* counter counts owning handles. At zero it destructs the
//!   payload in place, then hands one decrement to its holder.
//! - The *memory* counter is that holder. It starts at 1 (the unit the
//!   object counter gives back) and additionally counts observing
//!   handles. At zero it frees the whole block.
//!
//! So the payload lives as long as any `Shared` does, and the block (and
//! with it both counters) as long as any `Shared` or `Weak` does.

use crate::counter::{AdoptRc, Counter, Disposal};
use crate::slot::Slot;
use core::mem::MaybeUninit;
use core::ptr::{addr_of_mut, NonNull};
use log::trace;

pub(crate) struct MetaBlock<T> {
    memory: Counter,
    object: Counter,
    slot: Slot<T>,
}

impl<T> MetaBlock<T> {
    /// Allocate a block holding `value` with `initial_count` owning shares
    /// on the object counter and the implicit unit on the memory counter.
    pub(crate) fn allocate(initial_count: usize, value: T) -> NonNull<Self> {
        debug_assert!(initial_count > 0, "a block needs at least one owner");
        let block = NonNull::from(Box::leak(Box::new(MaybeUninit::<Self>::uninit()))).cast::<Self>();
        let raw = block.as_ptr();
        let target = block.cast::<()>();
        // Fields are written in place: the counters refer to the block's
        // own address, which is only known after allocation.
        unsafe {
            let memory = addr_of_mut!((*raw).memory);
            memory.write(Counter::adopt(
                AdoptRc,
                None,
                1,
                Disposal::ReleaseStorage {
                    target,
                    release: release::<T>,
                },
            ));
            addr_of_mut!((*raw).object).write(Counter::adopt(
                AdoptRc,
                Some(NonNull::new_unchecked(memory)),
                initial_count,
                Disposal::DestructPayload {
                    target,
                    destruct: destruct::<T>,
                },
            ));
            addr_of_mut!((*raw).slot).write(Slot::new());
            (*raw).slot.construct(value);
        }
        trace!(
            "allocated block {:p} for {} with {} owner(s)",
            block,
            core::any::type_name::<T>(),
            initial_count
        );
        block
    }

    /// # Safety
    /// `this` must point to a live block.
    #[inline]
    pub(crate) unsafe fn payload(this: NonNull<Self>) -> NonNull<T> {
        unsafe { (*this.as_ptr()).slot.get() }
    }

    /// # Safety
    /// `this` must point to a live block.
    #[inline]
    pub(crate) unsafe fn object_ctr(this: NonNull<Self>) -> NonNull<Counter> {
        unsafe { NonNull::new_unchecked(addr_of_mut!((*this.as_ptr()).object)) }
    }

    /// # Safety
    /// `this` must point to a live block.
    #[inline]
    pub(crate) unsafe fn memory_ctr(this: NonNull<Self>) -> NonNull<Counter> {
        unsafe { NonNull::new_unchecked(addr_of_mut!((*this.as_ptr()).memory)) }
    }
}

unsafe fn destruct<T>(target: NonNull<()>) {
    let block = target.cast::<MetaBlock<T>>();
    unsafe { (*block.as_ptr()).slot.destruct() };
}

unsafe fn release<T>(target: NonNull<()>) {
    let block = target.cast::<MetaBlock<T>>();
    trace!("releasing block {:p}", block);
    #[cfg(test)]
    events::record("release");
    // Allocated as Box<MaybeUninit<MetaBlock<T>>>; same layout. Dropping
    // runs the counters' zero checks; the empty slot drops nothing.
    drop(unsafe { Box::from_raw(block.as_ptr()) });
}
