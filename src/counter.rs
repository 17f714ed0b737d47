//! Atomic share counters with an optional holder.
//!
//! A `Counter` counts live shares of something and runs its `Disposal`
//! exactly once, on the 1 -> 0 transition. A counter may name a *holder*:
//! another counter that receives one decrement after this counter's
//! disposal has run. The holder link is non-owning; whoever builds the
//! pair guarantees the holder outlives the final decrement.

use crate::contract::{self, MAX_COUNT};
use core::fmt;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use log::trace;

/// Marker selecting constructors that take over an existing share (or
/// arm a counter) instead of creating a new increment.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AdoptRc;

/// What a counter does when its count reaches zero.
///
/// Each counter is bound to one variant for its whole life. The variant
/// carries a type-erased target and the thunk that knows its real type.
#[derive(Copy, Clone)]
pub enum Disposal {
    /// Run the payload's destructor in place; the storage stays allocated.
    DestructPayload {
        target: NonNull<()>,
        destruct: unsafe fn(NonNull<()>),
    },
    /// Free the storage block (both counters and the payload cell).
    ReleaseStorage {
        target: NonNull<()>,
        release: unsafe fn(NonNull<()>),
    },
}

impl Disposal {
    /// Short name of the variant, used in logs.
    pub fn role(&self) -> &'static str {
        match self {
            Disposal::DestructPayload { .. } => "destruct-payload",
            Disposal::ReleaseStorage { .. } => "release-storage",
        }
    }

    /// # Safety
    /// Called at most once per arming of the owning counter, with `target`
    /// still valid for the thunk.
    unsafe fn run(self) {
        match self {
            Disposal::DestructPayload { target, destruct } => unsafe { destruct(target) },
            Disposal::ReleaseStorage { target, release } => unsafe { release(target) },
        }
    }
}

impl fmt::Debug for Disposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self {
            Disposal::DestructPayload { target, .. } => target,
            Disposal::ReleaseStorage { target, .. } => target,
        };
        f.debug_struct("Disposal")
            .field("role", &self.role())
            .field("target", target)
            .finish()
    }
}

/// Lock-free share counter.
pub struct Counter {
    holder: AtomicPtr<Counter>,
    count: AtomicUsize,
    disposal: Disposal,
}

// The raw pointers inside `Disposal` and `holder` are only dereferenced by
// the thread that performs the zero transition, after it has synchronized
// with every other share through the acquire-release count.
unsafe impl Send for Counter {}
unsafe impl Sync for Counter {}

impl Counter {
    /// An unarmed counter: count 0, no holder. Arm it with `setup`.
    pub const fn new(disposal: Disposal) -> Self {
        Self {
            holder: AtomicPtr::new(ptr::null_mut()),
            count: AtomicUsize::new(0),
            disposal,
        }
    }

    /// A counter armed with `initial_count` shares and an optional holder.
    pub const fn adopt(
        _: AdoptRc,
        holder: Option<NonNull<Counter>>,
        initial_count: usize,
        disposal: Disposal,
    ) -> Self {
        let holder = match holder {
            Some(h) => h.as_ptr(),
            None => ptr::null_mut(),
        };
        Self {
            holder: AtomicPtr::new(holder),
            count: AtomicUsize::new(initial_count),
            disposal,
        }
    }

    /// Re-arm a counter whose previous life has fully ended.
    ///
    /// The count must currently be zero. The new state is written with
    /// relaxed stores: the caller publishes the counter to other threads
    /// only afterwards.
    pub fn setup(&self, _: AdoptRc, holder: Option<NonNull<Counter>>, initial_count: usize) {
        let current = self.count.load(Ordering::Relaxed);
        if current != 0 {
            contract::violated(format_args!(
                "setup on a counter that still holds {} shares",
                current
            ));
        }
        let holder = holder.map_or(ptr::null_mut(), NonNull::as_ptr);
        self.holder.store(holder, Ordering::Relaxed);
        self.count.store(initial_count, Ordering::Relaxed);
    }

    /// The counter notified when this one reaches zero, if any.
    pub fn holder(&self) -> Option<NonNull<Counter>> {
        NonNull::new(self.holder.load(Ordering::Relaxed))
    }

    /// The disposal this counter runs at zero.
    pub fn disposal(&self) -> Disposal {
        self.disposal
    }

    /// Relaxed snapshot of the count. Only meaningful as a diagnostic.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Add one share. The caller must already hold a share.
    #[inline]
    pub fn increment(&self) {
        let prev = self.count.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev != 0, "increment on a counter with no live share");
        if prev > MAX_COUNT {
            contract::overflow();
        }
    }

    /// Add one share unless the count is already zero.
    ///
    /// Returns false once the count has reached zero; the disposal has
    /// then run (or is running) and no share can be resurrected.
    #[inline]
    pub fn increment_if_nonzero(&self) -> bool {
        let mut n = self.count.load(Ordering::Relaxed);
        loop {
            if n == 0 {
                return false;
            }
            if n > MAX_COUNT {
                contract::overflow();
            }
            match self
                .count
                .compare_exchange_weak(n, n + 1, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(seen) => n = seen,
            }
        }
    }

    /// Drop one share; on the last one run the disposal, then pass one
    /// decrement on to the holder.
    ///
    /// # Safety
    /// `this` must point to a live counter on which the caller holds a
    /// share, and its holder (if any) must still be live. After this
    /// returns the counter may have been freed.
    pub unsafe fn decrement(this: NonNull<Counter>) {
        let ctr = unsafe { this.as_ref() };
        let prev = ctr.count.fetch_sub(1, Ordering::AcqRel);
        if prev > 1 {
            return;
        }
        if prev == 0 {
            contract::violated(format_args!("counter {:p} decremented below zero", this));
        }

        // The disposal may free the counter itself: read everything first.
        let holder = ctr.holder();
        let disposal = ctr.disposal;
        trace!("counter {:p} reached zero, running {}", this, disposal.role());

        unsafe { disposal.run() };

        if let Some(h) = holder {
            unsafe { Counter::decrement(h) };
        }
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        debug_assert_eq!(
            *self.count.get_mut(),
            0,
            "counter dropped while shares are outstanding"
        );
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("count", &self.count())
            .field("holder", &self.holder())
            .field("disposal", &self.disposal)
            .finish()
    }
}
