//! Owning handles.
//!
//! A non-null `Shared<T, F>` is exactly one live share of an object
//! counter plus a pointer to the payload that counter keeps alive.
//! `F` is the handle family: a zero-sized tag that only groups handles
//! which may be converted among each other.

use crate::contract;
use crate::counter::{AdoptRc, Counter};
use crate::meta_block::MetaBlock;
use crate::weak::Weak;
use core::any::Any;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

/// Allocate `value` in a fresh block and return its first owner.
pub fn make_shared<T>(value: T) -> Shared<T> {
    Shared::new(value)
}

pub struct Shared<T: ?Sized, F = ()> {
    raw: Option<(NonNull<T>, NonNull<Counter>)>,
    _owns: PhantomData<T>,
    _family: PhantomData<fn() -> F>,
}

// A `Shared` hands out `&T` on any thread and may drop `T` on any thread.
unsafe impl<T: ?Sized + Send + Sync, F> Send for Shared<T, F> {}
unsafe impl<T: ?Sized + Send + Sync, F> Sync for Shared<T, F> {}

impl<T> Shared<T> {
    /// Same as [`make_shared`].
    pub fn new(value: T) -> Self {
        Self::new_tagged(value)
    }
}

impl<T, F> Shared<T, F> {
    /// Allocate `value` and return its first owner in family `F`.
    pub fn new_tagged(value: T) -> Self {
        let block = MetaBlock::allocate(1, value);
        unsafe {
            Self::from_raw(
                AdoptRc,
                MetaBlock::payload(block),
                MetaBlock::object_ctr(block),
            )
        }
    }
}

impl<T: ?Sized, F> Shared<T, F> {
    /// The null handle. Owns nothing; dereferencing it is a contract
    /// violation.
    pub const fn null() -> Self {
        Self {
            raw: None,
            _owns: PhantomData,
            _family: PhantomData,
        }
    }

    /// Adopt one existing share of `ctr` without incrementing it.
    ///
    /// # Safety
    /// The caller must own one live share of `ctr`, and `object` must stay
    /// valid for as long as that share is held. The share is transferred
    /// to the returned handle.
    pub unsafe fn from_raw(_: AdoptRc, object: NonNull<T>, ctr: NonNull<Counter>) -> Self {
        Self {
            raw: Some((object, ctr)),
            _owns: PhantomData,
            _family: PhantomData,
        }
    }

    /// Give up the share without decrementing, leaving `self` null.
    ///
    /// The caller becomes responsible for the share, usually by handing
    /// it to [`Shared::from_raw`] or calling [`Counter::decrement`].
    pub fn release(&mut self) -> Option<(NonNull<T>, NonNull<Counter>)> {
        self.raw.take()
    }

    /// Move the share out, leaving `self` null.
    pub fn take(&mut self) -> Self {
        core::mem::replace(self, Self::null())
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        this.raw.map(|(object, _)| object)
    }

    /// The object counter this handle holds a share of.
    pub fn counter(this: &Self) -> Option<NonNull<Counter>> {
        this.raw.map(|(_, ctr)| ctr)
    }

    /// Number of owners sharing this payload (0 for a null handle).
    pub fn share_count(this: &Self) -> usize {
        match this.raw {
            Some((_, ctr)) => unsafe { ctr.as_ref() }.count(),
            None => 0,
        }
    }

    /// True if both handles hold shares of the same counter and point at
    /// the same payload address (or are both null).
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (a.raw, b.raw) {
            (Some((oa, ca)), Some((ob, cb))) => {
                ca == cb && oa.as_ptr() as *const () == ob.as_ptr() as *const ()
            }
            (None, None) => true,
            _ => false,
        }
    }

    /// Create an observing handle for the same payload.
    pub fn downgrade(this: &Self) -> Weak<T, F> {
        Weak::from(this)
    }

    /// Narrow or unsize the payload view without touching the counter.
    ///
    /// The new handle keeps the same share, so the projected reference
    /// stays valid exactly as long as the original payload.
    pub fn map<U: ?Sized, M>(mut this: Self, f: M) -> Shared<U, F>
    where
        M: FnOnce(&T) -> &U,
    {
        let projected = match this.raw {
            Some((object, _)) => NonNull::from(f(unsafe { object.as_ref() })),
            None => return Shared::null(),
        };
        // `f` ran before the share left `this`, so a panic there drops it.
        match this.release() {
            Some((_, ctr)) => unsafe { Shared::from_raw(AdoptRc, projected, ctr) },
            None => Shared::null(),
        }
    }

    /// Reinterpret the payload pointer, keeping the share.
    ///
    /// # Safety
    /// `f` must return a pointer that is valid to dereference as `U` for
    /// as long as the original payload is alive.
    pub unsafe fn cast<U: ?Sized, M>(mut this: Self, f: M) -> Shared<U, F>
    where
        M: FnOnce(NonNull<T>) -> NonNull<U>,
    {
        match this.release() {
            Some((object, ctr)) => unsafe { Shared::from_raw(AdoptRc, f(object), ctr) },
            None => Shared::null(),
        }
    }

    /// Move the share into another handle family.
    pub fn handle_cast<G>(mut this: Self) -> Shared<T, G> {
        match this.release() {
            Some((object, ctr)) => unsafe { Shared::from_raw(AdoptRc, object, ctr) },
            None => Shared::null(),
        }
    }
}

impl<F> Shared<dyn Any + Send + Sync, F> {
    /// Recover the concrete payload type of a type-erased handle.
    ///
    /// On mismatch the original handle comes back untouched.
    pub fn downcast<T: Any + Send + Sync>(mut self) -> Result<Shared<T, F>, Self> {
        if self.is_null() || !(*self).is::<T>() {
            return Err(self);
        }
        match self.release() {
            Some((object, ctr)) => Ok(unsafe { Shared::from_raw(AdoptRc, object.cast::<T>(), ctr) }),
            None => Err(Shared::null()),
        }
    }
}

impl<T: ?Sized, F> Clone for Shared<T, F> {
    fn clone(&self) -> Self {
        if let Some((_, ctr)) = self.raw {
            unsafe { ctr.as_ref() }.increment();
        }
        Self {
            raw: self.raw,
            _owns: PhantomData,
            _family: PhantomData,
        }
    }
}

impl<T: ?Sized, F> Drop for Shared<T, F> {
    fn drop(&mut self) {
        if let Some((_, ctr)) = self.raw.take() {
            unsafe { Counter::decrement(ctr) };
        }
    }
}

impl<T: ?Sized, F> Default for Shared<T, F> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized, F> Deref for Shared<T, F> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match self.raw {
            Some((object, _)) => unsafe { object.as_ref() },
            None => contract::violated(format_args!("dereferenced a null Shared")),
        }
    }
}

impl<T: ?Sized + fmt::Debug, F> fmt::Debug for Shared<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            Some((object, _)) => fmt::Debug::fmt(unsafe { object.as_ref() }, f),
            None => f.write_str("(null)"),
        }
    }
}

impl<T: ?Sized, F> fmt::Pointer for Shared<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            Some((object, _)) => fmt::Pointer::fmt(&object, f),
            None => fmt::Pointer::fmt(&core::ptr::null::<u8>(), f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta_block::events;

    struct Tracked(i32);
    impl Drop for Tracked {
        fn drop(&mut self) {
            events::record("payload");
        }
    }

    #[test]
    fn last_owner_destructs_then_releases() {
        events::take();
        let a = make_shared(Tracked(42));
        assert_eq!(a.0, 42);
        let b = a.clone();
        let c = b.clone();
        let d = c.clone();
        assert_eq!(Shared::share_count(&a), 4);
        drop(a);
        drop(c);
        drop(b);
        assert!(events::take().is_empty());
        drop(d);
        assert_eq!(events::take(), ["payload", "release"]);
    }

    #[test]
    fn weak_keeps_block_not_payload() {
        events::take();
        let a = make_shared(Tracked(1));
        let w = Shared::downgrade(&a);
        drop(a);
        assert_eq!(events::take(), ["payload"]);
        assert!(w.lock().is_none());
        drop(w);
        assert_eq!(events::take(), ["release"]);
    }

    #[test]
    fn release_and_adopt_move_the_share() {
        events::take();
        let mut a = make_shared(Tracked(3));
        let (object, ctr) = a.release().expect("non-null");
        assert!(a.is_null());
        drop(a);
        assert!(events::take().is_empty());
        let b: Shared<Tracked> = unsafe { Shared::from_raw(AdoptRc, object, ctr) };
        assert_eq!(Shared::share_count(&b), 1);
        drop(b);
        assert_eq!(events::take(), ["payload", "release"]);
    }

    #[test]
    fn take_leaves_null_behind() {
        let mut a = make_shared(5u8);
        let b = a.take();
        assert!(a.is_null());
        assert_eq!(Shared::share_count(&a), 0);
        assert_eq!(*b, 5);
        assert_eq!(Shared::share_count(&b), 1);
        let n: Shared<u8> = Shared::default();
        assert!(Shared::ptr_eq(&a, &n));
    }

    #[test]
    fn debug_formats_payload_or_null() {
        let a = make_shared(vec![1, 2]);
        assert_eq!(format!("{:?}", a), "[1, 2]");
        let n: Shared<Vec<i32>> = Shared::null();
        assert_eq!(format!("{:?}", n), "(null)");
    }

    #[cfg(not(feature = "abort_on_misuse"))]
    #[test]
    fn deref_null_panics() {
        let n: Shared<u32> = Shared::null();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| *n));
        assert!(res.is_err(), "null deref must be fatal");
    }
}
