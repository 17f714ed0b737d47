//! Observing handles.
//!
//! A `Weak` holds one share of the *memory* counter, reached through the
//! observed object counter's holder link. That keeps the block and both
//! counters readable after the payload is gone, so `lock` can always ask
//! the object counter whether an owner may still be minted.

use crate::contract;
use crate::counter::{AdoptRc, Counter};
use crate::shared::Shared;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

pub struct Weak<T: ?Sized, F = ()> {
    raw: Option<(NonNull<T>, NonNull<Counter>)>,
    _family: PhantomData<fn() -> F>,
}

unsafe impl<T: ?Sized + Send + Sync, F> Send for Weak<T, F> {}
unsafe impl<T: ?Sized + Send + Sync, F> Sync for Weak<T, F> {}

/// The memory counter behind an observed object counter.
///
/// # Safety
/// `ctr` must point to a live counter.
#[track_caller]
unsafe fn holder_of(ctr: NonNull<Counter>) -> NonNull<Counter> {
    match unsafe { ctr.as_ref() }.holder() {
        Some(h) => h,
        None => contract::violated(format_args!(
            "observing handle over counter {:p}, which has no holder",
            ctr
        )),
    }
}

impl<T: ?Sized, F> Weak<T, F> {
    /// An observer of nothing; `lock` always fails.
    pub const fn new() -> Self {
        Self {
            raw: None,
            _family: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// Try to become an owner.
    ///
    /// Succeeds only while at least one owner still exists; once the
    /// payload has been destructed this returns `None` forever.
    pub fn lock(&self) -> Option<Shared<T, F>> {
        let (object, ctr) = self.raw?;
        if !unsafe { ctr.as_ref() }.increment_if_nonzero() {
            return None;
        }
        Some(unsafe { Shared::from_raw(AdoptRc, object, ctr) })
    }

    /// Payload address this handle observes. Not dereferenceable unless
    /// an owner is held.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.raw.map(|(object, _)| object)
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (a.raw, b.raw) {
            (Some((oa, ca)), Some((ob, cb))) => {
                ca == cb && oa.as_ptr() as *const () == ob.as_ptr() as *const ()
            }
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: ?Sized, F> From<&Shared<T, F>> for Weak<T, F> {
    #[track_caller]
    fn from(owner: &Shared<T, F>) -> Self {
        let raw = Shared::as_ptr(owner).zip(Shared::counter(owner));
        if let Some((_, ctr)) = raw {
            // The owner's share keeps `ctr` and its holder alive here.
            unsafe { holder_of(ctr).as_ref() }.increment();
        }
        Self {
            raw,
            _family: PhantomData,
        }
    }
}

impl<T: ?Sized, F> Clone for Weak<T, F> {
    fn clone(&self) -> Self {
        if let Some((_, ctr)) = self.raw {
            unsafe { holder_of(ctr).as_ref() }.increment();
        }
        Self {
            raw: self.raw,
            _family: PhantomData,
        }
    }
}

impl<T: ?Sized, F> Drop for Weak<T, F> {
    fn drop(&mut self) {
        if let Some((_, ctr)) = self.raw.take() {
            unsafe { Counter::decrement(holder_of(ctr)) };
        }
    }
}

impl<T: ?Sized, F> Default for Weak<T, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, F> fmt::Debug for Weak<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make_shared;

    #[test]
    fn lock_while_owned_then_fails() {
        let a = make_shared(String::from("alive"));
        let w = Shared::downgrade(&a);
        {
            let b = w.lock().expect("owner still alive");
            assert_eq!(*b, "alive");
            assert_eq!(Shared::share_count(&a), 2);
        }
        assert_eq!(Shared::share_count(&a), 1);
        drop(a);
        assert!(w.lock().is_none());
        assert!(w.lock().is_none());
    }

    #[test]
    fn clones_share_the_block() {
        let a = make_shared(9u64);
        let w1 = Shared::downgrade(&a);
        let w2 = w1.clone();
        assert!(Weak::ptr_eq(&w1, &w2));
        assert_eq!(w1.as_ptr(), Shared::as_ptr(&a));
        drop(w1);
        assert_eq!(*w2.lock().expect("alive"), 9);
        drop(a);
        assert!(w2.lock().is_none());
    }

    #[test]
    fn null_observers() {
        let w: Weak<u8> = Weak::new();
        assert!(w.is_null());
        assert!(w.lock().is_none());
        let n: Shared<u8> = Shared::null();
        let w2 = Shared::downgrade(&n);
        assert!(w2.is_null());
        assert!(Weak::ptr_eq(&w, &w2));
    }

    #[test]
    fn locked_handle_keeps_payload_after_other_owners_leave() {
        let a = make_shared(vec![1, 2, 3]);
        let w = Shared::downgrade(&a);
        let b = w.lock().expect("alive");
        drop(a);
        assert_eq!(*b, [1, 2, 3]);
        assert!(w.lock().is_some());
        drop(b);
        assert!(w.lock().is_none());
    }
}
