//! dual-rc: lock-free shared/weak handles whose payload and backing
//! block have separate lifetimes.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a reference-counting primitive where observers keep the
//!   counting metadata alive without delaying payload destruction.
//! - Layers:
//!   - Counter: atomic count plus an optional non-owning *holder* link;
//!     runs a `Disposal` once on 1 -> 0, then decrements the holder.
//!   - Slot<T>: deferred-init space for one payload.
//!   - MetaBlock<T>: one slot and two counters. The object counter
//!     destructs the payload; its holder, the memory counter, frees the
//!     block.
//!   - Shared<T, F> / Weak<T, F>: public handles over the object and the
//!     memory counter respectively. `Weak::lock` promotes via
//!     `increment_if_nonzero` on the object counter.
//!
//! Constraints
//! - Thread-safe and lock-free; every counter operation is a handful of
//!   atomics. Promotion retries a CAS under contention.
//! - One heap allocation per `make_shared`; none for clones, observers
//!   or casts.
//! - The holder link is a raw pointer kept valid by the block's own
//!   layout. Counting it would create a cycle.
//!
//! Lifecycle of a block
//! - `make_shared`: object = 1, memory = 1 (the memory unit belongs to
//!   the object counter as a whole, not to any handle).
//! - Each `Weak` adds one to memory; each extra `Shared` adds one to
//!   object.
//! - Last `Shared` dropped: payload destructed, memory decremented.
//! - Memory reaches zero: block freed. This happens on whichever thread
//!   performs the final decrement.
//!
//! Overflow and misuse
//! - Counts beyond `isize::MAX` abort the process, matching `Arc`.
//! - Contract violations (underflow, re-arming a live counter, observing
//!   a counter without holder, dereferencing a null `Shared`) panic, or
//!   abort with the `abort_on_misuse` feature.
//! - `Weak::lock` returning `None` is not an error.
//!
//! Notes and non-goals
//! - No cycle detection; cyclic `Shared` graphs leak.
//! - Handle families (`F`) are plain tags; `Shared::handle_cast` moves a
//!   share between them.
//! - `Counter` is public so other structures can embed counters with
//!   their own disposal thunks and hand shares to `Shared::from_raw`.

mod contract;
pub mod counter;
mod meta_block;
mod shared;
mod slot;
mod weak;

// Public surface
pub use counter::{AdoptRc, Counter, Disposal};
pub use shared::{make_shared, Shared};
pub use weak::Weak;
