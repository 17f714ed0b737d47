// Heap traffic of the shared/weak protocol.
//
// A counting global allocator (per thread, so the harness's own threads
// don't interfere) shows:
// - make_shared allocates exactly one block;
// - clones, observers, locks and casts allocate nothing;
// - the payload's destructor runs when the last owner drops, but the
//   block is only freed when the last observer drops too.
use dual_rc::{make_shared, Shared};
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Counting;

thread_local! {
    static ALLOCS: Cell<usize> = const { Cell::new(0) };
    static FREES: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for Counting {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCS.try_with(|c| c.set(c.get() + 1));
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _ = FREES.try_with(|c| c.set(c.get() + 1));
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: Counting = Counting;

fn snapshot() -> (usize, usize) {
    (ALLOCS.with(|c| c.get()), FREES.with(|c| c.get()))
}

struct Payload {
    drops: Arc<AtomicUsize>,
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn block_outlives_payload_until_last_observer() {
    let drops = Arc::new(AtomicUsize::new(0));
    let payload = Payload {
        drops: drops.clone(),
    };

    let (a0, f0) = snapshot();
    let owner = make_shared(payload);
    assert_eq!(snapshot(), (a0 + 1, f0), "one block per make_shared");

    let second = owner.clone();
    let observer = Shared::downgrade(&owner);
    let observer2 = observer.clone();
    let promoted = observer.lock().expect("owners alive");
    let mapped: Shared<Arc<AtomicUsize>> = Shared::map(promoted, |p| &p.drops);
    assert_eq!(snapshot(), (a0 + 1, f0), "handles never allocate");

    drop(owner);
    drop(second);
    drop(mapped);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot(), (a0 + 1, f0), "observers keep the block");

    assert!(observer.lock().is_none());
    drop(observer);
    assert_eq!(snapshot(), (a0 + 1, f0));
    drop(observer2);
    assert_eq!(snapshot(), (a0 + 1, f0 + 1), "last observer frees the block");
}
