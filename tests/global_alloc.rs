//! End-to-end use as the registered global allocator: every allocation of
//! this binary, the runtime's included, is served by [`Allocator`].
//!
//! The binary runs without the libtest harness (`harness = false`) so that
//! all allocations in the process stay within the allocator's 8-byte
//! alignment contract.

extern crate alloc;

use segalloc::{Allocator, Region};

use core::mem::MaybeUninit;
use core::ops::Range;
use core::ptr::NonNull;

const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[repr(align(8))]
struct Storage([MaybeUninit<u8>; HEAP_SIZE]);

static mut STORAGE: Storage = Storage([MaybeUninit::uninit(); HEAP_SIZE]);

/// A region carving its spans out of `STORAGE`.
///
/// Unlike [`segalloc::Arena`], this handle holds no address at all, so it is
/// constructible in a `const` context and can back the `static` allocator
/// below; the storage address is only taken at run time.
struct StaticArena {
    brk: usize,
}

// SAFETY: `STORAGE` is reachable only through the one `StaticArena` inside
// `ALLOCATOR`, its spans are handed out front to back, and a static never
// moves.
unsafe impl Region for StaticArena {
    fn extend(&mut self, n: usize) -> Option<NonNull<u8>> {
        if n > HEAP_SIZE - self.brk {
            return None;
        }
        // SAFETY: `brk + n` stays inside `STORAGE`, and only the address of
        // the static is taken.
        let tail = unsafe { core::ptr::addr_of_mut!(STORAGE).cast::<u8>().add(self.brk) };
        self.brk += n;
        NonNull::new(tail)
    }

    fn bounds(&self) -> Range<usize> {
        // SAFETY: only the address of the static is taken.
        let base = unsafe { core::ptr::addr_of_mut!(STORAGE) } as usize;
        base..base + self.brk
    }
}

#[global_allocator]
static ALLOCATOR: Allocator<StaticArena> = Allocator::new(StaticArena { brk: 0 });

fn main() {
    vec();
    map_and_formatting();
}

fn vec() {
    let mut v = alloc::vec![1, 2, 3];
    v.push(4);

    assert_eq!((1..=4).collect::<alloc::vec::Vec<_>>(), v);
}

fn map_and_formatting() {
    let mut map = alloc::collections::BTreeMap::new();
    map.insert(10, "Hello");
    map.insert(11, "world");
    map.insert(20, "Hallo");
    map.insert(21, "Welt");
    map.insert(-1, "english");
    map.insert(-2, "german");

    let english = alloc::format!("[{}]: {}, {}!", map[&-1], map[&10], map[&11]);
    let german = alloc::format!("[{}]: {}, {}!", map[&-2], map[&20], map[&21]);
    assert_eq!(english, "[english]: Hello, world!");
    assert_eq!(german, "[german]: Hallo, Welt!");
}
