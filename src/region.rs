//! The host memory primitive a [`Heap`](crate::Heap) is built on.
//!
//! A region is a single contiguous span of bytes that can only ever grow:
//! [`Region::extend`] moves the break upwards and hands out the newly added
//! tail, the classic `sbrk`-shape. The heap embeds all of its bookkeeping
//! (class table, boundary tags, free-list links) inside the region bytes, so
//! the region merely provides raw storage.

use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ops::Range;
use core::ptr::NonNull;

/// Double-word alignment every payload address must satisfy.
const ALIGN: usize = 8;

/// A monotonically growable, contiguous byte region.
///
/// # Safety
/// Implementors must guarantee that
/// - all bytes handed out by [`extend()`](Self::extend) form one contiguous
///   span: each successful extension starts exactly where the previous one
///   ended,
/// - the span is readable and writable for the lifetime of the region and
///   never moves, even when the region *handle* is moved,
/// - no other party writes to the span.
///
/// A [`Heap`](crate::Heap) stores absolute addresses into the span and reads
/// them back across calls; violating any of the above is undefined behavior.
pub unsafe trait Region {
    /// Grow the region by `n` bytes and return the base of the new tail.
    ///
    /// Returns `None` if the underlying storage is exhausted. A failed
    /// extension must leave the region unchanged.
    fn extend(&mut self, n: usize) -> Option<NonNull<u8>>;

    /// The address range currently covered by the region, i.e. everything
    /// handed out by `extend()` so far.
    fn bounds(&self) -> Range<usize>;
}

/// A region over caller-provided storage.
///
/// This is the all-targets implementation of [`Region`]: the storage is a
/// fixed buffer (a static, a leaked allocation, a reserved address range) and
/// the break moves through it until it is used up. The base address is
/// rounded up to 8, so payload addresses derived from it keep the double-word
/// alignment guarantee; up to 7 bytes of the storage may be sacrificed for
/// that.
#[derive(Debug)]
pub struct Arena<'storage> {
    base: *mut u8,
    capacity: usize,
    brk: usize,
    _storage: PhantomData<&'storage mut [MaybeUninit<u8>]>,
}

impl<'storage> Arena<'storage> {
    /// Create an arena over the given storage.
    ///
    /// The arena borrows the storage exclusively; the bytes need not be
    /// initialized.
    pub fn new(storage: &'storage mut [MaybeUninit<u8>]) -> Self {
        let start = storage.as_mut_ptr().cast::<u8>();
        let pad = (ALIGN - start as usize % ALIGN) % ALIGN;
        let capacity = storage.len().saturating_sub(pad);
        // SAFETY: `pad` is at most `storage.len()` whenever `capacity` is
        // non-zero, so the adjusted base stays inside (or one past) the
        // storage.
        let base = unsafe { start.add(pad.min(storage.len())) };
        Self {
            base,
            capacity,
            brk: 0,
            _storage: PhantomData,
        }
    }

    /// Create an arena over a raw address range.
    ///
    /// This is the constructor for fixed-address storage (e.g. a reserved
    /// RAM range on a bare-metal target) and for `static` construction,
    /// where [`Arena::new`] cannot be used.
    ///
    /// # Safety
    /// `base..base + size` must be readable and writable for `'storage`, not
    /// referenced by anything else, and must stay valid without moving.
    #[must_use]
    pub const unsafe fn from_raw(base: *mut u8, size: usize) -> Self {
        // SAFETY: converting a pointer to its address for alignment math;
        // no provenance is exposed or relied upon. `as usize` is a hard
        // error in const fns, so transmute is used instead.
        let base_addr = unsafe { core::mem::transmute::<*mut u8, usize>(base) };
        let pad = (ALIGN - base_addr % ALIGN) % ALIGN;
        let (base, capacity) = if pad <= size {
            (base.wrapping_add(pad), size - pad)
        } else {
            (base, 0)
        };
        Self {
            base,
            capacity,
            brk: 0,
            _storage: PhantomData,
        }
    }

    /// Bytes still available for extension.
    pub fn remaining(&self) -> usize {
        self.capacity - self.brk
    }
}

// SAFETY: the arena has exclusive access to its storage (enforced by the
// `&mut` borrow respectively the contract of `from_raw`), so the handle can
// migrate between threads.
unsafe impl Send for Arena<'_> {}

// SAFETY: extensions are carved out of one contiguous buffer front to back,
// the buffer is borrowed exclusively for `'storage` and never reallocated.
unsafe impl Region for Arena<'_> {
    fn extend(&mut self, n: usize) -> Option<NonNull<u8>> {
        if n > self.capacity - self.brk {
            return None;
        }
        // SAFETY: `brk <= capacity - n` was just checked, so the resulting
        // pointer is inside the storage and non-null.
        let tail = unsafe { NonNull::new_unchecked(self.base.add(self.brk)) };
        self.brk += n;
        Some(tail)
    }

    fn bounds(&self) -> Range<usize> {
        let base = self.base as usize;
        base..base + self.brk
    }
}

/// A region backed by the real program break.
///
/// Every extension is a `sbrk(2)` call; the first one additionally rounds the
/// break up to 8. This mirrors growing the data segment directly instead of
/// simulating it in a buffer.
///
/// The process must not have a *second* brk user: a libc `malloc` that also
/// moves the break interleaves foreign bytes into the span and breaks the
/// [`Region`] contract. `extend()` detects a moved break and refuses further
/// growth instead of corrupting the heap. Create at most one `Sbrk` per
/// process.
#[cfg(feature = "sbrk")]
pub struct Sbrk {
    start: *mut u8,
    brk: *mut u8,
}

#[cfg(feature = "sbrk")]
impl Sbrk {
    /// Create the handle without touching the program break.
    ///
    /// This is a `const fn`, so it can initialize a `static`:
    /// ```no_run
    /// static ALLOCATOR: segalloc::Allocator<segalloc::Sbrk> =
    ///     segalloc::Allocator::new(segalloc::Sbrk::new());
    /// ```
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start: core::ptr::null_mut(),
            brk: core::ptr::null_mut(),
        }
    }
}

// SAFETY: the handle owns the span above its recorded start; the contract
// that only one `Sbrk` (and no other brk user) exists per process makes that
// access exclusive regardless of the thread using the handle.
#[cfg(feature = "sbrk")]
unsafe impl Send for Sbrk {}

// SAFETY: `sbrk` grows the data segment in place; as long as this handle is
// the only brk user the returned spans are contiguous and stable. A break
// moved by somebody else is detected below and turned into a refusal.
#[cfg(feature = "sbrk")]
unsafe impl Region for Sbrk {
    fn extend(&mut self, n: usize) -> Option<NonNull<u8>> {
        const FAILURE: *mut libc::c_void = usize::MAX as *mut libc::c_void;

        if self.start.is_null() {
            // SAFETY: `sbrk(0)` only queries the current break.
            let current = unsafe { libc::sbrk(0) };
            if current == FAILURE {
                return None;
            }
            let pad = (ALIGN - current as usize % ALIGN) % ALIGN;
            // SAFETY: moving the break up by at most 7 bytes has no effect
            // beyond claiming them.
            if pad != 0 && unsafe { libc::sbrk(pad as libc::intptr_t) } == FAILURE {
                return None;
            }
            let aligned = (current as usize + pad) as *mut u8;
            self.start = aligned;
            self.brk = aligned;
        }

        // SAFETY: requesting `n` more bytes of data segment; the kernel
        // either grants them or reports failure.
        let old = unsafe { libc::sbrk(n as libc::intptr_t) };
        if old == FAILURE {
            return None;
        }
        if old.cast::<u8>() != self.brk {
            // a foreign brk user moved the break; the span would no longer
            // be contiguous
            return None;
        }
        // SAFETY: `old..old + n` was just granted by the kernel.
        let tail = unsafe { NonNull::new_unchecked(old.cast::<u8>()) };
        self.brk = tail.as_ptr().wrapping_add(n);
        Some(tail)
    }

    fn bounds(&self) -> Range<usize> {
        self.start as usize..self.brk as usize
    }
}
