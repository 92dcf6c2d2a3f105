//! Block layout primitives.
//!
//! A block is addressed by its *payload* pointer. The 4-byte header sits
//! immediately below it, the footer in the last 4 bytes of the block:
//!
//! ```text
//!       header   payload ...                                   footer
//!      ┌────────┬──────────────────────────────────────────┬────────┐
//!      │ size|a │ caller bytes (or free-list links)        │ size|a │
//!      └────────┴──────────────────────────────────────────┴────────┘
//!               ^ payload pointer, 8-aligned
//! ```
//!
//! While a block is free, its first eight payload bytes are reused as two
//! signed 4-byte offsets to the predecessor and successor *payloads* in the
//! block's free list. An offset of 0 terminates the list in that direction;
//! that encoding is unambiguous because a block is never its own neighbor.

use super::tag::Tag;

use core::ptr::NonNull;

/// Word size of a boundary tag in bytes.
pub const WORD: usize = 4;
/// Double word: payload alignment and size granularity.
pub const DWORD: usize = 8;
/// Combined header and footer overhead per block.
pub const OVERHEAD: usize = 2 * WORD;
/// Smallest representable block: header, 8-byte payload, footer.
pub const MIN_BLOCK: usize = 16;

/// A block of the managed region, identified by its payload address.
///
/// `Block` is a plain address wrapper; copying it copies the address. All
/// methods that touch region memory are `unsafe` and share one contract:
/// the block must lie inside a live region and carry a valid header (and,
/// where the method reads them, a valid footer or link words). The heap
/// upholds this between public calls via its structural invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block(NonNull<u8>);

impl Block {
    pub fn from_payload(payload: NonNull<u8>) -> Self {
        debug_assert!(payload.as_ptr() as usize % DWORD == 0);
        Self(payload)
    }

    pub fn payload(self) -> NonNull<u8> {
        self.0
    }

    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Read the header tag.
    ///
    /// # Safety
    /// See the type-level contract.
    pub unsafe fn tag(self) -> Tag {
        // SAFETY: the header word lives at payload - 4 and is 4-aligned
        // because payloads are 8-aligned; validity is the caller's contract.
        Tag::from_raw(unsafe { self.0.as_ptr().sub(WORD).cast::<u32>().read() })
    }

    /// Total block size in bytes (header + payload + footer).
    ///
    /// # Safety
    /// See the type-level contract.
    pub unsafe fn size(self) -> usize {
        // SAFETY: forwarded contract.
        unsafe { self.tag() }.size()
    }

    /// # Safety
    /// See the type-level contract.
    pub unsafe fn is_allocated(self) -> bool {
        // SAFETY: forwarded contract.
        unsafe { self.tag() }.is_allocated()
    }

    /// Read the footer tag, located via the header's size.
    ///
    /// # Safety
    /// See the type-level contract; additionally the footer word derived
    /// from the header must lie inside the live region.
    pub unsafe fn footer_tag(self) -> Tag {
        // SAFETY: forwarded contract.
        let size = unsafe { self.size() };
        // SAFETY: forwarded contract.
        Tag::from_raw(unsafe { self.footer_ptr(size).read() })
    }

    /// Write `tag` as header only.
    ///
    /// The epilogue is the one block that is all header, so it is stamped
    /// with this instead of [`write_tags()`](Self::write_tags).
    ///
    /// # Safety
    /// The header word must lie inside the live region.
    pub unsafe fn write_header(self, tag: Tag) {
        // SAFETY: forwarded contract; alignment as in `tag()`.
        unsafe { self.0.as_ptr().sub(WORD).cast::<u32>().write(tag.as_raw()) };
    }

    /// Write `tag` as both header and footer.
    ///
    /// The footer position is derived from `tag.size()`, not from the old
    /// header, so this both re-tags a block and carves a new one out of raw
    /// region bytes.
    ///
    /// # Safety
    /// The whole span `payload - 4 .. payload + tag.size() - 4` must lie
    /// inside the live region, and `tag.size()` must be at least 8.
    pub unsafe fn write_tags(self, tag: Tag) {
        debug_assert!(tag.size() >= DWORD);
        // SAFETY: forwarded contract.
        unsafe {
            self.write_header(tag);
            self.footer_ptr(tag.size()).write(tag.as_raw());
        }
    }

    /// The block starting where this one ends.
    ///
    /// # Safety
    /// See the type-level contract. The result is only a valid block if this
    /// block is not the epilogue.
    pub unsafe fn next(self) -> Self {
        // SAFETY: forwarded contract.
        let size = unsafe { self.size() };
        // SAFETY: the block span plus the following header are in the region
        // (the epilogue terminates every walk before this can leave it).
        Self(unsafe { NonNull::new_unchecked(self.0.as_ptr().add(size)) })
    }

    /// The block ending where this one starts.
    ///
    /// Requires the preceding footer to be intact; the prologue guarantees
    /// that for the first real block.
    ///
    /// # Safety
    /// See the type-level contract. Must not be called on the prologue.
    pub unsafe fn prev(self) -> Self {
        // SAFETY: the word below the header is the previous block's footer,
        // valid per the caller's contract.
        let prev_size =
            Tag::from_raw(unsafe { self.0.as_ptr().sub(DWORD).cast::<u32>().read() }).size();
        // SAFETY: `prev_size` spans exactly the previous block.
        Self(unsafe { NonNull::new_unchecked(self.0.as_ptr().sub(prev_size)) })
    }

    /// Predecessor in this block's free list, `None` when the block is the
    /// list head.
    ///
    /// # Safety
    /// The block must be free and its link words initialized.
    pub unsafe fn pred(self) -> Option<Self> {
        // SAFETY: forwarded contract.
        unsafe { self.follow_link(0) }
    }

    /// Successor in this block's free list, `None` when the block is the
    /// list tail.
    ///
    /// # Safety
    /// The block must be free and its link words initialized.
    pub unsafe fn succ(self) -> Option<Self> {
        // SAFETY: forwarded contract.
        unsafe { self.follow_link(WORD) }
    }

    /// Point this block's predecessor link at `pred` (`None` marks it the
    /// list head).
    ///
    /// # Safety
    /// The block must be free; `pred`, if given, must be a payload inside
    /// the same region.
    pub unsafe fn link_to_pred(self, pred: Option<Self>) {
        // SAFETY: forwarded contract.
        unsafe { self.write_link(0, pred) };
    }

    /// Point this block's successor link at `succ` (`None` marks it the
    /// list tail).
    ///
    /// # Safety
    /// The block must be free; `succ`, if given, must be a payload inside
    /// the same region.
    pub unsafe fn link_to_succ(self, succ: Option<Self>) {
        // SAFETY: forwarded contract.
        unsafe { self.write_link(WORD, succ) };
    }

    unsafe fn follow_link(self, at: usize) -> Option<Self> {
        // SAFETY: the two link words are the first payload bytes of a free
        // block (at least 8 by the minimum block size), 4-aligned.
        let offset = unsafe { self.0.as_ptr().add(at).cast::<i32>().read() };
        if offset == 0 {
            return None;
        }
        // SAFETY: a non-zero link offset points at a free block's payload
        // within the region (heap invariant).
        Some(Self(unsafe {
            NonNull::new_unchecked(self.0.as_ptr().offset(offset as isize))
        }))
    }

    unsafe fn write_link(self, at: usize, target: Option<Self>) {
        let offset = target.map_or(0, |block| self.offset_to(block));
        // SAFETY: alignment and validity as in `follow_link`.
        unsafe { self.0.as_ptr().add(at).cast::<i32>().write(offset) };
    }

    /// Signed byte displacement from this payload to `other`'s payload.
    fn offset_to(self, other: Self) -> i32 {
        let offset = other.addr() as isize - self.addr() as isize;
        debug_assert!(
            i32::try_from(offset).is_ok(),
            "free-list members more than 2 GiB apart"
        );
        offset as i32
    }

    unsafe fn footer_ptr(self, size: usize) -> *mut u32 {
        // SAFETY: the footer is the last word of the block span, which the
        // caller asserts to be in the region.
        unsafe { self.0.as_ptr().add(size - DWORD).cast::<u32>() }
    }
}
