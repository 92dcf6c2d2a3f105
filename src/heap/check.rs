//! Heap consistency verification.
//!
//! [`Heap::check`] walks the block sequence from prologue to epilogue and
//! then every class list, verifying the structural invariants the allocator
//! relies on between public calls. It is a diagnostic for tests and
//! bring-up: the allocation paths never run it.

use super::block::{Block, DWORD, MIN_BLOCK, OVERHEAD};
use super::classes::{class_of, CLASS_COUNT};
use super::tag::Tag;
use super::Heap;
use crate::region::Region;

use core::ops::Range;

/// A violated heap invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    /// The prologue is missing or mis-tagged.
    BadPrologue,
    /// The block walk did not end in a zero-size allocated epilogue.
    BadEpilogue,
    /// A block's header and footer disagree.
    TagMismatch,
    /// A block size is not a double-word multiple of at least 16.
    BadSize,
    /// A payload address is not 8-aligned.
    MisalignedPayload,
    /// A block span leaves the region.
    OutOfRegion,
    /// Two neighboring blocks are both free.
    AdjacentFreeBlocks,
    /// A class list member is not marked free.
    ListedBlockAllocated,
    /// A class list member's size selects a different class.
    WrongClass,
    /// A member's predecessor link does not point back (or a head carries
    /// a non-zero predecessor offset).
    BrokenBackLink,
    /// A class list has more members than the heap has free blocks.
    UnterminatedList,
    /// The class lists and the block walk disagree about the set of free
    /// blocks.
    UnindexedFreeBlock,
}

impl<R: Region> Heap<R> {
    /// Verify the heap invariants, logging each block when `verbose`.
    ///
    /// Checks, in order: prologue and epilogue well-formedness; per block
    /// header/footer agreement, size validity, payload alignment and region
    /// containment; the absence of adjacent free blocks; and for every
    /// class list its membership (free, correctly sized blocks), link
    /// reciprocity and termination. Finally the number of listed blocks
    /// must equal the number of free blocks seen in the walk.
    pub fn check(&self, verbose: bool) -> Result<(), CheckError> {
        let bounds = self.region.bounds();
        // SAFETY: between public calls every block reachable from the
        // prologue and every list link is valid; each read below is
        // additionally range-checked before the values it yields are used
        // for navigation.
        unsafe {
            if self.first.tag() != Tag::used(OVERHEAD) || self.first.footer_tag() != Tag::used(OVERHEAD)
            {
                return Err(CheckError::BadPrologue);
            }
            if verbose {
                log::trace!("heap ({:#x}..{:#x}):", bounds.start, bounds.end);
                log::trace!("{:#x}: prologue", self.first.addr());
            }

            let mut free_blocks = 0usize;
            let mut prev_free = false;
            let mut cursor = self.first.next();
            while cursor.size() > 0 {
                check_block(cursor, &bounds)?;
                if verbose {
                    log::trace!("{:#x}: {:?}", cursor.addr(), cursor.tag());
                }
                let free = !cursor.is_allocated();
                if free && prev_free {
                    return Err(CheckError::AdjacentFreeBlocks);
                }
                free_blocks += usize::from(free);
                prev_free = free;
                cursor = cursor.next();
            }
            if cursor.tag() != Tag::used(0) {
                return Err(CheckError::BadEpilogue);
            }
            if verbose {
                log::trace!("{:#x}: epilogue", cursor.addr());
            }

            let mut listed = 0usize;
            for class in 0..CLASS_COUNT {
                let mut prev: Option<Block> = None;
                let mut member = self.classes.head(class);
                while let Some(block) = member {
                    listed += 1;
                    if listed > free_blocks {
                        return Err(CheckError::UnterminatedList);
                    }
                    if block.is_allocated() {
                        return Err(CheckError::ListedBlockAllocated);
                    }
                    if class_of(block.size()) != class {
                        return Err(CheckError::WrongClass);
                    }
                    if block.pred() != prev {
                        return Err(CheckError::BrokenBackLink);
                    }
                    prev = Some(block);
                    member = block.succ();
                }
            }
            if listed != free_blocks {
                return Err(CheckError::UnindexedFreeBlock);
            }
        }
        Ok(())
    }
}

/// Structural checks on one walked block, ordered so that every read is
/// justified by the checks before it.
unsafe fn check_block(block: Block, bounds: &Range<usize>) -> Result<(), CheckError> {
    // SAFETY: the caller walked to `block` from the prologue, so its header
    // is inside the region.
    let tag = unsafe { block.tag() };
    let size = tag.size();
    if size % DWORD != 0 || size < MIN_BLOCK {
        return Err(CheckError::BadSize);
    }
    if block.addr() % DWORD != 0 {
        return Err(CheckError::MisalignedPayload);
    }
    let span_end = match block.addr().checked_add(size) {
        Some(end) => end,
        None => return Err(CheckError::OutOfRegion),
    };
    if span_end > bounds.end || block.addr() < bounds.start {
        return Err(CheckError::OutOfRegion);
    }
    // SAFETY: the footer lies in `addr..span_end`, verified in-region above.
    if unsafe { block.footer_tag() } != tag {
        return Err(CheckError::TagMismatch);
    }
    Ok(())
}
