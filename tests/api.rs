use segalloc::{Allocator, Arena};

#[test]
fn is_usable_in_const_contexts() {
    // SAFETY: the allocator is never used, so the bogus range is never read
    const _ALLOCATOR1: Allocator<Arena<'static>> =
        unsafe { Allocator::new(Arena::from_raw(0x8000 as *mut u8, 0)) };
    // SAFETY: as above
    static _ALLOCATOR2: Allocator<Arena<'static>> =
        unsafe { Allocator::new(Arena::from_raw(0x8000 as *mut u8, 0)) };
}

#[test]
fn supports_global_alloc() {
    fn assert<T: core::alloc::GlobalAlloc>(_: T) {}
    // SAFETY: the allocator is never used, so the bogus range is never read
    assert(unsafe { Allocator::new(Arena::from_raw(0x8000 as *mut u8, 0)) });
}
