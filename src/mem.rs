//! Caller-controlled memory allocation
//!
//! Every byte the engine touches during a conversion comes from a single
//! allocator instance: the node arena, the text pool, the reference map,
//! the delimiter and bracket stacks, the HTML output buffer and the final
//! NUL-terminated copy handed to the caller.
//!
//! # Layers
//!
//! - [`RawAllocator`]: the three-operation capability object
//!   (`allocate_zeroed`, `reallocate`, `release`).
//! - [`MemAllocator`]: the `#[repr(C)]` record of function pointers that
//!   crosses the C boundary. It implements [`RawAllocator`].
//! - [`Mem`]: a copyable handle that adapts any `RawAllocator` to the
//!   `allocator_api2` [`Allocator`] trait so `allocator_api2::vec::Vec`
//!   can grow through it.
//!
//! # Fallibility
//!
//! `Vec::push` aborts the process when its allocator fails. Engine code
//! therefore only grows vectors through [`VecExt`], which reserves with
//! `try_reserve` first and turns refusal into
//! [`ConversionError::OutOfMemory`].

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use allocator_api2::alloc::{AllocError, Allocator, Layout};
use allocator_api2::vec::Vec;

use crate::error::ConversionError;

/// Strongest alignment `allocate_zeroed` is trusted to provide.
///
/// Matches what `malloc` guarantees for `max_align_t` on mainstream 64-bit
/// targets. Requests with stricter alignment fail instead of being
/// forwarded.
pub const MAX_ALIGN: usize = 16;

/// Allocation capability supplied once per conversion
///
/// Implementations must return memory aligned to at least [`MAX_ALIGN`]
/// bytes, or null on failure. `allocate_zeroed` memory is zero-filled.
pub trait RawAllocator {
    /// Allocate `size` zeroed bytes, or return null
    fn allocate_zeroed(&self, size: usize) -> *mut u8;

    /// Resize an allocation, or return null leaving `ptr` untouched
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer obtained from this allocator.
    unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> *mut u8;

    /// Release an allocation
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer obtained from this allocator;
    /// it must not be used afterwards.
    unsafe fn release(&self, ptr: *mut u8);
}

/// Function pointer types of the C allocator record
pub type AllocateZeroedFn = unsafe extern "C" fn(size: usize) -> *mut c_void;
/// See [`MemAllocator::reallocate`]
pub type ReallocateFn = unsafe extern "C" fn(ptr: *mut c_void, size: usize) -> *mut c_void;
/// See [`MemAllocator::release`]
pub type ReleaseFn = unsafe extern "C" fn(ptr: *mut c_void);

/// Allocator record shared with C callers
///
/// # C Layout
///
/// ```c
/// typedef struct markdown_allocator {
///     void *(*allocate_zeroed)(size_t size);
///     void *(*reallocate)(void *ptr, size_t size);
///     void (*release)(void *ptr);
/// } markdown_allocator_t;
/// ```
///
/// The fields are nullable. A record with a missing function fails every
/// request that needs it, which makes the conversion return NULL.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MemAllocator {
    /// Allocate zeroed memory (`calloc`-like, single size argument)
    pub allocate_zeroed: Option<AllocateZeroedFn>,
    /// Resize memory (`realloc`-like)
    pub reallocate: Option<ReallocateFn>,
    /// Release memory (`free`-like)
    pub release: Option<ReleaseFn>,
}

impl RawAllocator for MemAllocator {
    fn allocate_zeroed(&self, size: usize) -> *mut u8 {
        match self.allocate_zeroed {
            // SAFETY: the caller that built this record vouches for the
            // function pointer; the size argument has no other precondition.
            Some(allocate) => unsafe { allocate(size).cast() },
            None => ptr::null_mut(),
        }
    }

    unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        match self.reallocate {
            // SAFETY: forwarded contract, `ptr` came from this record.
            Some(reallocate) => unsafe { reallocate(ptr.cast(), size).cast() },
            None => ptr::null_mut(),
        }
    }

    unsafe fn release(&self, ptr: *mut u8) {
        if let Some(release) = self.release {
            // SAFETY: forwarded contract, `ptr` came from this record.
            unsafe { release(ptr.cast()) }
        }
    }
}

unsafe extern "C" fn heap_allocate_zeroed(size: usize) -> *mut c_void {
    // SAFETY: calloc accepts any size and returns null on failure.
    unsafe { libc::calloc(1, size) }
}

unsafe extern "C" fn heap_reallocate(ptr: *mut c_void, size: usize) -> *mut c_void {
    // SAFETY: `ptr` is null or was returned by calloc/realloc.
    unsafe { libc::realloc(ptr, size) }
}

unsafe extern "C" fn heap_release(ptr: *mut c_void) {
    // SAFETY: `ptr` is null or was returned by calloc/realloc.
    unsafe { libc::free(ptr) }
}

/// Process-wide allocator backed by the C heap
///
/// Immutable; the C heap is thread-safe, so concurrent conversions may
/// share it.
pub static DEFAULT_ALLOCATOR: MemAllocator = MemAllocator {
    allocate_zeroed: Some(heap_allocate_zeroed),
    reallocate: Some(heap_reallocate),
    release: Some(heap_release),
};

/// Returns the default C-heap allocator record
pub fn default_allocator() -> &'static MemAllocator {
    &DEFAULT_ALLOCATOR
}

/// Copyable handle routing `allocator_api2` requests to a [`RawAllocator`]
#[derive(Clone, Copy)]
pub struct Mem<'a> {
    raw: &'a dyn RawAllocator,
}

impl<'a> Mem<'a> {
    /// Wrap an allocator for the duration of one conversion
    pub fn new(raw: &'a dyn RawAllocator) -> Self {
        Self { raw }
    }

    /// Create an empty vector that allocates through this handle
    pub fn vec<T>(&self) -> MVec<'a, T> {
        Vec::new_in(*self)
    }
}

impl std::fmt::Debug for Mem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Mem")
    }
}

fn dangling(layout: Layout) -> NonNull<[u8]> {
    // Alignment is never zero, so the address is non-null.
    let addr = ptr::without_provenance_mut::<u8>(layout.align());
    let ptr = NonNull::new(addr).unwrap_or(NonNull::dangling());
    NonNull::slice_from_raw_parts(ptr, 0)
}

// SAFETY: blocks come from the wrapped allocator which, per the
// `RawAllocator` contract, hands out memory aligned to `MAX_ALIGN`.
// Stricter alignments and zero-sized requests never reach it.
unsafe impl Allocator for Mem<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.align() > MAX_ALIGN {
            return Err(AllocError);
        }
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        let ptr = self.raw.allocate_zeroed(layout.size());
        NonNull::new(ptr)
            .map(|ptr| NonNull::slice_from_raw_parts(ptr, layout.size()))
            .ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            // SAFETY: non-zero sized blocks were produced by `raw`.
            unsafe { self.raw.release(ptr.as_ptr()) }
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        if new_layout.align() > MAX_ALIGN {
            return Err(AllocError);
        }
        if old_layout.size() == 0 {
            return self.allocate(new_layout);
        }

        // SAFETY: `ptr` is a live non-zero sized block from `raw`.
        let new_ptr = unsafe { self.raw.reallocate(ptr.as_ptr(), new_layout.size()) };
        NonNull::new(new_ptr)
            .map(|ptr| NonNull::slice_from_raw_parts(ptr, new_layout.size()))
            .ok_or(AllocError)
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        if new_layout.size() == 0 {
            // SAFETY: forwarded contract.
            unsafe { self.deallocate(ptr, old_layout) };
            return Ok(dangling(new_layout));
        }

        // SAFETY: `ptr` is a live non-zero sized block from `raw`.
        let new_ptr = unsafe { self.raw.reallocate(ptr.as_ptr(), new_layout.size()) };
        NonNull::new(new_ptr)
            .map(|ptr| NonNull::slice_from_raw_parts(ptr, new_layout.size()))
            .ok_or(AllocError)
    }
}

/// Vector allocating through the conversion's allocator
pub type MVec<'a, T> = Vec<T, Mem<'a>>;

/// Fallible growth for allocator-aware vectors
pub trait VecExt<T> {
    /// Append one element, reporting allocator refusal as an error
    fn try_push(&mut self, value: T) -> Result<(), ConversionError>;

    /// Append a slice, reporting allocator refusal as an error
    fn try_extend_from_slice(&mut self, items: &[T]) -> Result<(), ConversionError>
    where
        T: Copy;
}

impl<T, A: Allocator> VecExt<T> for Vec<T, A> {
    fn try_push(&mut self, value: T) -> Result<(), ConversionError> {
        self.try_reserve(1)?;
        self.push(value);
        Ok(())
    }

    fn try_extend_from_slice(&mut self, items: &[T]) -> Result<(), ConversionError>
    where
        T: Copy,
    {
        self.try_reserve(items.len())?;
        self.extend_from_slice(items);
        Ok(())
    }
}

/// Copy `bytes` into a fresh NUL-terminated block owned by `raw`
///
/// The block is `bytes.len() + 1` bytes long. Ownership passes to the
/// caller, who must release it through the same allocator.
pub fn detach_nul_terminated(
    raw: &dyn RawAllocator,
    bytes: &[u8],
) -> Result<NonNull<u8>, ConversionError> {
    let size = bytes.len().checked_add(1).ok_or(ConversionError::Overflow)?;
    let ptr = NonNull::new(raw.allocate_zeroed(size)).ok_or(ConversionError::OutOfMemory)?;

    // SAFETY: the fresh block holds `size` bytes and cannot overlap `bytes`.
    // The trailing byte is already zero.
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
    Ok(ptr)
}
