//! FFI (Foreign Function Interface) layer for C integration
//!
//! This module exports the C ABI of the engine.
//!
//! # FFI Boundary Contract
//!
//! ## Input
//!
//! Input is a pointer plus a byte length; it does not need a NUL
//! terminator and may contain NUL bytes (they become U+FFFD). `text` may be
//! NULL only when `len == 0`.
//!
//! ## Output
//!
//! On success the functions return a NUL-terminated UTF-8 (for UTF-8
//! input) HTML string. On any failure they return NULL; there is never
//! partial output.
//!
//! ## Memory Management
//!
//! **Ownership Model:**
//! - Every allocation made during a call goes through one allocator record
//!   (the default one, or the record passed by the caller)
//! - When the call returns, the only live allocation is the result
//! - The caller owns the result and must release it exactly once with the
//!   `release` function of that same record
//!
//! ```c
//! const markdown_allocator_t *mem = markdown_get_default_allocator();
//! char *html = markdown_to_html((const uint8_t *)"# Hi", 4, 0);
//! if (html != NULL) {
//!     puts(html);
//!     mem->release(html);
//! }
//! ```
//!
//! ## Panic Safety
//!
//! All exported functions use `catch_unwind`; a panic is reported as NULL
//! and never unwinds into C.
//!
//! ## Thread Safety
//!
//! - No global mutable state; calls are independent
//! - The default allocator wraps the thread-safe C heap
//! - A custom allocator record is used only by the call it is passed to;
//!   sharing one between threads is safe when its functions are

use std::ffi::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

use crate::converter::MarkdownConverter;
use crate::error::ConversionError;
use crate::mem::{MemAllocator, RawAllocator, default_allocator};
use crate::options::{OPTIONS_VERSION, Options};

/// Borrow the input bytes, rejecting NULL with a non-zero length
///
/// # Safety
///
/// `text` must be NULL or point to `len` readable bytes that outlive `'a`.
unsafe fn required_bytes<'a>(text: *const u8, len: usize) -> Result<&'a [u8], ConversionError> {
    if len == 0 {
        return Ok(&[]);
    }
    if text.is_null() {
        return Err(ConversionError::InvalidInput("text pointer is NULL"));
    }
    // SAFETY: the caller guarantees `text` points to `len` readable bytes.
    Ok(unsafe { slice::from_raw_parts(text, len) })
}

/// Run a conversion behind the panic boundary
///
/// # Safety
///
/// `text` must be NULL or point to `len` readable bytes.
unsafe fn convert_raw(
    text: *const u8,
    len: usize,
    options: c_int,
    allocator: &dyn RawAllocator,
) -> *mut c_char {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: forwarded contract.
        let input = unsafe { required_bytes(text, len) }?;
        MarkdownConverter::with_options(Options::from_bits(options))
            .convert_with_allocator(input, allocator)
    }));

    match result {
        Ok(Ok(html)) => html.as_ptr().cast(),
        Ok(Err(_)) | Err(_) => ptr::null_mut(),
    }
}

/// Convert Markdown to HTML using the default allocator
///
/// # Parameters
///
/// - `text`: Markdown bytes
///   - Must point to at least `len` readable bytes when `len > 0`
///   - May be NULL when `len == 0`
///   - Need not be NUL-terminated or valid UTF-8
/// - `len`: number of bytes at `text`
/// - `options`: bitmask of `OPT_*` flags (see [`crate::options`]); unknown
///   bits are ignored
///
/// # Returns
///
/// A NUL-terminated HTML string, or NULL on allocation failure, size
/// overflow, NULL `text` with a non-zero `len`, or an internal panic.
///
/// # Memory Management
///
/// Release the result with the `release` function of
/// [`markdown_get_default_allocator`].
///
/// # Example (C)
///
/// ```c
/// const char *md = "*a* **b**";
/// char *html = markdown_to_html((const uint8_t *)md, strlen(md), 0);
/// // html == "<p><em>a</em> <strong>b</strong></p>\n"
/// markdown_get_default_allocator()->release(html);
/// ```
///
/// # Safety
///
/// `text` must be NULL or valid for reads of `len` bytes for the duration of
/// the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn markdown_to_html(
    text: *const u8,
    len: usize,
    options: c_int,
) -> *mut c_char {
    // SAFETY: forwarded contract.
    unsafe { convert_raw(text, len, options, default_allocator()) }
}

/// Convert Markdown to HTML using a caller-supplied allocator
///
/// Same as [`markdown_to_html`], except that every allocation made by the
/// call, including the result, goes through `allocator`. A NULL `allocator`
/// selects the default one.
///
/// A record whose `allocate_zeroed` is NULL makes every request fail, so the
/// call returns NULL.
///
/// # Memory Management
///
/// When the call returns, the result is the only block of `allocator` still
/// live. Release it with `allocator->release`.
///
/// # Safety
///
/// - `text` must be NULL or valid for reads of `len` bytes
/// - `allocator` must be NULL or point to a valid record whose functions
///   follow the `calloc`/`realloc`/`free` contracts and return memory
///   aligned for any fundamental type
#[unsafe(no_mangle)]
pub unsafe extern "C" fn markdown_to_html_with_allocator(
    text: *const u8,
    len: usize,
    options: c_int,
    allocator: *const MemAllocator,
) -> *mut c_char {
    let allocator: &MemAllocator = if allocator.is_null() {
        default_allocator()
    } else {
        // SAFETY: non-NULL, and the caller guarantees it is a valid record.
        unsafe { &*allocator }
    };
    // SAFETY: forwarded contract.
    unsafe { convert_raw(text, len, options, allocator) }
}

/// Default allocator record (backed by `calloc`/`realloc`/`free`)
///
/// The record is static and immutable; the pointer stays valid for the
/// lifetime of the process.
#[unsafe(no_mangle)]
pub extern "C" fn markdown_get_default_allocator() -> *const MemAllocator {
    default_allocator()
}

/// Version of the options bit layout understood by this library
#[unsafe(no_mangle)]
pub extern "C" fn markdown_options_version() -> c_int {
    OPTIONS_VERSION
}
