#![no_main]

use std::ffi::CStr;

use libfuzzer_sys::fuzz_target;
use markdown_html_converter::ffi::{
    markdown_get_default_allocator, markdown_to_html, markdown_to_html_with_allocator,
};

fuzz_target!(|data: &[u8]| {
    let allocator = markdown_get_default_allocator();

    // SAFETY: `data` is a live slice of the given length.
    let first = unsafe { markdown_to_html(data.as_ptr(), data.len(), 0) };
    // SAFETY: as above; the record is the static default one.
    let second = unsafe { markdown_to_html_with_allocator(data.as_ptr(), data.len(), 0, allocator) };
    assert!(!first.is_null() && !second.is_null());

    // SAFETY: non-NULL results are NUL-terminated.
    let (a, b) = unsafe { (CStr::from_ptr(first), CStr::from_ptr(second)) };
    assert_eq!(a, b, "conversion must be deterministic");

    // SAFETY: both results came from the default allocator record.
    unsafe {
        if let Some(release) = (*allocator).release {
            release(first.cast());
            release(second.cast());
        }
    }
});
