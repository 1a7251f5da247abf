//! FFI integration tests
//!
//! These tests verify that the exported functions produce the expected HTML,
//! reject invalid arguments with NULL, and hand back memory that can be
//! released through the allocator record.

use markdown_html_converter::ffi::*;
use markdown_html_converter::mem::MemAllocator;
use markdown_html_converter::options::*;
use proptest::prelude::*;
use std::ffi::{CStr, c_char, c_int};
use std::ptr;

fn ffi_markdown_to_html(text: &[u8], options: c_int) -> *mut c_char {
    unsafe { markdown_to_html(text.as_ptr(), text.len(), options) }
}

fn ffi_markdown_to_html_with_allocator(
    text: &[u8],
    options: c_int,
    allocator: *const MemAllocator,
) -> *mut c_char {
    unsafe { markdown_to_html_with_allocator(text.as_ptr(), text.len(), options, allocator) }
}

fn ffi_release(html: *mut c_char) {
    let allocator = markdown_get_default_allocator();
    unsafe {
        let release = (*allocator).release.expect("default record has release");
        release(html.cast());
    }
}

/// Convert through the C ABI and copy the result out
fn ffi_convert(text: &[u8], options: c_int) -> String {
    let html = ffi_markdown_to_html(text, options);
    assert!(!html.is_null(), "Conversion should not return NULL");

    let bytes = unsafe { CStr::from_ptr(html) }.to_bytes().to_vec();
    ffi_release(html);
    String::from_utf8(bytes).expect("HTML should be valid UTF-8")
}

#[test]
fn test_basic_conversion() {
    assert_eq!(ffi_convert(b"# Hello World", OPT_DEFAULT), "<h1>Hello World</h1>\n");
    assert_eq!(
        ffi_convert(b"*a* **b**", OPT_DEFAULT),
        "<p><em>a</em> <strong>b</strong></p>\n"
    );
}

#[test]
fn test_empty_input() {
    let html = ffi_markdown_to_html(b"", OPT_DEFAULT);
    assert!(!html.is_null(), "Empty input should still produce a buffer");

    let text = unsafe { CStr::from_ptr(html) };
    assert!(text.to_bytes().is_empty());
    ffi_release(html);
}

#[test]
fn test_null_text_with_zero_length() {
    let html = unsafe { markdown_to_html(ptr::null(), 0, OPT_DEFAULT) };
    assert!(!html.is_null());
    assert_eq!(unsafe { *html }, 0);
    ffi_release(html);
}

#[test]
fn test_null_text_with_length_is_rejected() {
    let html = unsafe { markdown_to_html(ptr::null(), 16, OPT_DEFAULT) };
    assert!(html.is_null());

    let html = unsafe { markdown_to_html_with_allocator(ptr::null(), 1, OPT_DEFAULT, ptr::null()) };
    assert!(html.is_null());
}

#[test]
fn test_input_is_length_delimited() {
    // Only the first four bytes are read; no terminator is needed.
    let buffer = b"*hi*garbage";
    let html = unsafe { markdown_to_html(buffer.as_ptr(), 4, OPT_DEFAULT) };
    assert!(!html.is_null());
    let text = unsafe { CStr::from_ptr(html) };
    assert_eq!(text.to_bytes(), b"<p><em>hi</em></p>\n");
    ffi_release(html);
}

#[test]
fn test_embedded_nul_becomes_replacement_character() {
    assert_eq!(ffi_convert(b"a\0b", OPT_DEFAULT), "<p>a\u{FFFD}b</p>\n");
}

#[test]
fn test_invalid_utf8_is_preserved_or_replaced() {
    let input = b"caf\xC3";

    let html = ffi_markdown_to_html(input, OPT_DEFAULT);
    assert!(!html.is_null());
    let raw = unsafe { CStr::from_ptr(html) }.to_bytes().to_vec();
    ffi_release(html);
    assert_eq!(raw, b"<p>caf\xC3</p>\n");

    assert_eq!(
        ffi_convert(input, OPT_VALIDATE_UTF8),
        "<p>caf\u{FFFD}</p>\n"
    );
}

#[test]
fn test_null_allocator_selects_default() {
    let html = ffi_markdown_to_html_with_allocator(b"`x`", OPT_DEFAULT, ptr::null());
    assert!(!html.is_null());
    let text = unsafe { CStr::from_ptr(html) };
    assert_eq!(text.to_bytes(), b"<p><code>x</code></p>\n");
    ffi_release(html);
}

#[test]
fn test_explicit_default_allocator() {
    let allocator = markdown_get_default_allocator();
    assert!(!allocator.is_null());

    let html = ffi_markdown_to_html_with_allocator(b"> q", OPT_DEFAULT, allocator);
    assert!(!html.is_null());
    let text = unsafe { CStr::from_ptr(html) };
    assert_eq!(text.to_bytes(), b"<blockquote>\n<p>q</p>\n</blockquote>\n");
    ffi_release(html);
}

#[test]
fn test_default_allocator_is_stable() {
    let first = markdown_get_default_allocator();
    let second = markdown_get_default_allocator();
    assert!(ptr::eq(first, second));

    let record = unsafe { &*first };
    assert!(record.allocate_zeroed.is_some());
    assert!(record.reallocate.is_some());
    assert!(record.release.is_some());
}

#[test]
fn test_record_without_functions_fails() {
    let record = MemAllocator {
        allocate_zeroed: None,
        reallocate: None,
        release: None,
    };
    let html = ffi_markdown_to_html_with_allocator(b"# nope", OPT_DEFAULT, &record);
    assert!(html.is_null());
}

#[test]
fn test_options_version() {
    assert_eq!(markdown_options_version(), OPTIONS_VERSION);
    assert_eq!(OPTIONS_VERSION, 1);
}

#[test]
fn test_option_bits() {
    let input = b"a\nb <i>c</i>";
    assert_eq!(ffi_convert(input, OPT_DEFAULT), "<p>a\nb &lt;i&gt;c&lt;/i&gt;</p>\n");
    assert_eq!(ffi_convert(input, OPT_UNSAFE), "<p>a\nb <i>c</i></p>\n");
    assert_eq!(
        ffi_convert(input, OPT_HARDBREAKS),
        "<p>a<br />\nb &lt;i&gt;c&lt;/i&gt;</p>\n"
    );
    assert_eq!(
        ffi_convert(input, OPT_NOBREAKS),
        "<p>a b &lt;i&gt;c&lt;/i&gt;</p>\n"
    );
    assert_eq!(
        ffi_convert(b"text", OPT_SOURCEPOS),
        "<p data-sourcepos=\"1:1-1:4\">text</p>\n"
    );
    assert_eq!(
        ffi_convert(b"\"q\" -- x...", OPT_SMART),
        "<p>\u{201C}q\u{201D} \u{2013} x\u{2026}</p>\n"
    );
}

#[test]
fn test_unknown_option_bits_are_ignored() {
    let input = b"# t\n\n*x*";
    let expected = ffi_convert(input, OPT_DEFAULT);
    assert_eq!(ffi_convert(input, 1 << 3), expected);
    assert_eq!(ffi_convert(input, 1 << 20), expected);
    assert_eq!(ffi_convert(input, i32::MIN), expected);
}

#[test]
fn test_concurrent_conversions() {
    let handles: Vec<_> = (0..8)
        .map(|i| {
            std::thread::spawn(move || {
                let input = format!("# Thread {i}\n\n- a\n- b");
                for _ in 0..50 {
                    let html = ffi_convert(input.as_bytes(), OPT_DEFAULT);
                    assert_eq!(
                        html,
                        format!("<h1>Thread {i}</h1>\n<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n")
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }
}

#[test]
fn test_large_input() {
    let input = "paragraph with *emphasis* and `code`\n\n".repeat(10_000);
    let html = ffi_convert(input.as_bytes(), OPT_DEFAULT);
    assert_eq!(html.matches("<p>").count(), 10_000);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Any byte string yields a NUL-terminated buffer
    #[test]
    fn prop_ffi_never_returns_null(input in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let html = ffi_markdown_to_html(&input, OPT_DEFAULT);
        prop_assert!(!html.is_null());
        ffi_release(html);
    }

    /// The C ABI agrees with the Rust API
    #[test]
    fn prop_ffi_matches_rust_api(input in "\\PC{0,200}", bits in 0..2048i32) {
        let expected = markdown_html_converter::converter::markdown_to_html(
            &input,
            &Options::from_bits(bits),
        )
        .unwrap();
        prop_assert_eq!(ffi_convert(input.as_bytes(), bits), expected);
    }
}
