#![no_main]

use libfuzzer_sys::fuzz_target;
use markdown_html_converter::converter::MarkdownConverter;
use markdown_html_converter::options::{OPT_SMART, OPT_VALIDATE_UTF8, Options};

// First byte selects the options (0x80: UTF-8 validation, 0x40: smart
// punctuation, low bits as in the C mask), the rest is the document.
fuzz_target!(|data: &[u8]| {
    let Some((&bits, input)) = data.split_first() else {
        return;
    };
    let mut flags = i32::from(bits & 0x1f);
    if bits & 0x40 != 0 {
        flags |= OPT_SMART;
    }
    if bits & 0x80 != 0 {
        flags |= OPT_VALIDATE_UTF8;
    }
    let options = Options::from_bits(flags);
    let html = MarkdownConverter::with_options(options)
        .convert_bytes(input)
        .expect("conversion with the heap allocator must succeed");

    if std::str::from_utf8(input).is_ok() || options.validate_utf8 {
        assert!(std::str::from_utf8(&html).is_ok());
    }
    if !options.unsafe_html {
        assert!(!html.windows(7).any(|w| w.eq_ignore_ascii_case(b"<script")));
    }
});
