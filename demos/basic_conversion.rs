//! Basic conversion example demonstrating the Markdown converter

use std::ffi::CStr;

use markdown_html_converter::converter::MarkdownConverter;
use markdown_html_converter::ffi::{markdown_get_default_allocator, markdown_to_html};
use markdown_html_converter::options::{OPT_DEFAULT, OPT_UNSAFE, Options};

fn main() {
    println!("=== Markdown HTML Converter - Basic Examples ===\n");

    // Example 1: Heading and paragraph
    example_1();

    // Example 2: Reference links
    example_2();

    // Example 3: Raw HTML, safe and unsafe
    example_3();

    // Example 4: Source positions and hard breaks
    example_4();

    // Example 5: The C ABI
    example_5();
}

fn show(title: &str, markdown: &str, converter: MarkdownConverter) {
    println!("{}", title);
    println!("Input Markdown:");
    println!("{}\n", markdown);

    let html = converter.convert(markdown).expect("Conversion failed");

    println!("Output HTML:");
    println!("{}", html);
    println!("---\n");
}

fn example_1() {
    show(
        "Example 1: Heading and paragraph",
        "# Welcome\n\nThis is *a* **test** document.",
        MarkdownConverter::new(),
    );
}

fn example_2() {
    show(
        "Example 2: Reference links",
        "See [the docs][docs] and [home].\n\n[docs]: /docs \"Documentation\"\n[home]: https://example.com",
        MarkdownConverter::new(),
    );
}

fn example_3() {
    let markdown = "<div onclick=\"x()\">hi</div>\n\n[click](javascript:alert(1))";
    show(
        "Example 3a: Raw HTML is escaped by default",
        markdown,
        MarkdownConverter::new(),
    );
    show(
        "Example 3b: Raw HTML passes through with OPT_UNSAFE",
        markdown,
        MarkdownConverter::with_options(Options::from_bits(OPT_UNSAFE)),
    );
}

fn example_4() {
    show(
        "Example 4: Source positions and hard breaks",
        "- one\n- two\n  three",
        MarkdownConverter::with_options(Options {
            sourcepos: true,
            hard_breaks: true,
            ..Options::default()
        }),
    );
}

fn example_5() {
    println!("Example 5: The C ABI");
    let markdown = b"> quoted `code`";

    // SAFETY: `markdown` is a live slice of the given length.
    let html = unsafe { markdown_to_html(markdown.as_ptr(), markdown.len(), OPT_DEFAULT) };
    if html.is_null() {
        println!("Conversion failed\n");
        return;
    }

    // SAFETY: non-NULL results are NUL-terminated.
    let text = unsafe { CStr::from_ptr(html) };
    println!("Output HTML:");
    println!("{}", text.to_string_lossy());

    let allocator = markdown_get_default_allocator();
    // SAFETY: the record is static and the result came from it.
    unsafe {
        if let Some(release) = (*allocator).release {
            release(html.cast());
        }
    }
    println!("---\n");
}
