//! Markdown converter - transforms Markdown text into HTML
//!
//! This module ties the pipeline together:
//!
//! 1. **Sanitize**: copy the input into an allocator-owned buffer, replacing
//!    U+0000 (and, with `validate_utf8`, invalid UTF-8) by U+FFFD
//! 2. **Blocks**: split into lines and build the block tree
//! 3. **Inlines**: parse the content of paragraphs and headings, resolving
//!    link references
//! 4. **Render**: walk the tree and write HTML ([`crate::html`])
//!
//! Every step allocates through the same [`Mem`] handle. When the caller
//! asks for a detached buffer, the HTML is copied into one final
//! NUL-terminated block and all intermediate memory is released before the
//! call returns.
//!
//! # Examples
//!
//! ```rust
//! use markdown_html_converter::converter::MarkdownConverter;
//!
//! let converter = MarkdownConverter::new();
//! let html = converter.convert("# Title\n\nSome *content* here.").unwrap();
//! assert_eq!(html, "<h1>Title</h1>\n<p>Some <em>content</em> here.</p>\n");
//! ```

use std::ptr::NonNull;

use log::{debug, error};

use crate::blocks::BlockParser;
use crate::error::ConversionError;
use crate::html::render_html;
use crate::inlines::parse_inlines;
use crate::mem::{MVec, Mem, RawAllocator, default_allocator, detach_nul_terminated};
use crate::node::Document;
use crate::options::Options;
use crate::references::ReferenceMap;
use crate::security::{SecurityPolicy, reference_expansion_limit};
use crate::text::sanitize_input;

/// Parse Markdown into a document tree
///
/// The tree, its text pool and all parser state live in memory obtained
/// from `mem`. Walk the result with [`Document::events`] or render it with
/// [`render_html`].
///
/// # Errors
///
/// Only allocation failures are reported; malformed Markdown always parses.
///
/// # Examples
///
/// ```rust
/// use markdown_html_converter::converter::parse_document;
/// use markdown_html_converter::mem::{Mem, default_allocator};
/// use markdown_html_converter::node::{Event, NodeKind};
/// use markdown_html_converter::options::Options;
///
/// let doc = parse_document(b"## Hi", &Options::default(), Mem::new(default_allocator())).unwrap();
/// let headings = doc
///     .events()
///     .filter(|event| matches!(event, Event::Enter(id) if matches!(doc.kind(*id), NodeKind::Heading { level: 2, .. })))
///     .count();
/// assert_eq!(headings, 1);
/// ```
pub fn parse_document<'a>(
    input: &[u8],
    options: &Options,
    mem: Mem<'a>,
) -> Result<Document<'a>, ConversionError> {
    let text = sanitize_input(mem, input, options.validate_utf8)?;
    let policy = SecurityPolicy::new(options);

    let mut doc = Document::new(mem)?;
    let mut refs = ReferenceMap::new(mem, reference_expansion_limit(input.len()));

    let mut parser = BlockParser::new(&mut doc, &mut refs, policy);
    parser.feed(&text)?;
    parser.finish()?;

    parse_inlines(&mut doc, &mut refs, policy, options.smart)?;
    Ok(doc)
}

/// Main converter struct
///
/// Holds the decoded options; each conversion is independent, so one
/// converter may be shared freely between threads.
///
/// # Usage
///
/// ```rust
/// use markdown_html_converter::converter::MarkdownConverter;
/// use markdown_html_converter::options::Options;
///
/// let converter = MarkdownConverter::with_options(Options {
///     hard_breaks: true,
///     ..Options::default()
/// });
/// let html = converter.convert("line one\nline two").unwrap();
/// assert_eq!(html, "<p>line one<br />\nline two</p>\n");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownConverter {
    options: Options,
}

impl MarkdownConverter {
    /// Create a converter with default options
    ///
    /// The defaults are the safe ones: raw HTML is escaped, dangerous URLs
    /// are blanked, soft breaks render as newlines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a converter with custom options
    pub fn with_options(options: Options) -> Self {
        Self { options }
    }

    /// Options used by this converter
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Convert into a buffer owned by `mem`
    ///
    /// The returned vector holds the HTML without a terminator. All other
    /// memory used by the conversion has been released when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::OutOfMemory`] when the allocator refuses a
    /// request.
    pub fn convert_in<'a>(&self, input: &[u8], mem: Mem<'a>) -> Result<MVec<'a, u8>, ConversionError> {
        debug!(
            "converting {} bytes of Markdown (options {:#x})",
            input.len(),
            self.options.bits()
        );

        let doc = parse_document(input, &self.options, mem)?;
        let html = render_html(&doc, &self.options)?;

        debug!(
            "rendered {} bytes of HTML from {} nodes",
            html.len(),
            doc.arena_len()
        );
        Ok(html)
    }

    /// Convert arbitrary bytes using the default allocator
    ///
    /// # Examples
    ///
    /// ```rust
    /// use markdown_html_converter::converter::MarkdownConverter;
    ///
    /// let html = MarkdownConverter::new().convert_bytes(b"a\0b").unwrap();
    /// assert_eq!(html, "<p>a\u{FFFD}b</p>\n".as_bytes());
    /// ```
    pub fn convert_bytes(&self, input: &[u8]) -> Result<Vec<u8>, ConversionError> {
        let html = self.convert_in(input, Mem::new(default_allocator()))?;
        Ok(html.to_vec())
    }

    /// Convert a string using the default allocator
    pub fn convert(&self, input: &str) -> Result<String, ConversionError> {
        let html = self.convert_bytes(input.as_bytes())?;
        String::from_utf8(html)
            .map_err(|_| ConversionError::InternalError("rendered HTML is not valid UTF-8"))
    }

    /// Convert into a NUL-terminated block owned by `allocator`
    ///
    /// The block is the only allocation still live when this returns; the
    /// caller releases it through `allocator`.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::OutOfMemory`] when any request is refused,
    /// [`ConversionError::Overflow`] when the output size does not fit.
    pub fn convert_with_allocator(
        &self,
        input: &[u8],
        allocator: &dyn RawAllocator,
    ) -> Result<NonNull<u8>, ConversionError> {
        let result = self
            .convert_in(input, Mem::new(allocator))
            .and_then(|html| detach_nul_terminated(allocator, &html));

        if let Err(err) = &result {
            error!(
                "conversion of {} bytes failed: {} (code {})",
                input.len(),
                err,
                err.code()
            );
        }
        result
    }
}

/// Convert Markdown to an HTML string
///
/// # Examples
///
/// ```rust
/// use markdown_html_converter::converter::markdown_to_html;
/// use markdown_html_converter::options::Options;
///
/// let html = markdown_to_html("*a* **b**", &Options::default()).unwrap();
/// assert_eq!(html, "<p><em>a</em> <strong>b</strong></p>\n");
/// ```
pub fn markdown_to_html(input: &str, options: &Options) -> Result<String, ConversionError> {
    MarkdownConverter::with_options(*options).convert(input)
}
