//! Markdown to HTML Converter - Rust library with a C ABI
//!
//! This library converts CommonMark-style Markdown into HTML. Every
//! allocation it makes goes through an allocator chosen by the caller, so it
//! can be embedded in hosts with their own memory discipline.
//!
//! # Architecture
//!
//! The library is structured into several modules:
//! - `ffi`: C-compatible exports (`markdown_to_html` and friends)
//! - `converter`: the sanitize → blocks → inlines → render pipeline
//! - `blocks`: line-oriented block structure parser
//! - `inlines`: inline parser (emphasis, links, code spans, ...)
//! - `html`: HTML renderer
//! - `node`: arena-backed document tree and its event iterator
//! - `references`: link reference definitions
//! - `scanners`: pattern recognizers shared by both parsers
//! - `entities`: HTML entity decoding
//! - `text`: byte and character utilities
//! - `mem`: allocator capability and allocator-aware vectors
//! - `options`: options bitmask
//! - `security`: resource limits and URL policy
//!
//! # Safety
//!
//! All FFI functions that take pointers are `unsafe` and document their
//! contracts. A result returned across the C boundary must be released with
//! the `release` function of the allocator record used for the call.
//!
//! # Examples
//!
//! ```rust
//! use markdown_html_converter::{MarkdownConverter, Options};
//!
//! let html = MarkdownConverter::with_options(Options::default())
//!     .convert("[x]\n\n[x]: /y")
//!     .unwrap();
//! assert_eq!(html, "<p><a href=\"/y\">x</a></p>\n");
//! ```

// Module declarations
mod blocks;
pub mod converter;
pub mod entities;
pub mod error;
pub mod ffi;
pub mod html;
mod inlines;
pub mod mem;
pub mod node;
pub mod options;
pub mod references;
mod scanners;
pub mod security;
pub mod text;

// Re-export main types for convenience
pub use converter::{MarkdownConverter, markdown_to_html, parse_document};
pub use error::ConversionError;
pub use html::render_html;
pub use mem::{MemAllocator, RawAllocator, default_allocator};
pub use node::{Document, Event, NodeId, NodeKind};
pub use options::Options;
