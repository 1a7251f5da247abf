//! Conversion options
//!
//! The C ABI takes a signed integer bitmask. It is decoded once into
//! [`Options`] at the start of a call; the parser and renderer only look at
//! the decoded struct.
//!
//! # Bit layout (version 1)
//!
//! | bit | constant            | effect                                          |
//! |-----|---------------------|-------------------------------------------------|
//! | 0   | [`OPT_UNSAFE`]        | raw HTML and dangerous URLs pass through        |
//! | 1   | [`OPT_SOURCEPOS`]     | `data-sourcepos` attributes on block elements   |
//! | 2   | [`OPT_HARDBREAKS`]    | soft line breaks render as `<br />`             |
//! | 3   | reserved            |                                                 |
//! | 4   | [`OPT_NOBREAKS`]      | soft line breaks render as a space              |
//! | 9   | [`OPT_VALIDATE_UTF8`] | invalid UTF-8 is replaced by U+FFFD             |
//! | 10  | [`OPT_SMART`]         | curly quotes, dashes and ellipses               |
//!
//! Every other bit is ignored. The layout only ever grows; existing bits
//! keep their meaning across versions.

/// Version of the bit layout documented above
pub const OPTIONS_VERSION: i32 = 1;

/// No options
pub const OPT_DEFAULT: i32 = 0;

/// Emit raw HTML and dangerous link destinations verbatim
pub const OPT_UNSAFE: i32 = 1 << 0;

/// Add `data-sourcepos="line:col-line:col"` to block elements
pub const OPT_SOURCEPOS: i32 = 1 << 1;

/// Render soft line breaks as hard breaks
pub const OPT_HARDBREAKS: i32 = 1 << 2;

/// Render soft line breaks as spaces
pub const OPT_NOBREAKS: i32 = 1 << 4;

/// Replace invalid UTF-8 sequences with U+FFFD before parsing
pub const OPT_VALIDATE_UTF8: i32 = 1 << 9;

/// Turn straight quotes into curly quotes, `--`/`---` into en/em dashes
/// and `...` into an ellipsis
pub const OPT_SMART: i32 = 1 << 10;

const KNOWN_BITS: i32 = OPT_UNSAFE
    | OPT_SOURCEPOS
    | OPT_HARDBREAKS
    | OPT_NOBREAKS
    | OPT_VALIDATE_UTF8
    | OPT_SMART;

/// Decoded conversion options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    /// Pass raw HTML through and keep dangerous URLs
    pub unsafe_html: bool,
    /// Emit source positions on block elements
    pub sourcepos: bool,
    /// Soft breaks become `<br />`
    pub hard_breaks: bool,
    /// Soft breaks become spaces (ignored when `hard_breaks` is set)
    pub no_breaks: bool,
    /// Replace invalid UTF-8 with U+FFFD
    pub validate_utf8: bool,
    /// Smart punctuation
    pub smart: bool,
}

impl Options {
    /// Decode a C options bitmask
    ///
    /// # Examples
    ///
    /// ```
    /// use markdown_html_converter::options::{Options, OPT_UNSAFE, OPT_SOURCEPOS};
    ///
    /// let options = Options::from_bits(OPT_UNSAFE | OPT_SOURCEPOS | (1 << 30));
    /// assert!(options.unsafe_html);
    /// assert!(options.sourcepos);
    /// assert!(!options.hard_breaks);
    /// assert_eq!(options.bits(), OPT_UNSAFE | OPT_SOURCEPOS);
    /// ```
    pub fn from_bits(bits: i32) -> Self {
        Self {
            unsafe_html: bits & OPT_UNSAFE != 0,
            sourcepos: bits & OPT_SOURCEPOS != 0,
            hard_breaks: bits & OPT_HARDBREAKS != 0,
            no_breaks: bits & OPT_NOBREAKS != 0,
            validate_utf8: bits & OPT_VALIDATE_UTF8 != 0,
            smart: bits & OPT_SMART != 0,
        }
    }

    /// Encode back into the bitmask understood by the C ABI
    pub fn bits(&self) -> i32 {
        let mut bits = OPT_DEFAULT;
        if self.unsafe_html {
            bits |= OPT_UNSAFE;
        }
        if self.sourcepos {
            bits |= OPT_SOURCEPOS;
        }
        if self.hard_breaks {
            bits |= OPT_HARDBREAKS;
        }
        if self.no_breaks {
            bits |= OPT_NOBREAKS;
        }
        if self.validate_utf8 {
            bits |= OPT_VALIDATE_UTF8;
        }
        if self.smart {
            bits |= OPT_SMART;
        }
        bits & KNOWN_BITS
    }
}
