//! Resource limits and output sanitization policy
//!
//! Markdown input is untrusted. This module holds the knobs that keep a
//! hostile document from exhausting the stack, from blowing up output size
//! through reference expansion, or from smuggling script into the rendered
//! HTML.
//!
//! # Defense Layers
//!
//! 1. **Nesting depth**: container blocks and link brackets stop nesting at
//!    [`MAX_NESTING_DEPTH`]; deeper markers are treated as literal text.
//! 2. **Reference expansion**: the total size of destinations and titles
//!    copied out of reference definitions is capped (see
//!    [`reference_expansion_limit`]).
//! 3. **Raw HTML**: escaped unless the caller opted into unsafe output.
//! 4. **URL schemes**: `javascript:`, `vbscript:`, `file:` and non-image
//!    `data:` destinations are blanked unless unsafe output is enabled.

use crate::options::Options;

/// Maximum nesting depth for container blocks and open link brackets
pub const MAX_NESTING_DEPTH: usize = 1000;

/// Link labels must be shorter than this many bytes
pub const MAX_LINK_LABEL_LENGTH: usize = 1000;

/// Floor of the reference expansion budget, in bytes
pub const MIN_REFERENCE_EXPANSION: usize = 100_000;

/// Dangerous URL schemes that are blanked in safe mode
const DANGEROUS_URL_SCHEMES: &[&[u8]] = &[
    b"javascript:", // JavaScript execution
    b"vbscript:",   // VBScript execution (legacy IE)
    b"file:",       // Local file access
    b"data:",       // Can contain executable content
];

/// `data:` media types that stay allowed (images only)
const SAFE_DATA_PREFIXES: &[&[u8]] = &[
    b"data:image/png",
    b"data:image/gif",
    b"data:image/jpeg",
    b"data:image/webp",
];

/// Budget of bytes reference lookups may copy into the document
///
/// Proportional to the input so that legitimate documents with many
/// references are unaffected, while a handful of huge definitions used
/// thousands of times cannot produce quadratic output.
pub fn reference_expansion_limit(input_len: usize) -> usize {
    input_len.max(MIN_REFERENCE_EXPANSION)
}

fn starts_with_ignore_ascii_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Check if a URL uses a dangerous scheme
///
/// # Examples
///
/// ```
/// use markdown_html_converter::security::is_dangerous_url;
///
/// assert!(is_dangerous_url(b"javascript:alert('xss')"));
/// assert!(is_dangerous_url(b"DATA:text/html,<script>"));
/// assert!(!is_dangerous_url(b"data:image/png;base64,AAAA"));
/// assert!(!is_dangerous_url(b"https://example.com"));
/// assert!(!is_dangerous_url(b"/relative/path"));
/// ```
pub fn is_dangerous_url(url: &[u8]) -> bool {
    let start = url
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(url.len());
    let url = &url[start..];

    if SAFE_DATA_PREFIXES
        .iter()
        .any(|prefix| starts_with_ignore_ascii_case(url, prefix))
    {
        return false;
    }

    DANGEROUS_URL_SCHEMES
        .iter()
        .any(|scheme| starts_with_ignore_ascii_case(url, scheme))
}

/// Per-conversion security decisions
#[derive(Debug, Clone, Copy)]
pub struct SecurityPolicy {
    max_depth: usize,
    allow_unsafe: bool,
}

impl SecurityPolicy {
    /// Policy derived from conversion options
    pub fn new(options: &Options) -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
            allow_unsafe: options.unsafe_html,
        }
    }

    /// Policy with a custom nesting limit
    pub fn with_max_depth(options: &Options, max_depth: usize) -> Self {
        Self {
            max_depth,
            allow_unsafe: options.unsafe_html,
        }
    }

    /// Maximum allowed nesting depth
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether a structure at `depth` may open another nested level
    ///
    /// # Examples
    ///
    /// ```
    /// use markdown_html_converter::options::Options;
    /// use markdown_html_converter::security::SecurityPolicy;
    ///
    /// let policy = SecurityPolicy::with_max_depth(&Options::default(), 100);
    /// assert!(policy.allows_depth(99));
    /// assert!(!policy.allows_depth(100));
    /// ```
    pub fn allows_depth(&self, depth: usize) -> bool {
        depth < self.max_depth
    }

    /// Whether raw HTML is emitted verbatim
    pub fn allows_raw_html(&self) -> bool {
        self.allow_unsafe
    }

    /// Return the URL if it may be emitted, `None` if it must be blanked
    pub fn sanitize_url<'u>(&self, url: &'u [u8]) -> Option<&'u [u8]> {
        if self.allow_unsafe || !is_dangerous_url(url) {
            Some(url)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OPT_UNSAFE;
    use proptest::prelude::*;

    #[test]
    fn test_dangerous_urls() {
        assert!(is_dangerous_url(b"javascript:alert('xss')"));
        assert!(is_dangerous_url(b"JavaScript:alert('xss')"));
        assert!(is_dangerous_url(b"data:text/html,<script>alert('xss')</script>"));
        assert!(is_dangerous_url(b"vbscript:msgbox('xss')"));
        assert!(is_dangerous_url(b"file:///etc/passwd"));

        assert!(!is_dangerous_url(b"https://example.com"));
        assert!(!is_dangerous_url(b"http://example.com"));
        assert!(!is_dangerous_url(b"/relative/path"));
        assert!(!is_dangerous_url(b"../parent/path"));
        assert!(!is_dangerous_url(b"#anchor"));
        assert!(!is_dangerous_url(b"data:image/gif;base64,R0lGOD"));
    }

    #[test]
    fn test_depth_validation() {
        let policy = SecurityPolicy::with_max_depth(&Options::default(), 100);

        assert!(policy.allows_depth(0));
        assert!(policy.allows_depth(50));
        assert!(!policy.allows_depth(100));
        assert!(!policy.allows_depth(1000));
    }

    #[test]
    fn test_sanitize_url() {
        let safe = SecurityPolicy::new(&Options::default());
        assert_eq!(safe.sanitize_url(b"javascript:alert('xss')"), None);
        assert_eq!(safe.sanitize_url(b"/path"), Some(&b"/path"[..]));

        let unsafe_policy = SecurityPolicy::new(&Options::from_bits(OPT_UNSAFE));
        assert_eq!(
            unsafe_policy.sanitize_url(b"javascript:void(0)"),
            Some(&b"javascript:void(0)"[..])
        );
        assert!(unsafe_policy.allows_raw_html());
        assert!(!safe.allows_raw_html());
    }

    #[test]
    fn test_reference_expansion_limit() {
        assert_eq!(reference_expansion_limit(0), MIN_REFERENCE_EXPANSION);
        assert_eq!(reference_expansion_limit(250_000), 250_000);
    }

    proptest! {
        /// Dangerous schemes are detected regardless of case and leading whitespace
        #[test]
        fn prop_dangerous_url_schemes_are_rejected(
            leading_ws in "[ \\t\\n\\r]{0,3}",
            payload in "[A-Za-z0-9_/?=&:%#.-]{0,64}",
            uppercase in any::<bool>(),
        ) {
            let schemes = ["javascript:", "vbscript:", "file:", "data:text/"];

            for scheme in schemes {
                let scheme_variant = if uppercase {
                    scheme.to_uppercase()
                } else {
                    scheme.to_string()
                };
                let candidate = format!("{leading_ws}{scheme_variant}{payload}");

                prop_assert!(
                    is_dangerous_url(candidate.as_bytes()),
                    "Dangerous scheme should be detected: {candidate}"
                );
            }
        }
    }
}
