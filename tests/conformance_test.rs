//! CommonMark conformance tests
//!
//! A selection of documents with their exact expected HTML, covering every
//! block and inline construct plus the option bits. Each case is checked
//! through both the Rust API and the C ABI.

use markdown_html_converter::converter::markdown_to_html as convert_str;
use markdown_html_converter::ffi::{markdown_get_default_allocator, markdown_to_html};
use markdown_html_converter::options::*;
use std::ffi::CStr;

struct Case {
    name: &'static str,
    markdown: &'static str,
    html: &'static str,
}

const fn case(name: &'static str, markdown: &'static str, html: &'static str) -> Case {
    Case {
        name,
        markdown,
        html,
    }
}

fn ffi_convert(markdown: &[u8], options: i32) -> Vec<u8> {
    let html = unsafe { markdown_to_html(markdown.as_ptr(), markdown.len(), options) };
    assert!(!html.is_null(), "conversion returned NULL");
    let bytes = unsafe { CStr::from_ptr(html) }.to_bytes().to_vec();
    unsafe {
        let release = (*markdown_get_default_allocator())
            .release
            .expect("default record has release");
        release(html.cast());
    }
    bytes
}

fn check(cases: &[Case], options: i32) {
    for case in cases {
        let rust = convert_str(case.markdown, &Options::from_bits(options))
            .unwrap_or_else(|e| panic!("{}: conversion failed: {e}", case.name));
        assert_eq!(rust, case.html, "{} (rust API)", case.name);

        let ffi = ffi_convert(case.markdown.as_bytes(), options);
        assert_eq!(
            String::from_utf8_lossy(&ffi),
            case.html,
            "{} (C ABI)",
            case.name
        );
    }
}

#[test]
fn test_leaf_blocks() {
    check(
        &[
            case("empty", "", ""),
            case("blank lines only", "\n\n  \n", ""),
            case("atx heading", "# Title", "<h1>Title</h1>\n"),
            case("atx levels", "###### six", "<h6>six</h6>\n"),
            case("seven hashes", "####### x", "<p>####### x</p>\n"),
            case("closing hashes", "## Heading ##", "<h2>Heading</h2>\n"),
            case("empty heading", "#", "<h1></h1>\n"),
            case("setext h1", "Title\n=====", "<h1>Title</h1>\n"),
            case("setext h2 multiline", "a\nb\n---", "<h2>a\nb</h2>\n"),
            case("thematic breaks", "***\n- - -\n___", "<hr />\n<hr />\n<hr />\n"),
            case(
                "paragraphs",
                "aaa\n\nbbb",
                "<p>aaa</p>\n<p>bbb</p>\n",
            ),
            case(
                "leading spaces stripped",
                "  aaa\n bbb",
                "<p>aaa\nbbb</p>\n",
            ),
            case(
                "indented code",
                "    a simple\n      indented code block",
                "<pre><code>a simple\n  indented code block\n</code></pre>\n",
            ),
            case(
                "indented code keeps interior blanks",
                "    a\n\n    b\n\n",
                "<pre><code>a\n\nb\n</code></pre>\n",
            ),
            case(
                "indented code cannot interrupt paragraph",
                "para\n    more",
                "<p>para\nmore</p>\n",
            ),
            case(
                "fenced code",
                "```\n<\n >\n```",
                "<pre><code>&lt;\n &gt;\n</code></pre>\n",
            ),
            case(
                "fenced code with info",
                "~~~ rust extra\nfn main() {}\n~~~",
                "<pre><code class=\"language-rust\">fn main() {}\n</code></pre>\n",
            ),
            case(
                "unclosed fence runs to end",
                "```\nabc",
                "<pre><code>abc\n</code></pre>\n",
            ),
            case(
                "fence indentation removed",
                "  ```\n  aaa\naaa\n  ```",
                "<pre><code>aaa\naaa\n</code></pre>\n",
            ),
            case(
                "backtick info cannot contain backticks",
                "``` a`b\ncode\n```",
                "<p><code>a`b code</code></p>\n",
            ),
        ],
        OPT_DEFAULT,
    );
}

#[test]
fn test_container_blocks() {
    check(
        &[
            case(
                "block quote",
                "> # Foo\n> bar",
                "<blockquote>\n<h1>Foo</h1>\n<p>bar</p>\n</blockquote>\n",
            ),
            case(
                "lazy continuation",
                "> a\nlazy",
                "<blockquote>\n<p>a\nlazy</p>\n</blockquote>\n",
            ),
            case(
                "nested quotes",
                ">> x",
                "<blockquote>\n<blockquote>\n<p>x</p>\n</blockquote>\n</blockquote>\n",
            ),
            case(
                "tight bullet list",
                "- a\n- b",
                "<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n",
            ),
            case(
                "loose bullet list",
                "- a\n\n- b",
                "<ul>\n<li>\n<p>a</p>\n</li>\n<li>\n<p>b</p>\n</li>\n</ul>\n",
            ),
            case(
                "bullet change starts new list",
                "- a\n+ b",
                "<ul>\n<li>a</li>\n</ul>\n<ul>\n<li>b</li>\n</ul>\n",
            ),
            case(
                "ordered list",
                "1. one\n2. two",
                "<ol>\n<li>one</li>\n<li>two</li>\n</ol>\n",
            ),
            case(
                "ordered list start",
                "7) seven",
                "<ol start=\"7\">\n<li>seven</li>\n</ol>\n",
            ),
            case(
                "only 1. interrupts a paragraph",
                "The number of windows in my house is\n14.  The number of doors is 6.",
                "<p>The number of windows in my house is\n14.  The number of doors is 6.</p>\n",
            ),
            case(
                "nested lists",
                "- a\n  - b\n    - c",
                "<ul>\n<li>a\n<ul>\n<li>b\n<ul>\n<li>c</li>\n</ul>\n</li>\n</ul>\n</li>\n</ul>\n",
            ),
            case(
                "list item with code",
                "1.  A paragraph\n\n        code",
                "<ol>\n<li>\n<p>A paragraph</p>\n<pre><code>code\n</code></pre>\n</li>\n</ol>\n",
            ),
            case(
                "empty list item",
                "-\n- b",
                "<ul>\n<li></li>\n<li>b</li>\n</ul>\n",
            ),
            case(
                "quote inside list",
                "- > q",
                "<ul>\n<li>\n<blockquote>\n<p>q</p>\n</blockquote>\n</li>\n</ul>\n",
            ),
        ],
        OPT_DEFAULT,
    );
}

#[test]
fn test_inlines() {
    check(
        &[
            case("emphasis", "*a* **b**", "<p><em>a</em> <strong>b</strong></p>\n"),
            case("unclosed emphasis", "*a", "<p>*a</p>\n"),
            case(
                "nested emphasis",
                "***strong emph***",
                "<p><em><strong>strong emph</strong></em></p>\n",
            ),
            case(
                "intraword underscore",
                "foo_bar_",
                "<p>foo_bar_</p>\n",
            ),
            case(
                "intraword star",
                "foo*bar*",
                "<p>foo<em>bar</em></p>\n",
            ),
            case(
                "rule of three",
                "*foo**bar**baz*",
                "<p><em>foo<strong>bar</strong>baz</em></p>\n",
            ),
            case(
                "code span",
                "`` a ` b ``",
                "<p><code>a ` b</code></p>\n",
            ),
            case(
                "code span beats emphasis",
                "*a `*` b*",
                "<p><em>a <code>*</code> b</em></p>\n",
            ),
            case("escapes", "\\*not\\* \\a", "<p>*not* \\a</p>\n"),
            case(
                "entities",
                "&copy; &#35; &#x41; &bogus;",
                "<p>\u{00A9} # A &amp;bogus;</p>\n",
            ),
            case(
                "invalid numeric entity",
                "&#0;",
                "<p>\u{FFFD}</p>\n",
            ),
            case("hard break spaces", "a  \nb", "<p>a<br />\nb</p>\n"),
            case("hard break backslash", "a\\\nb", "<p>a<br />\nb</p>\n"),
            case("soft break", "a\nb", "<p>a\nb</p>\n"),
            case(
                "uri autolink",
                "<http://example.com?a=1&b=2>",
                "<p><a href=\"http://example.com?a=1&amp;b=2\">http://example.com?a=1&amp;b=2</a></p>\n",
            ),
            case(
                "email autolink",
                "<foo@bar.example.com>",
                "<p><a href=\"mailto:foo@bar.example.com\">foo@bar.example.com</a></p>\n",
            ),
            case(
                "inline link",
                "[link](/uri \"title\")",
                "<p><a href=\"/uri\" title=\"title\">link</a></p>\n",
            ),
            case(
                "empty destination",
                "[link]()",
                "<p><a href=\"\">link</a></p>\n",
            ),
            case(
                "space ends a bare destination",
                "[a](/ä b)",
                "<p>[a](/ä b)</p>\n",
            ),
            case(
                "unicode destination",
                "[a](</ä b>)",
                "<p><a href=\"/%C3%A4%20b\">a</a></p>\n",
            ),
            case(
                "image",
                "![alt *x*](/i.png \"t\")",
                "<p><img src=\"/i.png\" alt=\"alt x\" title=\"t\" /></p>\n",
            ),
            case(
                "links do not nest",
                "[a [b](/b)](/a)",
                "<p>[a <a href=\"/b\">b</a>](/a)</p>\n",
            ),
            case(
                "unmatched bracket",
                "[not a link",
                "<p>[not a link</p>\n",
            ),
        ],
        OPT_DEFAULT,
    );
}

#[test]
fn test_reference_links() {
    check(
        &[
            case(
                "shortcut reference",
                "[x]\n\n[x]: /y",
                "<p><a href=\"/y\">x</a></p>\n",
            ),
            case(
                "full reference with title",
                "[text][ref]\n\n[ref]: /url 'the title'",
                "<p><a href=\"/url\" title=\"the title\">text</a></p>\n",
            ),
            case(
                "collapsed reference",
                "[Foo][]\n\n[foo]: /f",
                "<p><a href=\"/f\">Foo</a></p>\n",
            ),
            case(
                "case folding and whitespace",
                "[Foo  Bar]\n\n[FOO bar]: /fb",
                "<p><a href=\"/fb\">Foo  Bar</a></p>\n",
            ),
            case(
                "definition before use",
                "[a]: /first\n[a]: /second\n\n[a]",
                "<p><a href=\"/first\">a</a></p>\n",
            ),
            case(
                "undefined reference",
                "[missing]",
                "<p>[missing]</p>\n",
            ),
            case(
                "reference image",
                "![pic]\n\n[pic]: /p.png",
                "<p><img src=\"/p.png\" alt=\"pic\" /></p>\n",
            ),
            case(
                "definition inside quote",
                "> [q]: /q\n\n[q]",
                "<blockquote>\n</blockquote>\n<p><a href=\"/q\">q</a></p>\n",
            ),
        ],
        OPT_DEFAULT,
    );
}

#[test]
fn test_raw_html_safe_and_unsafe() {
    let safe = [
        case(
            "script block",
            "<script>alert(1)</script>",
            "&lt;script&gt;alert(1)&lt;/script&gt;\n",
        ),
        case(
            "div block",
            "<div>\n*hi*\n</div>",
            "&lt;div&gt;\n*hi*\n&lt;/div&gt;\n",
        ),
        case(
            "inline tag",
            "a <span class=\"x\">b</span>",
            "<p>a &lt;span class=\"x\"&gt;b&lt;/span&gt;</p>\n",
        ),
        case(
            "comment",
            "<!-- c -->",
            "&lt;!-- c --&gt;\n",
        ),
    ];
    let unsafe_cases = [
        case(
            "script block",
            "<script>alert(1)</script>",
            "<script>alert(1)</script>\n",
        ),
        case("div block", "<div>\n*hi*\n</div>", "<div>\n*hi*\n</div>\n"),
        case(
            "inline tag",
            "a <span class=\"x\">b</span>",
            "<p>a <span class=\"x\">b</span></p>\n",
        ),
        case("comment", "<!-- c -->", "<!-- c -->\n"),
    ];

    check(&safe, OPT_DEFAULT);
    check(&unsafe_cases, OPT_UNSAFE);
}

#[test]
fn test_line_endings() {
    let expected = "<p>a\nb</p>\n<ul>\n<li>c</li>\n</ul>\n";
    check(
        &[
            case("lf", "a\nb\n\n- c\n", expected),
            case("crlf", "a\r\nb\r\n\r\n- c\r\n", expected),
            case("cr", "a\rb\r\r- c\r", expected),
            case("mixed", "a\r\nb\r\n- c", expected),
        ],
        OPT_DEFAULT,
    );
}

#[test]
fn test_nul_and_invalid_bytes() {
    assert_eq!(
        ffi_convert(b"a\0b", OPT_DEFAULT),
        "<p>a\u{FFFD}b</p>\n".as_bytes()
    );
    assert_eq!(
        ffi_convert(b"# \0", OPT_DEFAULT),
        "<h1>\u{FFFD}</h1>\n".as_bytes()
    );

    // Invalid UTF-8 passes through unless validation is requested.
    assert_eq!(ffi_convert(b"\xFE", OPT_DEFAULT), b"<p>\xFE</p>\n");
    assert_eq!(
        ffi_convert(b"\xFE", OPT_VALIDATE_UTF8),
        "<p>\u{FFFD}</p>\n".as_bytes()
    );
}

#[test]
fn test_sourcepos() {
    check(
        &[
            case(
                "heading and paragraph",
                "# Hi\n\npara\ntwo",
                "<h1 data-sourcepos=\"1:1-1:4\">Hi</h1>\n<p data-sourcepos=\"3:1-4:3\">para\ntwo</p>\n",
            ),
            case(
                "quote",
                "> a\n> b",
                "<blockquote data-sourcepos=\"1:1-2:3\">\n<p data-sourcepos=\"1:3-2:3\">a\nb</p>\n</blockquote>\n",
            ),
            case(
                "list",
                "- a\n- b",
                "<ul data-sourcepos=\"1:1-2:3\">\n<li data-sourcepos=\"1:1-1:3\">a</li>\n<li data-sourcepos=\"2:1-2:3\">b</li>\n</ul>\n",
            ),
            case(
                "break",
                "---",
                "<hr data-sourcepos=\"1:1-1:3\" />\n",
            ),
        ],
        OPT_SOURCEPOS,
    );
}

#[test]
fn test_soft_break_options() {
    check(
        &[case("hard", "a\nb", "<p>a<br />\nb</p>\n")],
        OPT_HARDBREAKS,
    );
    check(&[case("none", "a\nb", "<p>a b</p>\n")], OPT_NOBREAKS);
    check(
        &[case("hard wins", "a\nb", "<p>a<br />\nb</p>\n")],
        OPT_HARDBREAKS | OPT_NOBREAKS,
    );
}

#[test]
fn test_combined_options() {
    check(
        &[case(
            "unsafe sourcepos",
            "<b>x</b>\ny",
            "<p data-sourcepos=\"1:1-2:1\"><b>x</b>\ny</p>\n",
        )],
        OPT_UNSAFE | OPT_SOURCEPOS,
    );
}

#[test]
fn test_smart_punctuation() {
    check(
        &[
            case(
                "mixed",
                "\"Hi\" -- it's --- done...",
                "<p>\u{201C}Hi\u{201D} \u{2013} it\u{2019}s \u{2014} done\u{2026}</p>\n",
            ),
            case(
                "single quotes",
                "'quoted' text",
                "<p>\u{2018}quoted\u{2019} text</p>\n",
            ),
            case("heading", "# Wait...", "<h1>Wait\u{2026}</h1>\n"),
            case(
                "link text only",
                "[\"a\"](/u \"t's\")",
                "<p><a href=\"/u\" title=\"t's\">\u{201C}a\u{201D}</a></p>\n",
            ),
            case("code span", "`\"x\" -- y`", "<p><code>\"x\" -- y</code></p>\n"),
            case(
                "code block",
                "    \"x\" -- y",
                "<pre><code>\"x\" -- y\n</code></pre>\n",
            ),
            case("escaped", "\\\"a\\\" \\-- b", "<p>\"a\" -- b</p>\n"),
        ],
        OPT_SMART,
    );
    check(
        &[case(
            "off by default",
            "\"Hi\" -- it's...",
            "<p>\"Hi\" -- it's...</p>\n",
        )],
        OPT_DEFAULT,
    );
}
