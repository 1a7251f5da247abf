//! HTML renderer
//!
//! Walks the document with its enter/exit event iterator and appends HTML to
//! an allocator-backed buffer. Block elements start on a fresh line and end
//! their own line; inline elements never add line breaks of their own.
//!
//! # Escaping
//!
//! | context          | escaped                                  |
//! |------------------|------------------------------------------|
//! | text, code       | `&` `<` `>`                              |
//! | attribute values | `&` `<` `>` `"`                          |
//! | `href` / `src`   | percent-encoding, `&` and `'` as entities |

use crate::error::ConversionError;
use crate::mem::{MVec, VecExt};
use crate::node::{Document, Event, LinkData, ListKind, Node, NodeId, NodeKind, Span};
use crate::options::Options;
use crate::security::SecurityPolicy;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Bytes that stay literal inside an `href`
fn is_href_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-_.+!*(),%#@?=;:/$~".contains(&b)
}

/// Render the whole document
pub fn render_html<'a>(doc: &Document<'a>, options: &Options) -> Result<MVec<'a, u8>, ConversionError> {
    let mut renderer = HtmlRenderer {
        doc,
        out: doc.mem().vec(),
        options: *options,
        policy: SecurityPolicy::new(options),
        plain: None,
    };
    renderer.render()?;
    Ok(renderer.out)
}

struct HtmlRenderer<'d, 'a> {
    doc: &'d Document<'a>,
    out: MVec<'a, u8>,
    options: Options,
    policy: SecurityPolicy,
    /// Image whose alt text is being written; only text is emitted inside
    plain: Option<NodeId>,
}

impl<'a> HtmlRenderer<'_, 'a> {
    fn render(&mut self) -> Result<(), ConversionError> {
        // Reserve roughly the size of the text pool up front.
        self.out.try_reserve(self.doc.text().len())?;

        for event in self.doc.events() {
            let (id, entering) = match event {
                Event::Enter(id) => (id, true),
                Event::Exit(id) => (id, false),
            };

            if self.plain == Some(id) {
                self.plain = None;
            }
            if self.plain.is_some() {
                self.render_plain(id)?;
            } else {
                self.render_node(id, entering)?;
            }
        }
        Ok(())
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), ConversionError> {
        self.out.try_extend_from_slice(bytes)
    }

    /// Start a new line unless the output is empty or already at one
    fn cr(&mut self) -> Result<(), ConversionError> {
        match self.out.last() {
            Some(&last) if last != b'\n' => self.out.try_push(b'\n'),
            _ => Ok(()),
        }
    }

    fn put_number(&mut self, mut n: usize) -> Result<(), ConversionError> {
        let mut digits = [0u8; 20];
        let mut i = digits.len();
        loop {
            i -= 1;
            digits[i] = b'0' + (n % 10) as u8;
            n /= 10;
            if n == 0 {
                break;
            }
        }
        self.out.try_extend_from_slice(&digits[i..])
    }

    fn escape(&mut self, span: Span, attribute: bool) -> Result<(), ConversionError> {
        let text = self.doc.literal(span);
        let mut run = 0;
        for (i, &b) in text.iter().enumerate() {
            let entity: &[u8] = match b {
                b'&' => b"&amp;",
                b'<' => b"&lt;",
                b'>' => b"&gt;",
                b'"' if attribute => b"&quot;",
                _ => continue,
            };
            self.out.try_extend_from_slice(&text[run..i])?;
            self.out.try_extend_from_slice(entity)?;
            run = i + 1;
        }
        self.out.try_extend_from_slice(&text[run..])
    }

    fn escape_href(&mut self, url: &[u8]) -> Result<(), ConversionError> {
        for &b in url {
            match b {
                b'&' => self.out.try_extend_from_slice(b"&amp;")?,
                b'\'' => self.out.try_extend_from_slice(b"&#x27;")?,
                b if is_href_safe(b) => self.out.try_push(b)?,
                b => self.out.try_extend_from_slice(&[
                    b'%',
                    HEX_DIGITS[usize::from(b >> 4)],
                    HEX_DIGITS[usize::from(b & 0x0F)],
                ])?,
            }
        }
        Ok(())
    }

    fn sourcepos(&mut self, node: &Node) -> Result<(), ConversionError> {
        if !self.options.sourcepos {
            return Ok(());
        }
        let pos = node.pos;
        self.put(b" data-sourcepos=\"")?;
        self.put_number(pos.start_line)?;
        self.put(b":")?;
        self.put_number(pos.start_column)?;
        self.put(b"-")?;
        self.put_number(pos.end_line)?;
        self.put(b":")?;
        self.put_number(pos.end_column)?;
        self.put(b"\"")
    }

    /// Open a block tag: `<tag` plus source position, without the `>`
    fn open_block(&mut self, tag: &[u8], node: &Node) -> Result<(), ConversionError> {
        self.cr()?;
        self.put(tag)?;
        self.sourcepos(node)
    }

    fn destination(&mut self, link: &LinkData) -> Result<(), ConversionError> {
        let url = self.doc.literal(link.destination);
        match self.policy.sanitize_url(url) {
            Some(url) => self.escape_href(url),
            None => Ok(()),
        }
    }

    fn title(&mut self, link: &LinkData) -> Result<(), ConversionError> {
        if link.title.is_empty() {
            return Ok(());
        }
        self.put(b"\" title=\"")?;
        self.escape(link.title, true)
    }

    fn raw_html(&mut self, span: Span) -> Result<(), ConversionError> {
        if self.policy.allows_raw_html() {
            self.put(self.doc.literal(span))
        } else {
            self.escape(span, false)
        }
    }

    /// Alt text of an image: text content only, attribute-escaped
    fn render_plain(&mut self, id: NodeId) -> Result<(), ConversionError> {
        match self.doc.kind(id) {
            NodeKind::Text(span) | NodeKind::CodeSpan(span) | NodeKind::RawHtmlInline(span) => {
                self.escape(*span, true)
            }
            NodeKind::LineBreak { .. } => self.put(b" "),
            _ => Ok(()),
        }
    }

    fn in_tight_list(&self, paragraph: NodeId) -> bool {
        let grandparent = self.doc.parent(paragraph).and_then(|p| self.doc.parent(p));
        match grandparent.map(|g| self.doc.kind(g)) {
            Some(NodeKind::List(list)) => list.tight,
            _ => false,
        }
    }

    fn render_node(&mut self, id: NodeId, entering: bool) -> Result<(), ConversionError> {
        let node = self.doc.node(id);

        match &node.kind {
            NodeKind::Document => Ok(()),

            NodeKind::BlockQuote => {
                if entering {
                    self.open_block(b"<blockquote", node)?;
                    self.put(b">\n")
                } else {
                    self.cr()?;
                    self.put(b"</blockquote>\n")
                }
            }

            NodeKind::List(list) => match (entering, list.kind) {
                (true, ListKind::Bullet) => {
                    self.open_block(b"<ul", node)?;
                    self.put(b">\n")
                }
                (true, ListKind::Ordered) => {
                    self.cr()?;
                    self.put(b"<ol")?;
                    let start = list.start.unwrap_or(1);
                    if start != 1 {
                        self.put(b" start=\"")?;
                        self.put_number(start as usize)?;
                        self.put(b"\"")?;
                    }
                    self.sourcepos(node)?;
                    self.put(b">\n")
                }
                (false, ListKind::Bullet) => self.put(b"</ul>\n"),
                (false, ListKind::Ordered) => self.put(b"</ol>\n"),
            },

            NodeKind::ListItem(_) => {
                if entering {
                    self.open_block(b"<li", node)?;
                    self.put(b">")
                } else {
                    self.put(b"</li>\n")
                }
            }

            NodeKind::Heading { level, .. } => {
                let digit = b'0' + level;
                if entering {
                    self.open_block(&[b'<', b'h', digit], node)?;
                    self.put(b">")
                } else {
                    self.put(&[b'<', b'/', b'h', digit, b'>', b'\n'])
                }
            }

            NodeKind::CodeBlock(code) => {
                self.open_block(b"<pre", node)?;
                let info = self.doc.literal(code.info);
                if info.is_empty() {
                    self.put(b"><code>")?;
                } else {
                    let word = info
                        .iter()
                        .position(|b| b.is_ascii_whitespace())
                        .unwrap_or(info.len());
                    self.put(b"><code class=\"")?;
                    if !info.starts_with(b"language-") {
                        self.put(b"language-")?;
                    }
                    self.escape(Span::new(code.info.start, word), true)?;
                    self.put(b"\">")?;
                }
                self.escape(code.literal, false)?;
                self.put(b"</code></pre>\n")
            }

            NodeKind::HtmlBlock { literal, .. } => {
                self.cr()?;
                self.raw_html(*literal)?;
                self.cr()
            }

            NodeKind::ThematicBreak => {
                self.open_block(b"<hr", node)?;
                self.put(b" />\n")
            }

            NodeKind::Paragraph => {
                if self.in_tight_list(id) {
                    return Ok(());
                }
                if entering {
                    self.open_block(b"<p", node)?;
                    self.put(b">")
                } else {
                    self.put(b"</p>\n")
                }
            }

            NodeKind::Text(span) => self.escape(*span, false),

            NodeKind::LineBreak { hard: true } => self.put(b"<br />\n"),
            NodeKind::LineBreak { hard: false } => {
                if self.options.hard_breaks {
                    self.put(b"<br />\n")
                } else if self.options.no_breaks {
                    self.put(b" ")
                } else {
                    self.put(b"\n")
                }
            }

            NodeKind::CodeSpan(span) => {
                self.put(b"<code>")?;
                self.escape(*span, false)?;
                self.put(b"</code>")
            }

            NodeKind::RawHtmlInline(span) => self.raw_html(*span),

            NodeKind::Emphasis => self.put(if entering { b"<em>" } else { b"</em>" }),
            NodeKind::Strong => self.put(if entering { b"<strong>" } else { b"</strong>" }),

            NodeKind::Link(link) => {
                if entering {
                    self.put(b"<a href=\"")?;
                    self.destination(link)?;
                    self.title(link)?;
                    self.put(b"\">")
                } else {
                    self.put(b"</a>")
                }
            }

            NodeKind::Image(link) => {
                if entering {
                    self.put(b"<img src=\"")?;
                    self.destination(link)?;
                    self.put(b"\" alt=\"")?;
                    self.plain = Some(id);
                    Ok(())
                } else {
                    self.title(link)?;
                    self.put(b"\" />")
                }
            }
        }
    }
}
