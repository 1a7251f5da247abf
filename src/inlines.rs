//! Inline parser
//!
//! Runs once block parsing has finished, over the content of every
//! paragraph and heading. Code spans, autolinks, raw HTML, escapes and
//! entities are recognized in a single left-to-right scan. Emphasis and
//! links are resolved afterwards from two stacks:
//!
//! - the delimiter stack records runs of `*` and `_` that may open or close
//!   emphasis, and with smart punctuation also straight quotes waiting for
//!   their partner;
//! - the bracket stack records `[` and `![` openers waiting for their `]`.
//!
//! Both stacks live in allocator-backed vectors and link entries by index,
//! so no step of the algorithm recurses.

use log::warn;

use crate::entities;
use crate::error::ConversionError;
use crate::mem::{MVec, Mem, VecExt};
use crate::node::{Document, LinkData, NodeId, NodeKind, Span};
use crate::references::ReferenceMap;
use crate::scanners;
use crate::security::{MAX_LINK_LABEL_LENGTH, SecurityPolicy};
use crate::text::{
    char_at, char_before, decode_entities_into, is_ascii_punct, is_space, is_space_or_tab,
    is_unicode_punctuation, is_unicode_whitespace, rtrim, trim, unescape_into,
};

/// Longest backtick run whose position is remembered between scans
const MAX_BACKTICKS: usize = 1000;

/// Deepest parenthesis nesting accepted in a bare link destination
const MAX_LINK_PARENS: usize = 32;

const LEFT_SINGLE_QUOTE: &str = "\u{2018}";
const RIGHT_SINGLE_QUOTE: &str = "\u{2019}";
const LEFT_DOUBLE_QUOTE: &str = "\u{201C}";
const RIGHT_DOUBLE_QUOTE: &str = "\u{201D}";
const EN_DASH: &str = "\u{2013}";
const EM_DASH: &str = "\u{2014}";
const ELLIPSIS: &str = "\u{2026}";

fn at(s: &[u8], pos: usize) -> u8 {
    s.get(pos).copied().unwrap_or(0)
}

fn is_special(b: u8, smart: bool) -> bool {
    matches!(
        b,
        b'\n' | b'`' | b'\\' | b'&' | b'<' | b'*' | b'_' | b'[' | b']' | b'!'
    ) || (smart && matches!(b, b'\'' | b'"' | b'-' | b'.'))
}

#[derive(Debug, Clone, Copy)]
struct Delimiter {
    prev: Option<usize>,
    next: Option<usize>,
    /// Text node holding the run
    node: NodeId,
    ch: u8,
    /// Run length when scanned, used by the multiple-of-3 rule
    orig_len: usize,
    /// Characters not yet consumed by emphasis
    remaining: usize,
    can_open: bool,
    can_close: bool,
}

#[derive(Debug, Clone, Copy)]
struct Bracket {
    /// Text node holding `[` or `![`
    node: NodeId,
    /// Subject position right after the opener
    position: usize,
    image: bool,
    active: bool,
    /// A later `[` was seen, so a shortcut reference is not allowed
    bracket_after: bool,
    /// Top of the delimiter stack when the bracket was pushed
    prev_delim: Option<usize>,
}

/// Destination, title and length of a link tail
struct LinkTail {
    url: (usize, usize),
    title: (usize, usize),
    end: usize,
}

/// Parse the inline content of every paragraph and heading
pub(crate) fn parse_inlines<'a>(
    doc: &mut Document<'a>,
    refs: &mut ReferenceMap<'a>,
    policy: SecurityPolicy,
    smart: bool,
) -> Result<(), ConversionError> {
    let mut parser = InlineParser::new(doc.mem(), policy, smart);

    // Nodes created here are inlines and never need a second pass.
    let block_count = doc.arena_len();
    for index in 0..block_count {
        let id = NodeId::from_index(index);
        let attached = doc.parent(id).is_some();
        let has_inlines = matches!(doc.kind(id), NodeKind::Paragraph | NodeKind::Heading { .. });
        if attached && has_inlines {
            parser.parse_block(doc, refs, id)?;
        }
    }
    Ok(())
}

struct InlineParser<'a> {
    subject: MVec<'a, u8>,
    pos: usize,
    /// Source position stamped on the inline nodes of the current block
    line: usize,
    column: usize,
    delims: MVec<'a, Delimiter>,
    last_delim: Option<usize>,
    brackets: MVec<'a, Bracket>,
    /// Start of the last backtick run of each length seen so far
    backticks: MVec<'a, usize>,
    scanned_for_backticks: bool,
    policy: SecurityPolicy,
    /// Quotes, dashes and ellipses become typographic characters
    smart: bool,
    depth_limit_reported: bool,
}

impl<'a> InlineParser<'a> {
    fn new(mem: Mem<'a>, policy: SecurityPolicy, smart: bool) -> Self {
        Self {
            subject: mem.vec(),
            pos: 0,
            line: 0,
            column: 0,
            delims: mem.vec(),
            last_delim: None,
            brackets: mem.vec(),
            backticks: mem.vec(),
            scanned_for_backticks: false,
            policy,
            smart,
            depth_limit_reported: false,
        }
    }

    fn parse_block(
        &mut self,
        doc: &mut Document<'a>,
        refs: &mut ReferenceMap<'a>,
        block: NodeId,
    ) -> Result<(), ConversionError> {
        let node = doc.node(block);
        let content = node.content;
        self.line = node.pos.start_line;
        self.column = node.pos.start_column;

        self.subject.clear();
        self.subject.try_extend_from_slice(rtrim(doc.literal(content)))?;
        self.pos = 0;
        self.delims.clear();
        self.last_delim = None;
        self.brackets.clear();
        if self.scanned_for_backticks {
            self.backticks.iter_mut().for_each(|p| *p = 0);
            self.scanned_for_backticks = false;
        }

        while self.pos < self.subject.len() {
            if let Some(inline) = self.parse_inline(doc, refs)? {
                doc.append_child(block, inline);
            }
        }

        self.process_emphasis(doc, None)?;
        Ok(())
    }

    fn text_node(&self, doc: &mut Document<'a>, span: Span) -> Result<NodeId, ConversionError> {
        doc.new_node(NodeKind::Text(span), self.line, self.column)
    }

    /// Copy `subject[start..end]` into a new text node
    fn subject_text(
        &self,
        doc: &mut Document<'a>,
        start: usize,
        end: usize,
    ) -> Result<NodeId, ConversionError> {
        let span = doc.push_text(&self.subject[start..end])?;
        self.text_node(doc, span)
    }

    fn literal_text(&self, doc: &mut Document<'a>, text: &str) -> Result<NodeId, ConversionError> {
        let span = doc.push_text(text.as_bytes())?;
        self.text_node(doc, span)
    }

    /// Parse one inline at the current position
    ///
    /// Returns the node to append to the block, if any; links are attached
    /// in place by the closing bracket handler.
    fn parse_inline(
        &mut self,
        doc: &mut Document<'a>,
        refs: &mut ReferenceMap<'a>,
    ) -> Result<Option<NodeId>, ConversionError> {
        let node = match self.subject[self.pos] {
            b'\n' => self.handle_newline(doc)?,
            b'`' => self.handle_backticks(doc)?,
            b'\\' => self.handle_backslash(doc)?,
            b'&' => self.handle_entity(doc)?,
            b'<' => self.handle_pointy_brace(doc)?,
            c @ (b'*' | b'_') => self.handle_delim(doc, c)?,
            c @ (b'\'' | b'"') if self.smart => self.handle_delim(doc, c)?,
            b'-' if self.smart => self.handle_hyphen(doc)?,
            b'.' if self.smart => self.handle_period(doc)?,
            b'[' => {
                self.pos += 1;
                let node = self.subject_text(doc, self.pos - 1, self.pos)?;
                self.push_bracket(node, false)?;
                node
            }
            b'!' => {
                self.pos += 1;
                if at(&self.subject, self.pos) == b'[' {
                    self.pos += 1;
                    let node = self.subject_text(doc, self.pos - 2, self.pos)?;
                    self.push_bracket(node, true)?;
                    node
                } else {
                    self.subject_text(doc, self.pos - 1, self.pos)?
                }
            }
            b']' => return self.handle_close_bracket(doc, refs),
            _ => {
                let start = self.pos;
                let end = self.subject[start..]
                    .iter()
                    .position(|&b| is_special(b, self.smart))
                    .map_or(self.subject.len(), |i| start + i);
                self.pos = end;

                // Trailing spaces before a line break belong to the break.
                let text = &self.subject[start..end];
                let text = if at(&self.subject, end) == b'\n' {
                    rtrim(text)
                } else {
                    text
                };
                if text.is_empty() {
                    return Ok(None);
                }
                let span = doc.push_text(text)?;
                self.text_node(doc, span)?
            }
        };
        Ok(Some(node))
    }

    fn handle_newline(&mut self, doc: &mut Document<'a>) -> Result<NodeId, ConversionError> {
        let newline = self.pos;
        self.pos += 1;
        while is_space_or_tab(at(&self.subject, self.pos)) {
            self.pos += 1;
        }

        let hard = newline >= 2 && self.subject[newline - 1] == b' ' && self.subject[newline - 2] == b' ';
        doc.new_node(NodeKind::LineBreak { hard }, self.line, self.column)
    }

    fn handle_backslash(&mut self, doc: &mut Document<'a>) -> Result<NodeId, ConversionError> {
        self.pos += 1;
        let next = at(&self.subject, self.pos);
        if self.pos < self.subject.len() && is_ascii_punct(next) {
            self.pos += 1;
            self.subject_text(doc, self.pos - 1, self.pos)
        } else if self.pos < self.subject.len() && next == b'\n' {
            self.pos += 1;
            doc.new_node(NodeKind::LineBreak { hard: true }, self.line, self.column)
        } else {
            self.subject_text(doc, self.pos - 1, self.pos)
        }
    }

    fn handle_entity(&mut self, doc: &mut Document<'a>) -> Result<NodeId, ConversionError> {
        self.pos += 1;
        match entities::decode(&self.subject[self.pos..]) {
            Some((consumed, decoded)) => {
                self.pos += consumed;
                let start = doc.text().len();
                decoded.push_to(doc.text_mut())?;
                let span = Span::new(start, doc.text().len() - start);
                self.text_node(doc, span)
            }
            None => self.subject_text(doc, self.pos - 1, self.pos),
        }
    }

    /// Position right after the closing run of `open_len` backticks
    fn scan_to_closing_backticks(&mut self, open_len: usize) -> Result<Option<usize>, ConversionError> {
        if open_len > MAX_BACKTICKS {
            return Ok(None);
        }
        if self.backticks.is_empty() {
            self.backticks.try_reserve(MAX_BACKTICKS + 1)?;
            self.backticks.resize(MAX_BACKTICKS + 1, 0);
        }
        if self.scanned_for_backticks && self.backticks[open_len] <= self.pos {
            return Ok(None);
        }

        let len = self.subject.len();
        let mut pos = self.pos;
        loop {
            while pos < len && self.subject[pos] != b'`' {
                pos += 1;
            }
            if pos >= len {
                break;
            }
            let run_start = pos;
            while at(&self.subject, pos) == b'`' {
                pos += 1;
            }
            let run = pos - run_start;
            if run <= MAX_BACKTICKS {
                self.backticks[run] = run_start;
            }
            if run == open_len {
                return Ok(Some(pos));
            }
        }

        self.scanned_for_backticks = true;
        Ok(None)
    }

    fn handle_backticks(&mut self, doc: &mut Document<'a>) -> Result<NodeId, ConversionError> {
        let start = self.pos;
        while at(&self.subject, self.pos) == b'`' {
            self.pos += 1;
        }
        let after_open = self.pos;
        let open_len = after_open - start;

        let Some(end) = self.scan_to_closing_backticks(open_len)? else {
            return self.subject_text(doc, start, after_open);
        };
        self.pos = end;

        let code_start = doc.text().len();
        doc.text_mut()
            .try_extend_from_slice(&self.subject[after_open..end - open_len])?;
        let code = &mut doc.text_mut()[code_start..];
        for b in code.iter_mut() {
            if *b == b'\n' {
                *b = b' ';
            }
        }

        let mut span = Span::new(code_start, code.len());
        let padded = code.len() >= 2 && code[0] == b' ' && code[code.len() - 1] == b' ';
        if padded && code.iter().any(|&b| b != b' ') {
            span = Span::new(code_start + 1, code.len() - 2);
        }
        doc.new_node(NodeKind::CodeSpan(span), self.line, self.column)
    }

    fn handle_pointy_brace(&mut self, doc: &mut Document<'a>) -> Result<NodeId, ConversionError> {
        self.pos += 1;
        let body = self.pos;

        if let Some(len) = scanners::autolink_uri(&self.subject, body) {
            self.pos += len;
            return self.autolink(doc, body, body + len - 1, false);
        }
        if let Some(len) = scanners::autolink_email(&self.subject, body) {
            self.pos += len;
            return self.autolink(doc, body, body + len - 1, true);
        }
        if let Some(len) = scanners::html_tag(&self.subject, body) {
            self.pos += len;
            let span = doc.push_text(&self.subject[body - 1..self.pos])?;
            return doc.new_node(NodeKind::RawHtmlInline(span), self.line, self.column);
        }

        self.subject_text(doc, body - 1, body)
    }

    fn autolink(
        &self,
        doc: &mut Document<'a>,
        start: usize,
        end: usize,
        email: bool,
    ) -> Result<NodeId, ConversionError> {
        let raw = &self.subject[start..end];

        let url_start = doc.text().len();
        if email {
            doc.text_mut().try_extend_from_slice(b"mailto:")?;
        }
        decode_entities_into(raw, doc.text_mut())?;
        let destination = Span::new(url_start, doc.text().len() - url_start);

        let link = doc.new_node(
            NodeKind::Link(LinkData {
                destination,
                title: Span::default(),
            }),
            self.line,
            self.column,
        )?;

        let text_start = doc.text().len();
        decode_entities_into(raw, doc.text_mut())?;
        let label = self.text_node(doc, Span::new(text_start, doc.text().len() - text_start))?;
        doc.append_child(link, label);
        Ok(link)
    }

    /// Measure a `*` or `_` run, or a single quote, and decide whether it
    /// can open or close
    fn scan_delims(&mut self, c: u8) -> (usize, bool, bool) {
        let before = char_before(&self.subject, self.pos);
        let start = self.pos;
        if matches!(c, b'\'' | b'"') {
            self.pos += 1;
        } else {
            while at(&self.subject, self.pos) == c {
                self.pos += 1;
            }
        }
        let count = self.pos - start;
        let after = char_at(&self.subject, self.pos);

        let before_space = before.is_none_or(is_unicode_whitespace);
        let before_punct = before.is_some_and(is_unicode_punctuation);
        let after_space = after.is_none_or(is_unicode_whitespace);
        let after_punct = after.is_some_and(is_unicode_punctuation);

        let left_flanking = !after_space && (!after_punct || before_space || before_punct);
        let right_flanking = !before_space && (!before_punct || after_space || after_punct);

        match c {
            b'_' => (
                count,
                left_flanking && (!right_flanking || before_punct),
                right_flanking && (!left_flanking || after_punct),
            ),
            b'\'' | b'"' => (
                count,
                left_flanking
                    && !right_flanking
                    && before != Some(']')
                    && before != Some(')'),
                right_flanking,
            ),
            _ => (count, left_flanking, right_flanking),
        }
    }

    fn handle_delim(&mut self, doc: &mut Document<'a>, c: u8) -> Result<NodeId, ConversionError> {
        let start = self.pos;
        let (count, can_open, can_close) = self.scan_delims(c);
        // Quotes start out as closing quotes unless they can only open. A
        // matched opener is turned into a left quote by process_emphasis.
        let node = match c {
            b'\'' => self.literal_text(doc, RIGHT_SINGLE_QUOTE)?,
            b'"' if can_close => self.literal_text(doc, RIGHT_DOUBLE_QUOTE)?,
            b'"' => self.literal_text(doc, LEFT_DOUBLE_QUOTE)?,
            _ => self.subject_text(doc, start, self.pos)?,
        };

        if can_open || can_close {
            let index = self.delims.len();
            self.delims.try_push(Delimiter {
                prev: self.last_delim,
                next: None,
                node,
                ch: c,
                orig_len: count,
                remaining: count,
                can_open,
                can_close,
            })?;
            if let Some(last) = self.last_delim {
                self.delims[last].next = Some(index);
            }
            self.last_delim = Some(index);
        }
        Ok(node)
    }

    /// A run of hyphens, split into em and en dashes
    ///
    /// Multiples of three become em dashes and even runs en dashes; other
    /// lengths use as many em dashes as fit before one or two en dashes.
    fn handle_hyphen(&mut self, doc: &mut Document<'a>) -> Result<NodeId, ConversionError> {
        let start = self.pos;
        self.pos += 1;
        if at(&self.subject, self.pos) != b'-' {
            return self.subject_text(doc, start, self.pos);
        }
        while at(&self.subject, self.pos) == b'-' {
            self.pos += 1;
        }

        let count = self.pos - start;
        let (em, en) = if count % 3 == 0 {
            (count / 3, 0)
        } else if count % 2 == 0 {
            (0, count / 2)
        } else if count % 3 == 2 {
            ((count - 2) / 3, 1)
        } else {
            ((count - 4) / 3, 2)
        };

        let text_start = doc.text().len();
        for _ in 0..em {
            doc.text_mut().try_extend_from_slice(EM_DASH.as_bytes())?;
        }
        for _ in 0..en {
            doc.text_mut().try_extend_from_slice(EN_DASH.as_bytes())?;
        }
        self.text_node(doc, Span::new(text_start, doc.text().len() - text_start))
    }

    fn handle_period(&mut self, doc: &mut Document<'a>) -> Result<NodeId, ConversionError> {
        let start = self.pos;
        self.pos += 1;
        if at(&self.subject, self.pos) == b'.' {
            self.pos += 1;
            if at(&self.subject, self.pos) == b'.' {
                self.pos += 1;
                return self.literal_text(doc, ELLIPSIS);
            }
        }
        self.subject_text(doc, start, self.pos)
    }

    fn remove_delimiter(&mut self, index: usize) {
        let Delimiter { prev, next, .. } = self.delims[index];
        match next {
            Some(next) => self.delims[next].prev = prev,
            None => self.last_delim = prev,
        }
        if let Some(prev) = prev {
            self.delims[prev].next = next;
        }
    }

    fn push_bracket(&mut self, node: NodeId, image: bool) -> Result<(), ConversionError> {
        if self.brackets.len() >= self.policy.max_depth() {
            if !self.depth_limit_reported {
                warn!(
                    "bracket nesting limit of {} reached; further brackets stay literal",
                    self.policy.max_depth()
                );
                self.depth_limit_reported = true;
            }
            return Ok(());
        }

        if let Some(last) = self.brackets.last_mut() {
            last.bracket_after = true;
        }
        self.brackets.try_push(Bracket {
            node,
            position: self.pos,
            image,
            active: true,
            bracket_after: false,
            prev_delim: self.last_delim,
        })
    }

    /// Inline link tail `(dest "title")` starting at `pos`
    fn scan_link_tail(&self, pos: usize) -> Option<LinkTail> {
        let subject = &self.subject[..];
        if at(subject, pos) != b'(' {
            return None;
        }

        let url_start = pos + 1 + scanners::spacechars(subject, pos + 1);
        let (url_len, url) = scan_link_url(subject, url_start)?;
        let url_end = url_start + url_len;

        let title_start = url_end + scanners::spacechars(subject, url_end);
        let title_end = if title_start == url_end {
            title_start
        } else {
            title_start + scanners::link_title(subject, title_start).unwrap_or(0)
        };

        let end = title_end + scanners::spacechars(subject, title_end);
        (at(subject, end) == b')').then_some(LinkTail {
            url,
            title: (title_start, title_end),
            end: end + 1,
        })
    }

    fn handle_close_bracket(
        &mut self,
        doc: &mut Document<'a>,
        refs: &mut ReferenceMap<'a>,
    ) -> Result<Option<NodeId>, ConversionError> {
        self.pos += 1;
        let initial_pos = self.pos;

        let Some(&opener) = self.brackets.last() else {
            return self.subject_text(doc, initial_pos - 1, initial_pos).map(Some);
        };
        if !opener.active {
            self.brackets.pop();
            return self.subject_text(doc, initial_pos - 1, initial_pos).map(Some);
        }

        let mut target = None;

        if let Some(tail) = self.scan_link_tail(self.pos) {
            let url = clean_url(doc, &self.subject[tail.url.0..tail.url.1])?;
            let title = clean_title(doc, &self.subject[tail.title.0..tail.title.1])?;
            self.pos = tail.end;
            target = Some((url, title));
        } else {
            let mut label = match link_label(&self.subject, self.pos) {
                Some((end, start, label_end)) => {
                    self.pos = end;
                    Some((start, label_end))
                }
                None => {
                    self.pos = initial_pos;
                    None
                }
            };

            let collapsed = label.is_none_or(|(start, end)| start == end);
            if collapsed && !opener.bracket_after {
                label = Some((opener.position, initial_pos - 1));
            }
            if let Some((start, end)) = label {
                if let Some(found) = refs.lookup(&self.subject[start..end])? {
                    target = Some((found.url, found.title));
                }
            }
        }

        let Some((destination, title)) = target else {
            self.brackets.pop();
            self.pos = initial_pos;
            return self.subject_text(doc, initial_pos - 1, initial_pos).map(Some);
        };

        let data = LinkData { destination, title };
        let kind = if opener.image {
            NodeKind::Image(data)
        } else {
            NodeKind::Link(data)
        };
        let link = doc.new_node(kind, self.line, self.column)?;

        doc.insert_before(opener.node, link);
        let mut child = doc.next_sibling(opener.node);
        while let Some(id) = child {
            child = doc.next_sibling(id);
            doc.append_child(link, id);
        }
        doc.unlink(opener.node);

        self.process_emphasis(doc, opener.prev_delim)?;
        self.brackets.pop();

        // Links may not contain links: earlier link openers go inactive.
        if !opener.image {
            for bracket in self.brackets.iter_mut().rev() {
                if !bracket.image {
                    if !bracket.active {
                        break;
                    }
                    bracket.active = false;
                }
            }
        }
        Ok(None)
    }

    /// Resolve emphasis among the delimiters above `stack_bottom`
    fn process_emphasis(
        &mut self,
        doc: &mut Document<'a>,
        stack_bottom: Option<usize>,
    ) -> Result<(), ConversionError> {
        if self.last_delim == stack_bottom {
            return Ok(());
        }

        // Lowest opener worth visiting, per closer character, closer
        // can-open flag and run length modulo 3. Quotes get one slot each.
        let mut openers_bottom = [stack_bottom; 14];

        let mut closer = self.last_delim;
        while let Some(index) = closer {
            let prev = self.delims[index].prev;
            if prev == stack_bottom {
                break;
            }
            closer = prev;
        }

        while let Some(index) = closer {
            let current = self.delims[index];
            if !current.can_close {
                closer = current.next;
                continue;
            }

            let bottom = match current.ch {
                b'"' => 12,
                b'\'' => 13,
                ch => {
                    usize::from(ch == b'*') * 6
                        + usize::from(current.can_open) * 3
                        + current.orig_len % 3
                }
            };

            let mut found = None;
            let mut opener = current.prev;
            while let Some(candidate) = opener {
                if opener == openers_bottom[bottom] {
                    break;
                }
                let open = self.delims[candidate];
                if open.can_open && open.ch == current.ch {
                    let odd_match = (current.can_open || open.can_close)
                        && current.orig_len % 3 != 0
                        && (open.orig_len + current.orig_len) % 3 == 0;
                    if !odd_match {
                        found = Some(candidate);
                        break;
                    }
                }
                opener = open.prev;
            }

            match found {
                Some(open) if matches!(current.ch, b'\'' | b'"') => {
                    let left = if current.ch == b'"' {
                        LEFT_DOUBLE_QUOTE
                    } else {
                        LEFT_SINGLE_QUOTE
                    };
                    replace_text(doc, self.delims[open].node, left)?;
                    self.remove_delimiter(open);
                    self.remove_delimiter(index);
                    closer = current.next;
                }
                Some(open) => closer = self.insert_emphasis(doc, open, index)?,
                None => {
                    openers_bottom[bottom] = current.prev;
                    if !current.can_open {
                        self.remove_delimiter(index);
                    }
                    closer = current.next;
                }
            }
        }

        while let Some(last) = self.last_delim {
            if self.last_delim == stack_bottom {
                break;
            }
            self.remove_delimiter(last);
        }
        Ok(())
    }

    /// Wrap the nodes between `opener` and `closer` in emphasis
    ///
    /// Returns the delimiter to continue from.
    fn insert_emphasis(
        &mut self,
        doc: &mut Document<'a>,
        opener: usize,
        closer: usize,
    ) -> Result<Option<usize>, ConversionError> {
        let open = self.delims[opener];
        let close = self.delims[closer];
        let used = if open.remaining >= 2 && close.remaining >= 2 {
            2
        } else {
            1
        };

        self.delims[opener].remaining -= used;
        self.delims[closer].remaining -= used;
        shrink_text(doc, open.node, used);
        shrink_text(doc, close.node, used);

        let mut between = close.prev;
        while let Some(index) = between {
            if index == opener {
                break;
            }
            between = self.delims[index].prev;
            self.remove_delimiter(index);
        }

        let kind = if used == 1 {
            NodeKind::Emphasis
        } else {
            NodeKind::Strong
        };
        let emphasis = doc.new_node(kind, self.line, self.column)?;

        let mut child = doc.next_sibling(open.node);
        while let Some(id) = child {
            if id == close.node {
                break;
            }
            child = doc.next_sibling(id);
            doc.append_child(emphasis, id);
        }
        doc.insert_after(open.node, emphasis);

        if self.delims[opener].remaining == 0 {
            doc.unlink(open.node);
            self.remove_delimiter(opener);
        }

        if self.delims[closer].remaining == 0 {
            doc.unlink(close.node);
            let next = self.delims[closer].next;
            self.remove_delimiter(closer);
            return Ok(next);
        }
        Ok(Some(closer))
    }
}

fn shrink_text(doc: &mut Document<'_>, node: NodeId, by: usize) {
    if let NodeKind::Text(span) = &mut doc.node_mut(node).kind {
        span.len -= by;
    }
}

fn replace_text(doc: &mut Document<'_>, node: NodeId, text: &str) -> Result<(), ConversionError> {
    let replacement = doc.push_text(text.as_bytes())?;
    if let NodeKind::Text(span) = &mut doc.node_mut(node).kind {
        *span = replacement;
    }
    Ok(())
}

/// Bracketed link label at `pos`
///
/// Returns the position after `]` and the trimmed label bounds.
fn link_label(s: &[u8], pos: usize) -> Option<(usize, usize, usize)> {
    if at(s, pos) != b'[' {
        return None;
    }

    let mut i = pos + 1;
    let mut length = 0;
    while i < s.len() && s[i] != b'[' && s[i] != b']' {
        if s[i] == b'\\' && is_ascii_punct(at(s, i + 1)) {
            i += 2;
            length += 2;
        } else {
            i += 1;
            length += 1;
        }
        if length >= MAX_LINK_LABEL_LENGTH {
            return None;
        }
    }

    if at(s, i) != b']' {
        return None;
    }
    let raw = &s[pos + 1..i];
    let leading = raw.iter().take_while(|&&b| is_space(b)).count();
    let trimmed = trim(raw).len();
    Some((i + 1, pos + 1 + leading, pos + 1 + leading + trimmed))
}

/// Link destination at `pos`, `<…>` or bare
///
/// Returns the consumed length and the bounds of the destination text.
fn scan_link_url(s: &[u8], pos: usize) -> Option<(usize, (usize, usize))> {
    if at(s, pos) == b'<' {
        let mut i = pos + 1;
        loop {
            if i >= s.len() {
                return None;
            }
            match s[i] {
                b'>' => break,
                b'\\' => i += 2,
                b'\n' | b'<' => return None,
                _ => i += 1,
            }
        }
        return Some((i + 1 - pos, (pos + 1, i)));
    }

    let mut i = pos;
    let mut depth = 0;
    while i < s.len() {
        match s[i] {
            b'\\' if is_ascii_punct(at(s, i + 1)) => i += 2,
            b'(' => {
                depth += 1;
                if depth > MAX_LINK_PARENS {
                    return None;
                }
                i += 1;
            }
            b')' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                i += 1;
            }
            b if is_space(b) || b.is_ascii_control() => {
                if i == pos {
                    return None;
                }
                break;
            }
            _ => i += 1,
        }
    }

    if i >= s.len() || depth != 0 {
        return None;
    }
    Some((i - pos, (pos, i)))
}

/// Store a destination with escapes and entities resolved
fn clean_url(doc: &mut Document<'_>, raw: &[u8]) -> Result<Span, ConversionError> {
    let start = doc.text().len();
    unescape_into(trim(raw), doc.text_mut())?;
    Ok(Span::new(start, doc.text().len() - start))
}

/// Store a title without its delimiters, escapes and entities resolved
fn clean_title(doc: &mut Document<'_>, raw: &[u8]) -> Result<Span, ConversionError> {
    if raw.len() < 2 {
        return Ok(Span::default());
    }
    let start = doc.text().len();
    unescape_into(&raw[1..raw.len() - 1], doc.text_mut())?;
    Ok(Span::new(start, doc.text().len() - start))
}

fn skip_spaces(s: &[u8], mut pos: usize) -> usize {
    while is_space_or_tab(at(s, pos)) {
        pos += 1;
    }
    pos
}

/// Position after an optional line ending, `None` if neither a line ending
/// nor the end of input is at `pos`
fn skip_line_end(s: &[u8], mut pos: usize) -> Option<usize> {
    let mut seen = false;
    if at(s, pos) == b'\r' {
        pos += 1;
        seen = true;
    }
    if at(s, pos) == b'\n' {
        pos += 1;
        seen = true;
    }
    (seen || pos >= s.len()).then_some(pos)
}

/// Spaces, at most one line ending, spaces
fn skip_spnl(s: &[u8], pos: usize) -> usize {
    let pos = skip_spaces(s, pos);
    match skip_line_end(s, pos) {
        Some(next) if next > pos => skip_spaces(s, next),
        _ => pos,
    }
}

/// Parse one link reference definition at the start of `input`
///
/// On success the definition is recorded in `refs` (destination and title
/// are stored in the document text pool) and the number of bytes it spans,
/// including its final line ending, is returned.
pub(crate) fn parse_reference_definition(
    input: &[u8],
    doc: &mut Document<'_>,
    refs: &mut ReferenceMap<'_>,
) -> Result<Option<usize>, ConversionError> {
    let Some((after_label, label_start, label_end)) = link_label(input, 0) else {
        return Ok(None);
    };
    if label_start == label_end || at(input, after_label) != b':' {
        return Ok(None);
    }

    let url_start = skip_spnl(input, after_label + 1);
    let Some((url_len, url)) = scan_link_url(input, url_start) else {
        return Ok(None);
    };
    let before_title = url_start + url_len;

    let title_start = skip_spnl(input, before_title);
    let title_len = if title_start == before_title {
        0
    } else {
        scanners::link_title(input, title_start).unwrap_or(0)
    };

    let mut title = (title_start, title_start + title_len);
    let mut end = skip_line_end(input, skip_spaces(input, title.1));
    if title_len == 0 {
        title = (before_title, before_title);
        end = skip_line_end(input, skip_spaces(input, before_title));
    } else if end.is_none() {
        // A title followed by junk is not a title; the destination alone may
        // still end the line.
        title = (before_title, before_title);
        end = skip_line_end(input, skip_spaces(input, before_title));
    }
    let Some(end) = end else {
        return Ok(None);
    };

    let url = clean_url(doc, &input[url.0..url.1])?;
    let title = clean_title(doc, &input[title.0..title.1])?;
    refs.insert(&input[label_start..label_end], url, title)?;
    Ok(Some(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockParser;
    use crate::mem::default_allocator;
    use crate::options::Options;

    fn parse(input: &str) -> Document<'static> {
        parse_with(input, false)
    }

    fn parse_with(input: &str, smart: bool) -> Document<'static> {
        let mem = Mem::new(default_allocator());
        let mut doc = Document::new(mem).unwrap();
        let mut refs = ReferenceMap::new(mem, 100_000);
        let policy = SecurityPolicy::new(&Options::default());
        let mut parser = BlockParser::new(&mut doc, &mut refs, policy);
        parser.feed(input.as_bytes()).unwrap();
        parser.finish().unwrap();
        parse_inlines(&mut doc, &mut refs, policy, smart).unwrap();
        doc
    }

    /// Compact s-expression of the inline tree under the first paragraph
    fn inline_tree(doc: &Document<'_>) -> String {
        let mut out = String::new();
        let mut block = doc.first_child(doc.root());
        while let Some(id) = block {
            if matches!(doc.kind(id), NodeKind::Paragraph | NodeKind::Heading { .. }) {
                break;
            }
            block = doc.first_child(id);
        }
        let Some(block) = block else { return out };

        fn walk(doc: &Document<'_>, id: NodeId, out: &mut String) {
            let mut child = doc.first_child(id);
            while let Some(c) = child {
                match doc.kind(c) {
                    NodeKind::Text(span) => {
                        out.push_str(&String::from_utf8_lossy(doc.literal(*span)));
                    }
                    NodeKind::CodeSpan(span) => {
                        out.push_str("(code ");
                        out.push_str(&String::from_utf8_lossy(doc.literal(*span)));
                        out.push(')');
                    }
                    NodeKind::LineBreak { hard } => out.push_str(if *hard { "(br)" } else { "(sb)" }),
                    NodeKind::Link(data) | NodeKind::Image(data) => {
                        out.push('(');
                        out.push_str(doc.kind(c).name());
                        out.push(' ');
                        out.push_str(&String::from_utf8_lossy(doc.literal(data.destination)));
                        if !data.title.is_empty() {
                            out.push_str(" \"");
                            out.push_str(&String::from_utf8_lossy(doc.literal(data.title)));
                            out.push('"');
                        }
                        out.push(' ');
                        walk(doc, c, out);
                        out.push(')');
                    }
                    other => {
                        out.push('(');
                        out.push_str(other.name());
                        if let NodeKind::RawHtmlInline(span) = other {
                            out.push(' ');
                            out.push_str(&String::from_utf8_lossy(doc.literal(*span)));
                        }
                        out.push(' ');
                        walk(doc, c, out);
                        out.push(')');
                    }
                }
                child = doc.next_sibling(c);
            }
        }

        walk(doc, block, &mut out);
        out
    }

    fn inlines(input: &str) -> String {
        inline_tree(&parse(input))
    }

    fn smart(input: &str) -> String {
        inline_tree(&parse_with(input, true))
    }

    #[test]
    fn test_emphasis_and_strong() {
        assert_eq!(inlines("*a* **b**"), "(emph a) (strong b)");
        assert_eq!(inlines("***both***"), "(emph (strong both))");
        assert_eq!(inlines("*a"), "*a");
        assert_eq!(inlines("a*b*c"), "a(emph b)c");
        assert_eq!(inlines("a_b_c"), "a_b_c");
        assert_eq!(inlines("*foo**bar**baz*"), "(emph foo(strong bar)baz)");
    }

    #[test]
    fn test_unbalanced_runs_keep_leftovers() {
        assert_eq!(inlines("**a*"), "*(emph a)");
        assert_eq!(inlines("*a**"), "(emph a)*");
    }

    #[test]
    fn test_code_spans() {
        assert_eq!(inlines("`a`"), "(code a)");
        assert_eq!(inlines("`` a ` b ``"), "(code a ` b)");
        assert_eq!(inlines("` `"), "(code  )");
        assert_eq!(inlines("`a\nb`"), "(code a b)");
        assert_eq!(inlines("`unclosed"), "`unclosed");
        assert_eq!(inlines("``a`b"), "``a`b");
    }

    #[test]
    fn test_escapes_and_entities() {
        assert_eq!(inlines("\\*a\\*"), "*a*");
        assert_eq!(inlines("a\\\nb"), "a(br)b");
        assert_eq!(inlines("&amp; &copy; &#65; &bogus;"), "& © A &bogus;");
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(inlines("a\nb"), "a(sb)b");
        assert_eq!(inlines("a  \nb"), "a(br)b");
        assert_eq!(inlines("a \nb"), "a(sb)b");
    }

    #[test]
    fn test_autolinks_and_raw_html() {
        assert_eq!(
            inlines("<https://x.org/a>"),
            "(link https://x.org/a https://x.org/a)"
        );
        assert_eq!(inlines("<me@x.org>"), "(link mailto:me@x.org me@x.org)");
        assert_eq!(inlines("a <b>c</b>"), "a (html_inline <b> )c(html_inline </b> )");
        assert_eq!(inlines("a < b"), "a < b");
    }

    #[test]
    fn test_inline_links() {
        assert_eq!(inlines("[a](/u \"t\")"), "(link /u \"t\" a)");
        assert_eq!(inlines("[a](<my url>)"), "(link my url a)");
        assert_eq!(inlines("[a](/u(x))"), "(link /u(x) a)");
        assert_eq!(inlines("![alt *x*](i.png)"), "(image i.png alt (emph x))");
        assert_eq!(inlines("[a](/u"), "[a](/u");
    }

    #[test]
    fn test_reference_links() {
        let doc = parse("[foo]\n\n[foo]: /url \"title\"");
        assert_eq!(inline_tree(&doc), "(link /url \"title\" foo)");

        assert_eq!(inlines("[x][Foo]\n\n[foo]: /f"), "(link /f x)");
        assert_eq!(inlines("[Foo][]\n\n[foo]: /f"), "(link /f Foo)");
        assert_eq!(inlines("[missing]"), "[missing]");
    }

    #[test]
    fn test_links_do_not_nest() {
        assert_eq!(inlines("[a [b](/b)](/a)"), "[a (link /b b)](/a)");
    }

    #[test]
    fn test_emphasis_does_not_cross_links() {
        assert_eq!(inlines("*[a*](/u)"), "*(link /u a*)");
    }

    #[test]
    fn test_reference_definition_forms() {
        let mem = Mem::new(default_allocator());
        let mut doc = Document::new(mem).unwrap();
        let mut refs = ReferenceMap::new(mem, 100_000);

        let input = b"[a]: /u 'title'\nrest";
        let len = parse_reference_definition(input, &mut doc, &mut refs).unwrap();
        assert_eq!(len, Some(16));

        let target = refs.lookup(b"A").unwrap().unwrap();
        assert_eq!(doc.literal(target.url), b"/u");
        assert_eq!(doc.literal(target.title), b"title");

        assert_eq!(
            parse_reference_definition(b"[b]: /u 'x' junk\n", &mut doc, &mut refs).unwrap(),
            None
        );
        assert_eq!(
            parse_reference_definition(b"[c]:\n", &mut doc, &mut refs).unwrap(),
            None
        );
        assert_eq!(
            parse_reference_definition(b"[]: /u\n", &mut doc, &mut refs).unwrap(),
            None
        );
    }

    #[test]
    fn test_title_on_next_line_is_optional() {
        let mem = Mem::new(default_allocator());
        let mut doc = Document::new(mem).unwrap();
        let mut refs = ReferenceMap::new(mem, 100_000);

        let input = b"[a]: /u\n\"not a title\" text\n";
        let len = parse_reference_definition(input, &mut doc, &mut refs).unwrap();
        assert_eq!(len, Some(8));
        let target = refs.lookup(b"a").unwrap().unwrap();
        assert!(target.title.is_empty());
    }

    #[test]
    fn test_bracket_depth_is_capped() {
        let input = "[".repeat(5000) + "a";
        let doc = parse(&input);
        assert_eq!(inline_tree(&doc), input);
    }

    #[test]
    fn test_smart_quotes_pair_up() {
        assert_eq!(smart("\"Hello,\" she said."), "\u{201C}Hello,\u{201D} she said.");
        assert_eq!(smart("'single' quotes"), "\u{2018}single\u{2019} quotes");
        assert_eq!(smart("it's"), "it\u{2019}s");
        assert_eq!(smart("\"'nested'\""), "\u{201C}\u{2018}nested\u{2019}\u{201D}");
    }

    #[test]
    fn test_smart_quotes_after_bracket_or_paren() {
        assert_eq!(smart("(\"a\")"), "(\u{201C}a\u{201D})");
        assert_eq!(smart("x)'s"), "x)\u{2019}s");
        assert_eq!(smart("\"unmatched"), "\u{201C}unmatched");
    }

    #[test]
    fn test_smart_quotes_mix_with_emphasis() {
        assert_eq!(smart("*\"a\"*"), "(emph \u{201C}a\u{201D})");
        assert_eq!(smart("\"*a*\""), "\u{201C}(emph a)\u{201D}");
    }

    #[test]
    fn test_smart_dashes() {
        assert_eq!(smart("a-b"), "a-b");
        assert_eq!(smart("a--b"), "a\u{2013}b");
        assert_eq!(smart("a---b"), "a\u{2014}b");
        assert_eq!(smart("a----b"), "a\u{2013}\u{2013}b");
        assert_eq!(smart("a-----b"), "a\u{2014}\u{2013}b");
        assert_eq!(smart("a-------b"), "a\u{2014}\u{2013}\u{2013}b");
    }

    #[test]
    fn test_smart_ellipsis() {
        assert_eq!(smart("wait..."), "wait\u{2026}");
        assert_eq!(smart("a.. b. c...."), "a.. b. c\u{2026}.");
    }

    #[test]
    fn test_smart_leaves_code_and_escapes_alone() {
        assert_eq!(smart("`\"a\" -- b...`"), "(code \"a\" -- b...)");
        assert_eq!(smart("\\\"a\\\""), "\"a\"");
        assert_eq!(inlines("\"a\" -- b..."), "\"a\" -- b...");
    }
}
