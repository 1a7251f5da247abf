//! Block structure parser
//!
//! Consumes the input one line at a time and maintains the chain of open
//! blocks from the document root down to the current tip. For every line:
//!
//! 1. walk the open containers and consume their continuation markers
//!    (`>`, list item indentation, code indentation, ...);
//! 2. try to open new blocks at the remaining position;
//! 3. hand what is left of the line to the innermost block, or treat it as
//!    a lazy paragraph continuation.
//!
//! Leaf blocks keep their raw content in the document text pool. Only one
//! leaf accepts lines at a time, so its content always grows at the end of
//! the pool.
//!
//! The walk over open containers is a loop, not recursion, and containers
//! stop nesting at the policy's depth limit.

use log::warn;

use crate::error::ConversionError;
use crate::inlines::parse_reference_definition;
use crate::mem::{MVec, VecExt};
use crate::node::{
    CodeBlockData, Document, ListData, ListDelimiter, ListKind, NodeId, NodeKind, Span,
};
use crate::references::ReferenceMap;
use crate::scanners;
use crate::security::SecurityPolicy;
use crate::text::{TAB_STOP, is_blank, is_line_end, is_space, is_space_or_tab, trim, unescape_into};

/// Columns of indentation that make an indented code block
const CODE_INDENT: usize = 4;

/// Longest ordered list number, in digits
const MAX_LIST_NUMBER_DIGITS: usize = 9;

fn at(s: &[u8], pos: usize) -> u8 {
    s.get(pos).copied().unwrap_or(0)
}

fn is_container(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::BlockQuote | NodeKind::List(_) | NodeKind::ListItem(_)
    )
}

fn lists_match(a: &ListData, b: &ListData) -> bool {
    a.kind == b.kind && a.delimiter == b.delimiter && a.bullet_char == b.bullet_char
}

/// Outcome of the continuation check of an open code block
enum FencePrefix {
    Matched,
    NotMatched,
    /// Closing fence: the line is fully consumed
    Closed,
}

/// Block start recognized at the current position
enum BlockStart {
    BlockQuote,
    AtxHeading { level: u8, len: usize },
    CodeFence { len: usize },
    HtmlBlock(u8),
    SetextHeading(u8),
    ThematicBreak,
    ListItem { data: ListData, len: usize },
    IndentedCode,
}

/// List marker at `pos`: bullet, or up to 9 digits followed by `.` or `)`
///
/// Returns the marker data (padding not yet known) and the marker length.
fn parse_list_marker(line: &[u8], pos: usize, interrupts_paragraph: bool) -> Option<(ListData, usize)> {
    let c = at(line, pos);
    let mut end = pos;

    let (kind, delimiter, bullet_char, start) = if matches!(c, b'*' | b'-' | b'+') {
        end += 1;
        (ListKind::Bullet, ListDelimiter::None, c, None)
    } else if c.is_ascii_digit() {
        let mut number: u32 = 0;
        while end - pos < MAX_LIST_NUMBER_DIGITS && at(line, end).is_ascii_digit() {
            number = number * 10 + u32::from(at(line, end) - b'0');
            end += 1;
        }
        if interrupts_paragraph && number != 1 {
            return None;
        }
        let delimiter = match at(line, end) {
            b'.' => ListDelimiter::Period,
            b')' => ListDelimiter::Paren,
            _ => return None,
        };
        end += 1;
        (ListKind::Ordered, delimiter, 0, Some(number))
    } else {
        return None;
    };

    if !is_space(at(line, end)) {
        return None;
    }

    if interrupts_paragraph {
        // an empty item cannot interrupt a paragraph
        let mut i = end;
        while is_space_or_tab(at(line, i)) {
            i += 1;
        }
        if is_line_end(at(line, i)) || i >= line.len() {
            return None;
        }
    }

    let data = ListData {
        kind,
        delimiter,
        bullet_char,
        start,
        tight: false,
        marker_offset: 0,
        padding: 0,
    };
    Some((data, end - pos))
}

/// Line-by-line block parser state
pub(crate) struct BlockParser<'a, 'd> {
    doc: &'d mut Document<'a>,
    refs: &'d mut ReferenceMap<'a>,
    policy: SecurityPolicy,
    scratch: MVec<'a, u8>,
    /// Deepest open block
    current: NodeId,
    line_number: usize,
    offset: usize,
    column: usize,
    first_nonspace: usize,
    first_nonspace_column: usize,
    indent: usize,
    blank: bool,
    partially_consumed_tab: bool,
    thematic_break_kill_pos: usize,
    current_line_length: usize,
    last_line_length: usize,
    at_eof: bool,
    depth_limit_reported: bool,
}

impl<'a, 'd> BlockParser<'a, 'd> {
    pub(crate) fn new(
        doc: &'d mut Document<'a>,
        refs: &'d mut ReferenceMap<'a>,
        policy: SecurityPolicy,
    ) -> Self {
        let current = doc.root();
        let scratch = doc.mem().vec();
        Self {
            doc,
            refs,
            policy,
            scratch,
            current,
            line_number: 0,
            offset: 0,
            column: 0,
            first_nonspace: 0,
            first_nonspace_column: 0,
            indent: 0,
            blank: false,
            partially_consumed_tab: false,
            thematic_break_kill_pos: 0,
            current_line_length: 0,
            last_line_length: 0,
            at_eof: false,
            depth_limit_reported: false,
        }
    }

    /// Split `input` on `\n`, `\r\n` and `\r` and process every line
    pub(crate) fn feed(&mut self, input: &[u8]) -> Result<(), ConversionError> {
        let mut line: MVec<'a, u8> = self.doc.mem().vec();
        let mut pos = 0;

        while pos < input.len() {
            let end = input[pos..]
                .iter()
                .position(|&b| is_line_end(b))
                .map_or(input.len(), |i| pos + i);

            line.clear();
            line.try_extend_from_slice(&input[pos..end])?;
            line.try_push(b'\n')?;
            self.process_line(&line)?;

            pos = end;
            if pos < input.len() {
                pos += if input[pos] == b'\r' && at(input, pos + 1) == b'\n' {
                    2
                } else {
                    1
                };
            }
        }

        Ok(())
    }

    /// Close every open block
    pub(crate) fn finish(mut self) -> Result<(), ConversionError> {
        self.at_eof = true;
        let root = self.doc.root();
        while self.current != root {
            self.current = self.finalize(self.current)?;
        }
        self.finalize(root)?;
        Ok(())
    }

    fn process_line(&mut self, line: &[u8]) -> Result<(), ConversionError> {
        self.offset = 0;
        self.column = 0;
        self.first_nonspace = 0;
        self.first_nonspace_column = 0;
        self.indent = 0;
        self.blank = false;
        self.partially_consumed_tab = false;
        self.thematic_break_kill_pos = 0;
        self.line_number += 1;
        self.current_line_length = line.len() - 1;

        if let Some((container, all_matched, depth)) = self.check_open_blocks(line)? {
            let last_matched = container;
            let container = self.open_new_blocks(line, container, all_matched, depth)?;
            self.add_text_to_container(line, container, last_matched)?;
        }

        self.last_line_length = line.len() - 1;
        Ok(())
    }

    fn find_first_nonspace(&mut self, line: &[u8]) {
        let mut chars_to_tab = TAB_STOP - (self.column % TAB_STOP);

        if self.first_nonspace <= self.offset {
            self.first_nonspace = self.offset;
            self.first_nonspace_column = self.column;
            loop {
                match at(line, self.first_nonspace) {
                    b' ' => {
                        self.first_nonspace += 1;
                        self.first_nonspace_column += 1;
                        chars_to_tab -= 1;
                        if chars_to_tab == 0 {
                            chars_to_tab = TAB_STOP;
                        }
                    }
                    b'\t' => {
                        self.first_nonspace += 1;
                        self.first_nonspace_column += chars_to_tab;
                        chars_to_tab = TAB_STOP;
                    }
                    _ => break,
                }
            }
        }

        self.indent = self.first_nonspace_column - self.column;
        let c = at(line, self.first_nonspace);
        self.blank = c == 0 || is_line_end(c);
    }

    /// Advance by `count` bytes, or by `count` columns when `columns` is set
    fn advance_offset(&mut self, line: &[u8], mut count: usize, columns: bool) {
        while count > 0 && self.offset < line.len() {
            if line[self.offset] == b'\t' {
                let chars_to_tab = TAB_STOP - (self.column % TAB_STOP);
                if columns {
                    self.partially_consumed_tab = chars_to_tab > count;
                    let advance = count.min(chars_to_tab);
                    self.column += advance;
                    if !self.partially_consumed_tab {
                        self.offset += 1;
                    }
                    count -= advance;
                } else {
                    self.partially_consumed_tab = false;
                    self.column += chars_to_tab;
                    self.offset += 1;
                    count -= 1;
                }
            } else {
                self.partially_consumed_tab = false;
                self.offset += 1;
                self.column += 1;
                count -= 1;
            }
        }
    }

    fn report_depth_limit(&mut self) {
        if !self.depth_limit_reported {
            warn!(
                "nesting depth limit of {} reached at line {}; deeper markers are kept as text",
                self.policy.max_depth(),
                self.line_number
            );
            self.depth_limit_reported = true;
        }
    }

    /// Match continuation markers of open containers
    ///
    /// Returns the deepest matched container, whether every open block
    /// matched, and the container nesting depth at that point. `None` means
    /// the line was consumed (closing code fence).
    fn check_open_blocks(
        &mut self,
        line: &[u8],
    ) -> Result<Option<(NodeId, bool, usize)>, ConversionError> {
        let mut container = self.doc.root();
        let mut depth = 0;

        loop {
            let Some(child) = self.doc.last_child(container) else {
                return Ok(Some((container, true, depth)));
            };
            if !self.doc.node(child).open {
                return Ok(Some((container, true, depth)));
            }

            self.find_first_nonspace(line);
            let kind = *self.doc.kind(child);
            let matched = match kind {
                NodeKind::BlockQuote => self.parse_block_quote_prefix(line),
                NodeKind::ListItem(data) => self.parse_item_prefix(line, child, &data),
                NodeKind::CodeBlock(data) => match self.parse_code_block_prefix(line, child, &data)? {
                    FencePrefix::Matched => true,
                    FencePrefix::NotMatched => false,
                    FencePrefix::Closed => return Ok(None),
                },
                NodeKind::Heading { .. } => false,
                NodeKind::HtmlBlock { html_kind, .. } => html_kind <= 5 || !self.blank,
                NodeKind::Paragraph => !self.blank,
                _ => true,
            };

            if !matched {
                return Ok(Some((container, false, depth)));
            }
            container = child;
            if is_container(&kind) {
                depth += 1;
            }
        }
    }

    fn parse_block_quote_prefix(&mut self, line: &[u8]) -> bool {
        if self.indent > 3 || at(line, self.first_nonspace) != b'>' {
            return false;
        }
        self.advance_offset(line, self.indent + 1, true);
        if is_space_or_tab(at(line, self.offset)) {
            self.advance_offset(line, 1, true);
        }
        true
    }

    fn parse_item_prefix(&mut self, line: &[u8], item: NodeId, data: &ListData) -> bool {
        let width = data.marker_offset + data.padding;
        if self.indent >= width {
            self.advance_offset(line, width, true);
            true
        } else if self.blank && self.doc.first_child(item).is_some() {
            let skip = self.first_nonspace - self.offset;
            self.advance_offset(line, skip, false);
            true
        } else {
            false
        }
    }

    fn parse_code_block_prefix(
        &mut self,
        line: &[u8],
        block: NodeId,
        data: &CodeBlockData,
    ) -> Result<FencePrefix, ConversionError> {
        if !data.fenced {
            if self.indent >= CODE_INDENT {
                self.advance_offset(line, CODE_INDENT, true);
                return Ok(FencePrefix::Matched);
            }
            if self.blank {
                let skip = self.first_nonspace - self.offset;
                self.advance_offset(line, skip, false);
                return Ok(FencePrefix::Matched);
            }
            return Ok(FencePrefix::NotMatched);
        }

        if self.indent <= 3 && at(line, self.first_nonspace) == data.fence_char {
            if let Some(len) = scanners::close_code_fence(line, self.first_nonspace) {
                if len >= data.fence_length {
                    let skip = self.first_nonspace + len - self.offset;
                    self.advance_offset(line, skip, false);
                    self.current = self.finalize(block)?;
                    return Ok(FencePrefix::Closed);
                }
            }
        }

        let mut remaining = data.fence_offset;
        while remaining > 0 && is_space_or_tab(at(line, self.offset)) {
            self.advance_offset(line, 1, true);
            remaining -= 1;
        }
        Ok(FencePrefix::Matched)
    }

    fn detect_block_start(
        &mut self,
        line: &[u8],
        container: NodeId,
        all_matched: bool,
        maybe_lazy: bool,
        depth: usize,
    ) -> Option<BlockStart> {
        let pos = self.first_nonspace;
        let indented = self.indent >= CODE_INDENT;
        let in_paragraph = matches!(self.doc.kind(container), NodeKind::Paragraph);

        if !indented {
            if at(line, pos) == b'>' {
                if self.policy.allows_depth(depth) {
                    return Some(BlockStart::BlockQuote);
                }
                self.report_depth_limit();
            }
            if let Some((level, len)) = scanners::atx_heading_start(line, pos) {
                return Some(BlockStart::AtxHeading { level, len });
            }
            if let Some(len) = scanners::open_code_fence(line, pos) {
                return Some(BlockStart::CodeFence { len });
            }
            let html = scanners::html_block_start(line, pos).or_else(|| {
                if in_paragraph {
                    None
                } else {
                    scanners::html_block_start_7(line, pos)
                }
            });
            if let Some(html_kind) = html {
                return Some(BlockStart::HtmlBlock(html_kind));
            }
            if in_paragraph {
                if let Some(level) = scanners::setext_heading_line(line, pos) {
                    return Some(BlockStart::SetextHeading(level));
                }
            }
            if !(in_paragraph && !all_matched) && self.thematic_break_kill_pos <= pos {
                match scanners::thematic_break(line, pos) {
                    Ok(_) => return Some(BlockStart::ThematicBreak),
                    Err(kill_pos) => self.thematic_break_kill_pos = kill_pos,
                }
            }
        }

        if self.indent < CODE_INDENT {
            if let Some((data, len)) = parse_list_marker(line, pos, in_paragraph) {
                if self.policy.allows_depth(depth + 1) {
                    return Some(BlockStart::ListItem { data, len });
                }
                self.report_depth_limit();
            }
        }

        if indented && !maybe_lazy && !self.blank {
            return Some(BlockStart::IndentedCode);
        }

        None
    }

    /// Open as many new blocks as the rest of the line starts
    fn open_new_blocks(
        &mut self,
        line: &[u8],
        mut container: NodeId,
        all_matched: bool,
        mut depth: usize,
    ) -> Result<NodeId, ConversionError> {
        let mut maybe_lazy = matches!(self.doc.kind(self.current), NodeKind::Paragraph);

        loop {
            if matches!(
                self.doc.kind(container),
                NodeKind::CodeBlock(_) | NodeKind::HtmlBlock { .. }
            ) {
                break;
            }

            self.find_first_nonspace(line);
            let Some(start) = self.detect_block_start(line, container, all_matched, maybe_lazy, depth)
            else {
                break;
            };
            let pos = self.first_nonspace;

            match start {
                BlockStart::BlockQuote => {
                    self.advance_offset(line, pos + 1 - self.offset, false);
                    if is_space_or_tab(at(line, self.offset)) {
                        self.advance_offset(line, 1, true);
                    }
                    container = self.add_child(container, NodeKind::BlockQuote, pos + 1)?;
                    depth += 1;
                }
                BlockStart::AtxHeading { level, len } => {
                    self.advance_offset(line, pos + len - self.offset, false);
                    let kind = NodeKind::Heading {
                        level,
                        setext: false,
                    };
                    container = self.add_child(container, kind, pos + 1)?;
                }
                BlockStart::CodeFence { len } => {
                    let data = CodeBlockData {
                        info: Span::default(),
                        literal: Span::default(),
                        fenced: true,
                        fence_char: line[pos],
                        fence_length: len,
                        fence_offset: pos - self.offset,
                    };
                    container = self.add_child(container, NodeKind::CodeBlock(data), pos + 1)?;
                    self.advance_offset(line, pos + len - self.offset, false);
                }
                BlockStart::HtmlBlock(html_kind) => {
                    // the tag is part of the content, offset stays put
                    let kind = NodeKind::HtmlBlock {
                        literal: Span::default(),
                        html_kind,
                    };
                    container = self.add_child(container, kind, pos + 1)?;
                }
                BlockStart::SetextHeading(level) => {
                    if self.resolve_reference_definitions(container)? {
                        self.doc.node_mut(container).kind = NodeKind::Heading {
                            level,
                            setext: true,
                        };
                        self.advance_offset(line, line.len() - 1 - self.offset, false);
                    }
                }
                BlockStart::ThematicBreak => {
                    container = self.add_child(container, NodeKind::ThematicBreak, pos + 1)?;
                    self.advance_offset(line, line.len() - 1 - self.offset, false);
                }
                BlockStart::ListItem { mut data, len } => {
                    self.advance_offset(line, pos + len - self.offset, false);

                    let saved_tab = self.partially_consumed_tab;
                    let saved_offset = self.offset;
                    let saved_column = self.column;

                    while self.column - saved_column <= 5 && is_space_or_tab(at(line, self.offset)) {
                        self.advance_offset(line, 1, true);
                    }

                    let spaces = self.column - saved_column;
                    if spaces >= 5 || spaces < 1 || is_line_end(at(line, self.offset)) {
                        data.padding = len + 1;
                        self.offset = saved_offset;
                        self.column = saved_column;
                        self.partially_consumed_tab = saved_tab;
                        if spaces > 0 {
                            self.advance_offset(line, 1, true);
                        }
                    } else {
                        data.padding = len + spaces;
                    }
                    data.marker_offset = self.indent;

                    let continues_list = matches!(
                        self.doc.kind(container),
                        NodeKind::List(existing) if lists_match(existing, &data)
                    );
                    if !continues_list {
                        container = self.add_child(container, NodeKind::List(data), pos + 1)?;
                        depth += 1;
                    }
                    container = self.add_child(container, NodeKind::ListItem(data), pos + 1)?;
                    depth += 1;
                }
                BlockStart::IndentedCode => {
                    self.advance_offset(line, CODE_INDENT, true);
                    let data = CodeBlockData {
                        info: Span::default(),
                        literal: Span::default(),
                        fenced: false,
                        fence_char: 0,
                        fence_length: 0,
                        fence_offset: 0,
                    };
                    container =
                        self.add_child(container, NodeKind::CodeBlock(data), self.offset + 1)?;
                }
            }

            if self.doc.kind(container).accepts_lines() {
                break;
            }
            maybe_lazy = false;
        }

        Ok(container)
    }

    fn add_text_to_container(
        &mut self,
        line: &[u8],
        mut container: NodeId,
        last_matched: NodeId,
    ) -> Result<(), ConversionError> {
        self.find_first_nonspace(line);

        if self.blank {
            if let Some(last) = self.doc.last_child(container) {
                self.doc.node_mut(last).last_line_blank = true;
            }
        }

        let kind = *self.doc.kind(container);
        let empty_new_item = matches!(kind, NodeKind::ListItem(_))
            && self.doc.first_child(container).is_none()
            && self.doc.node(container).pos.start_line == self.line_number;
        let last_line_blank = self.blank
            && !matches!(
                kind,
                NodeKind::BlockQuote | NodeKind::Heading { .. } | NodeKind::ThematicBreak
            )
            && !matches!(kind, NodeKind::CodeBlock(data) if data.fenced)
            && !empty_new_item;
        self.doc.node_mut(container).last_line_blank = last_line_blank;

        let mut ancestor = self.doc.parent(container);
        while let Some(node) = ancestor {
            self.doc.node_mut(node).last_line_blank = false;
            ancestor = self.doc.parent(node);
        }

        let lazy = self.current != last_matched
            && container == last_matched
            && !self.blank
            && matches!(self.doc.kind(self.current), NodeKind::Paragraph);
        if lazy {
            return self.add_line(line, self.current);
        }

        while self.current != last_matched {
            self.current = self.finalize(self.current)?;
        }

        match kind {
            NodeKind::CodeBlock(_) => self.add_line(line, container)?,
            NodeKind::HtmlBlock { html_kind, .. } => {
                self.add_line(line, container)?;
                if scanners::html_block_end(html_kind, &line[self.first_nonspace..]) {
                    container = self.finalize(container)?;
                }
            }
            _ if self.blank => {}
            NodeKind::Heading { setext: false, .. } => {
                let end = self.first_nonspace + chop_closing_hashes(&line[self.first_nonspace..]);
                self.advance_offset(line, self.first_nonspace - self.offset, false);
                self.add_line(&line[..end.max(self.offset)], container)?;
            }
            _ if kind.accepts_lines() => {
                self.advance_offset(line, self.first_nonspace - self.offset, false);
                self.add_line(line, container)?;
            }
            _ => {
                container = self.add_child(container, NodeKind::Paragraph, self.first_nonspace + 1)?;
                self.advance_offset(line, self.first_nonspace - self.offset, false);
                self.add_line(line, container)?;
            }
        }

        self.current = container;
        Ok(())
    }

    /// Append a detached child, closing blocks that cannot contain it
    fn add_child(
        &mut self,
        mut parent: NodeId,
        kind: NodeKind,
        column: usize,
    ) -> Result<NodeId, ConversionError> {
        while !self.doc.kind(parent).can_contain(&kind) {
            if parent == self.doc.root() {
                return Err(ConversionError::InternalError("block has no valid container"));
            }
            parent = self.finalize(parent)?;
        }

        let child = self.doc.new_node(kind, self.line_number, column)?;
        let start = self.doc.text().len();
        self.doc.node_mut(child).content = Span::new(start, 0);
        self.doc.append_child(parent, child);
        Ok(child)
    }

    /// Move a leaf's content to the end of the text pool if something was
    /// appended after it
    fn ensure_tail(&mut self, node: NodeId) -> Result<Span, ConversionError> {
        let span = self.doc.node(node).content;
        let pool_len = self.doc.text().len();
        if span.end() == pool_len {
            return Ok(span);
        }

        let moved = Span::new(pool_len, span.len);
        let text = self.doc.text_mut();
        text.try_reserve(span.len)?;
        for i in span.start..span.end() {
            let b = text[i];
            text.try_push(b)?;
        }
        self.doc.node_mut(node).content = moved;
        Ok(moved)
    }

    fn add_line(&mut self, line: &[u8], node: NodeId) -> Result<(), ConversionError> {
        let span = self.ensure_tail(node)?;
        let mut added = 0;

        if self.partially_consumed_tab {
            self.offset += 1;
            let chars_to_tab = TAB_STOP - (self.column % TAB_STOP);
            let text = self.doc.text_mut();
            for _ in 0..chars_to_tab {
                text.try_push(b' ')?;
            }
            added += chars_to_tab;
        }

        let rest = &line[self.offset.min(line.len())..];
        self.doc.text_mut().try_extend_from_slice(rest)?;
        added += rest.len();

        self.doc.node_mut(node).content = Span::new(span.start, span.len + added);
        Ok(())
    }

    /// Strip leading reference definitions from a paragraph
    ///
    /// Returns whether any content is left.
    fn resolve_reference_definitions(&mut self, paragraph: NodeId) -> Result<bool, ConversionError> {
        let content = self.doc.node(paragraph).content;
        if self.doc.literal(content).first() != Some(&b'[') {
            return Ok(!is_blank(self.doc.literal(content)));
        }

        self.scratch.clear();
        self.scratch.try_extend_from_slice(self.doc.literal(content))?;

        let mut consumed = 0;
        while at(&self.scratch, consumed) == b'[' {
            match parse_reference_definition(&self.scratch[consumed..], self.doc, self.refs)? {
                Some(len) => consumed += len,
                None => break,
            }
        }

        let remaining = Span::new(content.start + consumed, content.len - consumed);
        self.doc.node_mut(paragraph).content = remaining;
        Ok(!is_blank(&self.scratch[consumed..]))
    }

    fn ends_with_blank_line(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.doc.node(id).last_line_blank {
                return true;
            }
            current = match self.doc.kind(id) {
                NodeKind::List(_) | NodeKind::ListItem(_) => self.doc.last_child(id),
                _ => None,
            };
        }
        false
    }

    fn list_is_tight(&self, list: NodeId) -> bool {
        for item in self.doc.children(list) {
            let has_next_item = self.doc.next_sibling(item).is_some();
            if self.doc.node(item).last_line_blank && has_next_item {
                return false;
            }
            for block in self.doc.children(item) {
                let has_next = has_next_item || self.doc.next_sibling(block).is_some();
                if has_next && self.ends_with_blank_line(block) {
                    return false;
                }
            }
        }
        true
    }

    /// Close a block and return its parent
    fn finalize(&mut self, block: NodeId) -> Result<NodeId, ConversionError> {
        let parent = self.doc.parent(block);
        let root = self.doc.root();
        let parent_or_root = parent.unwrap_or(root);
        if !self.doc.node(block).open {
            return Ok(parent_or_root);
        }
        self.doc.node_mut(block).open = false;

        let kind = *self.doc.kind(block);
        let ends_on_current_line = matches!(kind, NodeKind::Document)
            || matches!(kind, NodeKind::CodeBlock(data) if data.fenced)
            || matches!(kind, NodeKind::Heading { setext: true, .. });
        let (end_line, end_column) = if self.at_eof {
            (self.line_number, self.last_line_length)
        } else if ends_on_current_line {
            (self.line_number, self.current_line_length)
        } else {
            (self.line_number.saturating_sub(1), self.last_line_length)
        };
        {
            let pos = &mut self.doc.node_mut(block).pos;
            pos.end_line = end_line.max(1);
            pos.end_column = end_column;
        }

        match kind {
            NodeKind::Paragraph => {
                if !self.resolve_reference_definitions(block)? {
                    self.doc.unlink(block);
                }
            }
            NodeKind::CodeBlock(mut data) => {
                if data.fenced {
                    self.finalize_fenced_code(block, &mut data)?;
                } else {
                    data.literal = self.finalize_indented_code(block)?;
                }
                self.doc.node_mut(block).kind = NodeKind::CodeBlock(data);
            }
            NodeKind::HtmlBlock { html_kind, .. } => {
                let literal = self.doc.node(block).content;
                self.doc.node_mut(block).kind = NodeKind::HtmlBlock { literal, html_kind };
            }
            NodeKind::List(mut data) => {
                data.tight = self.list_is_tight(block);
                self.doc.node_mut(block).kind = NodeKind::List(data);
            }
            _ => {}
        }

        Ok(parent_or_root)
    }

    /// Trailing blank lines are dropped; the literal ends with one newline
    fn finalize_indented_code(&mut self, block: NodeId) -> Result<Span, ConversionError> {
        let span = self.ensure_tail(block)?;
        let content = self.doc.literal(span);

        let keep = match content
            .iter()
            .rposition(|&b| !is_space_or_tab(b) && !is_line_end(b))
        {
            Some(last) => content[last..]
                .iter()
                .position(|&b| is_line_end(b))
                .map_or(content.len(), |i| last + i),
            None => 0,
        };

        let text = self.doc.text_mut();
        text.truncate(span.start + keep);
        text.try_push(b'\n')?;
        Ok(Span::new(span.start, keep + 1))
    }

    /// The first content line holds the info string
    fn finalize_fenced_code(
        &mut self,
        block: NodeId,
        data: &mut CodeBlockData,
    ) -> Result<(), ConversionError> {
        let span = self.doc.node(block).content;

        self.scratch.clear();
        self.scratch.try_extend_from_slice(self.doc.literal(span))?;
        let first_line_end = self
            .scratch
            .iter()
            .position(|&b| is_line_end(b))
            .unwrap_or(self.scratch.len());

        let info_start = self.doc.text().len();
        unescape_into(trim(&self.scratch[..first_line_end]), self.doc.text_mut())?;
        data.info = Span::new(info_start, self.doc.text().len() - info_start);

        let body = (first_line_end + 1).min(span.len);
        data.literal = Span::new(span.start + body, span.len - body);
        Ok(())
    }
}

/// Length of an ATX heading's content once an optional closing `#`
/// sequence and trailing whitespace are removed
fn chop_closing_hashes(content: &[u8]) -> usize {
    let trimmed = crate::text::rtrim(content).len();
    let mut n = trimmed;
    while n > 0 && content[n - 1] == b'#' {
        n -= 1;
    }
    if n == trimmed {
        return trimmed;
    }
    if n == 0 || is_space_or_tab(content[n - 1]) {
        crate::text::rtrim(&content[..n]).len()
    } else {
        trimmed
    }
}
