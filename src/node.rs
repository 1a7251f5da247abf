//! Document tree
//!
//! Nodes live in a single index-addressed arena owned by [`Document`].
//! Structural links (parent, children, siblings) are [`NodeId`] indices, so
//! the tree has no reference cycles and no per-node ownership: the whole
//! arena is released in one step when the document is dropped.
//!
//! String attributes (text literals, code, URLs, titles, info strings) are
//! [`Span`]s into the document's text pool rather than individual
//! allocations.
//!
//! # Traversal
//!
//! [`Document::events`] walks the tree depth-first and yields
//! [`Event::Enter`] / [`Event::Exit`] pairs without recursion. Leaf nodes
//! (code blocks, HTML blocks, thematic breaks, text, code spans, raw HTML,
//! line breaks) only produce an `Enter` event.

use crate::error::ConversionError;
use crate::mem::{MVec, Mem, VecExt};

/// Index of a node in its document's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Byte range inside the document's text pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Offset of the first byte
    pub start: usize,
    /// Length in bytes
    pub len: usize,
}

impl Span {
    /// Create a span
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Whether the span covers no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Bullet or ordered list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// `-`, `*` or `+` markers
    Bullet,
    /// Digits followed by `.` or `)`
    Ordered,
}

/// Delimiter following an ordered list number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDelimiter {
    /// Bullet lists have none
    None,
    /// `1.`
    Period,
    /// `1)`
    Paren,
}

/// Attributes shared by lists and their items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListData {
    /// Bullet or ordered
    pub kind: ListKind,
    /// Ordered list delimiter
    pub delimiter: ListDelimiter,
    /// Bullet character (`-`, `*`, `+`), zero for ordered lists
    pub bullet_char: u8,
    /// Start number of an ordered list
    pub start: Option<u32>,
    /// No blank lines between items or their blocks
    pub tight: bool,
    /// Columns of indentation before the marker
    pub(crate) marker_offset: usize,
    /// Columns from the marker start to the item content
    pub(crate) padding: usize,
}

/// Attributes of a code block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlockData {
    /// Info string (fenced blocks only, may be empty)
    pub info: Span,
    /// Verbatim content, ending with a newline unless empty
    pub literal: Span,
    /// Fenced (``` / ~~~) or indented
    pub fenced: bool,
    pub(crate) fence_char: u8,
    pub(crate) fence_length: usize,
    pub(crate) fence_offset: usize,
}

/// Destination and title of a link or image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkData {
    /// Destination, unescaped
    pub destination: Span,
    /// Title, unescaped (empty when absent)
    pub title: Span,
}

/// Kind and kind-specific attributes of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Root
    Document,
    /// `>` container
    BlockQuote,
    /// List container
    List(ListData),
    /// Item of a list
    ListItem(ListData),
    /// Fenced or indented code
    CodeBlock(CodeBlockData),
    /// Raw HTML block; `html_kind` is the start condition (1 to 7)
    HtmlBlock {
        /// Verbatim content
        literal: Span,
        /// Start condition that opened the block
        html_kind: u8,
    },
    /// Paragraph
    Paragraph,
    /// ATX or setext heading
    Heading {
        /// 1 to 6
        level: u8,
        /// Underlined with `=` or `-`
        setext: bool,
    },
    /// `<hr />`
    ThematicBreak,
    /// Plain text
    Text(Span),
    /// Hard (`<br />`) or soft line break
    LineBreak {
        /// Hard break
        hard: bool,
    },
    /// `code`
    CodeSpan(Span),
    /// Raw inline HTML
    RawHtmlInline(Span),
    /// `<em>`
    Emphasis,
    /// `<strong>`
    Strong,
    /// `<a>`
    Link(LinkData),
    /// `<img>`
    Image(LinkData),
}

impl NodeKind {
    /// Whether the kind is a block-level node
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Document
                | NodeKind::BlockQuote
                | NodeKind::List(_)
                | NodeKind::ListItem(_)
                | NodeKind::CodeBlock(_)
                | NodeKind::HtmlBlock { .. }
                | NodeKind::Paragraph
                | NodeKind::Heading { .. }
                | NodeKind::ThematicBreak
        )
    }

    /// Leaves never have children and produce no exit event
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            NodeKind::CodeBlock(_)
                | NodeKind::HtmlBlock { .. }
                | NodeKind::ThematicBreak
                | NodeKind::Text(_)
                | NodeKind::LineBreak { .. }
                | NodeKind::CodeSpan(_)
                | NodeKind::RawHtmlInline(_)
        )
    }

    /// Whether a node of this kind may hold a child of kind `child`
    pub fn can_contain(&self, child: &NodeKind) -> bool {
        match self {
            NodeKind::Document | NodeKind::BlockQuote | NodeKind::ListItem(_) => {
                child.is_block() && !matches!(child, NodeKind::ListItem(_) | NodeKind::Document)
            }
            NodeKind::List(_) => matches!(child, NodeKind::ListItem(_)),
            NodeKind::Paragraph
            | NodeKind::Heading { .. }
            | NodeKind::Emphasis
            | NodeKind::Strong
            | NodeKind::Link(_)
            | NodeKind::Image(_) => !child.is_block(),
            _ => false,
        }
    }

    /// Blocks whose content is accumulated line by line
    pub(crate) fn accepts_lines(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading { .. } | NodeKind::CodeBlock(_)
        )
    }

    /// Name used in debug output and tests
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::BlockQuote => "block_quote",
            NodeKind::List(_) => "list",
            NodeKind::ListItem(_) => "item",
            NodeKind::CodeBlock(_) => "code_block",
            NodeKind::HtmlBlock { .. } => "html_block",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading { .. } => "heading",
            NodeKind::ThematicBreak => "thematic_break",
            NodeKind::Text(_) => "text",
            NodeKind::LineBreak { hard: true } => "linebreak",
            NodeKind::LineBreak { hard: false } => "softbreak",
            NodeKind::CodeSpan(_) => "code",
            NodeKind::RawHtmlInline(_) => "html_inline",
            NodeKind::Emphasis => "emph",
            NodeKind::Strong => "strong",
            NodeKind::Link(_) => "link",
            NodeKind::Image(_) => "image",
        }
    }
}

/// Source position, 1-based lines and columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    /// First line
    pub start_line: usize,
    /// First column
    pub start_column: usize,
    /// Last line
    pub end_line: usize,
    /// Last column
    pub end_column: usize,
}

/// One element of the document tree
#[derive(Debug, Clone, Copy)]
pub struct Node {
    /// Kind and attributes
    pub kind: NodeKind,
    /// Location in the input
    pub pos: SourcePos,
    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    /// Raw content of a leaf block while it is being parsed
    pub(crate) content: Span,
    pub(crate) open: bool,
    pub(crate) last_line_blank: bool,
}

/// Walk direction reported by [`Events`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Entering a node (the only event for leaves)
    Enter(NodeId),
    /// Leaving a container node after its children
    Exit(NodeId),
}

/// Parsed document: node arena plus text pool
pub struct Document<'a> {
    mem: Mem<'a>,
    nodes: MVec<'a, Node>,
    text: MVec<'a, u8>,
    root: NodeId,
}

impl<'a> Document<'a> {
    /// Create a document holding only its root node
    pub fn new(mem: Mem<'a>) -> Result<Self, ConversionError> {
        let mut doc = Self {
            mem,
            nodes: mem.vec(),
            text: mem.vec(),
            root: NodeId(0),
        };
        doc.root = doc.new_node(NodeKind::Document, 1, 1)?;
        Ok(doc)
    }

    /// Allocator handle shared by everything in this conversion
    pub fn mem(&self) -> Mem<'a> {
        self.mem
    }

    /// The Document node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever allocated, including unlinked ones
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Access a node
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Kind of a node
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// First child of a node
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].first_child
    }

    /// Last child of a node
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].last_child
    }

    /// Next sibling
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].next
    }

    /// Previous sibling
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].prev
    }

    /// Iterate over the direct children of a node
    pub fn children(&self, id: NodeId) -> Children<'_, 'a> {
        Children {
            doc: self,
            next: self.first_child(id),
        }
    }

    /// Bytes of a span in the text pool
    pub fn literal(&self, span: Span) -> &[u8] {
        &self.text[span.start..span.end()]
    }

    /// Full text pool
    pub(crate) fn text(&self) -> &[u8] {
        &self.text
    }

    pub(crate) fn text_mut(&mut self) -> &mut MVec<'a, u8> {
        &mut self.text
    }

    /// Append bytes to the text pool and return their span
    pub(crate) fn push_text(&mut self, bytes: &[u8]) -> Result<Span, ConversionError> {
        let start = self.text.len();
        self.text.try_extend_from_slice(bytes)?;
        Ok(Span::new(start, bytes.len()))
    }

    /// Allocate a detached node
    pub(crate) fn new_node(
        &mut self,
        kind: NodeKind,
        line: usize,
        column: usize,
    ) -> Result<NodeId, ConversionError> {
        let id = NodeId(self.nodes.len());
        self.nodes.try_push(Node {
            kind,
            pos: SourcePos {
                start_line: line,
                start_column: column,
                end_line: line,
                end_column: column,
            },
            parent: None,
            first_child: None,
            last_child: None,
            prev: None,
            next: None,
            content: Span::default(),
            open: true,
            last_line_blank: false,
        })?;
        Ok(id)
    }

    /// Detach a node (and its subtree) from its parent and siblings
    pub(crate) fn unlink(&mut self, id: NodeId) {
        let Node {
            parent, prev, next, ..
        } = self.nodes[id.0];

        match prev {
            Some(prev) => self.nodes[prev.0].next = next,
            None => {
                if let Some(parent) = parent {
                    self.nodes[parent.0].first_child = next;
                }
            }
        }
        match next {
            Some(next) => self.nodes[next.0].prev = prev,
            None => {
                if let Some(parent) = parent {
                    self.nodes[parent.0].last_child = prev;
                }
            }
        }

        let node = &mut self.nodes[id.0];
        node.parent = None;
        node.prev = None;
        node.next = None;
    }

    /// Make `child` the last child of `parent`
    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.unlink(child);

        let old_last = self.nodes[parent.0].last_child;
        {
            let node = &mut self.nodes[child.0];
            node.parent = Some(parent);
            node.prev = old_last;
        }
        match old_last {
            Some(last) => self.nodes[last.0].next = Some(child),
            None => self.nodes[parent.0].first_child = Some(child),
        }
        self.nodes[parent.0].last_child = Some(child);
    }

    /// Insert `sibling` right before `node`
    pub(crate) fn insert_before(&mut self, node: NodeId, sibling: NodeId) {
        self.unlink(sibling);

        let Node { parent, prev, .. } = self.nodes[node.0];
        {
            let s = &mut self.nodes[sibling.0];
            s.parent = parent;
            s.prev = prev;
            s.next = Some(node);
        }
        self.nodes[node.0].prev = Some(sibling);
        match prev {
            Some(prev) => self.nodes[prev.0].next = Some(sibling),
            None => {
                if let Some(parent) = parent {
                    self.nodes[parent.0].first_child = Some(sibling);
                }
            }
        }
    }

    /// Insert `sibling` right after `node`
    pub(crate) fn insert_after(&mut self, node: NodeId, sibling: NodeId) {
        self.unlink(sibling);

        let Node { parent, next, .. } = self.nodes[node.0];
        {
            let s = &mut self.nodes[sibling.0];
            s.parent = parent;
            s.prev = Some(node);
            s.next = next;
        }
        self.nodes[node.0].next = Some(sibling);
        match next {
            Some(next) => self.nodes[next.0].prev = Some(sibling),
            None => {
                if let Some(parent) = parent {
                    self.nodes[parent.0].last_child = Some(sibling);
                }
            }
        }
    }

    /// Depth-first enter/exit walk starting at `root`
    pub fn events_from(&self, root: NodeId) -> Events<'_, 'a> {
        Events {
            doc: self,
            root,
            next: Some(Event::Enter(root)),
        }
    }

    /// Depth-first enter/exit walk of the whole document
    pub fn events(&self) -> Events<'_, 'a> {
        self.events_from(self.root)
    }
}

/// Iterator over the children of a node
pub struct Children<'d, 'a> {
    doc: &'d Document<'a>,
    next: Option<NodeId>,
}

impl Iterator for Children<'_, '_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.next_sibling(current);
        Some(current)
    }
}

/// Non-recursive tree walk, see [`Document::events`]
pub struct Events<'d, 'a> {
    doc: &'d Document<'a>,
    root: NodeId,
    next: Option<Event>,
}

impl Iterator for Events<'_, '_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        let current = self.next?;

        self.next = match current {
            Event::Enter(id) if !self.doc.kind(id).is_leaf() => match self.doc.first_child(id) {
                Some(child) => Some(Event::Enter(child)),
                None => Some(Event::Exit(id)),
            },
            Event::Enter(id) | Event::Exit(id) => {
                if id == self.root {
                    None
                } else if let Some(next) = self.doc.next_sibling(id) {
                    Some(Event::Enter(next))
                } else {
                    self.doc.parent(id).map(Event::Exit)
                }
            }
        };

        Some(current)
    }
}
