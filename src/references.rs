//! Link reference definitions
//!
//! Definitions are collected while blocks are parsed and looked up while
//! inlines are parsed, so a reference may be used before it is defined.
//! Labels are stored normalized (see [`normalize_label`]); the first
//! definition of a label wins.
//!
//! Entries are kept in a flat vector and sorted once, on the first lookup,
//! then searched with a binary search.

use log::warn;

use crate::error::ConversionError;
use crate::mem::{MVec, Mem, VecExt};
use crate::node::Span;
use crate::security::MAX_LINK_LABEL_LENGTH;
use crate::text::normalize_label;

#[derive(Debug, Clone, Copy)]
struct Reference {
    /// Normalized label in `ReferenceMap::labels`
    label: Span,
    /// Destination in the document text pool
    url: Span,
    /// Title in the document text pool
    title: Span,
    /// Definition order, breaks ties between duplicate labels
    age: usize,
}

/// Resolved reference target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceTarget {
    /// Destination span in the document text pool
    pub url: Span,
    /// Title span in the document text pool
    pub title: Span,
}

/// Label to destination/title map
pub struct ReferenceMap<'a> {
    labels: MVec<'a, u8>,
    refs: MVec<'a, Reference>,
    scratch: MVec<'a, u8>,
    sorted: bool,
    expanded: usize,
    expansion_limit: usize,
    limit_reported: bool,
}

impl<'a> ReferenceMap<'a> {
    /// Create an empty map whose lookups may copy at most
    /// `expansion_limit` bytes in total
    pub fn new(mem: Mem<'a>, expansion_limit: usize) -> Self {
        Self {
            labels: mem.vec(),
            refs: mem.vec(),
            scratch: mem.vec(),
            sorted: true,
            expanded: 0,
            expansion_limit,
            limit_reported: false,
        }
    }

    /// Number of distinct labels
    #[cfg(test)]
    fn len(&self) -> usize {
        let label = |r: &Reference| &self.labels[r.label.start..r.label.end()];
        self.refs
            .iter()
            .enumerate()
            .filter(|(i, r)| !self.refs[..*i].iter().any(|seen| label(seen) == label(r)))
            .count()
    }

    /// Whether no definition was recorded
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Record a definition; empty labels are ignored
    pub fn insert(&mut self, label: &[u8], url: Span, title: Span) -> Result<(), ConversionError> {
        let start = self.labels.len();
        normalize_label(label, &mut self.labels)?;
        let len = self.labels.len() - start;
        if len == 0 {
            return Ok(());
        }

        let age = self.refs.len();
        self.refs.try_push(Reference {
            label: Span::new(start, len),
            url,
            title,
            age,
        })?;
        self.sorted = false;
        Ok(())
    }

    /// Sort by label and drop later duplicates
    fn sort(&mut self) {
        if self.sorted {
            return;
        }

        let labels = &self.labels;
        self.refs.sort_unstable_by(|a, b| {
            labels[a.label.start..a.label.end()]
                .cmp(&labels[b.label.start..b.label.end()])
                .then(a.age.cmp(&b.age))
        });

        let mut kept = 0;
        for i in 0..self.refs.len() {
            let duplicate = kept > 0 && {
                let prev = self.refs[kept - 1].label;
                let current = self.refs[i].label;
                labels[prev.start..prev.end()] == labels[current.start..current.end()]
            };
            if !duplicate {
                self.refs[kept] = self.refs[i];
                kept += 1;
            }
        }
        self.refs.truncate(kept);
        self.sorted = true;
    }

    /// Resolve a raw label
    ///
    /// Returns `None` for unknown or over-long labels, and once the
    /// expansion budget is spent.
    pub fn lookup(&mut self, label: &[u8]) -> Result<Option<ReferenceTarget>, ConversionError> {
        if label.is_empty() || label.len() >= MAX_LINK_LABEL_LENGTH || self.refs.is_empty() {
            return Ok(None);
        }
        self.sort();

        self.scratch.clear();
        normalize_label(label, &mut self.scratch)?;
        if self.scratch.is_empty() {
            return Ok(None);
        }

        let labels = &self.labels;
        let wanted = &self.scratch[..];
        let Ok(index) = self
            .refs
            .binary_search_by(|r| labels[r.label.start..r.label.end()].cmp(wanted))
        else {
            return Ok(None);
        };

        let found = self.refs[index];
        let size = found.url.len + found.title.len;
        if self.expanded.saturating_add(size) > self.expansion_limit {
            if !self.limit_reported {
                warn!(
                    "reference expansion limit of {} bytes reached; further references stay literal",
                    self.expansion_limit
                );
                self.limit_reported = true;
            }
            return Ok(None);
        }
        self.expanded += size;

        Ok(Some(ReferenceTarget {
            url: found.url,
            title: found.title,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::default_allocator;

    fn map(limit: usize) -> ReferenceMap<'static> {
        ReferenceMap::new(Mem::new(default_allocator()), limit)
    }

    #[test]
    fn test_lookup_normalizes_labels() {
        let mut refs = map(1000);
        refs.insert(b"Foo  Bar", Span::new(0, 3), Span::default())
            .unwrap();

        let target = refs.lookup(b"foo\nbar").unwrap().unwrap();
        assert_eq!(target.url, Span::new(0, 3));
        assert!(refs.lookup(b"foo baz").unwrap().is_none());
    }

    #[test]
    fn test_first_definition_wins() {
        let mut refs = map(1000);
        refs.insert(b"a", Span::new(0, 1), Span::default()).unwrap();
        refs.insert(b"b", Span::new(5, 1), Span::default()).unwrap();
        refs.insert(b"A", Span::new(9, 1), Span::default()).unwrap();

        assert_eq!(refs.len(), 2);
        assert_eq!(refs.lookup(b"a").unwrap().unwrap().url, Span::new(0, 1));
        assert_eq!(refs.lookup(b"B").unwrap().unwrap().url, Span::new(5, 1));
    }

    #[test]
    fn test_len_before_and_after_lookup() {
        let mut refs = map(1000);
        refs.insert(b"a", Span::new(0, 1), Span::default()).unwrap();
        refs.insert(b"A", Span::new(2, 1), Span::default()).unwrap();
        refs.insert(b"b", Span::new(4, 1), Span::default()).unwrap();

        let before = &refs;
        assert_eq!(before.len(), 2);
        assert!(!refs.sorted);

        refs.lookup(b"b").unwrap();
        assert!(refs.sorted);
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_blank_and_long_labels() {
        let mut refs = map(1000);
        refs.insert(b"   ", Span::new(0, 1), Span::default()).unwrap();
        assert!(refs.is_empty());

        let long = [b'x'; MAX_LINK_LABEL_LENGTH];
        refs.insert(&long, Span::new(0, 1), Span::default()).unwrap();
        assert!(refs.lookup(&long).unwrap().is_none());
    }

    #[test]
    fn test_label_cap_counts_bytes() {
        let mut refs = map(1000);
        // 500 characters, 1000 bytes
        let wide = "\u{e9}".repeat(MAX_LINK_LABEL_LENGTH / 2);
        refs.insert(wide.as_bytes(), Span::new(0, 1), Span::default()).unwrap();
        assert!(refs.lookup(wide.as_bytes()).unwrap().is_none());

        let fits = "\u{e9}".repeat(MAX_LINK_LABEL_LENGTH / 2 - 1);
        refs.insert(fits.as_bytes(), Span::new(0, 1), Span::default()).unwrap();
        assert!(refs.lookup(fits.as_bytes()).unwrap().is_some());
    }

    #[test]
    fn test_expansion_limit() {
        let mut refs = map(10);
        refs.insert(b"x", Span::new(0, 4), Span::new(4, 2)).unwrap();

        assert!(refs.lookup(b"x").unwrap().is_some());
        assert!(refs.lookup(b"x").unwrap().is_none());
    }
}
