//! Highlights over recognized text
//!
//! A highlight covers a run of text elements on one page and is addressed by
//! a [`RangeDescriptor`] whose string form is `p{page}:{start}-{end}`. The
//! host persists highlights through [`HighlightStore`].

use crate::text_layer::PageText;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum HighlightError {
    #[error("invalid range descriptor: {0}")]
    InvalidRange(String),

    #[error("highlight storage failed: {0}")]
    Storage(String),
}

pub type HighlightResult<T> = Result<T, HighlightError>;

/// Inclusive run of element indices on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub page_index: usize,
    pub start: usize,
    pub end: usize,
}

impl RangeDescriptor {
    pub fn new(page_index: usize, start: usize, end: usize) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self {
            page_index,
            start,
            end,
        }
    }

    pub fn contains(&self, page_index: usize, index: usize) -> bool {
        self.page_index == page_index && (self.start..=self.end).contains(&index)
    }

    pub fn overlaps(&self, other: &RangeDescriptor) -> bool {
        self.page_index == other.page_index && self.start <= other.end && other.start <= self.end
    }

    /// What is left of `self` after taking out `removed`: zero, one or two ranges.
    pub fn subtract(&self, removed: &RangeDescriptor) -> Vec<RangeDescriptor> {
        if !self.overlaps(removed) {
            return vec![*self];
        }
        let mut pieces = Vec::new();
        if self.start < removed.start {
            pieces.push(RangeDescriptor::new(self.page_index, self.start, removed.start - 1));
        }
        if self.end > removed.end {
            pieces.push(RangeDescriptor::new(self.page_index, removed.end + 1, self.end));
        }
        pieces
    }
}

impl fmt::Display for RangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}:{}-{}", self.page_index, self.start, self.end)
    }
}

impl FromStr for RangeDescriptor {
    type Err = HighlightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HighlightError::InvalidRange(s.to_string());
        let rest = s.strip_prefix('p').ok_or_else(invalid)?;
        let (page, span) = rest.split_once(':').ok_or_else(invalid)?;
        let (start, end) = span.split_once('-').ok_or_else(invalid)?;
        let parse = |value: &str| value.parse::<usize>().map_err(|_| invalid());
        let (page_index, start, end) = (parse(page)?, parse(start)?, parse(end)?);
        if start > end {
            return Err(invalid());
        }
        Ok(RangeDescriptor {
            page_index,
            start,
            end,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub document_id: String,
    pub range: RangeDescriptor,
    pub text: String,
}

impl Highlight {
    pub fn page_index(&self) -> usize {
        self.range.page_index
    }
}

pub trait HighlightStore: Send + Sync {
    fn insert(&self, document_id: &str, page_index: usize, range: RangeDescriptor, text: &str) -> HighlightResult<()>;

    fn query(&self, document_id: &str) -> HighlightResult<Vec<Highlight>>;

    fn delete(&self, document_id: &str, range: &RangeDescriptor) -> HighlightResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryHighlightStore {
    highlights: Mutex<Vec<Highlight>>,
}

impl MemoryHighlightStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn highlights(&self) -> MutexGuard<'_, Vec<Highlight>> {
        self.highlights.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HighlightStore for MemoryHighlightStore {
    fn insert(&self, document_id: &str, page_index: usize, range: RangeDescriptor, text: &str) -> HighlightResult<()> {
        if range.page_index != page_index {
            return Err(HighlightError::InvalidRange(range.to_string()));
        }
        let mut highlights = self.highlights();
        highlights.retain(|h| !(h.document_id == document_id && h.range == range));
        highlights.push(Highlight {
            document_id: document_id.to_string(),
            range,
            text: text.to_string(),
        });
        Ok(())
    }

    fn query(&self, document_id: &str) -> HighlightResult<Vec<Highlight>> {
        Ok(self
            .highlights()
            .iter()
            .filter(|h| h.document_id == document_id)
            .cloned()
            .collect())
    }

    fn delete(&self, document_id: &str, range: &RangeDescriptor) -> HighlightResult<()> {
        self.highlights()
            .retain(|h| !(h.document_id == document_id && h.range == *range));
        Ok(())
    }
}

/// Highlight covering an element, if any.
pub fn highlight_at(highlights: &[Highlight], page_index: usize, element: usize) -> Option<&Highlight> {
    highlights
        .iter()
        .find(|h| h.range.contains(page_index, element))
}

/// Remove `removed` from every overlapping highlight of a document. A partly
/// covered highlight is split and its remaining pieces are stored again with
/// their text taken from `page`. Returns the pieces that were re-inserted.
pub fn remove_range(
    store: &dyn HighlightStore,
    document_id: &str,
    removed: &RangeDescriptor,
    page: &PageText,
) -> HighlightResult<Vec<Highlight>> {
    let overlapping: Vec<Highlight> = store
        .query(document_id)?
        .into_iter()
        .filter(|h| h.range.overlaps(removed))
        .collect();

    let mut remaining = Vec::new();
    for highlight in overlapping {
        store.delete(document_id, &highlight.range)?;
        for piece in highlight.range.subtract(removed) {
            let text = page.text(piece.start, piece.end);
            store.insert(document_id, piece.page_index, piece, &text)?;
            remaining.push(Highlight {
                document_id: document_id.to_string(),
                range: piece,
                text,
            });
        }
    }
    debug!(range = %removed, kept = remaining.len(), "highlight range removed");
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::TextElement;
    use inkleaf_model::Rect;

    fn page() -> PageText {
        let words = ["one", "two", "three", "four", "five", "six"];
        PageText {
            page_index: 2,
            render_scale: 1.0,
            bitmap_width: 400,
            bitmap_height: 50,
            elements: words
                .iter()
                .enumerate()
                .map(|(i, w)| TextElement::new(Rect::from_xywh(i as f32 * 60.0, 0.0, 50.0, 10.0), *w))
                .collect(),
        }
    }

    #[test]
    fn test_descriptor_string_form() {
        let range = RangeDescriptor::new(3, 4, 9);
        assert_eq!(range.to_string(), "p3:4-9");
        assert_eq!("p3:4-9".parse::<RangeDescriptor>().unwrap(), range);
    }

    #[test]
    fn test_descriptor_rejects_garbage() {
        for input in ["", "3:4-9", "p3:4", "px:1-2", "p1:5-2", "p1:-1-2"] {
            assert!(input.parse::<RangeDescriptor>().is_err(), "{input} should not parse");
        }
    }

    #[test]
    fn test_subtract_splits_middle() {
        let range = RangeDescriptor::new(0, 0, 5);
        let pieces = range.subtract(&RangeDescriptor::new(0, 2, 3));
        assert_eq!(pieces, vec![RangeDescriptor::new(0, 0, 1), RangeDescriptor::new(0, 4, 5)]);

        assert!(range.subtract(&RangeDescriptor::new(0, 0, 9)).is_empty());
        assert_eq!(range.subtract(&RangeDescriptor::new(1, 0, 9)), vec![range]);
    }

    #[test]
    fn test_remove_range_keeps_remainders_with_text() {
        let store = MemoryHighlightStore::new();
        let page = page();
        store
            .insert("doc", 2, RangeDescriptor::new(2, 0, 5), &page.text(0, 5))
            .unwrap();
        store
            .insert("other", 2, RangeDescriptor::new(2, 0, 5), "untouched")
            .unwrap();

        let kept = remove_range(&store, "doc", &RangeDescriptor::new(2, 2, 3), &page).unwrap();
        let texts: Vec<&str> = kept.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["one two", "five six"]);

        let stored = store.query("doc").unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|h| !h.range.contains(2, 2)));
        assert_eq!(store.query("other").unwrap().len(), 1);
    }

    #[test]
    fn test_highlight_at_finds_covering_highlight() {
        let highlights = vec![Highlight {
            document_id: "doc".to_string(),
            range: RangeDescriptor::new(1, 3, 4),
            text: "x".to_string(),
        }];
        assert!(highlight_at(&highlights, 1, 4).is_some());
        assert!(highlight_at(&highlights, 1, 5).is_none());
        assert!(highlight_at(&highlights, 0, 3).is_none());
    }
}
