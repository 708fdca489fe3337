use crate::annotation::{Annotation, Stroke, TextLabel};
use serde::{Deserialize, Serialize};

/// Current persisted format version.
pub const FORMAT_VERSION: u32 = 2;

/// Background grid drawn behind the ink layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GridStyle {
    #[default]
    None,
    Dot,
    Square,
    Ruled,
}

impl GridStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridStyle::None => "NONE",
            GridStyle::Dot => "DOT",
            GridStyle::Square => "SQUARE",
            GridStyle::Ruled => "RULED",
        }
    }

    /// Lenient parse used by the codec; unknown names map to `None`.
    pub fn from_name(name: &str) -> GridStyle {
        match name.trim().to_ascii_uppercase().as_str() {
            "DOT" => GridStyle::Dot,
            "SQUARE" => GridStyle::Square,
            "RULED" => GridStyle::Ruled,
            _ => GridStyle::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub annotations: Vec<Annotation>,
    pub grid: GridStyle,
}

impl Page {
    pub fn new(grid: GridStyle) -> Self {
        Self { annotations: Vec::new(), grid }
    }

    pub fn strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.annotations.iter().filter_map(Annotation::as_stroke)
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextLabel> {
        self.annotations.iter().filter_map(Annotation::as_text)
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelError {
    #[error("stroke {annotation} on page {page} has no points")]
    EmptyStroke { page: usize, annotation: usize },
    #[error("annotation {annotation} on page {page} claims page index {claimed}")]
    PageIndexMismatch { page: usize, annotation: usize, claimed: usize },
    #[error("document has no pages")]
    NoPages,
}

/// Multi-page annotation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(pages: Vec<Page>) -> Self {
        Self { version: FORMAT_VERSION, pages }
    }

    /// A single empty page without grid; the fallback for new and unreadable documents.
    pub fn blank() -> Self {
        Self::new(vec![Page::new(GridStyle::None)])
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Clamp any requested index into `[0, page_count)`.
    pub fn clamp_page_index(&self, index: i64) -> usize {
        clamp_page_index(index, self.page_count())
    }

    pub fn annotation_count(&self) -> usize {
        self.pages.iter().map(|page| page.annotations.len()).sum()
    }

    /// Check the structural invariants of the model.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.pages.is_empty() {
            return Err(ModelError::NoPages);
        }
        for (page_index, page) in self.pages.iter().enumerate() {
            for (i, annotation) in page.annotations.iter().enumerate() {
                if annotation.page_index() != page_index {
                    return Err(ModelError::PageIndexMismatch {
                        page: page_index,
                        annotation: i,
                        claimed: annotation.page_index(),
                    });
                }
                if let Annotation::Stroke(stroke) = annotation {
                    if stroke.points.is_empty() {
                        return Err(ModelError::EmptyStroke { page: page_index, annotation: i });
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::blank()
    }
}

/// Clamp a possibly negative page index into `[0, page_count)`.
///
/// Returns 0 when there are no pages.
pub fn clamp_page_index(index: i64, page_count: usize) -> usize {
    if page_count == 0 || index <= 0 {
        return 0;
    }
    (index as u64).min(page_count as u64 - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::Point;

    #[test]
    fn test_blank_document_has_one_empty_page() {
        let doc = Document::blank();
        assert_eq!(doc.version, FORMAT_VERSION);
        assert_eq!(doc.page_count(), 1);
        assert!(doc.pages[0].is_empty());
        assert_eq!(doc.pages[0].grid, GridStyle::None);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_clamp_handles_negative_and_overflow() {
        assert_eq!(clamp_page_index(-3, 5), 0);
        assert_eq!(clamp_page_index(2, 5), 2);
        assert_eq!(clamp_page_index(9, 5), 4);
        assert_eq!(clamp_page_index(3, 0), 0);
    }

    #[test]
    fn test_grid_names_round_trip() {
        for grid in [GridStyle::None, GridStyle::Dot, GridStyle::Square, GridStyle::Ruled] {
            assert_eq!(GridStyle::from_name(grid.as_str()), grid);
        }
        assert_eq!(GridStyle::from_name("HEXAGON"), GridStyle::None);
        assert_eq!(GridStyle::from_name("dot"), GridStyle::Dot);
    }

    #[test]
    fn test_validate_rejects_misplaced_annotation() {
        let mut doc = Document::new(vec![Page::default(), Page::default()]);
        doc.pages[1]
            .annotations
            .push(Stroke::new(vec![Point::ZERO], Color::BLACK, 2.0, false, 0).into());

        assert_eq!(
            doc.validate(),
            Err(ModelError::PageIndexMismatch { page: 1, annotation: 0, claimed: 0 })
        );
    }

    #[test]
    fn test_validate_rejects_empty_stroke() {
        let mut doc = Document::blank();
        doc.pages[0].annotations.push(Stroke::new(Vec::new(), Color::BLACK, 2.0, false, 0).into());
        assert_eq!(doc.validate(), Err(ModelError::EmptyStroke { page: 0, annotation: 0 }));
    }
}
