//! Text extents for hit-testing text labels.
//!
//! The host owns fonts, so measurement is injected. `ApproxTextMetrics`
//! estimates extents from character counts and is used when nothing better is
//! supplied.

use inkleaf_model::{Rect, Size, TextLabel};

pub trait TextMetrics: Send + Sync {
    /// Extent of `text` at `font_size`. Multi-line text stacks lines.
    fn measure(&self, text: &str, font_size: f32) -> Size;

    /// Distance from the top of the first line to its baseline.
    fn ascent(&self, font_size: f32) -> f32 {
        font_size * 0.8
    }

    /// World-space box of a label, unpadded.
    fn label_bounds(&self, label: &TextLabel) -> Rect {
        let size = self.measure(&label.text, label.font_size);
        Rect::from_xywh(
            label.x,
            label.y - self.ascent(label.font_size),
            size.width,
            size.height,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ApproxTextMetrics {
    /// Average glyph advance as a fraction of the font size
    pub advance: f32,
    pub line_height: f32,
}

impl Default for ApproxTextMetrics {
    fn default() -> Self {
        Self {
            advance: 0.55,
            line_height: 1.2,
        }
    }
}

impl TextMetrics for ApproxTextMetrics {
    fn measure(&self, text: &str, font_size: f32) -> Size {
        let lines: Vec<&str> = text.lines().collect();
        let widest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
        let line_count = lines.len().max(1);
        Size::new(
            (widest as f32 * font_size * self.advance).max(font_size * self.advance),
            line_count as f32 * font_size * self.line_height,
        )
    }
}
