//! Vertically stacked page layout
//!
//! Every page is scaled so its intrinsic width fills the viewport width minus a
//! fixed horizontal gap on each side. Pages are stacked top to bottom with a
//! fixed vertical gap between them (and above the first page). All rectangles
//! are in world coordinates, i.e. screen pixels at zoom 1 with no panning.

use inkleaf_model::{Rect, Size};

/// Gaps around and between pages, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub horizontal_gap: f32,
    pub vertical_gap: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_gap: 16.0,
            vertical_gap: 24.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSlot {
    /// Source page size in its own units (points for PDF).
    pub intrinsic: Size,
    /// Display rectangle in world coordinates.
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    config: LayoutConfig,
    viewport_width: f32,
    slots: Vec<PageSlot>,
}

impl PageLayout {
    pub fn new(page_sizes: &[Size], viewport_width: f32, config: LayoutConfig) -> Self {
        let display_width = (viewport_width - 2.0 * config.horizontal_gap).max(1.0);
        let mut cursor = config.vertical_gap;
        let slots = page_sizes
            .iter()
            .map(|intrinsic| {
                let height = if intrinsic.width > 0.0 {
                    intrinsic.height * display_width / intrinsic.width
                } else {
                    display_width
                };
                let rect = Rect::from_xywh(config.horizontal_gap, cursor, display_width, height);
                cursor += height + config.vertical_gap;
                PageSlot {
                    intrinsic: *intrinsic,
                    rect,
                }
            })
            .collect();

        Self {
            config,
            viewport_width,
            slots,
        }
    }

    /// Rebuild for a new viewport width, keeping the page sizes.
    pub fn relayout(&mut self, viewport_width: f32) {
        let sizes: Vec<Size> = self.slots.iter().map(|slot| slot.intrinsic).collect();
        *self = PageLayout::new(&sizes, viewport_width, self.config);
    }

    pub fn page_count(&self) -> usize {
        self.slots.len()
    }

    pub fn viewport_width(&self) -> f32 {
        self.viewport_width
    }

    pub fn config(&self) -> LayoutConfig {
        self.config
    }

    pub fn slot(&self, index: usize) -> Option<&PageSlot> {
        self.slots.get(index)
    }

    pub fn page_rect(&self, index: usize) -> Option<Rect> {
        self.slots.get(index).map(|slot| slot.rect)
    }

    pub fn page_top(&self, index: usize) -> Option<f32> {
        self.page_rect(index).map(|rect| rect.top)
    }

    /// Display pixels per intrinsic unit for a page.
    pub fn display_scale(&self, index: usize) -> Option<f32> {
        let slot = self.slots.get(index)?;
        if slot.intrinsic.width <= 0.0 {
            return None;
        }
        Some(slot.rect.width() / slot.intrinsic.width)
    }

    /// Height of the whole stack including the trailing gap.
    pub fn total_height(&self) -> f32 {
        self.slots
            .last()
            .map(|slot| slot.rect.bottom + self.config.vertical_gap)
            .unwrap_or(0.0)
    }

    /// Page at a vertical offset. A gap belongs to the page above it; offsets
    /// past the end map to the last page.
    pub fn page_at(&self, y: f32) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        for (index, slot) in self.slots.iter().enumerate() {
            if y <= slot.rect.bottom + self.config.vertical_gap {
                return Some(index);
            }
        }
        Some(self.slots.len() - 1)
    }

    /// Page whose display rectangle actually contains the point.
    pub fn page_containing(&self, x: f32, y: f32) -> Option<usize> {
        let point = inkleaf_model::Point::new(x, y);
        self.slots.iter().position(|slot| slot.rect.contains(&point))
    }

    /// Inclusive range of pages intersecting the vertical band `[top, bottom]`.
    pub fn visible_range(&self, top: f32, bottom: f32) -> Option<(usize, usize)> {
        let (top, bottom) = if top <= bottom { (top, bottom) } else { (bottom, top) };
        let first = self.slots.iter().position(|slot| slot.rect.bottom >= top)?;
        let last = self
            .slots
            .iter()
            .rposition(|slot| slot.rect.top <= bottom)?;
        if last < first {
            // The band sits entirely inside a gap.
            return Some((first, first));
        }
        Some((first, last))
    }

    /// Page under the centre of the band, used for page-changed notifications.
    pub fn current_page(&self, top: f32, bottom: f32) -> Option<usize> {
        self.page_at(((top + bottom) / 2.0).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter_pages(count: usize) -> Vec<Size> {
        vec![Size::new(612.0, 792.0); count]
    }

    fn layout(count: usize) -> PageLayout {
        PageLayout::new(
            &letter_pages(count),
            1032.0,
            LayoutConfig {
                horizontal_gap: 16.0,
                vertical_gap: 20.0,
            },
        )
    }

    #[test]
    fn test_fit_width_scales_height_proportionally() {
        let layout = layout(1);
        let rect = layout.page_rect(0).unwrap();
        assert_eq!(rect.left, 16.0);
        assert_eq!(rect.width(), 1000.0);
        assert!((rect.height() - 792.0 * 1000.0 / 612.0).abs() < 0.01);
        assert!((layout.display_scale(0).unwrap() - 1000.0 / 612.0).abs() < 1e-4);
    }

    #[test]
    fn test_pages_stack_with_gaps() {
        let layout = layout(3);
        let first = layout.page_rect(0).unwrap();
        let second = layout.page_rect(1).unwrap();
        assert_eq!(first.top, 20.0);
        assert!((second.top - (first.bottom + 20.0)).abs() < 0.001);
        assert!((layout.total_height() - (layout.page_rect(2).unwrap().bottom + 20.0)).abs() < 0.001);
    }

    #[test]
    fn test_visible_range_tracks_band() {
        let layout = layout(5);
        let page_height = layout.page_rect(0).unwrap().height();

        assert_eq!(layout.visible_range(0.0, page_height / 2.0), Some((0, 0)));

        let second_top = layout.page_top(1).unwrap();
        assert_eq!(layout.visible_range(second_top - 5.0, second_top + 5.0), Some((0, 1)));

        let past_end = layout.total_height() + 500.0;
        assert_eq!(layout.visible_range(past_end, past_end + 10.0), None);
    }

    #[test]
    fn test_band_inside_gap_reports_next_page() {
        let layout = layout(3);
        let gap_top = layout.page_rect(0).unwrap().bottom + 2.0;
        assert_eq!(layout.visible_range(gap_top, gap_top + 5.0), Some((1, 1)));
    }

    #[test]
    fn test_page_at_assigns_gap_to_page_above() {
        let layout = layout(3);
        let first = layout.page_rect(0).unwrap();
        assert_eq!(layout.page_at(first.bottom + 10.0), Some(0));
        assert_eq!(layout.page_at(1.0e9), Some(2));
        assert_eq!(PageLayout::new(&[], 100.0, LayoutConfig::default()).page_at(0.0), None);
    }

    #[test]
    fn test_relayout_keeps_page_count() {
        let mut layout = layout(2);
        layout.relayout(532.0);
        assert_eq!(layout.page_count(), 2);
        assert_eq!(layout.page_rect(0).unwrap().width(), 500.0);
    }
}
