//! Inkleaf render library
//!
//! Page layout, page rasterizers and the tiny-skia compositor used to draw
//! page bitmaps, grids, ink and overlays into a frame.

pub mod ink;
pub mod layout;
pub mod pdf;
pub mod source;

pub use ink::{
    draw_dashed_outline, draw_grid, draw_handle, draw_lasso, draw_page_bitmap, fill_rect, fill_rects,
    pixmap_to_image, smoothed_path, BlockLabelPainter, GridAppearance, InkLayer, LabelPainter,
};
pub use layout::{LayoutConfig, PageLayout, PageSlot};
pub use pdf::PdfiumPageSource;
pub use source::{BlankPageSource, PageSource, RenderError, RenderResult};

pub use tiny_skia::{Pixmap, Transform};
