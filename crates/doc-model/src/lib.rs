//! Inkleaf document model
//!
//! Geometry primitives, colors and the multi-page annotation document shared by
//! the renderer, the cache and the editor core.

pub mod annotation;
pub mod color;
pub mod document;
pub mod geometry;

pub use annotation::{Annotation, Stroke, TextLabel};
pub use color::Color;
pub use document::{clamp_page_index, Document, GridStyle, ModelError, Page, FORMAT_VERSION};
pub use geometry::{polygon_contains, Point, Rect, Size};
