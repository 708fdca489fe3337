//! Page sources
//!
//! A page source knows how many fixed-size pages a document has and can
//! rasterize any of them to an RGBA bitmap of a requested pixel size. Sources
//! are shared with render workers, so they must be `Send + Sync`.

use image::{Rgba, RgbaImage};
use inkleaf_model::Size;
use thiserror::Error;

/// Errors that can occur while rasterizing pages
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page {0} does not exist")]
    PageNotFound(usize),

    #[error("invalid target size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("rasterizer initialization failed: {0}")]
    Initialization(String),

    #[error("failed to load document: {0}")]
    Load(String),

    #[error("rasterizer error: {0}")]
    Backend(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

pub trait PageSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Intrinsic page size, or `None` for an index past the end.
    fn page_size(&self, index: usize) -> Option<Size>;

    /// Rasterize a page to exactly `width` x `height` pixels.
    fn render(&self, index: usize, width: u32, height: u32) -> RenderResult<RgbaImage>;

    /// Intrinsic sizes of every page, in order.
    fn page_sizes(&self) -> Vec<Size> {
        (0..self.page_count())
            .filter_map(|index| self.page_size(index))
            .collect()
    }
}

/// Uniform blank pages, used for whiteboards and as a stand-in document.
#[derive(Debug, Clone)]
pub struct BlankPageSource {
    page_count: usize,
    page_size: Size,
    background: Rgba<u8>,
}

impl BlankPageSource {
    /// US Letter in points.
    pub const LETTER: Size = Size {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(page_count: usize, page_size: Size) -> Self {
        Self {
            page_count,
            page_size,
            background: Rgba([255, 255, 255, 255]),
        }
    }

    pub fn with_background(mut self, background: Rgba<u8>) -> Self {
        self.background = background;
        self
    }
}

impl PageSource for BlankPageSource {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, index: usize) -> Option<Size> {
        (index < self.page_count).then_some(self.page_size)
    }

    fn render(&self, index: usize, width: u32, height: u32) -> RenderResult<RgbaImage> {
        if index >= self.page_count {
            return Err(RenderError::PageNotFound(index));
        }
        check_size(width, height)?;
        Ok(RgbaImage::from_pixel(width, height, self.background))
    }
}

/// Reject zero-sized and absurdly large targets before allocating.
pub(crate) fn check_size(width: u32, height: u32) -> RenderResult<()> {
    const MAX_SIDE: u32 = 16_384;
    if width == 0 || height == 0 || width > MAX_SIDE || height > MAX_SIDE {
        return Err(RenderError::InvalidSize { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_source_renders_requested_size() {
        let source = BlankPageSource::new(3, BlankPageSource::LETTER);
        let image = source.render(1, 120, 80).unwrap();
        assert_eq!(image.dimensions(), (120, 80));
        assert_eq!(image.get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_blank_source_rejects_missing_page() {
        let source = BlankPageSource::new(2, BlankPageSource::LETTER);
        assert!(matches!(source.render(2, 10, 10), Err(RenderError::PageNotFound(2))));
        assert!(source.page_size(2).is_none());
    }

    #[test]
    fn test_zero_size_is_invalid() {
        let source = BlankPageSource::new(1, BlankPageSource::LETTER);
        assert!(matches!(
            source.render(0, 0, 10),
            Err(RenderError::InvalidSize { width: 0, height: 10 })
        ));
    }

    #[test]
    fn test_page_sizes_lists_every_page() {
        let source = BlankPageSource::new(4, Size::new(100.0, 200.0));
        assert_eq!(source.page_sizes(), vec![Size::new(100.0, 200.0); 4]);
    }
}
