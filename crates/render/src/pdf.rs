//! PDF page source backed by PDFium.

use crate::source::{check_size, PageSource, RenderError, RenderResult};
use image::RgbaImage;
use inkleaf_model::Size;
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// A PDF opened through PDFium.
///
/// PDFium is not re-entrant, so every call goes through one mutex. Page sizes
/// are read once at open time so layout never has to take the lock.
pub struct PdfiumPageSource {
    document: Mutex<PdfDocument<'static>>,
    page_sizes: Vec<Size>,
}

impl PdfiumPageSource {
    /// Bind to the PDFium library.
    ///
    /// Search order:
    /// 1. The executable's directory (app bundles ship the library next to the binary)
    /// 2. The current working directory
    /// 3. System library paths
    fn init_pdfium() -> RenderResult<Pdfium> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));

        if let Some(ref dir) = exe_dir {
            if let Ok(bindings) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            {
                return Ok(Pdfium::new(bindings));
            }
        }

        Ok(Pdfium::new(
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| RenderError::Initialization(e.to_string()))?,
        ))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let pdfium = Box::leak(Box::new(Self::init_pdfium()?));
        let document = pdfium
            .load_pdf_from_file(path.as_ref(), None)
            .map_err(|e| RenderError::Load(e.to_string()))?;

        let source = Self::from_document(document);
        info!(
            path = %path.as_ref().display(),
            pages = source.page_sizes.len(),
            "opened PDF"
        );
        Ok(source)
    }

    pub fn from_bytes(data: Vec<u8>) -> RenderResult<Self> {
        let pdfium = Box::leak(Box::new(Self::init_pdfium()?));
        let data: &'static [u8] = Box::leak(data.into_boxed_slice());
        let document = pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(|e| RenderError::Load(e.to_string()))?;
        Ok(Self::from_document(document))
    }

    fn from_document(document: PdfDocument<'static>) -> Self {
        let page_sizes = document
            .pages()
            .iter()
            .map(|page| Size::new(page.width().value, page.height().value))
            .collect();
        Self {
            document: Mutex::new(document),
            page_sizes,
        }
    }

    fn document(&self) -> MutexGuard<'_, PdfDocument<'static>> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PageSource for PdfiumPageSource {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn page_size(&self, index: usize) -> Option<Size> {
        self.page_sizes.get(index).copied()
    }

    fn render(&self, index: usize, width: u32, height: u32) -> RenderResult<RgbaImage> {
        if index >= self.page_sizes.len() {
            return Err(RenderError::PageNotFound(index));
        }
        check_size(width, height)?;
        let page_index = u16::try_from(index).map_err(|_| RenderError::PageNotFound(index))?;

        let document = self.document();
        let page = document
            .pages()
            .get(page_index)
            .map_err(|_| RenderError::PageNotFound(index))?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        let rgba = bitmap.as_rgba_bytes().to_vec();

        // PDFium keeps the aspect ratio, so the bitmap can be a pixel off the
        // requested size. Derive the real height from the buffer length.
        let actual_width = width;
        let actual_height = (rgba.len() / (actual_width as usize * 4)) as u32;
        debug!(
            page = index,
            width = actual_width,
            height = actual_height,
            "rendered PDF page"
        );
        RgbaImage::from_raw(actual_width, actual_height, rgba).ok_or_else(|| {
            RenderError::Backend(format!(
                "bitmap buffer does not match {}x{}",
                actual_width, actual_height
            ))
        })
    }
}
