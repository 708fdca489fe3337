//! Text recognition capability
//!
//! The engine never recognizes text itself. A [`TextRecognizer`] turns a page
//! bitmap into positioned [`TextElement`]s in reading order; hosts inject
//! whatever engine they have. With the `tesseract` feature enabled,
//! [`TesseractRecognizer`] runs the system Tesseract through `rusty-tesseract`.

use image::RgbaImage;
use inkleaf_model::Rect;
use thiserror::Error;

/// A recognized word and its box in bitmap pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    pub bounds: Rect,
    pub text: String,
}

impl TextElement {
    pub fn new(bounds: Rect, text: impl Into<String>) -> Self {
        Self {
            bounds,
            text: text.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),

    #[error("recognition failed: {0}")]
    Failed(String),
}

pub trait TextRecognizer: Send + Sync {
    /// Elements in reading order.
    fn recognize(&self, bitmap: &RgbaImage) -> Result<Vec<TextElement>, RecognitionError>;
}

/// Recognizer backed by a closure.
pub struct FnRecognizer<F>(pub F);

impl<F> TextRecognizer for FnRecognizer<F>
where
    F: Fn(&RgbaImage) -> Result<Vec<TextElement>, RecognitionError> + Send + Sync,
{
    fn recognize(&self, bitmap: &RgbaImage) -> Result<Vec<TextElement>, RecognitionError> {
        (self.0)(bitmap)
    }
}

/// Recognizer for hosts without a recognition engine. Always fails, so text
/// selection silently does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRecognizer;

impl TextRecognizer for NoRecognizer {
    fn recognize(&self, _bitmap: &RgbaImage) -> Result<Vec<TextElement>, RecognitionError> {
        Err(RecognitionError::Unavailable("no recognizer configured".to_string()))
    }
}

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;

#[cfg(feature = "tesseract")]
mod tesseract {
    use super::{RecognitionError, TextElement, TextRecognizer};
    use image::{DynamicImage, RgbaImage};
    use inkleaf_model::Rect;
    use rusty_tesseract::{Args, Image};
    use std::collections::HashMap;
    use tracing::debug;

    /// Word-level recognition through the system `tesseract` binary.
    #[derive(Debug, Clone)]
    pub struct TesseractRecognizer {
        pub lang: String,
        pub dpi: i32,
        /// Words below this confidence are dropped
        pub min_confidence: f32,
    }

    impl Default for TesseractRecognizer {
        fn default() -> Self {
            Self {
                lang: "eng".to_string(),
                dpi: 150,
                min_confidence: 0.0,
            }
        }
    }

    impl TextRecognizer for TesseractRecognizer {
        fn recognize(&self, bitmap: &RgbaImage) -> Result<Vec<TextElement>, RecognitionError> {
            let dynamic = DynamicImage::ImageRgba8(bitmap.clone());
            let image = Image::from_dynamic_image(&dynamic)
                .map_err(|err| RecognitionError::Failed(err.to_string()))?;
            let args = Args {
                lang: self.lang.clone(),
                config_variables: HashMap::new(),
                dpi: Some(self.dpi),
                // Sparse text; pages mix columns, captions and figures.
                psm: Some(11),
                oem: Some(3),
            };

            let output = rusty_tesseract::image_to_data(&image, &args)
                .map_err(|err| RecognitionError::Unavailable(err.to_string()))?;

            let mut words: Vec<_> = output
                .data
                .into_iter()
                .filter(|d| !d.text.trim().is_empty() && d.conf > self.min_confidence)
                .collect();
            words.sort_by_key(|d| (d.block_num, d.par_num, d.line_num, d.word_num));

            let elements: Vec<TextElement> = words
                .into_iter()
                .map(|d| {
                    let bounds =
                        Rect::from_xywh(d.left as f32, d.top as f32, d.width as f32, d.height as f32);
                    TextElement::new(bounds, d.text.trim())
                })
                .collect();
            debug!(
                width = bitmap.width(),
                height = bitmap.height(),
                words = elements.len(),
                "tesseract finished"
            );
            Ok(elements)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_recognizer_forwards_to_closure() {
        let recognizer = FnRecognizer(|bitmap: &RgbaImage| {
            Ok(vec![TextElement::new(
                Rect::from_xywh(0.0, 0.0, bitmap.width() as f32, 10.0),
                "wide",
            )])
        });
        let elements = recognizer.recognize(&RgbaImage::new(40, 20)).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].bounds.width(), 40.0);
    }

    #[test]
    fn test_no_recognizer_always_fails() {
        assert!(matches!(
            NoRecognizer.recognize(&RgbaImage::new(1, 1)),
            Err(RecognitionError::Unavailable(_))
        ));
    }
}
