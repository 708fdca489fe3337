//! Annotation document codec
//!
//! Two JSON shapes are understood:
//!
//! - legacy: `strokes`, `texts` and `gridType` at the top level, one implicit page
//! - current: `version` plus a `pages` list, each page with its own
//!   `strokes`, `texts` and `gridType`
//!
//! Encoding always produces the current shape. `decode` never fails: anything
//! unreadable becomes a blank document.

use inkleaf_model::{Annotation, Color, Document, GridStyle, Page, Point, Stroke, TextLabel, FORMAT_VERSION};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_STROKE_WIDTH: f32 = 4.0;
const DEFAULT_TEXT_SIZE: f32 = 32.0;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Which shape a payload was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Legacy,
    Paged,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pages: Option<Vec<WirePage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strokes: Option<Vec<WireStroke>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    texts: Option<Vec<WireText>>,
    #[serde(default, rename = "gridType", skip_serializing_if = "Option::is_none")]
    grid_type: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WirePage {
    #[serde(default)]
    strokes: Vec<WireStroke>,
    #[serde(default)]
    texts: Vec<WireText>,
    #[serde(default, rename = "gridType")]
    grid_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireStroke {
    points: Vec<[f32; 2]>,
    #[serde(default)]
    color: Color,
    #[serde(rename = "strokeWidth", default = "default_stroke_width")]
    stroke_width: f32,
    #[serde(rename = "isEraser", default)]
    is_eraser: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireText {
    text: String,
    x: f32,
    y: f32,
    #[serde(default)]
    color: Color,
    #[serde(rename = "textSize", default = "default_text_size")]
    text_size: f32,
}

fn default_stroke_width() -> f32 {
    DEFAULT_STROKE_WIDTH
}

fn default_text_size() -> f32 {
    DEFAULT_TEXT_SIZE
}

/// Decode a persisted document. Malformed input yields [`Document::blank`].
pub fn decode(bytes: &[u8]) -> Document {
    match try_decode(bytes) {
        Ok(document) => document,
        Err(err) => {
            warn!(%err, "unreadable annotation document; starting blank");
            Document::blank()
        }
    }
}

/// Decode a persisted document, reporting why it could not be read.
pub fn try_decode(bytes: &[u8]) -> CodecResult<Document> {
    inspect(bytes).map(|(document, _)| document)
}

/// Decode and report which shape the payload used.
pub fn inspect(bytes: &[u8]) -> CodecResult<(Document, SourceFormat)> {
    let wire: WireDocument = serde_json::from_slice(bytes)?;

    let (pages, format) = match wire.pages {
        Some(pages) if !pages.is_empty() => {
            let pages = pages
                .into_iter()
                .enumerate()
                .map(|(index, page)| page_from_wire(index, page.strokes, page.texts, page.grid_type))
                .collect();
            (pages, SourceFormat::Paged)
        }
        _ => {
            let page = page_from_wire(
                0,
                wire.strokes.unwrap_or_default(),
                wire.texts.unwrap_or_default(),
                wire.grid_type,
            );
            (vec![page], SourceFormat::Legacy)
        }
    };

    let document = Document::new(pages);
    debug!(
        pages = document.page_count(),
        annotations = document.annotation_count(),
        ?format,
        "decoded annotation document"
    );
    Ok((document, format))
}

/// Encode in the current paged shape.
pub fn encode(document: &Document) -> CodecResult<Vec<u8>> {
    Ok(serde_json::to_vec(&to_wire(document))?)
}

/// Pretty-printed variant of [`encode`], for files meant to be read by people.
pub fn encode_pretty(document: &Document) -> CodecResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&to_wire(document))?)
}

fn page_from_wire(
    index: usize,
    strokes: Vec<WireStroke>,
    texts: Vec<WireText>,
    grid_type: Option<String>,
) -> Page {
    let grid = grid_type
        .as_deref()
        .map(GridStyle::from_name)
        .unwrap_or_default();
    let mut page = Page::new(grid);

    page.annotations.extend(strokes.into_iter().filter_map(|stroke| {
        let points: Vec<Point> = stroke
            .points
            .iter()
            .map(|[x, y]| Point::new(*x, *y))
            .collect();
        if points.is_empty() {
            return None;
        }
        Some(Annotation::Stroke(Stroke::new(
            points,
            stroke.color,
            stroke.stroke_width,
            stroke.is_eraser,
            index,
        )))
    }));
    page.annotations.extend(texts.into_iter().map(|text| {
        Annotation::Text(TextLabel::new(
            text.text,
            text.x,
            text.y,
            text.color,
            text.text_size,
            index,
        ))
    }));
    page
}

fn to_wire(document: &Document) -> WireDocument {
    let pages = document
        .pages
        .iter()
        .map(|page| WirePage {
            strokes: page
                .strokes()
                .filter_map(|stroke| {
                    // JSON has no NaN; drop samples that would not survive a reload.
                    let points: Vec<[f32; 2]> = stroke
                        .points
                        .iter()
                        .filter(|p| p.x.is_finite() && p.y.is_finite())
                        .map(|p| [p.x, p.y])
                        .collect();
                    (!points.is_empty()).then(|| WireStroke {
                        points,
                        color: stroke.color,
                        stroke_width: finite_or(stroke.stroke_width, DEFAULT_STROKE_WIDTH),
                        is_eraser: stroke.is_eraser,
                    })
                })
                .collect(),
            texts: page
                .texts()
                .filter(|label| label.x.is_finite() && label.y.is_finite())
                .map(|label| WireText {
                    text: label.text.clone(),
                    x: label.x,
                    y: label.y,
                    color: label.color,
                    text_size: finite_or(label.font_size, DEFAULT_TEXT_SIZE),
                })
                .collect(),
            grid_type: Some(page.grid.as_str().to_string()),
        })
        .collect();

    WireDocument {
        version: Some(FORMAT_VERSION),
        pages: Some(pages),
        ..Default::default()
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample_document() -> Document {
        let mut first = Page::new(GridStyle::Dot);
        first.annotations.push(
            Stroke::new(
                vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)],
                Color(0xFF00_0000),
                5.0,
                false,
                0,
            )
            .into(),
        );
        first
            .annotations
            .push(Stroke::new(vec![Point::new(3.5, 4.25)], Color::WHITE, 24.0, true, 0).into());
        first
            .annotations
            .push(TextLabel::new("hello", 12.0, 40.0, Color::RED, 18.0, 0).into());

        let mut second = Page::new(GridStyle::Ruled);
        second
            .annotations
            .push(TextLabel::new("two\nlines", 1.0, 2.0, Color::BLUE, 30.0, 1).into());

        Document::new(vec![first, second])
    }

    #[test]
    fn test_round_trip_preserves_pages() {
        let document = sample_document();
        let bytes = encode(&document).unwrap();
        let decoded = try_decode(&bytes).unwrap();
        assert_eq!(decoded, document);
    }

    #[test]
    fn test_encode_emits_current_shape() {
        let mut document = Document::blank();
        document.pages[0]
            .annotations
            .push(Stroke::new(vec![Point::new(1.0, 2.0)], Color(0xFF00_0000), 5.0, false, 0).into());

        let value: Value = serde_json::from_slice(&encode(&document).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "version": 2,
                "pages": [{
                    "strokes": [{
                        "points": [[1.0, 2.0]],
                        "color": -16777216,
                        "strokeWidth": 5.0,
                        "isEraser": false
                    }],
                    "texts": [],
                    "gridType": "NONE"
                }]
            })
        );
    }

    #[test]
    fn test_legacy_payload_becomes_single_page() {
        let legacy = json!({
            "strokes": [
                {"points": [[1, 2], [3, 4]], "color": -65536, "strokeWidth": 3.0, "isEraser": false}
            ],
            "texts": [
                {"text": "old", "x": 5, "y": 6, "color": -16777216, "textSize": 20}
            ],
            "gridType": "SQUARE"
        });
        let (document, format) = inspect(legacy.to_string().as_bytes()).unwrap();

        assert_eq!(format, SourceFormat::Legacy);
        assert_eq!(document.page_count(), 1);
        let page = &document.pages[0];
        assert_eq!(page.grid, GridStyle::Square);
        let stroke = page.strokes().next().unwrap();
        assert_eq!(stroke.points, vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)]);
        assert_eq!(stroke.color, Color::RED);
        assert_eq!(page.texts().next().unwrap().text, "old");
    }

    #[test]
    fn test_empty_pages_list_falls_back_to_legacy_fields() {
        let payload = json!({"version": 2, "pages": [], "gridType": "DOT"});
        let document = decode(payload.to_string().as_bytes());
        assert_eq!(document.page_count(), 1);
        assert_eq!(document.pages[0].grid, GridStyle::Dot);
        assert!(document.pages[0].is_empty());
    }

    #[test]
    fn test_legacy_without_fields_is_one_empty_page() {
        let document = decode(b"{}");
        assert_eq!(document, Document::blank());
    }

    #[test]
    fn test_pages_take_precedence_over_legacy_fields() {
        let payload = json!({
            "pages": [{"strokes": [], "texts": [], "gridType": "RULED"}, {}],
            "strokes": [{"points": [[9, 9]], "color": 0, "strokeWidth": 1, "isEraser": false}]
        });
        let (document, format) = inspect(payload.to_string().as_bytes()).unwrap();
        assert_eq!(format, SourceFormat::Paged);
        assert_eq!(document.page_count(), 2);
        assert_eq!(document.annotation_count(), 0);
        assert_eq!(document.pages[1].grid, GridStyle::None);
    }

    #[test]
    fn test_malformed_input_decodes_blank() {
        for input in [&b"{not json"[..], b"", b"[1,2,3]", b"{\"pages\": 7}", b"\xff\xfe"] {
            let document = decode(input);
            assert_eq!(document.page_count(), 1);
            assert!(document.pages[0].is_empty());
            assert_eq!(document.pages[0].grid, GridStyle::None);
            assert!(try_decode(input).is_err());
        }
    }

    #[test]
    fn test_unknown_grid_and_missing_optional_fields() {
        let payload = json!({
            "pages": [{
                "strokes": [{"points": [[0, 0]]}],
                "texts": [{"text": "t", "x": 0, "y": 0}],
                "gridType": "HEXAGON"
            }]
        });
        let document = try_decode(payload.to_string().as_bytes()).unwrap();
        let page = &document.pages[0];
        assert_eq!(page.grid, GridStyle::None);
        assert_eq!(page.strokes().next().unwrap().stroke_width, DEFAULT_STROKE_WIDTH);
        assert_eq!(page.texts().next().unwrap().font_size, DEFAULT_TEXT_SIZE);
    }

    #[test]
    fn test_strokes_without_points_are_dropped() {
        let payload = json!({"pages": [{"strokes": [{"points": []}]}]});
        let document = try_decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(document.annotation_count(), 0);
        assert!(document.validate().is_ok());
    }

    #[test]
    fn test_reencoding_is_idempotent() {
        let document = sample_document();
        let first = encode(&document).unwrap();
        let second = encode(&decode(&first)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_finite_values_do_not_lose_the_document() {
        let mut page = Page::new(GridStyle::None);
        page.annotations
            .push(TextLabel::new("lost", f32::NAN, 0.0, Color::BLACK, 18.0, 0).into());
        page.annotations
            .push(TextLabel::new("kept", 10.0, 20.0, Color::BLACK, f32::INFINITY, 0).into());
        page.annotations.push(
            Stroke::new(vec![Point::new(1.0, 2.0)], Color::BLACK, f32::NAN, false, 0).into(),
        );
        let document = Document::new(vec![page]);

        let reloaded = try_decode(&encode(&document).unwrap()).unwrap();
        let page = &reloaded.pages[0];
        let texts: Vec<&TextLabel> = page.texts().collect();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].text, "kept");
        assert_eq!(texts[0].font_size, DEFAULT_TEXT_SIZE);
        assert_eq!(page.strokes().next().unwrap().stroke_width, DEFAULT_STROKE_WIDTH);
    }
}
