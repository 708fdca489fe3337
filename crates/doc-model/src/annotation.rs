//! Annotation data model
//!
//! An annotation is either a freehand ink stroke or a text label. Both are
//! stored in world coordinates and carry the index of the page they belong to.

use crate::color::Color;
use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Freehand ink stroke.
///
/// A committed stroke always has at least one point. Eraser strokes are
/// ordinary strokes drawn with destination-clear compositing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub color: Color,
    pub stroke_width: f32,
    pub is_eraser: bool,
    pub page_index: usize,
}

impl Stroke {
    pub fn new(points: Vec<Point>, color: Color, stroke_width: f32, is_eraser: bool, page_index: usize) -> Self {
        Self { points, color, stroke_width, is_eraser, page_index }
    }

    /// Bounding box of the sample points, not inflated by the stroke width.
    pub fn bounds(&self) -> Option<Rect> {
        Rect::from_points(&self.points)
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        for point in &mut self.points {
            point.x += dx;
            point.y += dy;
        }
    }
}

/// Text placed on the canvas. `(x, y)` is the left end of the first baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLabel {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub color: Color,
    pub font_size: f32,
    pub page_index: usize,
}

impl TextLabel {
    pub fn new(text: impl Into<String>, x: f32, y: f32, color: Color, font_size: f32, page_index: usize) -> Self {
        Self { text: text.into(), x, y, color, font_size, page_index }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }
}

/// Committed annotation.
///
/// Standalone serialization carries an explicit `kind` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Stroke(Stroke),
    Text(TextLabel),
}

impl Annotation {
    pub fn page_index(&self) -> usize {
        match self {
            Annotation::Stroke(stroke) => stroke.page_index,
            Annotation::Text(label) => label.page_index,
        }
    }

    pub fn set_page_index(&mut self, page_index: usize) {
        match self {
            Annotation::Stroke(stroke) => stroke.page_index = page_index,
            Annotation::Text(label) => label.page_index = page_index,
        }
    }

    pub fn as_stroke(&self) -> Option<&Stroke> {
        match self {
            Annotation::Stroke(stroke) => Some(stroke),
            Annotation::Text(_) => None,
        }
    }

    pub fn as_stroke_mut(&mut self) -> Option<&mut Stroke> {
        match self {
            Annotation::Stroke(stroke) => Some(stroke),
            Annotation::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextLabel> {
        match self {
            Annotation::Text(label) => Some(label),
            Annotation::Stroke(_) => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextLabel> {
        match self {
            Annotation::Text(label) => Some(label),
            Annotation::Stroke(_) => None,
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        match self {
            Annotation::Stroke(stroke) => stroke.translate(dx, dy),
            Annotation::Text(label) => label.translate(dx, dy),
        }
    }
}

impl From<Stroke> for Annotation {
    fn from(stroke: Stroke) -> Self {
        Annotation::Stroke(stroke)
    }
}

impl From<TextLabel> for Annotation {
    fn from(label: TextLabel) -> Self {
        Annotation::Text(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_bounds_and_translate() {
        let mut stroke = Stroke::new(
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)],
            Color::BLACK,
            5.0,
            false,
            0,
        );
        assert_eq!(stroke.bounds(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));

        stroke.translate(3.0, -2.0);
        assert_eq!(stroke.points[0], Point::new(3.0, -2.0));
        assert_eq!(stroke.points[2], Point::new(13.0, 8.0));
    }

    #[test]
    fn test_annotation_kind_discriminator() {
        let annotation = Annotation::Text(TextLabel::new("hi", 1.0, 2.0, Color::RED, 24.0, 3));
        let value = serde_json::to_value(&annotation).unwrap();
        assert_eq!(value["kind"], "text");
        assert_eq!(value["page_index"], 3);

        let back: Annotation = serde_json::from_value(value).unwrap();
        assert_eq!(back, annotation);
    }

    #[test]
    fn test_page_index_accessors() {
        let mut annotation: Annotation =
            Stroke::new(vec![Point::ZERO], Color::BLACK, 1.0, true, 1).into();
        assert_eq!(annotation.page_index(), 1);
        annotation.set_page_index(4);
        assert_eq!(annotation.page_index(), 4);
        assert!(annotation.as_text().is_none());
        assert!(annotation.as_stroke().unwrap().is_eraser);
    }
}
