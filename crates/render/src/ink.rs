//! Ink and grid compositing with tiny-skia
//!
//! Strokes are drawn into their own transparent layer. Eraser strokes punch
//! holes in that layer with `BlendMode::Clear`, and the layer is then
//! composited over the page background and grid, so erasing reveals whatever
//! lies underneath instead of painting a colour.

use image::RgbaImage;
use inkleaf_model::{Color, GridStyle, Point, Rect, Stroke, TextLabel};
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap,
    PixmapPaint, PixmapRef, StrokeDash, Transform,
};

/// Grid colours and spacing, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridAppearance {
    pub spacing: f32,
    pub color: Color,
    pub line_width: f32,
    pub dot_radius: f32,
}

impl Default for GridAppearance {
    fn default() -> Self {
        Self {
            spacing: 32.0,
            color: Color(0xFFD0_D4DA),
            line_width: 1.0,
            dot_radius: 1.5,
        }
    }
}

/// Draws text labels. Glyph shaping belongs to the host, so the compositor
/// only hands over the label and the world-to-screen transform.
pub trait LabelPainter {
    fn paint_label(&self, pixmap: &mut Pixmap, label: &TextLabel, transform: Transform);
}

/// Stand-in painter that fills the approximate extent of each line of text.
///
/// Used where no font stack is available (headless rendering, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockLabelPainter;

impl LabelPainter for BlockLabelPainter {
    fn paint_label(&self, pixmap: &mut Pixmap, label: &TextLabel, transform: Transform) {
        let mut paint = solid_paint(label.color);
        let (r, g, b, a) = label.color.to_rgba8();
        paint.set_color_rgba8(r, g, b, a / 3);

        let line_height = label.font_size * 1.2;
        for (line_index, line) in label.text.lines().enumerate() {
            let width = line.chars().count() as f32 * label.font_size * 0.55;
            let baseline = label.y + line_index as f32 * line_height;
            let Some(rect) = tiny_skia::Rect::from_xywh(
                label.x,
                baseline - label.font_size * 0.8,
                width.max(1.0),
                label.font_size,
            ) else {
                continue;
            };
            pixmap.fill_rect(rect, &paint, transform, None);
        }
    }
}

/// Transparent layer holding the committed and in-progress ink.
pub struct InkLayer {
    pixmap: Pixmap,
}

impl InkLayer {
    /// `None` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Pixmap::new(width, height).map(|pixmap| Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Draw one stroke. Eraser strokes clear the layer under their path.
    pub fn draw_stroke(&mut self, stroke: &Stroke, transform: Transform) {
        let mut paint = solid_paint(stroke.color);
        if stroke.is_eraser {
            paint.blend_mode = BlendMode::Clear;
        }

        if stroke.points.len() == 1 {
            let p = stroke.points[0];
            if let Some(dot) = PathBuilder::from_circle(p.x, p.y, (stroke.stroke_width / 2.0).max(0.5)) {
                self.pixmap
                    .fill_path(&dot, &paint, FillRule::Winding, transform, None);
            }
            return;
        }

        let Some(path) = smoothed_path(&stroke.points) else {
            return;
        };
        let pen = tiny_skia::Stroke {
            width: stroke.stroke_width.max(0.1),
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Default::default()
        };
        self.pixmap.stroke_path(&path, &paint, &pen, transform, None);
    }

    pub fn draw_strokes<'a>(&mut self, strokes: impl IntoIterator<Item = &'a Stroke>, transform: Transform) {
        for stroke in strokes {
            self.draw_stroke(stroke, transform);
        }
    }

    /// Source-over the layer onto `target` at the origin.
    pub fn composite_onto(&self, target: &mut Pixmap) {
        target.draw_pixmap(
            0,
            0,
            self.pixmap.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
}

/// Quadratic midpoint smoothing: each sample becomes the control point of a
/// curve ending halfway to the next sample, and the path ends on the last
/// sample with a straight segment.
pub fn smoothed_path(points: &[Point]) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut builder = PathBuilder::new();
    builder.move_to(first.x, first.y);

    let mut previous = *first;
    for point in rest {
        let mid = previous.midpoint(point);
        builder.quad_to(previous.x, previous.y, mid.x, mid.y);
        previous = *point;
    }
    builder.line_to(previous.x, previous.y);
    builder.finish()
}

/// Paint the grid for one page. `area` is the page rectangle in screen pixels
/// and `scale` converts world units to screen pixels.
///
/// Only the part of `area` inside the pixmap is walked, so the cost of a frame
/// does not depend on how far the page extends off screen.
pub fn draw_grid(pixmap: &mut Pixmap, grid: GridStyle, area: Rect, scale: f32, appearance: &GridAppearance) {
    let spacing = appearance.spacing * scale;
    if grid == GridStyle::None || !spacing.is_finite() || spacing < 2.0 {
        return;
    }
    let bounds = Rect::new(0.0, 0.0, pixmap.width() as f32, pixmap.height() as f32).padded(spacing);
    let Some(clip) = area.intersection(&bounds) else {
        return;
    };

    let paint = solid_paint(appearance.color);
    let mut builder = PathBuilder::new();
    let rows = grid_lines(area.top, clip.top, clip.bottom, spacing);

    match grid {
        GridStyle::None => return,
        GridStyle::Dot => {
            let radius = (appearance.dot_radius * scale).max(0.75);
            for y in rows {
                for x in grid_lines(area.left, clip.left, clip.right, spacing) {
                    builder.push_circle(x, y, radius);
                }
            }
            if let Some(path) = builder.finish() {
                pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
            }
            return;
        }
        GridStyle::Square => {
            for x in grid_lines(area.left, clip.left, clip.right, spacing) {
                builder.move_to(x, clip.top);
                builder.line_to(x, clip.bottom);
            }
            push_horizontal_rules(&mut builder, rows, clip);
        }
        GridStyle::Ruled => push_horizontal_rules(&mut builder, rows, clip),
    }

    if let Some(path) = builder.finish() {
        let pen = tiny_skia::Stroke {
            width: (appearance.line_width * scale).max(1.0),
            ..Default::default()
        };
        pixmap.stroke_path(&path, &paint, &pen, Transform::identity(), None);
    }
}

/// Positions of the lines `origin + k * spacing` (k >= 1) inside `[from, to)`.
///
/// Computed in f64 from the line index: with a far-away origin, repeatedly
/// adding `spacing` to an f32 stops advancing.
fn grid_lines(origin: f32, from: f32, to: f32, spacing: f32) -> impl Iterator<Item = f32> {
    let (origin, spacing) = (f64::from(origin), f64::from(spacing));
    let first = ((f64::from(from) - origin) / spacing).ceil().max(1.0);
    let last = ((f64::from(to) - origin) / spacing).ceil() - 1.0;
    let count = if last >= first { (last - first) as u64 + 1 } else { 0 };
    (0..count).map(move |k| (origin + (first + k as f64) * spacing) as f32)
}

fn push_horizontal_rules(builder: &mut PathBuilder, rows: impl Iterator<Item = f32>, clip: Rect) {
    for y in rows {
        builder.move_to(clip.left, y);
        builder.line_to(clip.right, y);
    }
}

/// Draw a rendered page bitmap stretched into `dest` (screen pixels).
///
/// Page bitmaps are opaque, so straight and premultiplied alpha coincide.
pub fn draw_page_bitmap(pixmap: &mut Pixmap, image: &RgbaImage, dest: Rect) {
    let (width, height) = image.dimensions();
    let Some(source) = PixmapRef::from_bytes(image.as_raw(), width, height) else {
        return;
    };
    let transform = Transform::from_row(
        dest.width() / width as f32,
        0.0,
        0.0,
        dest.height() / height as f32,
        dest.left,
        dest.top,
    );
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..Default::default()
    };
    pixmap.draw_pixmap(0, 0, source, &paint, transform, None);
}

/// Fill a plain rectangle, used for page backgrounds.
pub fn fill_rect(pixmap: &mut Pixmap, rect: Rect, color: Color) {
    if let Some(rect) = to_skia_rect(rect) {
        pixmap.fill_rect(rect, &solid_paint(color), Transform::identity(), None);
    }
}

/// Translucent fills for text selections and highlights.
pub fn fill_rects<'a>(pixmap: &mut Pixmap, rects: impl IntoIterator<Item = &'a Rect>, color: Color) {
    let paint = solid_paint(color);
    for rect in rects {
        if let Some(rect) = to_skia_rect(*rect) {
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }
}

/// Dashed outline around a stroke selection or the current text label.
pub fn draw_dashed_outline(pixmap: &mut Pixmap, rect: Rect, color: Color) {
    let Some(skia_rect) = to_skia_rect(rect) else {
        return;
    };
    let path = PathBuilder::from_rect(skia_rect);
    let pen = tiny_skia::Stroke {
        width: 1.5,
        dash: StrokeDash::new(vec![6.0, 4.0], 0.0),
        ..Default::default()
    };
    pixmap.stroke_path(&path, &solid_paint(color), &pen, Transform::identity(), None);
}

/// Dashed closed outline of a lasso polygon given in world coordinates.
pub fn draw_lasso(pixmap: &mut Pixmap, polygon: &[Point], transform: Transform, color: Color) {
    let Some((first, rest)) = polygon.split_first() else {
        return;
    };
    let mut builder = PathBuilder::new();
    builder.move_to(first.x, first.y);
    for point in rest {
        builder.line_to(point.x, point.y);
    }
    builder.close();
    let Some(path) = builder.finish().and_then(|path| path.transform(transform)) else {
        return;
    };
    let pen = tiny_skia::Stroke {
        width: 1.5,
        dash: StrokeDash::new(vec![6.0, 4.0], 0.0),
        ..Default::default()
    };
    pixmap.stroke_path(&path, &solid_paint(color), &pen, Transform::identity(), None);
}

/// Filled circular handle (text remove and resize controls).
pub fn draw_handle(pixmap: &mut Pixmap, center: Point, radius: f32, color: Color) {
    if let Some(path) = PathBuilder::from_circle(center.x, center.y, radius) {
        pixmap.fill_path(&path, &solid_paint(color), FillRule::Winding, Transform::identity(), None);
    }
}

/// Copy a pixmap into an `RgbaImage` with straight alpha, e.g. for PNG output.
pub fn pixmap_to_image(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = image::Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    image
}

fn solid_paint(color: Color) -> Paint<'static> {
    let (r, g, b, a) = color.to_rgba8();
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    paint
}

fn to_skia_rect(rect: Rect) -> Option<tiny_skia::Rect> {
    tiny_skia::Rect::from_ltrb(rect.left, rect.top, rect.right, rect.bottom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha_at(pixmap: &Pixmap, x: u32, y: u32) -> u8 {
        pixmap.pixel(x, y).map(|p| p.alpha()).unwrap_or(0)
    }

    fn horizontal_stroke(y: f32, is_eraser: bool, width: f32) -> Stroke {
        Stroke::new(
            vec![Point::new(10.0, y), Point::new(50.0, y), Point::new(90.0, y)],
            Color::BLACK,
            width,
            is_eraser,
            0,
        )
    }

    #[test]
    fn test_smoothed_path_needs_points() {
        assert!(smoothed_path(&[]).is_none());
        let path = smoothed_path(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)]);
        let bounds = path.unwrap().bounds();
        assert_eq!(bounds.left(), 0.0);
        assert!(bounds.right() <= 10.0);
        assert_eq!(bounds.bottom(), 10.0);
    }

    #[test]
    fn test_stroke_marks_ink_layer() {
        let mut layer = InkLayer::new(100, 100).unwrap();
        layer.draw_stroke(&horizontal_stroke(50.0, false, 6.0), Transform::identity());
        assert_eq!(alpha_at(layer.pixmap(), 50, 50), 255);
        assert_eq!(alpha_at(layer.pixmap(), 50, 10), 0);
    }

    #[test]
    fn test_eraser_clears_ink_but_not_background() {
        let mut layer = InkLayer::new(100, 100).unwrap();
        layer.draw_stroke(&horizontal_stroke(50.0, false, 10.0), Transform::identity());
        layer.draw_stroke(&horizontal_stroke(50.0, true, 20.0), Transform::identity());
        assert_eq!(alpha_at(layer.pixmap(), 50, 50), 0);

        let mut target = Pixmap::new(100, 100).unwrap();
        target.fill(tiny_skia::Color::WHITE);
        layer.composite_onto(&mut target);
        let pixel = target.pixel(50, 50).unwrap();
        assert_eq!((pixel.red(), pixel.green(), pixel.blue()), (255, 255, 255));
    }

    #[test]
    fn test_single_point_stroke_draws_dot() {
        let mut layer = InkLayer::new(40, 40).unwrap();
        let dot = Stroke::new(vec![Point::new(20.0, 20.0)], Color::RED, 8.0, false, 0);
        layer.draw_stroke(&dot, Transform::identity());
        assert!(alpha_at(layer.pixmap(), 20, 20) > 0);
    }

    #[test]
    fn test_transform_scales_ink() {
        let mut layer = InkLayer::new(200, 200).unwrap();
        layer.draw_stroke(&horizontal_stroke(50.0, false, 4.0), Transform::from_scale(2.0, 2.0));
        assert_eq!(alpha_at(layer.pixmap(), 100, 100), 255);
        assert_eq!(alpha_at(layer.pixmap(), 100, 50), 0);
    }

    #[test]
    fn test_ruled_grid_draws_lines_only_on_rules() {
        let mut pixmap = Pixmap::new(100, 100).unwrap();
        let appearance = GridAppearance {
            spacing: 20.0,
            ..Default::default()
        };
        draw_grid(&mut pixmap, GridStyle::Ruled, Rect::new(0.0, 0.0, 100.0, 100.0), 1.0, &appearance);
        assert!(alpha_at(&pixmap, 50, 20) > 0);
        assert_eq!(alpha_at(&pixmap, 50, 30), 0);
    }

    #[test]
    fn test_grid_far_above_pixmap_only_walks_visible_rows() {
        let mut pixmap = Pixmap::new(100, 100).unwrap();
        let area = Rect::new(-1.0e9, -1.0e9, 100.0, 100.0);
        draw_grid(&mut pixmap, GridStyle::Square, area, 1.0, &GridAppearance::default());
        // 1e9 is a multiple of the 32 px spacing, so rules land on 32 and 64.
        assert!(alpha_at(&pixmap, 50, 32) > 0);
        assert!(alpha_at(&pixmap, 32, 50) > 0);
        assert_eq!(alpha_at(&pixmap, 50, 48), 0);
    }

    #[test]
    fn test_grid_lines_are_bounded_by_the_range() {
        let lines: Vec<f32> = grid_lines(-1.0e9, 0.0, 100.0, 32.0).collect();
        assert_eq!(lines, vec![0.0, 32.0, 64.0, 96.0]);

        // The first line is one spacing past the origin.
        let lines: Vec<f32> = grid_lines(10.0, 0.0, 60.0, 20.0).collect();
        assert_eq!(lines, vec![30.0, 50.0]);
        assert_eq!(grid_lines(0.0, 50.0, 40.0, 20.0).count(), 0);
    }

    #[test]
    fn test_none_grid_draws_nothing() {
        let mut pixmap = Pixmap::new(50, 50).unwrap();
        draw_grid(&mut pixmap, GridStyle::None, Rect::new(0.0, 0.0, 50.0, 50.0), 1.0, &GridAppearance::default());
        assert!(pixmap.pixels().iter().all(|p| p.alpha() == 0));
    }

    #[test]
    fn test_page_bitmap_is_stretched_into_destination() {
        let image = RgbaImage::from_pixel(10, 10, image::Rgba([0, 0, 255, 255]));
        let mut pixmap = Pixmap::new(100, 100).unwrap();
        draw_page_bitmap(&mut pixmap, &image, Rect::new(20.0, 20.0, 80.0, 80.0));
        assert_eq!(pixmap.pixel(50, 50).unwrap().blue(), 255);
        assert_eq!(alpha_at(&pixmap, 5, 5), 0);
    }

    #[test]
    fn test_pixmap_round_trips_to_image() {
        let mut pixmap = Pixmap::new(4, 4).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(255, 0, 0, 255));
        let image = pixmap_to_image(&pixmap);
        assert_eq!(image.get_pixel(1, 1), &image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_lasso_outline_follows_transform() {
        let mut pixmap = Pixmap::new(100, 100).unwrap();
        let square = [
            Point::new(10.0, 10.0),
            Point::new(40.0, 10.0),
            Point::new(40.0, 40.0),
            Point::new(10.0, 40.0),
        ];
        draw_lasso(&mut pixmap, &square, Transform::from_scale(2.0, 2.0), Color::BLUE);
        // The first dash starts the top edge at (20, 20) after scaling.
        assert!((18..=22).any(|y| alpha_at(&pixmap, 22, y) > 0));
        assert_eq!(alpha_at(&pixmap, 50, 50), 0);
    }
}
