//! Screen/world transform
//!
//! The canvas maps world coordinates to screen pixels through
//!
//! ```text
//! screen = user(anchor(world))
//! ```
//!
//! where `user` is the pinch/pan state (uniform scale plus translation) and
//! `anchor` places the world on screen: either shifted by the host's scroll
//! offset (flowed documents) or fitted into fixed page bounds (paginated
//! documents). The forward matrix and its inverse are recomputed together on
//! every mutation.

use inkleaf_model::{Point, Rect, Size};
use inkleaf_render::Transform as SkiaTransform;

/// 2x3 affine matrix.
///
/// ```text
/// x' = a*x + c*y + e
/// y' = b*x + d*y + f
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translation(dx: f32, dy: f32) -> Self {
        Affine {
            e: dx,
            f: dy,
            ..Self::IDENTITY
        }
    }

    pub fn scaling(sx: f32, sy: f32) -> Self {
        Affine {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            e: next.a * self.e + next.c * self.f + next.e,
            f: next.b * self.e + next.d * self.f + next.f,
        }
    }

    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    pub fn invert(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < f32::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }

    pub fn apply(&self, point: Point) -> Point {
        Point::new(
            self.a * point.x + self.c * point.y + self.e,
            self.b * point.x + self.d * point.y + self.f,
        )
    }

    /// Axis-aligned bounds of a transformed rectangle.
    pub fn apply_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.apply(Point::new(rect.left, rect.top)),
            self.apply(Point::new(rect.right, rect.top)),
            self.apply(Point::new(rect.left, rect.bottom)),
            self.apply(Point::new(rect.right, rect.bottom)),
        ];
        Rect::from_points(&corners).unwrap_or(*rect)
    }

    pub fn to_skia(&self) -> SkiaTransform {
        SkiaTransform::from_row(self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// How world coordinates are placed on screen before pinch and pan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    /// World is shifted by the host's scroll offset.
    ScrollOffset { x: f32, y: f32 },
    /// World is a single page of `page_size` units fitted into `bounds`.
    PageBounds { bounds: Rect, page_size: Size },
}

impl Anchor {
    fn matrix(&self) -> Affine {
        match *self {
            Anchor::ScrollOffset { x, y } => Affine::translation(-x, -y),
            Anchor::PageBounds { bounds, page_size } => {
                let sx = if page_size.width > 0.0 { bounds.width() / page_size.width } else { 1.0 };
                let sy = if page_size.height > 0.0 { bounds.height() / page_size.height } else { 1.0 };
                Affine::scaling(sx, sy).then(&Affine::translation(bounds.left, bounds.top))
            }
        }
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::ScrollOffset { x: 0.0, y: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewTransform {
    scale: f32,
    tx: f32,
    ty: f32,
    min_scale: f32,
    max_scale: f32,
    anchor: Anchor,
    matrix: Affine,
    inverse: Affine,
}

impl ViewTransform {
    pub fn new(min_scale: f32, max_scale: f32) -> Self {
        let mut transform = Self {
            scale: 1.0,
            tx: 0.0,
            ty: 0.0,
            min_scale: min_scale.min(max_scale),
            max_scale: max_scale.max(min_scale),
            anchor: Anchor::default(),
            matrix: Affine::IDENTITY,
            inverse: Affine::IDENTITY,
        };
        transform.recompute();
        transform
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn translation(&self) -> (f32, f32) {
        (self.tx, self.ty)
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn matrix(&self) -> Affine {
        self.matrix
    }

    pub fn inverse(&self) -> Affine {
        self.inverse
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.tx += dx;
        self.ty += dy;
        self.recompute();
    }

    /// Scale by `factor` keeping the world point under `(focus_x, focus_y)`
    /// fixed on screen. The resulting scale is clamped to the zoom range.
    /// Returns the factor actually applied.
    pub fn scale_about(&mut self, factor: f32, focus_x: f32, focus_y: f32) -> f32 {
        if !factor.is_finite() || factor <= 0.0 {
            return 1.0;
        }
        let focus = Point::new(focus_x, focus_y);
        let world = self.inverse.apply(focus);

        let old_scale = self.scale;
        self.scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);

        let anchored = self.anchor.matrix().apply(world);
        self.tx = focus.x - self.scale * anchored.x;
        self.ty = focus.y - self.scale * anchored.y;
        self.recompute();

        self.scale / old_scale
    }

    /// Back to scale 1 with no translation. The anchor is kept.
    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.tx = 0.0;
        self.ty = 0.0;
        self.recompute();
    }

    pub fn set_scroll_offset(&mut self, x: f32, y: f32) {
        self.anchor = Anchor::ScrollOffset { x, y };
        self.recompute();
    }

    pub fn set_page_bounds(&mut self, bounds: Rect, page_size: Size) {
        self.anchor = Anchor::PageBounds { bounds, page_size };
        self.recompute();
    }

    pub fn map_screen_to_world(&self, point: Point) -> Point {
        self.inverse.apply(point)
    }

    pub fn map_world_to_screen(&self, point: Point) -> Point {
        self.matrix.apply(point)
    }

    pub fn map_rect_to_screen(&self, rect: &Rect) -> Rect {
        self.matrix.apply_rect(rect)
    }

    pub fn map_rect_to_world(&self, rect: &Rect) -> Rect {
        self.inverse.apply_rect(rect)
    }

    /// Screen pixels per world unit along x.
    pub fn pixels_per_unit(&self) -> f32 {
        (self.matrix.a * self.matrix.a + self.matrix.b * self.matrix.b).sqrt()
    }

    /// World units covering `pixels` screen pixels; keeps hit radii constant on screen.
    pub fn screen_to_world_distance(&self, pixels: f32) -> f32 {
        let ppu = self.pixels_per_unit();
        if ppu > 0.0 {
            pixels / ppu
        } else {
            pixels
        }
    }

    pub fn to_skia(&self) -> SkiaTransform {
        self.matrix.to_skia()
    }

    fn recompute(&mut self) {
        let user = Affine::scaling(self.scale, self.scale).then(&Affine::translation(self.tx, self.ty));
        self.matrix = self.anchor.matrix().then(&user);
        // Scale is clamped positive, so the matrix is always invertible.
        self.inverse = self.matrix.invert().unwrap_or(Affine::IDENTITY);
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::new(0.5, 5.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    #[test]
    fn test_scale_about_keeps_focus_fixed() {
        let mut transform = ViewTransform::default();
        let focus = Point::new(100.0, 100.0);
        let world_before = transform.map_screen_to_world(focus);

        transform.scale_about(2.0, 100.0, 100.0);

        assert!(close(transform.map_world_to_screen(world_before), focus));
        // World origin moves away from the focus by the scale factor.
        assert!(close(transform.map_world_to_screen(Point::ZERO), Point::new(-100.0, -100.0)));
    }

    #[test]
    fn test_scale_about_after_pan_keeps_focus() {
        let mut transform = ViewTransform::default();
        transform.pan(37.0, -12.0);
        transform.scale_about(1.7, 220.0, 45.0);
        let world = transform.map_screen_to_world(Point::new(10.0, 300.0));
        transform.scale_about(0.8, 10.0, 300.0);
        assert!(close(transform.map_world_to_screen(world), Point::new(10.0, 300.0)));
    }

    #[test]
    fn test_inverse_is_consistent_after_every_mutation() {
        let mut transform = ViewTransform::default();
        let sample = Point::new(12.5, -40.0);
        let check = |t: &ViewTransform| {
            assert!(close(t.map_screen_to_world(t.map_world_to_screen(sample)), sample));
        };

        transform.pan(5.0, 7.0);
        check(&transform);
        transform.scale_about(3.0, 50.0, 60.0);
        check(&transform);
        transform.set_scroll_offset(0.0, 400.0);
        check(&transform);
        transform.set_page_bounds(Rect::new(10.0, 20.0, 310.0, 420.0), Size::new(600.0, 800.0));
        check(&transform);
        transform.reset();
        check(&transform);
    }

    #[test]
    fn test_scale_is_clamped_to_zoom_range() {
        let mut transform = ViewTransform::new(0.5, 4.0);
        transform.scale_about(100.0, 0.0, 0.0);
        assert_eq!(transform.scale(), 4.0);
        let applied = transform.scale_about(0.01, 0.0, 0.0);
        assert_eq!(transform.scale(), 0.5);
        assert!((applied - 0.125).abs() < 1e-6);
        assert_eq!(transform.scale_about(f32::NAN, 0.0, 0.0), 1.0);
    }

    #[test]
    fn test_scroll_anchor_shifts_world() {
        let mut transform = ViewTransform::default();
        transform.set_scroll_offset(0.0, 250.0);
        assert!(close(transform.map_world_to_screen(Point::new(10.0, 300.0)), Point::new(10.0, 50.0)));
    }

    #[test]
    fn test_page_anchor_fits_page_into_bounds() {
        let mut transform = ViewTransform::default();
        transform.set_page_bounds(Rect::new(100.0, 50.0, 400.0, 450.0), Size::new(600.0, 800.0));

        assert!(close(transform.map_world_to_screen(Point::ZERO), Point::new(100.0, 50.0)));
        assert!(close(transform.map_world_to_screen(Point::new(600.0, 800.0)), Point::new(400.0, 450.0)));
        assert!((transform.screen_to_world_distance(10.0) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_reset_restores_identity() {
        let mut transform = ViewTransform::default();
        transform.pan(30.0, 30.0);
        transform.scale_about(2.0, 5.0, 5.0);
        transform.reset();
        assert_eq!(transform.matrix(), Affine::IDENTITY);
        assert_eq!(transform.inverse(), Affine::IDENTITY);
    }
}
