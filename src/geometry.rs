use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in viewport (fixed) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
            width,
            height,
        }
    }

    /// Caret-only rects carry no area in either direction.
    pub fn is_empty(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }

    /// True when the rect overlaps the viewport by at least one pixel on both axes.
    pub fn intersects(&self, viewport: &Viewport) -> bool {
        let overlap_x = self.right.min(viewport.width) - self.left.max(0.0);
        let overlap_y = self.bottom.min(viewport.height) - self.top.max(0.0);
        overlap_x >= 1.0 && overlap_y >= 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// 1x1 rect near the bottom-left corner, `margin` pixels in from both edges.
    pub fn corner_rect(&self, margin: f64) -> Rect {
        Rect::new(margin, (self.height - margin - 1.0).max(0.0), 1.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Clamps `value` into `[margin, extent - size - margin]`. When the popup is larger
/// than the space available the lower bound wins so the top-left stays on screen.
fn clamp_axis(value: f64, size: f64, extent: f64, margin: f64) -> f64 {
    let max = extent - size - margin;
    if max < margin {
        return margin;
    }
    value.clamp(margin, max)
}

/// Top-left of a popup placed under `anchor`, kept fully inside the viewport.
pub fn place_below(anchor: &Rect, popup: Size, viewport: &Viewport, margin: f64) -> Point {
    Point {
        x: clamp_axis(anchor.left, popup.width, viewport.width, margin),
        y: clamp_axis(anchor.bottom + margin, popup.height, viewport.height, margin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_needs_a_full_pixel_on_both_axes() {
        let viewport = Viewport::new(800.0, 600.0);
        assert!(Rect::new(10.0, 10.0, 50.0, 20.0).intersects(&viewport));
        assert!(!Rect::new(10.0, 599.5, 50.0, 20.0).intersects(&viewport));
        assert!(!Rect::new(-100.0, 10.0, 50.0, 20.0).intersects(&viewport));
        assert!(Rect::new(799.0, 599.0, 5.0, 5.0).intersects(&viewport));
    }

    #[test]
    fn placement_clamps_near_edges() {
        let viewport = Viewport::new(800.0, 600.0);
        let popup = Size::new(300.0, 200.0);

        let p = place_below(&Rect::new(100.0, 100.0, 40.0, 16.0), popup, &viewport, 8.0);
        assert_eq!(p, Point { x: 100.0, y: 124.0 });

        let p = place_below(&Rect::new(700.0, 560.0, 40.0, 16.0), popup, &viewport, 8.0);
        assert_eq!(p, Point { x: 492.0, y: 392.0 });

        let p = place_below(&Rect::new(-20.0, -50.0, 10.0, 10.0), popup, &viewport, 8.0);
        assert_eq!(p, Point { x: 8.0, y: 8.0 });
    }

    #[test]
    fn oversized_popup_pins_to_margin() {
        let viewport = Viewport::new(200.0, 100.0);
        let p = place_below(&Rect::new(50.0, 20.0, 10.0, 10.0), Size::new(400.0, 300.0), &viewport, 8.0);
        assert_eq!(p, Point { x: 8.0, y: 8.0 });
    }

    #[test]
    fn corner_rect_sits_inside_bottom_left() {
        let viewport = Viewport::new(800.0, 600.0);
        let rect = viewport.corner_rect(1.0);
        assert_eq!(rect.left, 1.0);
        assert_eq!(rect.bottom, 599.0);
        assert!(rect.intersects(&viewport));
    }
}
