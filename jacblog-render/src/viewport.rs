//! Pan and zoom state for the diagram pane

use crate::layout::Point;

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 10.0;
/// Scale factor applied per wheel notch
pub const ZOOM_STEP: f64 = 1.1;

/// Maps drawing coordinates to screen coordinates: `screen = p * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f64,
    pub x: f64,
    pub y: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        scale: 1.0,
        x: 0.0,
        y: 0.0,
    };

    pub fn apply(&self, p: Point) -> Point {
        Point {
            x: p.x * self.scale + self.x,
            y: p.y * self.scale + self.y,
        }
    }

    /// Value for an SVG `transform` attribute
    pub fn to_svg(&self) -> String {
        format!(
            "translate({} {}) scale({})",
            crate::svg::num(self.x),
            crate::svg::num(self.y),
            crate::svg::num(self.scale)
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    origin: Point,
    start: Transform,
}

/// Pointer-driven viewport: drag pans, the wheel zooms around the cursor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Viewport {
    transform: Transform,
    drag: Option<Drag>,
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.drag = Some(Drag {
            origin: Point { x, y },
            start: self.transform,
        });
    }

    /// Returns whether the view moved
    pub fn pointer_move(&mut self, x: f64, y: f64) -> bool {
        let Some(drag) = self.drag else {
            return false;
        };
        self.transform.x = drag.start.x + (x - drag.origin.x);
        self.transform.y = drag.start.y + (y - drag.origin.y);
        true
    }

    pub fn pointer_up(&mut self) {
        self.drag = None;
    }

    /// One wheel event; negative `delta_y` (scrolling up) zooms in
    pub fn wheel(&mut self, delta_y: f64, x: f64, y: f64) {
        if delta_y < 0.0 {
            self.zoom_at(ZOOM_STEP, x, y);
        } else if delta_y > 0.0 {
            self.zoom_at(1.0 / ZOOM_STEP, x, y);
        }
    }

    /// Scale by `factor`, keeping the drawing point under `(x, y)` fixed
    pub fn zoom_at(&mut self, factor: f64, x: f64, y: f64) {
        let old = self.transform.scale;
        let new = (old * factor).clamp(MIN_SCALE, MAX_SCALE);
        if new == old {
            return;
        }
        let ratio = new / old;
        self.transform.x = x - (x - self.transform.x) * ratio;
        self.transform.y = y - (y - self.transform.y) * ratio;
        self.transform.scale = new;
    }

    pub fn reset(&mut self) {
        self.transform = Transform::IDENTITY;
        self.drag = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_drag_pans() {
        let mut view = Viewport::new();
        view.pointer_down(10.0, 10.0);
        assert!(view.pointer_move(25.0, 5.0));
        assert_eq!(view.transform(), Transform { scale: 1.0, x: 15.0, y: -5.0 });
        view.pointer_up();
        assert!(!view.pointer_move(100.0, 100.0));
        assert_eq!(view.transform().x, 15.0);
    }

    #[test]
    fn test_zoom_keeps_cursor_point_fixed() {
        let mut view = Viewport::new();
        view.pointer_down(0.0, 0.0);
        view.pointer_move(30.0, -20.0);
        view.pointer_up();

        let cursor = Point { x: 120.0, y: 80.0 };
        let before = view.transform();
        let anchored = Point {
            x: (cursor.x - before.x) / before.scale,
            y: (cursor.y - before.y) / before.scale,
        };
        view.wheel(-1.0, cursor.x, cursor.y);
        let after = view.transform().apply(anchored);
        assert!(close(view.transform().scale, ZOOM_STEP));
        assert!(close(after.x, cursor.x) && close(after.y, cursor.y));
    }

    #[test]
    fn test_scale_is_clamped() {
        let mut view = Viewport::new();
        for _ in 0..200 {
            view.wheel(1.0, 0.0, 0.0);
        }
        assert!(close(view.transform().scale, MIN_SCALE));
        for _ in 0..400 {
            view.wheel(-1.0, 0.0, 0.0);
        }
        assert!(close(view.transform().scale, MAX_SCALE));
    }

    #[test]
    fn test_reset() {
        let mut view = Viewport::new();
        view.zoom_at(2.0, 50.0, 50.0);
        view.pointer_down(0.0, 0.0);
        view.reset();
        assert_eq!(view.transform(), Transform::IDENTITY);
        assert!(!view.is_dragging());
    }

    #[test]
    fn test_svg_transform() {
        let t = Transform { scale: 1.5, x: 10.0, y: -2.25 };
        assert_eq!(t.to_svg(), "translate(10 -2.25) scale(1.5)");
    }
}
