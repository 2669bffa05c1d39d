// viewport.rs — screen rectangles and the flat image pan/zoom transform

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 10.0;

/// Zoom factor per wheel notch.
const ZOOM_FACTOR: f64 = 1.2;

/// Axis-aligned rectangle in screen points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn aspect(&self) -> f64 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }

    /// Pointer position mapped to `[-1, 1]` on both axes, `+y` up.
    pub fn to_ndc(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let nx = ((x - self.left) / self.width) * 2.0 - 1.0;
        let ny = -(((y - self.top) / self.height) * 2.0 - 1.0);
        Some((nx, ny))
    }

    pub fn from_ndc(&self, nx: f64, ny: f64) -> (f64, f64) {
        (
            self.left + (nx + 1.0) / 2.0 * self.width,
            self.top + (1.0 - ny) / 2.0 * self.height,
        )
    }
}

/// Pan/zoom state of the flat viewer.
///
/// The image's unscaled top-left sits at the viewport origin plus `pan`, and
/// every image point is drawn `scale` times its unscaled size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatView {
    pub scale: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl FlatView {
    pub const fn new(scale: f64, pan_x: f64, pan_y: f64) -> Self {
        Self { scale, pan_x, pan_y }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    /// Scale and pan that center an image of `size` inside `viewport` at 1:1
    /// or smaller.
    pub fn fit(viewport: ScreenRect, size: (f64, f64)) -> Self {
        let (w, h) = size;
        if viewport.is_empty() || w <= 0.0 || h <= 0.0 {
            return Self::identity();
        }
        let scale = (viewport.width / w).min(viewport.height / h).min(1.0).clamp(MIN_SCALE, MAX_SCALE);
        Self {
            scale,
            pan_x: (viewport.width - w * scale) / 2.0,
            pan_y: (viewport.height - h * scale) / 2.0,
        }
    }

    /// On-screen bounds of an image whose unscaled rendered size is `size`.
    pub fn image_rect(&self, viewport: ScreenRect, size: (f64, f64)) -> ScreenRect {
        ScreenRect::new(
            viewport.left + self.pan_x,
            viewport.top + self.pan_y,
            size.0 * self.scale,
            size.1 * self.scale,
        )
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Change the scale while keeping the point under `cursor` fixed.
    pub fn zoom_at(&mut self, viewport: ScreenRect, cursor: (f64, f64), new_scale: f64) {
        let new_scale = new_scale.clamp(MIN_SCALE, MAX_SCALE);
        let rel_x = cursor.0 - viewport.left;
        let rel_y = cursor.1 - viewport.top;

        let img_x = (rel_x - self.pan_x) / self.scale;
        let img_y = (rel_y - self.pan_y) / self.scale;

        self.pan_x = rel_x - img_x * new_scale;
        self.pan_y = rel_y - img_y * new_scale;
        self.scale = new_scale;
    }

    /// Wheel zoom around the cursor; positive `scroll` zooms in.
    pub fn zoom_by(&mut self, viewport: ScreenRect, cursor: (f64, f64), scroll: f64) {
        let factor = ZOOM_FACTOR.powf(scroll);
        self.zoom_at(viewport, cursor, self.scale * factor);
    }
}

impl Default for FlatView {
    fn default() -> Self {
        Self::identity()
    }
}
