// projection.rs — pointer → domain position, and domain position → screen
//
// Every resolver is built from value snapshots taken when the pointer event
// arrives, so a zoom or orbit that lands mid-drag is seen on the next event
// and never read half-way.

use glam::DVec3;

use crate::geometry::{self, CoordinateSpace, EquirectDims, Position};
use crate::panorama::CameraSnapshot;
use crate::viewport::{FlatView, ScreenRect};

/// Resolves a pointer position (screen points) into a domain position.
pub trait SurfaceResolver {
    /// `None` when the pointer does not map to a usable position.
    fn resolve(&self, pointer: (f64, f64)) -> Option<Position>;
}

/// Direction of the camera ray through `ndc`, scaled to `radius`.
///
/// Returns `None` when the ray direction degenerates to zero length.
pub fn ray_cast_sphere(camera: &CameraSnapshot, ndc: (f64, f64), radius: f64) -> Option<DVec3> {
    let t = camera.tan_half_fov();
    let dir = camera.forward() + camera.right() * (ndc.0 * t * camera.aspect) + camera.up() * (ndc.1 * t);
    let dir = dir.try_normalize()?;
    let p = dir * radius;
    p.is_finite().then_some(p)
}

/// Inverse of [`ray_cast_sphere`]: viewport NDC of a point seen from the
/// sphere's center, or `None` if it is behind the camera.
pub fn project_sphere(camera: &CameraSnapshot, point: DVec3) -> Option<(f64, f64)> {
    let d = point.try_normalize()?;
    let depth = d.dot(camera.forward());
    if depth <= 1e-6 {
        return None;
    }
    let t = camera.tan_half_fov();
    let nx = d.dot(camera.right()) / (depth * t * camera.aspect);
    let ny = d.dot(camera.up()) / (depth * t);
    Some((nx, ny))
}

/// Resolver for the panorama viewer.
#[derive(Debug, Clone, Copy)]
pub struct SphereResolver {
    pub camera: CameraSnapshot,
    pub viewport: ScreenRect,
    pub radius: f64,
}

impl SurfaceResolver for SphereResolver {
    fn resolve(&self, pointer: (f64, f64)) -> Option<Position> {
        let ndc = self.viewport.to_ndc(pointer.0, pointer.1)?;
        ray_cast_sphere(&self.camera, ndc, self.radius).map(Position::from)
    }
}

impl SphereResolver {
    /// Screen position of a stored hotspot, if in front of the camera.
    pub fn to_screen(&self, position: Position, space: CoordinateSpace, dims: EquirectDims) -> Option<(f64, f64)> {
        let point = geometry::sphere_point(position, space, self.radius, dims)?;
        let (nx, ny) = project_sphere(&self.camera, point)?;
        Some(self.viewport.from_ndc(nx, ny))
    }
}

/// Resolver for the flat viewer.
#[derive(Debug, Clone, Copy)]
pub struct FlatResolver {
    /// Pan/zoom state at the moment of the event.
    pub view: FlatView,
    /// Bounds of the rendered image on screen, after scaling.
    pub image_rect: ScreenRect,
    /// Pixel size positions are expressed in: the natural size, or the
    /// explicit width/height override.
    pub logical_size: (f64, f64),
}

impl FlatResolver {
    pub fn new(view: FlatView, viewport: ScreenRect, rendered_size: (f64, f64), logical_size: (f64, f64)) -> Self {
        Self {
            view,
            image_rect: view.image_rect(viewport, rendered_size),
            logical_size,
        }
    }

    /// Screen position of a pixel-space hotspot.
    pub fn to_screen(&self, position: Position) -> Option<(f64, f64)> {
        let (lw, lh) = self.logical_size;
        if lw <= 0.0 || lh <= 0.0 {
            return None;
        }
        Some((
            self.image_rect.left + position.x / lw * self.image_rect.width,
            self.image_rect.top + position.y / lh * self.image_rect.height,
        ))
    }
}

impl SurfaceResolver for FlatResolver {
    fn resolve(&self, pointer: (f64, f64)) -> Option<Position> {
        let scale = self.view.scale;
        if scale <= 0.0 {
            return None;
        }

        let rendered_w = self.image_rect.width / scale;
        let rendered_h = self.image_rect.height / scale;
        if rendered_w <= 0.0 || rendered_h <= 0.0 {
            return None;
        }

        let relative_x = (pointer.0 - self.image_rect.left) / scale;
        let relative_y = (pointer.1 - self.image_rect.top) / scale;

        let x = relative_x / rendered_w * self.logical_size.0;
        let y = relative_y / rendered_h * self.logical_size.1;

        let p = Position::new(x, y, 0.0);
        p.is_finite().then_some(p)
    }
}
