// geometry.rs — equirectangular mapping between the display sphere and pixel space

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Radius of the sphere hotspots are placed on in the panorama viewer.
pub const SPHERE_RADIUS: f64 = 4.0;

/// Fraction of the canonical dimensions above which a raw tuple is read as pixels.
const PIXEL_THRESHOLD: f64 = 0.01;

/// A raw hotspot position. Whether it is a sphere direction or a pixel
/// coordinate is decided by the owning file's [`CoordinateSpace`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_dvec3(self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<DVec3> for Position {
    fn from(v: DVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Pixel-space projection of a position. `pz` is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelPoint {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
}

/// Size of the equirectangular image that pixel coordinates refer to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquirectDims {
    pub width: f64,
    pub height: f64,
}

impl EquirectDims {
    /// Project-wide canonical size used when a file does not say otherwise.
    pub const CANONICAL: Self = Self {
        width: 6000.0,
        height: 3000.0,
    };

    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for EquirectDims {
    fn default() -> Self {
        Self::CANONICAL
    }
}

/// How the `position` of every hotspot in a file is to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpace {
    /// Direction on the panorama sphere; magnitude is irrelevant.
    Sphere,
    /// Pixel coordinate on a flat image, `z == 0`.
    Pixel,
}

impl CoordinateSpace {
    /// Magnitude heuristic for tuples whose space was never recorded.
    ///
    /// Only meant for importing legacy data: if `x` or `y` exceeds 1% of the
    /// canonical pixel dimensions the tuple is taken as pixels.
    pub fn classify(position: Position, dims: EquirectDims) -> Self {
        if position.x > dims.width * PIXEL_THRESHOLD || position.y > dims.height * PIXEL_THRESHOLD {
            Self::Pixel
        } else {
            Self::Sphere
        }
    }
}

/// Map a sphere direction to equirectangular pixel coordinates.
///
/// The vector is normalized first, so its length does not matter. The zero
/// vector maps to the origin pixel.
pub fn sphere_to_pixel(position: Position, dims: EquirectDims) -> PixelPoint {
    let Some(n) = position.to_dvec3().try_normalize() else {
        return PixelPoint::default();
    };

    // clamp: normalization can leave |y| a hair above 1
    let phi = n.y.clamp(-1.0, 1.0).acos();
    let theta = n.x.atan2(-n.z);

    PixelPoint {
        px: ((theta + PI) / (2.0 * PI)) * dims.width,
        py: (phi / PI) * dims.height,
        pz: 0.0,
    }
}

/// Inverse of [`sphere_to_pixel`], placing the point on a sphere of `radius`.
pub fn pixel_to_sphere(px: f64, py: f64, radius: f64, dims: EquirectDims) -> Position {
    let theta = (px / dims.width) * 2.0 * PI - PI;
    let phi = (py / dims.height) * PI;

    Position {
        x: radius * phi.sin() * theta.sin(),
        y: radius * phi.cos(),
        z: -radius * phi.sin() * theta.cos(),
    }
}

/// Pixel-space form of a stored position, given the space it was stored in.
pub fn to_pixel(position: Position, space: CoordinateSpace, dims: EquirectDims) -> PixelPoint {
    match space {
        CoordinateSpace::Sphere => sphere_to_pixel(position, dims),
        CoordinateSpace::Pixel => PixelPoint {
            px: position.x,
            py: position.y,
            pz: 0.0,
        },
    }
}

/// Point on the display sphere for a raw tuple of unknown space.
///
/// Sphere tuples are rescaled to `radius`; pixel tuples are unprojected.
/// Tuples with a zero component are unprojected as well, matching how
/// positions were placed before the space was stored per file.
pub fn display_sphere_position(position: Position, radius: f64, dims: EquirectDims) -> DVec3 {
    let is_sphere = CoordinateSpace::classify(position, dims) == CoordinateSpace::Sphere
        && position.x != 0.0
        && position.y != 0.0
        && position.z != 0.0;

    if is_sphere {
        return match position.to_dvec3().try_normalize() {
            Some(n) => n * radius,
            None => DVec3::new(0.0, 0.0, -radius),
        };
    }

    pixel_to_sphere(position.x, position.y, radius, dims).to_dvec3()
}

/// Point on the display sphere for a position stored in a known space.
pub fn sphere_point(position: Position, space: CoordinateSpace, radius: f64, dims: EquirectDims) -> Option<DVec3> {
    match space {
        CoordinateSpace::Sphere => position.to_dvec3().try_normalize().map(|n| n * radius),
        CoordinateSpace::Pixel => Some(pixel_to_sphere(position.x, position.y, radius, dims).to_dvec3()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn dims() -> EquirectDims {
        EquirectDims::CANONICAL
    }

    #[test]
    fn pixel_round_trip_is_identity() {
        let d = dims();
        // interior grid; px == 0 is the seam where atan2 may land on +π
        for i in 1..60 {
            for j in 1..30 {
                let px = i as f64 * 100.0 + 0.25;
                let py = j as f64 * 100.0 - 0.5;
                let s = pixel_to_sphere(px, py, SPHERE_RADIUS, d);
                let p = sphere_to_pixel(s, d);
                assert!((p.px - px).abs() < EPS, "px {px} -> {}", p.px);
                assert!((p.py - py).abs() < EPS, "py {py} -> {}", p.py);
                assert_eq!(p.pz, 0.0);
            }
        }
    }

    #[test]
    fn sphere_round_trip_preserves_direction() {
        let d = dims();
        let inputs = [
            Position::new(1.0, 2.0, 3.0),
            Position::new(-0.3, 0.1, -4.0),
            Position::new(10.0, -7.0, 0.5),
            Position::new(0.0, 0.0, -4.0),
        ];
        for input in inputs {
            let p = sphere_to_pixel(input, d);
            let back = pixel_to_sphere(p.px, p.py, 1.0, d).to_dvec3();
            let expected = input.to_dvec3().normalize();
            assert!((back - expected).length() < EPS, "{input:?} -> {back:?}");
        }
    }

    #[test]
    fn zero_vector_maps_to_origin_pixel() {
        let p = sphere_to_pixel(Position::default(), dims());
        assert_eq!(p, PixelPoint::default());
        assert!(!p.px.is_nan() && !p.py.is_nan());
    }

    #[test]
    fn forward_axis_is_image_center() {
        // -Z faces the middle of the panorama, +Y the top row
        let p = sphere_to_pixel(Position::new(0.0, 0.0, -1.0), dims());
        assert!((p.px - 3000.0).abs() < EPS);
        assert!((p.py - 1500.0).abs() < EPS);

        let top = sphere_to_pixel(Position::new(0.0, 1.0, 0.0), dims());
        assert!(top.py.abs() < EPS);
    }

    #[test]
    fn positive_x_is_right_of_center() {
        let p = sphere_to_pixel(Position::new(1.0, 0.0, 0.0), dims());
        assert!((p.px - 4500.0).abs() < EPS);
    }

    #[test]
    fn custom_dims_scale_output() {
        let half = EquirectDims::new(3000.0, 1500.0);
        let p = sphere_to_pixel(Position::new(0.0, 0.0, -1.0), half);
        assert!((p.px - 1500.0).abs() < EPS);
        assert!((p.py - 750.0).abs() < EPS);
    }

    #[test]
    fn classify_uses_one_percent_threshold() {
        let d = dims();
        assert_eq!(CoordinateSpace::classify(Position::new(0.5, 0.2, -0.8), d), CoordinateSpace::Sphere);
        assert_eq!(CoordinateSpace::classify(Position::new(60.0, 0.0, 0.0), d), CoordinateSpace::Sphere);
        assert_eq!(CoordinateSpace::classify(Position::new(60.1, 0.0, 0.0), d), CoordinateSpace::Pixel);
        assert_eq!(CoordinateSpace::classify(Position::new(0.0, 30.5, 0.0), d), CoordinateSpace::Pixel);
    }

    #[test]
    fn display_position_rescales_sphere_tuples() {
        let p = display_sphere_position(Position::new(1.0, 1.0, -1.0), SPHERE_RADIUS, dims());
        assert!((p.length() - SPHERE_RADIUS).abs() < EPS);
    }

    #[test]
    fn display_position_unprojects_pixel_tuples() {
        let p = display_sphere_position(Position::new(3000.0, 1500.0, 0.0), SPHERE_RADIUS, dims());
        assert!((p - DVec3::new(0.0, 0.0, -SPHERE_RADIUS)).length() < EPS);
    }

    #[test]
    fn to_pixel_passes_pixel_space_through() {
        let p = to_pixel(Position::new(120.0, 80.0, 0.0), CoordinateSpace::Pixel, dims());
        assert_eq!(p, PixelPoint { px: 120.0, py: 80.0, pz: 0.0 });
    }

    #[test]
    fn sphere_point_rejects_zero_vector() {
        assert!(sphere_point(Position::default(), CoordinateSpace::Sphere, SPHERE_RADIUS, dims()).is_none());
    }
}
