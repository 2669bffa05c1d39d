// panorama.rs — orbit camera parameters for the 360° viewer

use glam::DVec3;

pub const DEFAULT_FOV: f64 = 75.0;
pub const MIN_FOV: f64 = 5.0;
pub const MAX_FOV: f64 = 120.0;

/// Pitch stays short of the poles so the camera basis never degenerates.
const PITCH_LIMIT: f64 = 89.9;

/// Degrees of FOV per wheel notch.
const ZOOM_STEP: f64 = 2.5;

/// Live orbit state, mutated only by the camera controls.
///
/// Angles are in degrees. The camera sits at the sphere's center and only
/// rotates; `yaw == 0, pitch == 0` looks down `-Z`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub yaw: f64,
    pub pitch: f64,
    pub fov: f64,
    pub sensitivity_scale: f64,
}

impl OrbitCamera {
    pub fn new() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            fov: DEFAULT_FOV,
            sensitivity_scale: 1.0,
        }
    }

    pub fn reset(&mut self) {
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.fov = DEFAULT_FOV;
    }

    /// Rotate by a pointer drag of `(dx, dy)` pixels on a `width × height` viewport.
    ///
    /// One pixel of motion turns the view by one pixel's worth of field of
    /// view, so the image stays under the pointer at the center.
    pub fn orbit_by_pixels(&mut self, dx: f64, dy: f64, width: f64, height: f64) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }

        let v_f = self.fov.to_radians();
        let aspect = width / height;
        let h_f = 2.0 * ((v_f / 2.0).tan() * aspect).atan();

        let yaw_per_px_deg = (h_f / width).to_degrees();
        let pitch_per_px_deg = (v_f / height).to_degrees();

        self.yaw = (self.yaw - dx * yaw_per_px_deg * self.sensitivity_scale).rem_euclid(360.0);
        self.pitch =
            (self.pitch + dy * pitch_per_px_deg * self.sensitivity_scale).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Wheel zoom; positive `scroll` narrows the field of view.
    pub fn zoom_by(&mut self, scroll: f64) {
        self.fov = (self.fov - scroll * ZOOM_STEP).clamp(MIN_FOV, MAX_FOV);
    }

    /// Read-only copy of the orientation for one pointer event or frame.
    pub fn snapshot(&self, aspect: f64) -> CameraSnapshot {
        CameraSnapshot {
            yaw: self.yaw.to_radians(),
            pitch: self.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT).to_radians(),
            fov_y: self.fov.clamp(MIN_FOV, MAX_FOV).to_radians(),
            aspect: if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 },
        }
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable camera orientation handed to the resolver and the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSnapshot {
    /// Radians, positive turns toward `+X`.
    pub yaw: f64,
    /// Radians, positive looks up.
    pub pitch: f64,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    pub aspect: f64,
}

impl CameraSnapshot {
    pub fn forward(&self) -> DVec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        DVec3::new(sy * cp, sp, -cy * cp)
    }

    pub fn right(&self) -> DVec3 {
        let (sy, cy) = self.yaw.sin_cos();
        DVec3::new(cy, 0.0, sy)
    }

    pub fn up(&self) -> DVec3 {
        self.right().cross(self.forward())
    }

    pub fn tan_half_fov(&self) -> f64 {
        (self.fov_y / 2.0).tan()
    }
}
