// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! 2D camera: offset, zoom and rotation applied by the vertex stage.
//!
//! The rotation is kept as a column-major 2x2 matrix ready for the
//! `rotationMatrix` uniform. It is corrected by the aspect ratio of the
//! render target, so it has to be rebuilt whenever the target changes.

use crate::render::error::{DisplayError, DisplayResult};

/// maximum depth of the camera stack
pub const CAMERA_STACK_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub dx: f32,
    pub dy: f32,
    pub zoom: f32,
    /// radians
    pub angle: f32,
    pub matrix: [f32; 4],
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            dx: 0.0,
            dy: 0.0,
            zoom: 1.0,
            angle: 0.0,
            matrix: [1.0, 0.0, 0.0, 1.0],
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.dx = 0.0;
        self.dy = 0.0;
        self.zoom = 1.0;
        self.angle = 0.0;
    }

    /// rebuilds the rotation matrix for a `w` x `h` target
    pub fn update_matrix(&mut self, w: f32, h: f32) {
        let ratio = if h != 0.0 { w / h } else { 1.0 };
        let (s, c) = self.angle.sin_cos();
        self.matrix = [c, s * ratio, -s / ratio, c];
    }

    /// Scene position to screen position on a `dw` x `dh` destination,
    /// same math as the default vertex stage with viewport (0, 0, dw, dh).
    pub fn scene_to_screen(&self, x: f32, y: f32, dw: f32, dh: f32) -> (f32, f32) {
        let m = &self.matrix;
        let vx = 2.0 * (x + self.dx) / dw - 1.0;
        let vy = 2.0 * (y + self.dy) / dh - 1.0;
        let nx = self.zoom * (m[0] * vx + m[2] * vy);
        let ny = self.zoom * (m[1] * vx + m[3] * vy);
        ((nx + 1.0) * dw / 2.0, (ny + 1.0) * dh / 2.0)
    }

    /// inverse of `scene_to_screen`
    pub fn screen_to_scene(&self, x: f32, y: f32, dw: f32, dh: f32) -> (f32, f32) {
        let m = &self.matrix;
        let nx = 2.0 * x / dw - 1.0;
        let ny = 2.0 * y / dh - 1.0;
        let det = m[0] * m[3] - m[2] * m[1];
        let k = if det * self.zoom != 0.0 {
            1.0 / (det * self.zoom)
        } else {
            0.0
        };
        let vx = k * (m[3] * nx - m[2] * ny);
        let vy = k * (-m[1] * nx + m[0] * ny);
        ((vx + 1.0) * dw / 2.0 - self.dx, (vy + 1.0) * dh / 2.0 - self.dy)
    }
}

/// bounded stack used by push_camera / pop_camera
#[derive(Debug, Default)]
pub struct CameraStack {
    cams: Vec<Camera>,
}

impl CameraStack {
    pub fn push(&mut self, cam: Camera) -> DisplayResult<()> {
        if self.cams.len() >= CAMERA_STACK_SIZE {
            return Err(DisplayError::CameraStack("stack is full".to_string()));
        }
        self.cams.push(cam);
        Ok(())
    }

    pub fn pop(&mut self) -> DisplayResult<Camera> {
        self.cams
            .pop()
            .ok_or_else(|| DisplayError::CameraStack("stack is empty".to_string()))
    }

    pub fn len(&self) -> usize {
        self.cams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3
    }

    #[test]
    fn test_reset_gives_identity() {
        let mut c = Camera::new();
        c.dx = 3.0;
        c.zoom = 2.5;
        c.angle = 1.2;
        c.update_matrix(640.0, 480.0);
        c.reset();
        c.update_matrix(640.0, 480.0);
        assert_eq!(c.matrix, [1.0, 0.0, -0.0, 1.0]);
        assert_eq!((c.dx, c.dy, c.zoom, c.angle), (0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn test_matrix_aspect() {
        let mut c = Camera::new();
        c.angle = std::f32::consts::FRAC_PI_2;
        c.update_matrix(200.0, 100.0);
        assert!((c.matrix[1] - 2.0).abs() < 1e-5);
        assert!((c.matrix[2] + 0.5).abs() < 1e-5);
        assert!(c.matrix[0].abs() < 1e-5);
    }

    #[test]
    fn test_identity_mapping() {
        let c = Camera::new();
        assert!(close(c.scene_to_screen(10.0, 20.0, 64.0, 64.0), (10.0, 20.0)));
    }

    #[test]
    fn test_round_trip() {
        let mut c = Camera::new();
        c.dx = 12.0;
        c.dy = -7.0;
        c.zoom = 1.7;
        c.angle = 0.6;
        c.update_matrix(320.0, 200.0);
        for p in [(0.0, 0.0), (100.0, 40.0), (-30.0, 250.0)] {
            let s = c.scene_to_screen(p.0, p.1, 320.0, 200.0);
            assert!(close(c.screen_to_scene(s.0, s.1, 320.0, 200.0), p));
        }
    }

    #[test]
    fn test_stack_bounds() {
        let mut st = CameraStack::default();
        assert!(st.pop().is_err());
        for _ in 0..CAMERA_STACK_SIZE {
            st.push(Camera::new()).unwrap();
        }
        assert!(st.push(Camera::new()).is_err());
        assert_eq!(st.len(), CAMERA_STACK_SIZE);
    }
}
