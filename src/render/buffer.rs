// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! # Vertex Buffer
//!
//! `Buffer` accumulates primitives into CPU-side vertex arrays and issues
//! one `draw_arrays` per batch. A batch holds a single primitive kind
//! (points, lines or triangles) and is either textured or not, so every
//! state change that would break this is preceded by a flush:
//!
//! ```text
//!   check_type(kind)        kind differs        -> flush, switch kind
//!   check_use_texture()     untextured batch    -> flush, textured
//!   check_not_use_texture() textured batch      -> flush, untextured
//!   check_not_full(n)       no room for n more  -> flush (or grow)
//!   check_empty()           anything pending    -> flush
//! ```
//!
//! A flush is `draw(0, 0)` followed by `reset()`. The GPU side of the
//! buffer is four vertex buffer objects (positions, colours, texture
//! coordinates, point sizes) generated on first use and uploaded lazily
//! when the CPU arrays changed since the last upload.
//!
//! Drawing needs the backend, the shader and camera of the buffer, and the
//! size of its render target. They are handed in through [`DrawEnv`] by the
//! display, which owns all of them.

use crate::render::backend::{
    BufferHandle, BufferUsage, DrawMode, GpuBackend, ATTR_COLOR, ATTR_POINT_SIZE, ATTR_POSITION,
    ATTR_TEXCOORD,
};
use crate::render::camera::Camera;
use crate::render::display::{ShaderId, SurfaceId};
use crate::render::error::check_gl_error;
use crate::render::shader::{ProgramKind, Shader};
use log::debug;

/// default capacity in vertices: 4096 quads of two triangles
pub const DEFAULT_BUFFER_SIZE: usize = 2 * 3 * 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Undefined,
    Point,
    Line,
    Triangle,
}

impl BufferKind {
    pub fn vertices_per_primitive(&self) -> usize {
        match self {
            BufferKind::Undefined => 0,
            BufferKind::Point => 1,
            BufferKind::Line => 2,
            BufferKind::Triangle => 3,
        }
    }

    fn draw_mode(&self) -> DrawMode {
        match self {
            BufferKind::Point => DrawMode::Points,
            BufferKind::Line => DrawMode::Lines,
            _ => DrawMode::Triangles,
        }
    }
}

/// what happens when a push would overflow the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// draw and reset, then keep accumulating
    Flush,
    /// double the CPU arrays, keeping the pushed data
    Grow,
}

/// everything a draw needs besides the buffer itself
pub struct DrawEnv<'a> {
    pub gl: &'a mut dyn GpuBackend,
    pub shader: &'a Shader,
    pub camera: &'a Camera,
    /// allocated size (texw, texh) of the render target
    pub destination: (f32, f32),
}

#[derive(Debug)]
pub struct Buffer {
    pub kind: BufferKind,
    pub size: usize,
    positions: Vec<f32>,
    colors: Vec<f32>,
    tex_coords: Vec<f32>,
    point_sizes: Vec<f32>,
    pub current_position: usize,
    pub current_color: usize,
    pub current_tex_coord: usize,
    pub current_point_size: usize,
    pub uploaded: bool,
    pub has_texture: bool,
    pub user_buffer: bool,
    pub policy: OverflowPolicy,
    pub shader: Option<ShaderId>,
    pub draw_on: Option<SurfaceId>,
    gpu: Option<[BufferHandle; 4]>,
    freed: bool,
}

impl Buffer {
    pub fn new(user_buffer: bool, size: usize, policy: OverflowPolicy) -> Self {
        let size = size.max(1);
        Self {
            kind: BufferKind::Undefined,
            size,
            positions: vec![0.0; size * 2],
            colors: vec![0.0; size * 4],
            tex_coords: vec![],
            point_sizes: vec![],
            current_position: 0,
            current_color: 0,
            current_tex_coord: 0,
            current_point_size: 0,
            uploaded: false,
            has_texture: false,
            user_buffer,
            policy,
            shader: None,
            draw_on: None,
            gpu: None,
            freed: false,
        }
    }

    /// generates the four GPU buffer names
    pub fn allocate(&mut self, gl: &mut dyn GpuBackend) {
        if self.gpu.is_some() {
            return;
        }
        let mut names = vec![];
        for _ in 0..4 {
            match gl.create_buffer() {
                Ok(b) => names.push(b),
                Err(e) => {
                    log::error!("create_buffer failed: {}", e);
                    check_gl_error(gl, "create_buffer");
                    for b in names {
                        gl.delete_buffer(b);
                    }
                    return;
                }
            }
        }
        self.gpu = Some([names[0], names[1], names[2], names[3]]);
        self.kind = BufferKind::Undefined;
    }

    pub fn is_allocated(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn was_freed(&self) -> bool {
        self.freed
    }

    pub fn is_empty(&self) -> bool {
        self.current_color == 0
    }

    /// no room left for `quantity` more primitives of the current kind
    pub fn is_full(&self, quantity: usize) -> bool {
        let per = self.kind.vertices_per_primitive();
        per != 0 && self.current_position + per * quantity > self.size
    }

    pub fn check_type(&mut self, env: &mut DrawEnv, kind: BufferKind) {
        if self.kind != kind {
            self.flush(env);
            self.kind = kind;
            if kind == BufferKind::Point && self.point_sizes.len() < self.size {
                self.point_sizes.resize(self.size, 0.0);
            }
        }
    }

    pub fn check_use_texture(&mut self, env: &mut DrawEnv) {
        if !self.has_texture {
            self.flush(env);
            self.has_texture = true;
        }
        if self.tex_coords.len() < self.size * 2 {
            self.tex_coords.resize(self.size * 2, 0.0);
        }
    }

    pub fn check_not_use_texture(&mut self, env: &mut DrawEnv) {
        if self.has_texture {
            self.flush(env);
            self.has_texture = false;
        }
    }

    /// Makes room for `quantity` primitives. Returns the new capacity when
    /// the buffer grew.
    pub fn check_not_full(&mut self, env: &mut DrawEnv, quantity: usize) -> Option<usize> {
        if !self.is_full(quantity) {
            return None;
        }
        match self.policy {
            OverflowPolicy::Flush => {
                self.flush(env);
                None
            }
            OverflowPolicy::Grow => {
                let need = self.current_position + self.kind.vertices_per_primitive() * quantity;
                Some(self.grow(need))
            }
        }
    }

    fn grow(&mut self, need: usize) -> usize {
        let size = (self.size * 2).max(need);
        self.positions.resize(size * 2, 0.0);
        self.colors.resize(size * 4, 0.0);
        if !self.tex_coords.is_empty() {
            self.tex_coords.resize(size * 2, 0.0);
        }
        if !self.point_sizes.is_empty() {
            self.point_sizes.resize(size, 0.0);
        }
        debug!("buffer grows {} -> {}", self.size, size);
        self.size = size;
        self.uploaded = false;
        size
    }

    pub fn check_empty(&mut self, env: &mut DrawEnv) {
        if self.current_color != 0 {
            self.flush(env);
        }
    }

    fn assert_pushable(&self) {
        assert!(!self.freed, "push on a buffer released by upload_and_free");
    }

    pub fn push_vertex(&mut self, x: f32, y: f32) {
        self.assert_pushable();
        let cur = self.current_position * 2;
        assert!(cur < self.size * 2, "buffer overflow");
        self.positions[cur] = x;
        self.positions[cur + 1] = y;
        self.current_position += 1;
        self.uploaded = false;
    }

    pub fn push_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.assert_pushable();
        let cur = self.current_color * 4;
        assert!(cur < self.size * 4, "buffer overflow");
        self.colors[cur..cur + 4].copy_from_slice(&[r, g, b, a]);
        self.current_color += 1;
        self.uploaded = false;
    }

    pub fn push_tex_coord(&mut self, x: f32, y: f32) {
        self.assert_pushable();
        let cur = self.current_tex_coord * 2;
        assert!(cur < self.tex_coords.len(), "buffer overflow");
        self.tex_coords[cur] = x;
        self.tex_coords[cur + 1] = y;
        self.current_tex_coord += 1;
        self.uploaded = false;
    }

    pub fn push_point_size(&mut self, s: f32) {
        self.assert_pushable();
        let cur = self.current_point_size;
        assert!(cur < self.point_sizes.len(), "buffer overflow");
        self.point_sizes[cur] = s;
        self.current_point_size += 1;
        self.uploaded = false;
    }

    fn upload(&mut self, gl: &mut dyn GpuBackend, usage: BufferUsage) {
        let used = self.current_color;
        if used == 0 || self.uploaded || self.freed {
            return;
        }
        self.allocate(gl);
        let Some(names) = self.gpu else {
            return;
        };
        gl.buffer_data(names[0], &self.positions[..used * 2], usage);
        gl.buffer_data(names[1], &self.colors[..used * 4], usage);
        if self.has_texture {
            gl.buffer_data(names[2], &self.tex_coords[..used * 2], usage);
        }
        if self.kind == BufferKind::Point {
            gl.buffer_data(names[3], &self.point_sizes[..used], usage);
        }
        check_gl_error(gl, "buffer upload");
        self.uploaded = true;
    }

    /// Issues the pending geometry, offset by (dx, dy). Does not reset.
    pub fn draw(&mut self, env: &mut DrawEnv, dx: f32, dy: f32) {
        let used = self.current_color;
        if used == 0 {
            return;
        }
        assert_eq!(self.current_position, self.current_color);
        if self.has_texture {
            assert_eq!(self.current_tex_coord, self.current_color);
        }
        if self.kind == BufferKind::Point {
            assert_eq!(self.current_point_size, self.current_color);
        }

        let gl = &mut *env.gl;
        let kind = if self.has_texture {
            ProgramKind::Textured
        } else {
            ProgramKind::Color
        };
        let prog = env.shader.program(kind);
        gl.use_program(Some(prog.program));

        if !self.uploaded {
            self.upload(gl, BufferUsage::Dynamic);
        }
        let Some(names) = self.gpu else {
            return;
        };

        gl.vertex_attrib(ATTR_POSITION, names[0], 2);
        gl.vertex_attrib(ATTR_COLOR, names[1], 4);
        if self.has_texture {
            gl.vertex_attrib(ATTR_TEXCOORD, names[2], 2);
        }
        if self.kind == BufferKind::Point {
            gl.vertex_attrib(ATTR_POINT_SIZE, names[3], 1);
        }

        let loc = &prog.locations;
        let cam = env.camera;
        gl.uniform_1f(loc.dx, dx - cam.dx);
        gl.uniform_1f(loc.dy, dy - cam.dy);
        gl.uniform_1f(loc.zoom, cam.zoom);
        gl.uniform_matrix_2f(loc.rotation_matrix, &cam.matrix);
        gl.uniform_2f(loc.destination_size, env.destination.0, env.destination.1);

        gl.draw_arrays(self.kind.draw_mode(), 0, used as i32);

        if self.has_texture {
            gl.disable_attrib(ATTR_TEXCOORD);
        }
        if self.kind == BufferKind::Point {
            gl.disable_attrib(ATTR_POINT_SIZE);
        }
    }

    /// rewinds the cursors, GPU data is left alone
    pub fn reset(&mut self) {
        self.current_position = 0;
        self.current_color = 0;
        self.current_tex_coord = 0;
        self.current_point_size = 0;
    }

    pub fn flush(&mut self, env: &mut DrawEnv) {
        self.draw(env, 0.0, 0.0);
        self.reset();
    }

    /// Uploads once with a static hint and drops the CPU arrays. The buffer
    /// can still be drawn, but no longer pushed to.
    pub fn upload_and_free(&mut self, gl: &mut dyn GpuBackend) {
        self.upload(gl, BufferUsage::Static);
        self.positions = vec![];
        self.colors = vec![];
        self.tex_coords = vec![];
        self.point_sizes = vec![];
        self.freed = true;
    }

    /// releases the GPU buffer names
    pub fn free(&mut self, gl: &mut dyn GpuBackend) {
        if let Some(names) = self.gpu.take() {
            for b in names {
                gl.delete_buffer(b);
            }
        }
    }
}
