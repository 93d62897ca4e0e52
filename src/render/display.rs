// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! # Display
//!
//! The rendering context. `Display` owns the GPU backend and every GPU
//! resource record (surfaces, shaders, buffers), and keeps the drawing
//! state: current buffer, shader, render target, texture source, colour,
//! alpha, line width, point size, blend mode, camera and debug flag.
//!
//! Every state change that affects pending geometry flushes the current
//! buffer first, so a batch is always drawn with the state it was built
//! under:
//!
//! ```text
//!  set_blend_mode / camera / use_shader / set_line_width  -> check_empty
//!  draw_on(s) / draw_from(s) when s differs               -> check_empty
//!  draw_point / draw_line / draw_triangle / draw_surface  -> check_type,
//!                    check_(not_)use_texture, check_not_full, then push
//! ```
//!
//! Resources are referred to by generation-checked ids. Freeing a surface
//! or shader that is current falls back first (no target, no source,
//! default shader), so an id never dangles inside the display.
//!
//! # Example
//! ```
//! use pixel_gl2d::render::{backend::SoftBackend, display::Display};
//!
//! let mut d = Display::new(Box::new(SoftBackend::new(64, 64))).unwrap();
//! let s = d.new_surface(64, 64, false).unwrap();
//! d.draw_on(s).unwrap();
//! d.set_color(255, 0, 0).unwrap();
//! d.draw_triangle(0.0, 0.0, 60.0, 0.0, 0.0, 60.0).unwrap();
//! assert_eq!(d.get_pixel(s, 10, 10).unwrap(), [255, 0, 0, 255]);
//! ```

use crate::config::{get_display_config, DisplayConfig};
use crate::render::backend::{BlendMode, FilterMode, GpuBackend};
use crate::render::buffer::{Buffer, BufferKind, DrawEnv, OverflowPolicy};
use crate::render::camera::{Camera, CameraStack};
use crate::render::error::{DisplayError, DisplayResult};
use crate::render::shader::Shader;
use crate::render::surface::Surface;
use crate::util::objpool::{Pool, PoolHandle};
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(PoolHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(PoolHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(PoolHandle);

/// primitive families a user buffer may be asked to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPrimitive {
    Point,
    Line,
    Triangle,
    TexturedTriangle,
}

impl DrawPrimitive {
    fn layout(&self) -> (bool, &'static str) {
        match self {
            DrawPrimitive::Point => (false, "points"),
            DrawPrimitive::Line => (false, "lines"),
            DrawPrimitive::Triangle => (false, "triangles"),
            DrawPrimitive::TexturedTriangle => (true, "textured triangles"),
        }
    }
}

fn color_component(v: i32) -> DisplayResult<f32> {
    if !(0..=255).contains(&v) {
        return Err(DisplayError::InvalidColor(v as i64));
    }
    Ok(v as f32 / 255.0)
}

pub struct Display {
    gl: Box<dyn GpuBackend>,
    config: DisplayConfig,

    surfaces: Pool<Surface>,
    shaders: Pool<Shader>,
    buffers: Pool<Buffer>,

    default_buffer: BufferId,
    current_buffer: BufferId,
    default_shader: ShaderId,
    current_shader: ShaderId,
    screen: Option<SurfaceId>,
    current_on: Option<SurfaceId>,
    current_from: Option<SurfaceId>,

    r: f32,
    g: f32,
    b: f32,
    alpha: f32,
    line_width: f32,
    point_size: f32,
    blend: BlendMode,
    camera: Camera,
    camera_stack: CameraStack,
    debug: bool,
}

impl Display {
    /// Display configured from the global config.
    pub fn new(gl: Box<dyn GpuBackend>) -> DisplayResult<Self> {
        Self::with_config(gl, get_display_config().clone())
    }

    pub fn with_config(mut gl: Box<dyn GpuBackend>, config: DisplayConfig) -> DisplayResult<Self> {
        config.validate()?;
        let mut shaders = Pool::new();
        let shader = Shader::new(gl.as_mut(), None, None, None)?;
        let default_shader = ShaderId(shaders.insert(shader));

        let mut buffers = Pool::new();
        let mut buffer = Buffer::new(false, config.default_buffer_size, OverflowPolicy::Flush);
        buffer.shader = Some(default_shader);
        let default_buffer = BufferId(buffers.insert(buffer));

        gl.set_blend_mode(BlendMode::Alpha);
        let mut d = Self {
            gl,
            surfaces: Pool::new(),
            shaders,
            buffers,
            default_buffer,
            current_buffer: default_buffer,
            default_shader,
            current_shader: default_shader,
            screen: None,
            current_on: None,
            current_from: None,
            r: 1.0,
            g: 1.0,
            b: 1.0,
            alpha: 1.0,
            line_width: config.line_width,
            point_size: config.point_size,
            blend: BlendMode::Alpha,
            camera: Camera::new(),
            camera_stack: CameraStack::default(),
            debug: config.debug,
            config,
        };
        d.gl.set_line_width(d.line_width.max(1.0));
        let screen = d.new_surface_inner(d.config.screen_width, d.config.screen_height, true)?;
        d.screen = Some(screen);
        d.draw_on(screen)?;
        info!(
            "display {}x{} buffer={}",
            d.config.screen_width, d.config.screen_height, d.config.default_buffer_size
        );
        Ok(d)
    }

    // ------------------------------------------------------------------
    // internal helpers
    // ------------------------------------------------------------------

    /// runs `f` on buffer `id` with its draw environment
    fn with_buffer<R>(
        &mut self,
        id: BufferId,
        f: impl FnOnce(&mut Buffer, &mut DrawEnv) -> R,
    ) -> DisplayResult<R> {
        let buffer = self
            .buffers
            .get_mut(id.0)
            .ok_or(DisplayError::UnknownBuffer)?;
        let shader = buffer
            .shader
            .and_then(|s| self.shaders.get(s.0))
            .or_else(|| self.shaders.get(self.default_shader.0))
            .ok_or(DisplayError::UnknownShader)?;
        let destination = match buffer.draw_on.and_then(|s| self.surfaces.get(s.0)) {
            Some(s) => (s.texw as f32, s.texh as f32),
            None => {
                let (w, h) = self.gl.framebuffer_size();
                (w as f32, h as f32)
            }
        };
        let mut env = DrawEnv {
            gl: self.gl.as_mut(),
            shader,
            camera: &self.camera,
            destination,
        };
        Ok(f(buffer, &mut env))
    }

    fn with_current<R>(
        &mut self,
        f: impl FnOnce(&mut Buffer, &mut DrawEnv) -> R,
    ) -> DisplayResult<R> {
        self.with_buffer(self.current_buffer, f)
    }

    fn check_empty(&mut self) -> DisplayResult<()> {
        self.with_current(|b, env| b.check_empty(env))
    }

    fn surface_ref(&self, id: SurfaceId) -> DisplayResult<&Surface> {
        self.surfaces.get(id.0).ok_or(DisplayError::UnknownSurface)
    }

    fn buffer_ref(&self, id: BufferId) -> DisplayResult<&Buffer> {
        self.buffers.get(id.0).ok_or(DisplayError::UnknownBuffer)
    }

    /// logical size of the render target, or of the default framebuffer
    fn target_size(&self) -> (f32, f32) {
        match self.current_on.and_then(|s| self.surfaces.get(s.0)) {
            Some(s) => (s.w as f32, s.h as f32),
            None => {
                let (w, h) = self.gl.framebuffer_size();
                (w as f32, h as f32)
            }
        }
    }

    /// allocated size of the render target, what the vertex stage maps to
    fn destination_size(&self) -> (f32, f32) {
        match self.current_on.and_then(|s| self.surfaces.get(s.0)) {
            Some(s) => (s.texw as f32, s.texh as f32),
            None => {
                let (w, h) = self.gl.framebuffer_size();
                (w as f32, h as f32)
            }
        }
    }

    fn update_camera_matrix(&mut self) {
        let (w, h) = self.target_size();
        self.camera.update_matrix(w, h);
    }

    /// binds the current target again after something else was bound
    fn rebind_target(&mut self) -> DisplayResult<()> {
        match self.current_on {
            Some(id) => {
                let s = self
                    .surfaces
                    .get_mut(id.0)
                    .ok_or(DisplayError::UnknownSurface)?;
                s.bind_as_target(self.gl.as_mut())?;
                let (w, h) = (s.texw as i32, s.texh as i32);
                self.gl.viewport(0, 0, w, h);
            }
            None => {
                let (w, h) = self.gl.framebuffer_size();
                self.gl.bind_framebuffer(None);
                self.gl.viewport(0, 0, w as i32, h as i32);
            }
        }
        Ok(())
    }

    fn push_triangle_untextured(&mut self, v: [(f32, f32); 3]) -> DisplayResult<()> {
        let (r, g, b, a) = (self.r, self.g, self.b, self.alpha);
        self.with_current(|buf, env| {
            buf.check_type(env, BufferKind::Triangle);
            buf.check_not_use_texture(env);
            buf.check_not_full(env, 1);
            for (x, y) in v {
                buf.push_vertex(x, y);
                buf.push_color(r, g, b, a);
            }
        })
    }

    // ------------------------------------------------------------------
    // state
    // ------------------------------------------------------------------

    /// components are 0..=255
    pub fn set_color(&mut self, r: i32, g: i32, b: i32) -> DisplayResult<()> {
        let (r, g, b) = (color_component(r)?, color_component(g)?, color_component(b)?);
        self.r = r;
        self.g = g;
        self.b = b;
        Ok(())
    }

    pub fn set_alpha(&mut self, a: i32) -> DisplayResult<()> {
        self.alpha = color_component(a)?;
        Ok(())
    }

    pub fn get_color(&self) -> (i32, i32, i32) {
        (
            (self.r * 255.0).round() as i32,
            (self.g * 255.0).round() as i32,
            (self.b * 255.0).round() as i32,
        )
    }

    pub fn get_alpha(&self) -> i32 {
        (self.alpha * 255.0).round() as i32
    }

    pub fn set_line_width(&mut self, width: f32) -> DisplayResult<()> {
        if width < 0.0 || width.is_nan() {
            return Err(DisplayError::InvalidArgument(format!("line width {}", width)));
        }
        self.check_empty()?;
        self.line_width = width;
        // zero is a legal width here, not for GL
        self.gl.set_line_width(width.max(f32::MIN_POSITIVE));
        Ok(())
    }

    pub fn line_width(&self) -> f32 {
        self.line_width
    }

    pub fn set_point_size(&mut self, size: f32) -> DisplayResult<()> {
        if size < 0.0 || size.is_nan() {
            return Err(DisplayError::InvalidArgument(format!("point size {}", size)));
        }
        self.point_size = size;
        Ok(())
    }

    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) -> DisplayResult<()> {
        self.check_empty()?;
        self.gl.set_blend_mode(mode);
        self.blend = mode;
        Ok(())
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    pub fn toggle_debug_mode(&mut self) {
        self.debug = !self.debug;
        debug!("debug mode {}", self.debug);
    }

    pub fn set_debug_mode(&mut self, on: bool) {
        self.debug = on;
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    // ------------------------------------------------------------------
    // camera
    // ------------------------------------------------------------------

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn set_camera_position(&mut self, dx: f32, dy: f32) -> DisplayResult<()> {
        self.check_empty()?;
        self.camera.dx = dx;
        self.camera.dy = dy;
        self.update_camera_matrix();
        Ok(())
    }

    pub fn set_camera_angle(&mut self, angle: f32) -> DisplayResult<()> {
        self.check_empty()?;
        self.camera.angle = angle;
        self.update_camera_matrix();
        Ok(())
    }

    pub fn set_camera_zoom(&mut self, zoom: f32) -> DisplayResult<()> {
        self.check_empty()?;
        self.camera.zoom = zoom;
        self.update_camera_matrix();
        Ok(())
    }

    pub fn reset_camera(&mut self) -> DisplayResult<()> {
        self.check_empty()?;
        self.camera.reset();
        self.update_camera_matrix();
        Ok(())
    }

    pub fn push_camera(&mut self) -> DisplayResult<()> {
        self.check_empty()?;
        self.camera_stack.push(self.camera)
    }

    pub fn pop_camera(&mut self) -> DisplayResult<()> {
        self.check_empty()?;
        self.camera = self.camera_stack.pop()?;
        self.update_camera_matrix();
        Ok(())
    }

    pub fn screen_to_scene(&self, x: f32, y: f32) -> (f32, f32) {
        let (w, h) = self.destination_size();
        self.camera.screen_to_scene(x, y, w, h)
    }

    pub fn scene_to_screen(&self, x: f32, y: f32) -> (f32, f32) {
        let (w, h) = self.destination_size();
        self.camera.scene_to_screen(x, y, w, h)
    }

    // ------------------------------------------------------------------
    // surfaces
    // ------------------------------------------------------------------

    fn adopt_surface(&mut self, mut s: Surface) -> SurfaceId {
        if self.config.default_filter != s.filter {
            s.set_filter(self.gl.as_mut(), self.config.default_filter);
        }
        SurfaceId(self.surfaces.insert(s))
    }

    fn new_surface_inner(&mut self, w: u32, h: u32, force_npot: bool) -> DisplayResult<SurfaceId> {
        let s = Surface::new(self.gl.as_mut(), w, h, force_npot)?;
        let id = self.adopt_surface(s);
        // Surface::new left its own framebuffer bound
        self.rebind_target()?;
        self.rebind_source();
        Ok(id)
    }

    fn rebind_source(&mut self) {
        let tex = self
            .current_from
            .and_then(|s| self.surfaces.get(s.0))
            .map(|s| s.tex);
        self.gl.bind_texture(tex);
    }

    /// blank surface cleared to transparent
    pub fn new_surface(&mut self, w: i32, h: i32, force_npot: bool) -> DisplayResult<SurfaceId> {
        if w <= 0 || h <= 0 {
            return Err(DisplayError::InvalidSize(w as i64, h as i64));
        }
        self.new_surface_inner(w as u32, h as u32, force_npot)
    }

    /// surface from `w * h` RGBA8 pixels
    pub fn create_surface(
        &mut self,
        w: i32,
        h: i32,
        pixels: &[u8],
        force_npot: bool,
    ) -> DisplayResult<SurfaceId> {
        if w <= 0 || h <= 0 {
            return Err(DisplayError::InvalidSize(w as i64, h as i64));
        }
        let s = Surface::from_pixels(self.gl.as_mut(), w as u32, h as u32, pixels, force_npot)?;
        let id = self.adopt_surface(s);
        self.rebind_source();
        Ok(id)
    }

    pub fn load_surface(&mut self, path: &str) -> DisplayResult<SurfaceId> {
        let s = Surface::load(self.gl.as_mut(), path)?;
        let id = self.adopt_surface(s);
        self.rebind_source();
        Ok(id)
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(id.0)
    }

    pub fn surface_size(&self, id: SurfaceId) -> DisplayResult<(u32, u32)> {
        self.surface_ref(id).map(|s| (s.w, s.h))
    }

    pub fn free_surface(&mut self, id: SurfaceId) -> DisplayResult<()> {
        self.surface_ref(id)?;
        if self.current_from == Some(id) {
            self.with_current(|b, env| b.check_not_use_texture(env))?;
            self.gl.bind_texture(None);
            self.current_from = None;
        }
        if self.current_on == Some(id) {
            self.check_empty()?;
            self.current_on = None;
            let (dflt, cur) = (self.default_buffer, self.current_buffer);
            for bid in [dflt, cur] {
                if let Some(b) = self.buffers.get_mut(bid.0) {
                    b.draw_on = None;
                }
            }
            self.rebind_target()?;
            self.update_camera_matrix();
        }
        if self.screen == Some(id) {
            self.screen = None;
        }
        // user buffers drawing on it fall back to the default framebuffer
        self.buffers.update_active(|_, b| {
            if b.draw_on == Some(id) {
                b.draw_on = None;
            }
        });
        if let Some(s) = self.surfaces.remove(id.0) {
            s.free(self.gl.as_mut());
        }
        Ok(())
    }

    pub fn set_filter(&mut self, id: SurfaceId, filter: FilterMode) -> DisplayResult<()> {
        self.surface_ref(id)?;
        if self.current_from == Some(id) {
            self.check_empty()?;
        }
        if let Some(s) = self.surfaces.get_mut(id.0) {
            s.set_filter(self.gl.as_mut(), filter);
        }
        self.rebind_source();
        Ok(())
    }

    /// reads back one RGBA8 pixel of a surface
    pub fn get_pixel(&mut self, id: SurfaceId, x: u32, y: u32) -> DisplayResult<[u8; 4]> {
        let (w, h) = self.surface_size(id)?;
        if x >= w || y >= h {
            return Err(DisplayError::InvalidArgument(format!(
                "pixel ({}, {}) outside {}x{}",
                x, y, w, h
            )));
        }
        self.check_empty()?;
        if let Some(s) = self.surfaces.get_mut(id.0) {
            let mipmap = s.has_mipmap;
            s.bind_as_target(self.gl.as_mut())?;
            // reading does not invalidate mipmaps
            s.has_mipmap = mipmap;
        }
        let mut out = [0u8; 4];
        self.gl.read_pixels(x as i32, y as i32, 1, 1, &mut out);
        self.rebind_target()?;
        Ok(out)
    }

    pub fn screen(&self) -> Option<SurfaceId> {
        self.screen
    }

    /// Replaces the screen surface by a `w` x `h` one and draws on it.
    pub fn resize(&mut self, w: i32, h: i32) -> DisplayResult<()> {
        if w <= 0 || h <= 0 {
            return Err(DisplayError::InvalidSize(w as i64, h as i64));
        }
        let old = self.screen;
        let screen = self.new_surface_inner(w as u32, h as u32, true)?;
        self.draw_on(screen)?;
        if let Some(old) = old {
            self.free_surface(old)?;
        }
        self.screen = Some(screen);
        self.config.screen_width = w as u32;
        self.config.screen_height = h as u32;
        info!("display resized {}x{}", w, h);
        Ok(())
    }

    pub fn draw_on(&mut self, id: SurfaceId) -> DisplayResult<()> {
        self.surface_ref(id)?;
        if self.current_on == Some(id) {
            return Ok(());
        }
        self.check_empty()?;
        self.current_on = Some(id);
        self.rebind_target()?;
        self.update_camera_matrix();
        let (dflt, cur) = (self.default_buffer, self.current_buffer);
        for bid in [dflt, cur] {
            if let Some(b) = self.buffers.get_mut(bid.0) {
                b.draw_on = Some(id);
            }
        }
        Ok(())
    }

    pub fn draw_from(&mut self, id: SurfaceId) -> DisplayResult<()> {
        self.surface_ref(id)?;
        if self.current_from == Some(id) {
            return Ok(());
        }
        self.check_empty()?;
        self.current_from = Some(id);
        if let Some(s) = self.surfaces.get_mut(id.0) {
            s.bind_as_source(self.gl.as_mut());
        }
        Ok(())
    }

    pub fn draw_on_target(&self) -> Option<SurfaceId> {
        self.current_on
    }

    pub fn draw_from_source(&self) -> Option<SurfaceId> {
        self.current_from
    }

    /// flushes, then clears the target with the current colour and alpha
    pub fn draw_background(&mut self) -> DisplayResult<()> {
        self.check_empty()?;
        self.gl.clear(self.r, self.g, self.b, self.alpha);
        Ok(())
    }

    // ------------------------------------------------------------------
    // primitives
    // ------------------------------------------------------------------

    /// Rejects a draw whose texture mode differs from what a user buffer
    /// already holds. Kind changes and full buffers flush like the default
    /// buffer does.
    pub fn check_draw(&self, prim: DrawPrimitive) -> DisplayResult<()> {
        let b = self.buffer_ref(self.current_buffer)?;
        if !b.user_buffer {
            return Ok(());
        }
        if b.was_freed() {
            return Err(DisplayError::BufferFreed);
        }
        let (textured, name) = prim.layout();
        if b.kind != BufferKind::Undefined && b.has_texture != textured {
            return Err(DisplayError::BufferIncompatible(name.to_string()));
        }
        Ok(())
    }

    pub fn draw_point(&mut self, x: f32, y: f32, size: f32) -> DisplayResult<()> {
        self.check_draw(DrawPrimitive::Point)?;
        let (r, g, b, a) = (self.r, self.g, self.b, self.alpha);
        self.with_current(|buf, env| {
            buf.check_type(env, BufferKind::Point);
            buf.check_not_use_texture(env);
            buf.check_not_full(env, 1);
            buf.push_vertex(x, y);
            buf.push_point_size(size);
            buf.push_color(r, g, b, a);
        })
    }

    /// point of the current point size
    pub fn plot(&mut self, x: f32, y: f32) -> DisplayResult<()> {
        self.draw_point(x, y, self.point_size)
    }

    /// `size` x `size` square centred on (x, y), textured with the region
    /// of the same size at (sx, sy) of the source
    pub fn draw_point_tex(
        &mut self,
        sx: f32,
        sy: f32,
        x: f32,
        y: f32,
        size: f32,
    ) -> DisplayResult<()> {
        let h = size / 2.0;
        self.draw_quad(
            [sx, sy, sx + size, sy, sx + size, sy + size, sx, sy + size],
            [x - h, y - h, x + h, y - h, x + h, y + h, x - h, y + h],
        )
    }

    pub fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> DisplayResult<()> {
        self.check_draw(DrawPrimitive::Line)?;
        let (r, g, b, a) = (self.r, self.g, self.b, self.alpha);
        self.with_current(|buf, env| {
            buf.check_type(env, BufferKind::Line);
            buf.check_not_use_texture(env);
            buf.check_not_full(env, 1);
            buf.push_vertex(x1, y1);
            buf.push_vertex(x2, y2);
            for _ in 0..2 {
                buf.push_color(r, g, b, a);
            }
        })
    }

    /// line as a quad of width `line_width`
    pub fn draw_thick_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> DisplayResult<()> {
        let (dx, dy) = (x2 - x1, y2 - y1);
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            return Ok(());
        }
        let k = self.line_width / 2.0 / len;
        let (nx, ny) = (-dy * k, dx * k);
        let p = [
            (x1 + nx, y1 + ny),
            (x2 + nx, y2 + ny),
            (x2 - nx, y2 - ny),
            (x1 - nx, y1 - ny),
        ];
        if self.debug {
            for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
                self.draw_line(p[a].0, p[a].1, p[b].0, p[b].1)?;
            }
            return Ok(());
        }
        self.check_draw(DrawPrimitive::Triangle)?;
        self.push_triangle_untextured([p[0], p[1], p[2]])?;
        self.push_triangle_untextured([p[0], p[2], p[3]])
    }

    pub fn draw_triangle(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        x3: f32,
        y3: f32,
    ) -> DisplayResult<()> {
        if self.debug {
            self.draw_line(x1, y1, x2, y2)?;
            self.draw_line(x2, y2, x3, y3)?;
            return self.draw_line(x3, y3, x1, y1);
        }
        self.check_draw(DrawPrimitive::Triangle)?;
        self.push_triangle_untextured([(x1, y1), (x2, y2), (x3, y3)])
    }

    /// Textured triangle. `src` holds three texel coordinates of the
    /// current source, `dst` the three target positions.
    pub fn draw_surface(&mut self, src: [f32; 6], dst: [f32; 6]) -> DisplayResult<()> {
        if self.debug {
            self.draw_line(dst[0], dst[1], dst[2], dst[3])?;
            self.draw_line(dst[2], dst[3], dst[4], dst[5])?;
            return self.draw_line(dst[4], dst[5], dst[0], dst[1]);
        }
        let from = self.current_from.ok_or(DisplayError::UnknownSurface)?;
        let (tw, th) = {
            let s = self.surface_ref(from)?;
            (s.texw as f32, s.texh as f32)
        };
        self.check_draw(DrawPrimitive::TexturedTriangle)?;
        let (r, g, b, a) = (self.r, self.g, self.b, self.alpha);
        self.with_current(|buf, env| {
            buf.check_type(env, BufferKind::Triangle);
            buf.check_use_texture(env);
            buf.check_not_full(env, 1);
            for i in 0..3 {
                buf.push_vertex(dst[i * 2], dst[i * 2 + 1]);
                buf.push_tex_coord(src[i * 2] / tw, src[i * 2 + 1] / th);
                buf.push_color(r, g, b, a);
            }
        })
    }

    /// Textured quad as triangles (1, 2, 3) and (1, 3, 4).
    pub fn draw_quad(&mut self, src: [f32; 8], dst: [f32; 8]) -> DisplayResult<()> {
        if !self.debug {
            self.check_draw(DrawPrimitive::TexturedTriangle)?;
        }
        let pick = |v: &[f32; 8], i: usize, j: usize, k: usize| -> [f32; 6] {
            [v[i * 2], v[i * 2 + 1], v[j * 2], v[j * 2 + 1], v[k * 2], v[k * 2 + 1]]
        };
        self.draw_surface(pick(&src, 0, 1, 2), pick(&dst, 0, 1, 2))?;
        self.draw_surface(pick(&src, 0, 2, 3), pick(&dst, 0, 2, 3))
    }

    // ------------------------------------------------------------------
    // shaders
    // ------------------------------------------------------------------

    pub fn new_shader(
        &mut self,
        vert: Option<&str>,
        frag_color: Option<&str>,
        frag_tex: Option<&str>,
    ) -> DisplayResult<ShaderId> {
        let s = Shader::new(self.gl.as_mut(), vert, frag_color, frag_tex)?;
        Ok(ShaderId(self.shaders.insert(s)))
    }

    pub fn default_shader(&self) -> ShaderId {
        self.default_shader
    }

    pub fn current_shader(&self) -> ShaderId {
        self.current_shader
    }

    pub fn shader(&self, id: ShaderId) -> Option<&Shader> {
        self.shaders.get(id.0)
    }

    /// None selects the default shader
    pub fn use_shader(&mut self, id: Option<ShaderId>) -> DisplayResult<()> {
        let id = id.unwrap_or(self.default_shader);
        if !self.shaders.contains(id.0) {
            return Err(DisplayError::UnknownShader);
        }
        self.check_empty()?;
        self.current_shader = id;
        if let Some(b) = self.buffers.get_mut(self.current_buffer.0) {
            b.shader = Some(id);
        }
        Ok(())
    }

    pub fn feed_shader(&mut self, id: ShaderId, name: &str, value: f32) -> DisplayResult<bool> {
        if !self.shaders.contains(id.0) {
            return Err(DisplayError::UnknownShader);
        }
        self.check_empty()?;
        let s = self.shaders.get(id.0).ok_or(DisplayError::UnknownShader)?;
        Ok(s.feed(self.gl.as_mut(), name, value))
    }

    pub fn free_shader(&mut self, id: ShaderId) -> DisplayResult<()> {
        if id == self.default_shader {
            return Err(DisplayError::InvalidArgument(
                "the default shader cannot be freed".to_string(),
            ));
        }
        if !self.shaders.contains(id.0) {
            return Err(DisplayError::UnknownShader);
        }
        if self.current_shader == id {
            self.use_shader(None)?;
        }
        let dflt = self.default_shader;
        self.buffers.update_active(|_, b| {
            if b.shader == Some(id) {
                b.shader = Some(dflt);
            }
        });
        if let Some(s) = self.shaders.remove(id.0) {
            s.free(self.gl.as_mut());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // buffers
    // ------------------------------------------------------------------

    /// Sized buffers flush when full. Without a size the buffer starts at
    /// the configured auto size and grows.
    pub fn new_buffer(&mut self, size: Option<usize>) -> DisplayResult<BufferId> {
        let b = match size {
            Some(0) => {
                return Err(DisplayError::InvalidArgument(
                    "buffer size must be > 0".to_string(),
                ))
            }
            Some(n) => Buffer::new(true, n, OverflowPolicy::Flush),
            None => Buffer::new(true, self.config.auto_buffer_size, OverflowPolicy::Grow),
        };
        Ok(BufferId(self.buffers.insert(b)))
    }

    pub fn default_buffer(&self) -> BufferId {
        self.default_buffer
    }

    pub fn current_buffer(&self) -> BufferId {
        self.current_buffer
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(id.0)
    }

    /// None selects the default buffer
    pub fn use_buffer(&mut self, id: Option<BufferId>) -> DisplayResult<()> {
        let id = id.unwrap_or(self.default_buffer);
        let (shader, on) = (self.current_shader, self.current_on);
        let b = self
            .buffers
            .get_mut(id.0)
            .ok_or(DisplayError::UnknownBuffer)?;
        if b.was_freed() {
            return Err(DisplayError::BufferFreed);
        }
        b.shader = Some(shader);
        b.draw_on = on;
        self.current_buffer = id;
        Ok(())
    }

    /// Flushes the current buffer, then draws `id` keeping its content.
    /// (dx, dy) is subtracted from every position, like a camera offset.
    pub fn draw_buffer(&mut self, id: BufferId, dx: f32, dy: f32) -> DisplayResult<()> {
        self.buffer_ref(id)?;
        self.check_empty()?;
        let on = self.current_on;
        if let Some(b) = self.buffers.get_mut(id.0) {
            b.draw_on = on;
        }
        self.with_buffer(id, |b, env| b.draw(env, dx, dy))
    }

    pub fn reset_buffer(&mut self, id: BufferId) -> DisplayResult<()> {
        let b = self
            .buffers
            .get_mut(id.0)
            .ok_or(DisplayError::UnknownBuffer)?;
        if b.was_freed() {
            return Err(DisplayError::BufferFreed);
        }
        b.reset();
        Ok(())
    }

    /// uploads once and drops the CPU copy, switching back to the default buffer
    pub fn upload_and_free_buffer(&mut self, id: BufferId) -> DisplayResult<()> {
        if id == self.default_buffer {
            return Err(DisplayError::InvalidArgument(
                "the default buffer cannot be frozen".to_string(),
            ));
        }
        let b = self
            .buffers
            .get_mut(id.0)
            .ok_or(DisplayError::UnknownBuffer)?;
        if b.was_freed() {
            return Err(DisplayError::BufferFreed);
        }
        b.upload_and_free(self.gl.as_mut());
        crate::render::error::check_gl_error(self.gl.as_mut(), "upload_and_free");
        if self.current_buffer == id {
            self.use_buffer(None)?;
        }
        Ok(())
    }

    pub fn free_buffer(&mut self, id: BufferId) -> DisplayResult<()> {
        if id == self.default_buffer {
            return Err(DisplayError::InvalidArgument(
                "the default buffer cannot be freed".to_string(),
            ));
        }
        self.buffer_ref(id)?;
        if self.current_buffer == id {
            self.use_buffer(None)?;
        }
        if let Some(mut b) = self.buffers.remove(id.0) {
            b.free(self.gl.as_mut());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // frame
    // ------------------------------------------------------------------

    /// Composes the screen surface onto the default framebuffer, stretched
    /// to its size, with a neutral context; the drawing context is then
    /// restored. Presenting the frame is up to the window layer.
    pub fn flip(&mut self) -> DisplayResult<()> {
        let screen = self.screen.ok_or(DisplayError::UnknownSurface)?;
        let (sw, sh) = self.surface_size(screen)?;

        let old_from = self.current_from;
        let old_buffer = self.current_buffer;
        let old_shader = self.current_shader;
        let (r, g, b, a) = (self.r, self.g, self.b, self.alpha);
        let old_debug = self.debug;
        let old_camera = self.camera;

        self.use_buffer(None)?;
        self.check_empty()?;
        self.draw_from(screen)?;
        self.use_shader(None)?;
        self.r = 1.0;
        self.g = 1.0;
        self.b = 1.0;
        self.alpha = 1.0;
        self.camera.reset();
        self.camera.update_matrix(sw as f32, sh as f32);
        self.debug = false;

        // the default framebuffer is the destination for this one draw
        let (fw, fh) = self.gl.framebuffer_size();
        let dflt = self.default_buffer;
        if let Some(b) = self.buffers.get_mut(dflt.0) {
            b.draw_on = None;
        }
        self.gl.bind_framebuffer(None);
        self.gl.viewport(0, 0, fw as i32, fh as i32);
        self.gl.clear(0.0, 0.0, 0.0, 1.0);
        let (w, h, fw, fh) = (sw as f32, sh as f32, fw as f32, fh as f32);
        // scene y grows downwards on the window
        let drawn = self
            .draw_quad([0.0, 0.0, w, 0.0, w, h, 0.0, h], [0.0, fh, fw, fh, fw, 0.0, 0.0, 0.0])
            .and_then(|_| self.check_empty());

        // restore context
        let on = self.current_on;
        if let Some(b) = self.buffers.get_mut(dflt.0) {
            b.draw_on = on;
        }
        self.rebind_target()?;
        match old_from {
            Some(s) => self.draw_from(s)?,
            None => {
                self.current_from = None;
                self.gl.bind_texture(None);
            }
        }
        self.use_shader(Some(old_shader))?;
        self.use_buffer(Some(old_buffer))?;
        self.r = r;
        self.g = g;
        self.b = b;
        self.alpha = a;
        self.debug = old_debug;
        self.camera = old_camera;
        self.update_camera_matrix();
        if let Err(e) = &drawn {
            warn!("flip failed: {}", e);
        }
        drawn
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.gl.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn GpuBackend {
        self.gl.as_mut()
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        for (_, mut b) in self.buffers.drain() {
            b.free(self.gl.as_mut());
        }
        for (_, s) in self.shaders.drain() {
            s.free(self.gl.as_mut());
        }
        for (_, s) in self.surfaces.drain() {
            s.free(self.gl.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::SoftBackend;

    fn display() -> Display {
        Display::with_config(Box::new(SoftBackend::new(64, 64)), DisplayConfig::default()).unwrap()
    }

    fn soft(d: &Display) -> &SoftBackend {
        d.backend().as_any().downcast_ref::<SoftBackend>().unwrap()
    }

    #[test]
    fn test_color_bounds() {
        let mut d = display();
        assert_eq!(d.set_color(256, 0, 0), Err(DisplayError::InvalidColor(256)));
        assert_eq!(d.set_alpha(-1), Err(DisplayError::InvalidColor(-1)));
        d.set_color(255, 128, 0).unwrap();
        assert_eq!(d.get_color(), (255, 128, 0));
    }

    #[test]
    fn test_bad_sizes() {
        let mut d = display();
        assert!(matches!(d.new_surface(0, 10, false), Err(DisplayError::InvalidSize(0, 10))));
        assert!(d.set_line_width(-1.0).is_err());
        assert!(d.set_point_size(-0.5).is_err());
        assert!(d.new_buffer(Some(0)).is_err());
    }

    #[test]
    fn test_blend_mode_flushes() {
        let mut d = display();
        d.draw_triangle(0.0, 0.0, 10.0, 0.0, 0.0, 10.0).unwrap();
        assert!(soft(&d).draws().is_empty());
        d.set_blend_mode(BlendMode::Add).unwrap();
        assert_eq!(soft(&d).draws().len(), 1);
        assert_eq!(soft(&d).blend_mode(), BlendMode::Add);
    }

    #[test]
    fn test_draw_on_same_target_does_not_flush() {
        let mut d = display();
        let s = d.screen().unwrap();
        d.draw_triangle(0.0, 0.0, 10.0, 0.0, 0.0, 10.0).unwrap();
        d.draw_on(s).unwrap();
        assert!(soft(&d).draws().is_empty());
        let t = d.new_surface(16, 16, false).unwrap();
        d.draw_on(t).unwrap();
        assert_eq!(soft(&d).draws().len(), 1);
        assert_eq!(soft(&d).viewport_rect(), [0, 0, 16, 16]);
    }

    #[test]
    fn test_surface_requires_source() {
        let mut d = display();
        let r = d.draw_surface([0.0; 6], [0.0; 6]);
        assert_eq!(r, Err(DisplayError::UnknownSurface));
    }

    #[test]
    fn test_user_buffer_flushes_like_default() {
        let mut d = display();
        let b = d.new_buffer(Some(6)).unwrap();
        d.use_buffer(Some(b)).unwrap();
        d.draw_triangle(0.0, 0.0, 1.0, 0.0, 0.0, 1.0).unwrap();
        // kind change flushes the triangle
        d.draw_line(0.0, 0.0, 1.0, 1.0).unwrap();
        assert_eq!(soft(&d).draws().len(), 1);
        assert_eq!(soft(&d).draws()[0].count, 3);
        d.draw_triangle(0.0, 0.0, 1.0, 0.0, 0.0, 1.0).unwrap();
        d.draw_triangle(0.0, 0.0, 1.0, 0.0, 0.0, 1.0).unwrap();
        assert_eq!(soft(&d).draws().len(), 2);
        // full under Flush: the six vertices go out, the new one stays
        d.draw_triangle(0.0, 0.0, 1.0, 0.0, 0.0, 1.0).unwrap();
        let draws = soft(&d).draws();
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[2].count, 6);
        assert_eq!(d.buffer(b).unwrap().current_position, 3);
    }

    #[test]
    fn test_user_buffer_rejects_texture_mode_change() {
        let mut d = display();
        let src = d.create_surface(1, 1, &[255, 255, 255, 255], false).unwrap();
        d.draw_from(src).unwrap();
        let b = d.new_buffer(Some(6)).unwrap();
        d.use_buffer(Some(b)).unwrap();
        d.draw_triangle(0.0, 0.0, 1.0, 0.0, 0.0, 1.0).unwrap();
        assert_eq!(
            d.draw_surface([0.0; 6], [0.0; 6]),
            Err(DisplayError::BufferIncompatible("textured triangles".to_string()))
        );
        assert_eq!(d.buffer(b).unwrap().current_position, 3);
        assert!(soft(&d).draws().is_empty());
    }

    #[test]
    fn test_auto_buffer_grows() {
        let mut d = display();
        let b = d.new_buffer(None).unwrap();
        d.use_buffer(Some(b)).unwrap();
        let n = d.config().auto_buffer_size;
        for i in 0..n {
            d.draw_point(i as f32, 0.0, 1.0).unwrap();
        }
        d.draw_point(0.0, 1.0, 1.0).unwrap();
        let buf = d.buffer(b).unwrap();
        assert!(buf.size > n);
        assert_eq!(buf.current_color, n + 1);
        assert!(soft(&d).draws().is_empty());
    }

    #[test]
    fn test_free_buffer_switches_back() {
        let mut d = display();
        let b = d.new_buffer(Some(30)).unwrap();
        d.use_buffer(Some(b)).unwrap();
        d.free_buffer(b).unwrap();
        assert_eq!(d.current_buffer(), d.default_buffer());
        assert!(d.use_buffer(Some(b)).is_err());
        assert!(d.free_buffer(d.default_buffer()).is_err());
    }

    #[test]
    fn test_upload_and_free_buffer() {
        let mut d = display();
        let b = d.new_buffer(Some(30)).unwrap();
        d.use_buffer(Some(b)).unwrap();
        d.draw_line(0.0, 0.0, 5.0, 5.0).unwrap();
        d.upload_and_free_buffer(b).unwrap();
        assert_eq!(d.current_buffer(), d.default_buffer());
        assert_eq!(d.use_buffer(Some(b)), Err(DisplayError::BufferFreed));
        assert_eq!(d.reset_buffer(b), Err(DisplayError::BufferFreed));
        d.draw_buffer(b, 1.0, 1.0).unwrap();
        d.draw_buffer(b, 2.0, 1.0).unwrap();
        let draws = soft(&d).draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].count, 2);
    }

    #[test]
    fn test_feed_shader_and_default_protected() {
        let mut d = display();
        let frag = "uniform float time;\nvarying vec4 fColor;\nvoid main() { gl_FragColor = fColor * time; }";
        let s = d.new_shader(None, Some(frag), None).unwrap();
        assert_eq!(d.feed_shader(s, "time", 2.0), Ok(true));
        assert_eq!(d.feed_shader(s, "other", 2.0), Ok(false));
        assert!(d.free_shader(d.default_shader()).is_err());
        d.free_shader(s).unwrap();
        assert_eq!(d.feed_shader(s, "time", 1.0), Err(DisplayError::UnknownShader));
    }

    #[test]
    fn test_camera_stack() {
        let mut d = display();
        d.set_camera_position(5.0, 6.0).unwrap();
        d.push_camera().unwrap();
        d.set_camera_zoom(3.0).unwrap();
        d.pop_camera().unwrap();
        assert_eq!((d.camera().dx, d.camera().dy, d.camera().zoom), (5.0, 6.0, 1.0));
        assert!(d.pop_camera().is_err());
    }

    #[test]
    fn test_draw_background() {
        let mut d = display();
        let s = d.new_surface(8, 8, false).unwrap();
        d.draw_on(s).unwrap();
        d.set_color(0, 0, 255).unwrap();
        d.draw_background().unwrap();
        assert_eq!(d.get_pixel(s, 7, 7).unwrap(), [0, 0, 255, 255]);
        assert!(d.get_pixel(s, 8, 0).is_err());
    }

    #[test]
    fn test_thick_line_is_two_triangles() {
        let mut d = display();
        d.set_line_width(4.0).unwrap();
        d.draw_thick_line(10.0, 10.0, 30.0, 10.0).unwrap();
        d.draw_background().unwrap();
        let draws = soft(&d).draws();
        assert_eq!(draws[0].mode, crate::render::backend::DrawMode::Triangles);
        assert_eq!(draws[0].count, 6);
        assert_eq!(draws[0].positions[0], [10.0, 12.0]);
    }
}
