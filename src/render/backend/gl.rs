// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! OpenGL implementation of [`GpuBackend`] on top of `glow`.
//!
//! The built-in shaders are GLSL ES 1.00 (`#version 100`), so the context
//! handed to [`GlowBackend::new`] must accept them: GLES 2/3, WebGL, or a
//! desktop context with ES compatibility. Window and context creation stay
//! with the embedding application.
//!
//! glow objects are kept in pools and exposed through the opaque handles of
//! the backend module, so the rest of the crate never touches `glow` types.

use super::{
    BlendMode, BufferHandle, BufferUsage, DrawMode, FilterMode, FramebufferHandle, GpuBackend,
    ProgramHandle, ShaderObject, ShaderStage, TextureHandle, UniformHandle,
};
use crate::render::error::GlError;
use crate::util::objpool::Pool;
use glow::HasContext;
use log::{info, warn};
use std::any::Any;

pub struct GlowBackend {
    gl: glow::Context,
    width: u32,
    height: u32,
    textures: Pool<glow::Texture>,
    framebuffers: Pool<glow::Framebuffer>,
    shaders: Pool<glow::Shader>,
    programs: Pool<glow::Program>,
    uniforms: Pool<(ProgramHandle, String, glow::UniformLocation)>,
    buffers: Pool<glow::Buffer>,
    vao: Option<glow::VertexArray>,
}

impl GlowBackend {
    /// `width` x `height` is the drawable size of the default framebuffer
    pub fn new(gl: glow::Context, width: u32, height: u32) -> Self {
        let vao = unsafe {
            // desktop core profiles need a bound vertex array,
            // GLES2 and WebGL1 have none
            let vao = gl.create_vertex_array().ok();
            if vao.is_some() {
                gl.bind_vertex_array(vao);
            }
            gl.enable(glow::BLEND);
            gl.disable(glow::DEPTH_TEST);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.enable(glow::PROGRAM_POINT_SIZE);
            // PROGRAM_POINT_SIZE is unknown on GLES, drop the flag
            let _ = gl.get_error();
            gl.viewport(0, 0, width as i32, height as i32);
            vao
        };
        info!("glow backend {}x{}", width, height);
        Self {
            gl,
            width,
            height,
            textures: Pool::new(),
            framebuffers: Pool::new(),
            shaders: Pool::new(),
            programs: Pool::new(),
            uniforms: Pool::new(),
            buffers: Pool::new(),
            vao,
        }
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    /// default framebuffer resized by the window layer
    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn gl_texture(&self, tex: TextureHandle) -> Option<glow::Texture> {
        self.textures.get(tex.0).copied()
    }

    fn gl_buffer(&self, buf: BufferHandle) -> Option<glow::Buffer> {
        self.buffers.get(buf.0).copied()
    }

    fn gl_location(&self, loc: Option<UniformHandle>) -> Option<&glow::UniformLocation> {
        loc.and_then(|l| self.uniforms.get(l.0)).map(|(_, _, u)| u)
    }
}

impl Drop for GlowBackend {
    fn drop(&mut self) {
        unsafe {
            if let Some(vao) = self.vao.take() {
                self.gl.delete_vertex_array(vao);
            }
        }
    }
}

impl GpuBackend for GlowBackend {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Result<TextureHandle, String> {
        unsafe {
            let texture = self.gl.create_texture()?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            for (pname, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::LINEAR),
                (glow::TEXTURE_MAG_FILTER, glow::LINEAR),
                (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
                (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
            ] {
                self.gl.tex_parameter_i32(glow::TEXTURE_2D, pname, value as i32);
            }
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                pixels,
            );
            Ok(TextureHandle(self.textures.insert(texture)))
        }
    }

    fn delete_texture(&mut self, tex: TextureHandle) {
        if let Some(t) = self.textures.remove(tex.0) {
            unsafe { self.gl.delete_texture(t) };
        }
    }

    fn bind_texture(&mut self, tex: Option<TextureHandle>) {
        let t = tex.and_then(|t| self.gl_texture(t));
        unsafe { self.gl.bind_texture(glow::TEXTURE_2D, t) };
    }

    fn set_texture_filter(&mut self, tex: TextureHandle, filter: FilterMode) {
        let Some(t) = self.gl_texture(tex) else {
            return;
        };
        let (min, mag) = match filter {
            FilterMode::Nearest => (glow::NEAREST, glow::NEAREST),
            FilterMode::Linear => (glow::LINEAR, glow::LINEAR),
            FilterMode::Bilinear => (glow::LINEAR_MIPMAP_NEAREST, glow::LINEAR),
            FilterMode::Trilinear => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
        };
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(t));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, min as i32);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, mag as i32);
        }
    }

    fn generate_mipmap(&mut self, tex: TextureHandle) {
        if let Some(t) = self.gl_texture(tex) {
            unsafe {
                self.gl.bind_texture(glow::TEXTURE_2D, Some(t));
                self.gl.generate_mipmap(glow::TEXTURE_2D);
            }
        }
    }

    fn create_framebuffer(&mut self, tex: TextureHandle) -> Result<FramebufferHandle, String> {
        let texture = self
            .gl_texture(tex)
            .ok_or_else(|| "unknown texture".to_string())?;
        unsafe {
            let framebuffer = self.gl.create_framebuffer()?;
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            if self.gl.check_framebuffer_status(glow::FRAMEBUFFER) != glow::FRAMEBUFFER_COMPLETE {
                self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                self.gl.delete_framebuffer(framebuffer);
                return Err("Framebuffer is not complete".to_string());
            }
            Ok(FramebufferHandle(self.framebuffers.insert(framebuffer)))
        }
    }

    fn delete_framebuffer(&mut self, fbo: FramebufferHandle) {
        if let Some(f) = self.framebuffers.remove(fbo.0) {
            unsafe { self.gl.delete_framebuffer(f) };
        }
    }

    fn bind_framebuffer(&mut self, fbo: Option<FramebufferHandle>) {
        let f = fbo.and_then(|f| self.framebuffers.get(f.0).copied());
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, f) };
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) };
    }

    fn clear(&mut self, r: f32, g: f32, b: f32, a: f32) {
        unsafe {
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn read_pixels(&mut self, x: i32, y: i32, width: u32, height: u32, out: &mut [u8]) {
        unsafe {
            self.gl.read_pixels(
                x,
                y,
                width as i32,
                height as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(out),
            );
        }
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        let (src, dst) = match mode {
            BlendMode::Alpha => (glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA),
            BlendMode::Add => (glow::SRC_ALPHA, glow::ONE),
            BlendMode::Mult => (glow::DST_COLOR, glow::ONE_MINUS_SRC_ALPHA),
        };
        unsafe {
            self.gl.blend_equation(glow::FUNC_ADD);
            self.gl.blend_func(src, dst);
        }
    }

    fn set_line_width(&mut self, width: f32) {
        unsafe { self.gl.line_width(width) };
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderObject, String> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = self.gl.create_shader(kind)?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(if log.is_empty() {
                    "shader compilation failed".to_string()
                } else {
                    log
                });
            }
            Ok(ShaderObject(self.shaders.insert(shader)))
        }
    }

    fn delete_shader(&mut self, shader: ShaderObject) {
        if let Some(s) = self.shaders.remove(shader.0) {
            unsafe { self.gl.delete_shader(s) };
        }
    }

    fn link_program(
        &mut self,
        vertex: ShaderObject,
        fragment: ShaderObject,
        attribs: &[(u32, &str)],
    ) -> Result<ProgramHandle, String> {
        let (Some(vs), Some(fs)) = (
            self.shaders.get(vertex.0).copied(),
            self.shaders.get(fragment.0).copied(),
        ) else {
            return Err("link error: missing shader object".to_string());
        };
        unsafe {
            let program = self.gl.create_program()?;
            self.gl.attach_shader(program, vs);
            self.gl.attach_shader(program, fs);
            for (index, name) in attribs {
                self.gl.bind_attrib_location(program, *index, name);
            }
            self.gl.link_program(program);
            self.gl.detach_shader(program, vs);
            self.gl.detach_shader(program, fs);
            if !self.gl.get_program_link_status(program) {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(if log.is_empty() {
                    "program linking failed".to_string()
                } else {
                    log
                });
            }
            Ok(ProgramHandle(self.programs.insert(program)))
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        let mut stale = vec![];
        self.uniforms.update_active(|h, (p, _, _)| {
            if *p == program {
                stale.push(h);
            }
        });
        for h in stale {
            self.uniforms.remove(h);
        }
        if let Some(p) = self.programs.remove(program.0) {
            unsafe { self.gl.delete_program(p) };
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        let p = program.and_then(|p| self.programs.get(p.0).copied());
        unsafe { self.gl.use_program(p) };
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformHandle> {
        let p = self.programs.get(program.0).copied()?;
        let mut known = None;
        self.uniforms.update_active(|h, (owner, n, _)| {
            if *owner == program && n.as_str() == name {
                known = Some(h);
            }
        });
        if let Some(h) = known {
            return Some(UniformHandle(h));
        }
        let loc = unsafe { self.gl.get_uniform_location(p, name) }?;
        Some(UniformHandle(
            self.uniforms.insert((program, name.to_string(), loc)),
        ))
    }

    fn uniform_1f(&mut self, loc: Option<UniformHandle>, v: f32) {
        let l = self.gl_location(loc);
        unsafe { self.gl.uniform_1_f32(l, v) };
    }

    fn uniform_2f(&mut self, loc: Option<UniformHandle>, x: f32, y: f32) {
        let l = self.gl_location(loc);
        unsafe { self.gl.uniform_2_f32(l, x, y) };
    }

    fn uniform_matrix_2f(&mut self, loc: Option<UniformHandle>, m: &[f32; 4]) {
        let l = self.gl_location(loc);
        unsafe { self.gl.uniform_matrix_2_f32_slice(l, false, m) };
    }

    fn create_buffer(&mut self) -> Result<BufferHandle, String> {
        let b = unsafe { self.gl.create_buffer()? };
        Ok(BufferHandle(self.buffers.insert(b)))
    }

    fn delete_buffer(&mut self, buf: BufferHandle) {
        if let Some(b) = self.buffers.remove(buf.0) {
            unsafe { self.gl.delete_buffer(b) };
        }
    }

    fn buffer_data(&mut self, buf: BufferHandle, data: &[f32], usage: BufferUsage) {
        let Some(b) = self.gl_buffer(buf) else {
            warn!("buffer_data on unknown buffer");
            return;
        };
        let hint = match usage {
            BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
            BufferUsage::Static => glow::STATIC_DRAW,
        };
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(b));
            self.gl
                .buffer_data_u8_slice(glow::ARRAY_BUFFER, bytemuck::cast_slice(data), hint);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn vertex_attrib(&mut self, index: u32, buf: BufferHandle, components: i32) {
        let Some(b) = self.gl_buffer(buf) else {
            return;
        };
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(b));
            self.gl.enable_vertex_attrib_array(index);
            self.gl
                .vertex_attrib_pointer_f32(index, components, glow::FLOAT, false, 0, 0);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn disable_attrib(&mut self, index: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(index) };
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32) {
        let m = match mode {
            DrawMode::Points => glow::POINTS,
            DrawMode::Lines => glow::LINES,
            DrawMode::Triangles => glow::TRIANGLES,
        };
        unsafe { self.gl.draw_arrays(m, first, count) };
    }

    fn get_error(&mut self) -> GlError {
        GlError::from_code(unsafe { self.gl.get_error() })
    }
}
