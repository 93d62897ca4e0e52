// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! Software implementation of [`GpuBackend`].
//!
//! Rasterizes on the CPU what the built-in shader programs would produce on
//! a GPU: the default vertex transform (camera offset, zoom, rotation,
//! destination size) and the colour / textured fragment stages. Custom GLSL
//! is syntax checked and its uniforms are tracked, but it is shaded like the
//! built-in stage of the same kind (a fragment source sampling a `sampler2D`
//! is treated as textured).
//!
//! Texture rows follow the GL convention: row 0 is the bottom row, and
//! `read_pixels` reads upward from `y`. Every `draw_arrays` is recorded in a
//! draw log, which is what the tests inspect to verify batching.

use super::{
    BlendMode, BufferHandle, BufferUsage, DrawMode, FilterMode, FramebufferHandle, GpuBackend,
    ProgramHandle, ShaderObject, ShaderStage, TextureHandle, UniformHandle, ATTR_COLOR,
    ATTR_POINT_SIZE, ATTR_POSITION, ATTR_TEXCOORD,
};
use crate::render::error::GlError;
use crate::util::objpool::Pool;
use log::debug;
use regex::Regex;
use std::any::Any;
use std::collections::HashMap;

/// largest texture edge accepted, like GL_MAX_TEXTURE_SIZE
pub const SOFT_MAX_TEXTURE_SIZE: u32 = 8192;

/// one recorded draw_arrays call
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub mode: DrawMode,
    pub count: usize,
    pub textured: bool,
    /// untransformed vertex positions
    pub positions: Vec<[f32; 2]>,
    /// None is the default framebuffer
    pub target: Option<FramebufferHandle>,
}

#[derive(Debug, Clone)]
pub struct SoftTexture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub filter: FilterMode,
    pub mipmap: bool,
}

impl SoftTexture {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
            filter: FilterMode::Nearest,
            mipmap: false,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0, 0.0, 0.0, 1.0];
        }
        let x = ((u * self.width as f32).floor() as i64).clamp(0, self.width as i64 - 1);
        let y = ((v * self.height as f32).floor() as i64).clamp(0, self.height as i64 - 1);
        let p = self.pixel(x as u32, y as u32);
        [
            p[0] as f32 / 255.0,
            p[1] as f32 / 255.0,
            p[2] as f32 / 255.0,
            p[3] as f32 / 255.0,
        ]
    }

    fn blend(&mut self, x: i64, y: i64, src: [f32; 4], mode: BlendMode) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let i = ((y as u32 * self.width + x as u32) * 4) as usize;
        let a = src[3];
        for c in 0..4 {
            let d = self.pixels[i + c] as f32 / 255.0;
            let s = src[c];
            let o = match mode {
                BlendMode::Alpha => s * a + d * (1.0 - a),
                BlendMode::Add => s * a + d,
                BlendMode::Mult => s * d + d * (1.0 - a),
            };
            self.pixels[i + c] = (o.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }
}

struct SoftShader {
    stage: ShaderStage,
    samples_texture: bool,
    uniforms: Vec<String>,
}

struct SoftProgram {
    textured: bool,
    declared: Vec<String>,
    values: HashMap<String, Vec<f32>>,
}

impl SoftProgram {
    fn value(&self, name: &str, default: &[f32]) -> Vec<f32> {
        self.values
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_vec())
    }
}

struct SoftUniform {
    program: ProgramHandle,
    name: String,
}

#[derive(Clone, Copy)]
struct Vertex {
    x: f32,
    y: f32,
    color: [f32; 4],
    uv: [f32; 2],
    size: f32,
}

pub struct SoftBackend {
    width: u32,
    height: u32,
    screen: SoftTexture,
    textures: Pool<SoftTexture>,
    framebuffers: Pool<TextureHandle>,
    bound_fbo: Option<FramebufferHandle>,
    bound_texture: Option<TextureHandle>,
    viewport: [i32; 4],
    blend: BlendMode,
    line_width: f32,
    shaders: Pool<SoftShader>,
    programs: Pool<SoftProgram>,
    uniforms: Pool<SoftUniform>,
    current_program: Option<ProgramHandle>,
    buffers: Pool<Vec<f32>>,
    attribs: [Option<(BufferHandle, usize)>; 4],
    draws: Vec<DrawCall>,
    error: GlError,
}

impl SoftBackend {
    /// `width` x `height` is the size of the default framebuffer
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            screen: SoftTexture::new(width, height),
            textures: Pool::new(),
            framebuffers: Pool::new(),
            bound_fbo: None,
            bound_texture: None,
            viewport: [0, 0, width as i32, height as i32],
            blend: BlendMode::Alpha,
            line_width: 1.0,
            shaders: Pool::new(),
            programs: Pool::new(),
            uniforms: Pool::new(),
            current_program: None,
            buffers: Pool::new(),
            attribs: [None; 4],
            draws: vec![],
            error: GlError::NoError,
        }
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    pub fn texture(&self, tex: TextureHandle) -> Option<&SoftTexture> {
        self.textures.get(tex.0)
    }

    pub fn screen(&self) -> &SoftTexture {
        &self.screen
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn uniform_count(&self) -> usize {
        self.uniforms.len()
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    pub fn line_width(&self) -> f32 {
        self.line_width
    }

    pub fn viewport_rect(&self) -> [i32; 4] {
        self.viewport
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_fbo
    }

    pub fn bound_texture(&self) -> Option<TextureHandle> {
        self.bound_texture
    }

    /// last value set on a uniform of `program`
    pub fn uniform_value(&self, program: ProgramHandle, name: &str) -> Option<Vec<f32>> {
        self.programs
            .get(program.0)
            .and_then(|p| p.values.get(name).cloned())
    }

    fn set_error(&mut self, e: GlError) {
        if self.error == GlError::NoError {
            self.error = e;
        }
    }

    fn target_mut(&mut self) -> Option<&mut SoftTexture> {
        match self.bound_fbo {
            None => Some(&mut self.screen),
            Some(f) => {
                let tex = *self.framebuffers.get(f.0)?;
                self.textures.get_mut(tex.0)
            }
        }
    }

    fn attrib_data(&self, index: u32) -> Option<(&[f32], usize)> {
        let (buf, comps) = self.attribs[index as usize]?;
        self.buffers.get(buf.0).map(|d| (d.as_slice(), comps))
    }

    fn gather_vertices(&self, first: usize, count: usize) -> Vec<Vertex> {
        let fetch = |index: u32, i: usize, n: usize| -> Vec<f32> {
            match self.attrib_data(index) {
                Some((data, comps)) if comps >= n => {
                    let base = i * comps;
                    (0..n)
                        .map(|c| data.get(base + c).copied().unwrap_or(0.0))
                        .collect()
                }
                _ => vec![0.0; n],
            }
        };
        (first..first + count)
            .map(|i| {
                let p = fetch(ATTR_POSITION, i, 2);
                let c = fetch(ATTR_COLOR, i, 4);
                let t = fetch(ATTR_TEXCOORD, i, 2);
                let s = fetch(ATTR_POINT_SIZE, i, 1);
                Vertex {
                    x: p[0],
                    y: p[1],
                    color: [c[0], c[1], c[2], c[3]],
                    uv: [t[0], t[1]],
                    size: s[0],
                }
            })
            .collect()
    }

    /// default vertex stage: camera offset, destination size, zoom, rotation,
    /// then the viewport transform to window coordinates
    fn transform(&self, prog: &SoftProgram, vs: &mut [Vertex]) {
        let cdx = prog.value("cameraDx", &[0.0])[0];
        let cdy = prog.value("cameraDy", &[0.0])[0];
        let zoom = prog.value("cameraZoom", &[1.0])[0];
        let m = prog.value("rotationMatrix", &[1.0, 0.0, 0.0, 1.0]);
        let dest = prog.value("destinationSize", &[1.0, 1.0]);
        let [vx, vy, vw, vh] = self.viewport;
        for v in vs.iter_mut() {
            let px = 2.0 * (v.x - cdx) / dest[0] - 1.0;
            let py = 2.0 * (v.y - cdy) / dest[1] - 1.0;
            let nx = zoom * (m[0] * px + m[2] * py);
            let ny = zoom * (m[1] * px + m[3] * py);
            v.x = vx as f32 + (nx + 1.0) * 0.5 * vw as f32;
            v.y = vy as f32 + (ny + 1.0) * 0.5 * vh as f32;
            v.size *= zoom;
        }
    }

    fn shade(&self, textured: bool, color: [f32; 4], uv: [f32; 2]) -> [f32; 4] {
        if !textured {
            return color;
        }
        let texval = self
            .bound_texture
            .and_then(|t| self.textures.get(t.0))
            .map(|t| t.sample(uv[0], uv[1]))
            .unwrap_or([0.0, 0.0, 0.0, 1.0]);
        let mut out = [0.0; 4];
        for c in 0..3 {
            // mix(texval, color, 1 - color)
            let k = 1.0 - color[c];
            out[c] = texval[c] * (1.0 - k) + color[c] * k;
        }
        out[3] = texval[3] * color[3];
        out
    }

    fn raster_triangle(&self, textured: bool, v: [Vertex; 3]) -> Vec<(i64, i64, [f32; 4])> {
        let edge = |a: &Vertex, b: &Vertex, x: f32, y: f32| {
            (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x)
        };
        let mut v = v;
        let mut area = edge(&v[0], &v[1], v[2].x, v[2].y);
        if area == 0.0 {
            return vec![];
        }
        if area < 0.0 {
            v.swap(1, 2);
            area = -area;
        }
        // top-left fill rule, shared edges are drawn once
        let owns = |a: &Vertex, b: &Vertex| {
            let dy = b.y - a.y;
            dy < 0.0 || (dy == 0.0 && b.x - a.x < 0.0)
        };
        let edges = [(1usize, 2usize), (2, 0), (0, 1)];
        let own: Vec<bool> = edges.iter().map(|(a, b)| owns(&v[*a], &v[*b])).collect();
        let (minx, maxx, miny, maxy) = self.clip_box(
            v.iter().map(|p| p.x).fold(f32::MAX, f32::min),
            v.iter().map(|p| p.x).fold(f32::MIN, f32::max),
            v.iter().map(|p| p.y).fold(f32::MAX, f32::min),
            v.iter().map(|p| p.y).fold(f32::MIN, f32::max),
        );
        let mut frags = vec![];
        for py in miny..maxy {
            for px in minx..maxx {
                let (cx, cy) = (px as f32 + 0.5, py as f32 + 0.5);
                let mut w = [0.0f32; 3];
                let mut inside = true;
                for (k, (a, b)) in edges.iter().enumerate() {
                    w[k] = edge(&v[*a], &v[*b], cx, cy);
                    if w[k] < 0.0 || (w[k] == 0.0 && !own[k]) {
                        inside = false;
                        break;
                    }
                }
                if !inside {
                    continue;
                }
                let l = [w[0] / area, w[1] / area, w[2] / area];
                let mut color = [0.0; 4];
                for (c, item) in color.iter_mut().enumerate() {
                    *item = l[0] * v[0].color[c] + l[1] * v[1].color[c] + l[2] * v[2].color[c];
                }
                let uv = [
                    l[0] * v[0].uv[0] + l[1] * v[1].uv[0] + l[2] * v[2].uv[0],
                    l[0] * v[0].uv[1] + l[1] * v[1].uv[1] + l[2] * v[2].uv[1],
                ];
                frags.push((px, py, self.shade(textured, color, uv)));
            }
        }
        frags
    }

    fn raster_line(&self, textured: bool, a: Vertex, b: Vertex) -> Vec<(i64, i64, [f32; 4])> {
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as i64;
        let half = (self.line_width.max(1.0) / 2.0).floor() as i64;
        let mut frags = vec![];
        let mut last = None;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let x = (a.x + dx * t).floor() as i64;
            let y = (a.y + dy * t).floor() as i64;
            if last == Some((x, y)) {
                continue;
            }
            last = Some((x, y));
            let mut color = [0.0; 4];
            for (c, item) in color.iter_mut().enumerate() {
                *item = a.color[c] + (b.color[c] - a.color[c]) * t;
            }
            let uv = [
                a.uv[0] + (b.uv[0] - a.uv[0]) * t,
                a.uv[1] + (b.uv[1] - a.uv[1]) * t,
            ];
            let c = self.shade(textured, color, uv);
            for oy in -half..=half {
                for ox in -half..=half {
                    frags.push((x + ox, y + oy, c));
                }
            }
        }
        frags
    }

    fn raster_point(&self, textured: bool, p: Vertex) -> Vec<(i64, i64, [f32; 4])> {
        let s = p.size.max(1.0);
        let (x0, y0) = (p.x - s / 2.0, p.y - s / 2.0);
        let (minx, maxx, miny, maxy) = self.clip_box(x0, x0 + s, y0, y0 + s);
        let mut frags = vec![];
        for py in miny..maxy {
            for px in minx..maxx {
                let (cx, cy) = (px as f32 + 0.5, py as f32 + 0.5);
                if cx < x0 || cx >= x0 + s || cy < y0 || cy >= y0 + s {
                    continue;
                }
                // point sprite coordinates
                let uv = [(cx - x0) / s, 1.0 - (cy - y0) / s];
                frags.push((px, py, self.shade(textured, p.color, uv)));
            }
        }
        frags
    }

    /// pixel range covering [x0, x1) x [y0, y1), clipped to the viewport
    fn clip_box(&self, x0: f32, x1: f32, y0: f32, y1: f32) -> (i64, i64, i64, i64) {
        let [vx, vy, vw, vh] = self.viewport;
        let minx = (x0.floor() as i64).max(vx as i64);
        let maxx = (x1.ceil() as i64).min((vx + vw) as i64);
        let miny = (y0.floor() as i64).max(vy as i64);
        let maxy = (y1.ceil() as i64).min((vy + vh) as i64);
        (minx, maxx, miny, maxy)
    }

    fn parse_uniforms(source: &str) -> Result<Vec<String>, String> {
        let re = Regex::new(r"uniform\s+\w+\s+(\w+)\s*;").map_err(|e| e.to_string())?;
        Ok(re
            .captures_iter(source)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect())
    }

    fn check_syntax(source: &str) -> Result<(), String> {
        if !source.contains("void main") {
            return Err("ERROR: 0:0: 'main' : function not defined".to_string());
        }
        let mut depth = [0i32; 2];
        for (line, text) in source.lines().enumerate() {
            for ch in text.chars() {
                let (k, d) = match ch {
                    '(' => (0, 1),
                    ')' => (0, -1),
                    '{' => (1, 1),
                    '}' => (1, -1),
                    _ => continue,
                };
                depth[k] += d;
                if depth[k] < 0 {
                    return Err(format!("ERROR: 0:{}: '{}' : syntax error", line + 1, ch));
                }
            }
        }
        if depth != [0, 0] {
            return Err("ERROR: 0:0: '' : syntax error, unexpected end of file".to_string());
        }
        Ok(())
    }
}

impl GpuBackend for SoftBackend {
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
        if width == 0
            || height == 0
            || width > SOFT_MAX_TEXTURE_SIZE
            || height > SOFT_MAX_TEXTURE_SIZE
        {
            self.set_error(GlError::InvalidValue);
            return Err(format!("invalid texture size {}x{}", width, height));
        }
        let mut t = SoftTexture::new(width, height);
        if let Some(p) = pixels {
            let n = t.pixels.len().min(p.len());
            t.pixels[..n].copy_from_slice(&p[..n]);
        }
        Ok(TextureHandle(self.textures.insert(t)))
    }

    fn delete_texture(&mut self, tex: TextureHandle) {
        if self.textures.remove(tex.0).is_none() {
            self.set_error(GlError::InvalidValue);
        }
        if self.bound_texture == Some(tex) {
            self.bound_texture = None;
        }
    }

    fn bind_texture(&mut self, tex: Option<TextureHandle>) {
        self.bound_texture = tex;
    }

    fn set_texture_filter(&mut self, tex: TextureHandle, filter: FilterMode) {
        match self.textures.get_mut(tex.0) {
            Some(t) => t.filter = filter,
            None => self.set_error(GlError::InvalidValue),
        }
    }

    fn generate_mipmap(&mut self, tex: TextureHandle) {
        match self.textures.get_mut(tex.0) {
            Some(t) => t.mipmap = true,
            None => self.set_error(GlError::InvalidOperation),
        }
    }

    fn create_framebuffer(&mut self, tex: TextureHandle) -> Result<FramebufferHandle, String> {
        if !self.textures.contains(tex.0) {
            return Err("Framebuffer is not complete".to_string());
        }
        Ok(FramebufferHandle(self.framebuffers.insert(tex)))
    }

    fn delete_framebuffer(&mut self, fbo: FramebufferHandle) {
        if self.framebuffers.remove(fbo.0).is_none() {
            self.set_error(GlError::InvalidValue);
        }
        if self.bound_fbo == Some(fbo) {
            self.bound_fbo = None;
        }
    }

    fn bind_framebuffer(&mut self, fbo: Option<FramebufferHandle>) {
        self.bound_fbo = fbo;
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.viewport = [x, y, width, height];
    }

    fn clear(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let c = [r, g, b, a].map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
        match self.target_mut() {
            Some(t) => {
                for px in t.pixels.chunks_exact_mut(4) {
                    px.copy_from_slice(&c);
                }
            }
            None => self.set_error(GlError::InvalidFramebufferOperation),
        }
    }

    fn read_pixels(&mut self, x: i32, y: i32, width: u32, height: u32, out: &mut [u8]) {
        let Some(t) = self.target_mut() else {
            self.set_error(GlError::InvalidFramebufferOperation);
            return;
        };
        let t = t.clone();
        for row in 0..height {
            for col in 0..width {
                let (sx, sy) = (x + col as i32, y + row as i32);
                let p = if sx < 0 || sy < 0 {
                    [0; 4]
                } else {
                    t.pixel(sx as u32, sy as u32)
                };
                let i = ((row * width + col) * 4) as usize;
                if i + 4 <= out.len() {
                    out[i..i + 4].copy_from_slice(&p);
                }
            }
        }
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn set_line_width(&mut self, width: f32) {
        if width <= 0.0 {
            self.set_error(GlError::InvalidValue);
            return;
        }
        self.line_width = width;
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderObject, String> {
        Self::check_syntax(source)?;
        let uniforms = Self::parse_uniforms(source)?;
        let samples_texture = stage == ShaderStage::Fragment && source.contains("sampler2D");
        Ok(ShaderObject(self.shaders.insert(SoftShader {
            stage,
            samples_texture,
            uniforms,
        })))
    }

    fn delete_shader(&mut self, shader: ShaderObject) {
        self.shaders.remove(shader.0);
    }

    fn link_program(
        &mut self,
        vertex: ShaderObject,
        fragment: ShaderObject,
        _attribs: &[(u32, &str)],
    ) -> Result<ProgramHandle, String> {
        let (Some(vs), Some(fs)) = (self.shaders.get(vertex.0), self.shaders.get(fragment.0)) else {
            return Err("link error: missing shader object".to_string());
        };
        if vs.stage != ShaderStage::Vertex || fs.stage != ShaderStage::Fragment {
            return Err("link error: shader stages do not match".to_string());
        }
        let mut declared = vs.uniforms.clone();
        for u in &fs.uniforms {
            if !declared.contains(u) {
                declared.push(u.clone());
            }
        }
        let textured = fs.samples_texture;
        Ok(ProgramHandle(self.programs.insert(SoftProgram {
            textured,
            declared,
            values: HashMap::new(),
        })))
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(program.0).is_none() {
            self.set_error(GlError::InvalidValue);
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        let mut stale = vec![];
        self.uniforms.update_active(|h, u| {
            if u.program == program {
                stale.push(h);
            }
        });
        for h in stale {
            self.uniforms.remove(h);
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.current_program = program;
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformHandle> {
        let p = self.programs.get(program.0)?;
        if !p.declared.iter().any(|d| d == name) {
            return None;
        }
        let mut known = None;
        self.uniforms.update_active(|h, u| {
            if u.program == program && u.name == name {
                known = Some(h);
            }
        });
        if let Some(h) = known {
            return Some(UniformHandle(h));
        }
        Some(UniformHandle(self.uniforms.insert(SoftUniform {
            program,
            name: name.to_string(),
        })))
    }

    fn uniform_1f(&mut self, loc: Option<UniformHandle>, v: f32) {
        self.set_uniform(loc, vec![v]);
    }

    fn uniform_2f(&mut self, loc: Option<UniformHandle>, x: f32, y: f32) {
        self.set_uniform(loc, vec![x, y]);
    }

    fn uniform_matrix_2f(&mut self, loc: Option<UniformHandle>, m: &[f32; 4]) {
        self.set_uniform(loc, m.to_vec());
    }

    fn create_buffer(&mut self) -> Result<BufferHandle, String> {
        Ok(BufferHandle(self.buffers.insert(vec![])))
    }

    fn delete_buffer(&mut self, buf: BufferHandle) {
        self.buffers.remove(buf.0);
        for a in self.attribs.iter_mut() {
            if matches!(a, Some((b, _)) if *b == buf) {
                *a = None;
            }
        }
    }

    fn buffer_data(&mut self, buf: BufferHandle, data: &[f32], _usage: BufferUsage) {
        match self.buffers.get_mut(buf.0) {
            Some(b) => {
                b.clear();
                b.extend_from_slice(data);
            }
            None => self.set_error(GlError::InvalidOperation),
        }
    }

    fn vertex_attrib(&mut self, index: u32, buf: BufferHandle, components: i32) {
        if index as usize >= self.attribs.len() || components <= 0 {
            self.set_error(GlError::InvalidValue);
            return;
        }
        self.attribs[index as usize] = Some((buf, components as usize));
    }

    fn disable_attrib(&mut self, index: u32) {
        if let Some(a) = self.attribs.get_mut(index as usize) {
            *a = None;
        }
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32) {
        let Some(prog) = self.current_program.and_then(|p| self.programs.get(p.0)) else {
            self.set_error(GlError::InvalidOperation);
            return;
        };
        if first < 0 || count < 0 {
            self.set_error(GlError::InvalidValue);
            return;
        }
        let textured = prog.textured;
        let mut vs = self.gather_vertices(first as usize, count as usize);
        self.draws.push(DrawCall {
            mode,
            count: count as usize,
            textured,
            positions: vs.iter().map(|v| [v.x, v.y]).collect(),
            target: self.bound_fbo,
        });
        debug!("soft draw_arrays {:?} count={} textured={}", mode, count, textured);
        if let Some(prog) = self.current_program.and_then(|p| self.programs.get(p.0)) {
            self.transform(prog, &mut vs);
        }

        let mut frags = vec![];
        match mode {
            DrawMode::Triangles => {
                for t in vs.chunks_exact(3) {
                    frags.extend(self.raster_triangle(textured, [t[0], t[1], t[2]]));
                }
            }
            DrawMode::Lines => {
                for l in vs.chunks_exact(2) {
                    frags.extend(self.raster_line(textured, l[0], l[1]));
                }
            }
            DrawMode::Points => {
                for p in vs.iter() {
                    frags.extend(self.raster_point(textured, *p));
                }
            }
        }
        let blend = self.blend;
        match self.target_mut() {
            Some(t) => {
                for (x, y, c) in frags {
                    t.blend(x, y, c, blend);
                }
            }
            None => self.set_error(GlError::InvalidFramebufferOperation),
        }
    }

    fn get_error(&mut self) -> GlError {
        std::mem::replace(&mut self.error, GlError::NoError)
    }
}

impl SoftBackend {
    fn set_uniform(&mut self, loc: Option<UniformHandle>, v: Vec<f32>) {
        let Some(loc) = loc else {
            return;
        };
        let Some(u) = self.uniforms.get(loc.0) else {
            self.set_error(GlError::InvalidOperation);
            return;
        };
        let (program, name) = (u.program, u.name.clone());
        match self.programs.get_mut(program.0) {
            Some(p) => {
                p.values.insert(name, v);
            }
            None => self.set_error(GlError::InvalidOperation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::ATTRIB_BINDINGS;

    const VS: &str = "uniform vec2 destinationSize;\nattribute vec2 position;\nvoid main() { gl_Position = vec4(position, 0.0, 1.0); }";
    const FS: &str = "varying vec4 fColor;\nvoid main() { gl_FragColor = fColor; }";

    fn color_program(gl: &mut SoftBackend) -> ProgramHandle {
        let v = gl.compile_shader(ShaderStage::Vertex, VS).unwrap();
        let f = gl.compile_shader(ShaderStage::Fragment, FS).unwrap();
        gl.link_program(v, f, &ATTRIB_BINDINGS).unwrap()
    }

    fn upload(gl: &mut SoftBackend, index: u32, data: &[f32], comps: i32) {
        let b = gl.create_buffer().unwrap();
        gl.buffer_data(b, data, BufferUsage::Dynamic);
        gl.vertex_attrib(index, b, comps);
    }

    #[test]
    fn test_compile_errors() {
        let mut gl = SoftBackend::new(4, 4);
        assert!(gl.compile_shader(ShaderStage::Vertex, "int x;").is_err());
        assert!(gl
            .compile_shader(ShaderStage::Fragment, "void main() { x = (1; }")
            .is_err());
        assert!(gl.compile_shader(ShaderStage::Fragment, FS).is_ok());
    }

    #[test]
    fn test_uniform_declared_only() {
        let mut gl = SoftBackend::new(4, 4);
        let p = color_program(&mut gl);
        assert!(gl.uniform_location(p, "destinationSize").is_some());
        assert!(gl.uniform_location(p, "nope").is_none());
    }

    #[test]
    fn test_uniform_location_cached() {
        let mut gl = SoftBackend::new(4, 4);
        let p = color_program(&mut gl);
        let q = color_program(&mut gl);
        let a = gl.uniform_location(p, "destinationSize");
        assert_eq!(gl.uniform_location(p, "destinationSize"), a);
        assert_eq!(gl.uniform_count(), 1);
        // other programs get their own location
        assert_ne!(gl.uniform_location(q, "destinationSize"), a);
        assert_eq!(gl.uniform_count(), 2);
        gl.delete_program(p);
        assert_eq!(gl.uniform_count(), 1);
    }

    #[test]
    fn test_clear_and_read() {
        let mut gl = SoftBackend::new(2, 2);
        gl.clear(1.0, 0.0, 0.0, 1.0);
        let mut out = [0u8; 16];
        gl.read_pixels(0, 0, 2, 2, &mut out);
        assert_eq!(&out[0..4], &[255, 0, 0, 255]);
        assert_eq!(&out[12..16], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_triangle_fill_and_log() {
        let mut gl = SoftBackend::new(8, 8);
        let p = color_program(&mut gl);
        gl.use_program(Some(p));
        let loc = gl.uniform_location(p, "destinationSize");
        gl.uniform_2f(loc, 8.0, 8.0);
        upload(&mut gl, ATTR_POSITION, &[0.0, 0.0, 8.0, 0.0, 0.0, 8.0], 2);
        upload(&mut gl, ATTR_COLOR, &[0.0, 1.0, 0.0, 1.0].repeat(3), 4);
        gl.draw_arrays(DrawMode::Triangles, 0, 3);
        assert_eq!(gl.draws().len(), 1);
        assert_eq!(gl.draws()[0].count, 3);
        assert!(!gl.draws()[0].textured);
        assert_eq!(gl.screen().pixel(1, 1), [0, 255, 0, 255]);
        assert_eq!(gl.screen().pixel(7, 7), [0, 0, 0, 0]);
    }

    #[test]
    fn test_shared_edge_drawn_once() {
        let mut gl = SoftBackend::new(4, 4);
        let p = color_program(&mut gl);
        gl.use_program(Some(p));
        let loc = gl.uniform_location(p, "destinationSize");
        gl.uniform_2f(loc, 4.0, 4.0);
        // two triangles of a quad, half transparent white
        upload(
            &mut gl,
            ATTR_POSITION,
            &[0.0, 0.0, 4.0, 0.0, 4.0, 4.0, 0.0, 0.0, 4.0, 4.0, 0.0, 4.0],
            2,
        );
        upload(&mut gl, ATTR_COLOR, &[1.0, 1.0, 1.0, 0.5].repeat(6), 4);
        gl.draw_arrays(DrawMode::Triangles, 0, 6);
        let d = gl.screen().pixel(1, 1);
        let o = gl.screen().pixel(2, 1);
        assert_eq!(d, o);
    }

    #[test]
    fn test_draw_without_program_is_error() {
        let mut gl = SoftBackend::new(4, 4);
        gl.draw_arrays(DrawMode::Points, 0, 1);
        assert_eq!(gl.get_error(), GlError::InvalidOperation);
        assert_eq!(gl.get_error(), GlError::NoError);
        assert!(gl.draws().is_empty());
    }
}
