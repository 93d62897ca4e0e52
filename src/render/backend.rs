// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! # GPU Backend Interface
//!
//! Every GPU call of the rendering core goes through the object-safe
//! [`GpuBackend`] trait. The surface of the trait is the small GLES2 subset
//! the batching pipeline needs: textures, framebuffers, vertex buffer
//! objects, shader programs, float uniforms, blending and `draw_arrays`.
//!
//! Two implementations ship with the crate:
//!
//! - **`GlowBackend`** (`gl` feature): OpenGL / GLES / WebGL through `glow`.
//!   The embedding application owns window and context creation and hands
//!   the `glow::Context` over.
//! - **`SoftBackend`**: a CPU rasterizer emulating the built-in pipeline,
//!   used headless and by the tests.
//!
//! GPU objects are referred to through opaque handles, each backend maps
//! them to its native objects. Handles are plain `Copy` values and carry no
//! ownership, the records in `render::surface`, `render::shader` and
//! `render::buffer` decide when they are released.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Display ── Buffer ── Shader ── Surface ── Camera │
//! └────────────────────────┬─────────────────────────┘
//!                          │ &mut dyn GpuBackend
//!            ┌─────────────┴─────────────┐
//!            ▼                           ▼
//!     ┌─────────────┐             ┌─────────────┐
//!     │ GlowBackend │             │ SoftBackend │
//!     │ (glow, GL)  │             │ (CPU, tests)│
//!     └─────────────┘             └─────────────┘
//! ```

use crate::render::error::GlError;
use crate::util::objpool::PoolHandle;
use serde::{Deserialize, Serialize};
use std::any::Any;

#[cfg(feature = "gl")]
pub mod gl;
pub mod soft;

#[cfg(feature = "gl")]
pub use gl::GlowBackend;
pub use soft::{DrawCall, SoftBackend};

/// attribute slots bound before linking, shared by every program
pub const ATTR_POSITION: u32 = 0;
pub const ATTR_COLOR: u32 = 1;
pub const ATTR_TEXCOORD: u32 = 2;
pub const ATTR_POINT_SIZE: u32 = 3;

/// attribute name → slot table passed to link_program
pub const ATTRIB_BINDINGS: [(u32, &str); 4] = [
    (ATTR_POSITION, "position"),
    (ATTR_COLOR, "color"),
    (ATTR_TEXCOORD, "texCoord"),
    (ATTR_POINT_SIZE, "pointSize"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub PoolHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub PoolHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub PoolHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub PoolHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderObject(pub PoolHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformHandle(pub PoolHandle);

/// texture sampling filter, ordered from cheapest to most expensive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Nearest,
    Linear,
    Bilinear,
    Trilinear,
}

impl FilterMode {
    /// filters at or above bilinear sample mipmaps
    pub fn uses_mipmap(&self) -> bool {
        *self >= FilterMode::Bilinear
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// src * a + dst * (1 - a)
    #[default]
    Alpha,
    /// src * a + dst
    Add,
    /// src * dst + dst * (1 - a)
    Mult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Points,
    Lines,
    Triangles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Dynamic,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// GPU command interface of the rendering core.
///
/// Errors are reported as `String` in the style of `glow`; info logs of
/// failed compiles and links come back as the `Err` value.
pub trait GpuBackend {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// size of the default framebuffer
    fn framebuffer_size(&self) -> (u32, u32);

    /// Allocates an RGBA8 texture. `pixels`, when given, holds
    /// `width * height * 4` bytes, row 0 first.
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Result<TextureHandle, String>;
    fn delete_texture(&mut self, tex: TextureHandle);
    fn bind_texture(&mut self, tex: Option<TextureHandle>);
    fn set_texture_filter(&mut self, tex: TextureHandle, filter: FilterMode);
    fn generate_mipmap(&mut self, tex: TextureHandle);

    /// Creates a framebuffer with `tex` as its colour attachment.
    fn create_framebuffer(&mut self, tex: TextureHandle) -> Result<FramebufferHandle, String>;
    fn delete_framebuffer(&mut self, fbo: FramebufferHandle);
    /// None binds the default framebuffer
    fn bind_framebuffer(&mut self, fbo: Option<FramebufferHandle>);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn clear(&mut self, r: f32, g: f32, b: f32, a: f32);
    /// Reads RGBA8 pixels of the bound framebuffer into `out`.
    fn read_pixels(&mut self, x: i32, y: i32, width: u32, height: u32, out: &mut [u8]);

    fn set_blend_mode(&mut self, mode: BlendMode);
    fn set_line_width(&mut self, width: f32);

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderObject, String>;
    fn delete_shader(&mut self, shader: ShaderObject);
    fn link_program(
        &mut self,
        vertex: ShaderObject,
        fragment: ShaderObject,
        attribs: &[(u32, &str)],
    ) -> Result<ProgramHandle, String>;
    fn delete_program(&mut self, program: ProgramHandle);
    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformHandle>;
    fn uniform_1f(&mut self, loc: Option<UniformHandle>, v: f32);
    fn uniform_2f(&mut self, loc: Option<UniformHandle>, x: f32, y: f32);
    /// column-major 2x2 matrix
    fn uniform_matrix_2f(&mut self, loc: Option<UniformHandle>, m: &[f32; 4]);

    fn create_buffer(&mut self) -> Result<BufferHandle, String>;
    fn delete_buffer(&mut self, buf: BufferHandle);
    fn buffer_data(&mut self, buf: BufferHandle, data: &[f32], usage: BufferUsage);
    /// Binds `buf` to attribute `index` with `components` floats per vertex
    /// and enables the attribute array.
    fn vertex_attrib(&mut self, index: u32, buf: BufferHandle, components: i32);
    fn disable_attrib(&mut self, index: u32);
    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32);

    /// Returns and clears the pending error flag.
    fn get_error(&mut self) -> GlError;
}
