// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! # Render module
//!
//! Batched immediate-mode 2D rendering.
//!
//! ## Submodules
//! - `backend`: the `GpuBackend` trait with the glow and software backends
//! - `buffer`: vertex batching, flushed on every incompatible state change
//! - `camera`: pan, zoom and rotation of the scene, camera stack
//! - `display`: the rendering context owning every resource and the drawing state
//! - `error`: display errors and the GL error table
//! - `shader`: colour and textured program pairs
//! - `shader_source`: built-in GLSL stages
//! - `surface`: textures usable as source and render target

pub mod backend;
pub mod buffer;
pub mod camera;
pub mod display;
pub mod error;
pub mod shader;
pub mod shader_source;
pub mod surface;

// re-export common types
pub use backend::{BlendMode, FilterMode, GpuBackend, SoftBackend};
#[cfg(feature = "gl")]
pub use backend::GlowBackend;
pub use buffer::{Buffer, BufferKind, OverflowPolicy};
pub use camera::Camera;
pub use display::{BufferId, Display, DrawPrimitive, ShaderId, SurfaceId};
pub use error::{DisplayError, DisplayResult, GlError};
pub use shader::Shader;
pub use surface::Surface;
