// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! pixel_gl2d is the 2D rendering core of a small game engine: surfaces
//! (textures usable as render targets), shaders, a camera and a batching
//! vertex buffer, driven through one immediate-mode `Display` context.
//!
//! Draw calls are accumulated into vertex arrays and sent to the GPU in
//! batches. A batch is flushed whenever the state it was built under would
//! change: primitive kind, texture use, shader, render target, texture
//! source, camera or blend mode.
//!
//! The GPU is reached through the `GpuBackend` trait. With the `gl` feature
//! `GlowBackend` drives OpenGL / GLES / WebGL through glow, the embedding
//! application providing the context. `SoftBackend` rasterizes on the CPU
//! and needs nothing.
//!
//! ```
//! use pixel_gl2d::render::{Display, SoftBackend};
//!
//! let mut d = Display::new(Box::new(SoftBackend::new(320, 200))).unwrap();
//! d.set_color(0, 255, 0).unwrap();
//! d.draw_line(0.0, 0.0, 100.0, 100.0).unwrap();
//! d.flip().unwrap();
//! ```
//!
//! Modules config, log, render and util are offered. Building without
//! default features leaves out file logging, image decoding and the GL
//! backend.

/// display configuration, TOML
pub mod config;

/// log4rs setup
pub mod log;

/// surfaces, shaders, camera, buffers and the display context
pub mod render;

/// power-of-two helpers, object pool
pub mod util;

pub use config::{get_display_config, init_display_config, DisplayConfig};
pub use render::{Display, DisplayError, DisplayResult};
