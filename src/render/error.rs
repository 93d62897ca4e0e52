// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! Error types of the rendering core.
//!
//! `DisplayError` is what callers see: bad arguments, image decode failures,
//! shader compile logs, stale handles and user buffer misuse. `GlError` is
//! the backend error flag decoded through a lookup table. An out-of-memory
//! flag is fatal and never surfaces as a value.

use crate::render::backend::GpuBackend;
use log::{error, warn};

/// rendering core result type
pub type DisplayResult<T> = Result<T, DisplayError>;

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayError {
    /// colour or alpha component outside 0..=255
    InvalidColor(i64),
    /// zero or negative surface dimensions
    InvalidSize(i64, i64),
    /// negative line width, point size and the like
    InvalidArgument(String),
    ImageLoad(String),
    /// image wider or taller than MAX_SURFACE_SIZE
    ImageTooLarge(u32, u32),
    ShaderCompile(String),
    UnknownSurface,
    UnknownShader,
    UnknownBuffer,
    /// buffer was uploaded with upload_and_free, no more pushes allowed
    BufferFreed,
    BufferIncompatible(String),
    CameraStack(String),
    Backend(String),
    Config(String),
    Io(String),
}

impl std::fmt::Display for DisplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayError::InvalidColor(v) => {
                write!(f, "invalid color component {}, expected 0..255", v)
            }
            DisplayError::InvalidSize(w, h) => {
                write!(f, "invalid surface size {}x{}, must be > 0", w, h)
            }
            DisplayError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            DisplayError::ImageLoad(msg) => write!(f, "cannot load image: {}", msg),
            DisplayError::ImageTooLarge(w, h) => {
                write!(f, "image too large: {}x{}", w, h)
            }
            DisplayError::ShaderCompile(msg) => write!(f, "shader error: {}", msg),
            DisplayError::UnknownSurface => write!(f, "unknown or freed surface"),
            DisplayError::UnknownShader => write!(f, "unknown or freed shader"),
            DisplayError::UnknownBuffer => write!(f, "unknown or freed buffer"),
            DisplayError::BufferFreed => write!(f, "the buffer has been freed"),
            DisplayError::BufferIncompatible(what) => {
                write!(f, "the current buffer cannot contain {}", what)
            }
            DisplayError::CameraStack(msg) => write!(f, "camera stack: {}", msg),
            DisplayError::Backend(msg) => write!(f, "gpu backend error: {}", msg),
            DisplayError::Config(msg) => write!(f, "config error: {}", msg),
            DisplayError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for DisplayError {}

impl From<std::io::Error> for DisplayError {
    fn from(e: std::io::Error) -> Self {
        DisplayError::Io(e.to_string())
    }
}

/// decoded backend error flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlError {
    NoError,
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    StackOverflow,
    StackUnderflow,
    OutOfMemory,
    InvalidFramebufferOperation,
    Unknown(u32),
}

const GL_ERRORS: [(u32, GlError, &str); 8] = [
    (0, GlError::NoError, "GL_NO_ERROR"),
    (0x0500, GlError::InvalidEnum, "GL_INVALID_ENUM"),
    (0x0501, GlError::InvalidValue, "GL_INVALID_VALUE"),
    (0x0502, GlError::InvalidOperation, "GL_INVALID_OPERATION"),
    (0x0503, GlError::StackOverflow, "GL_STACK_OVERFLOW"),
    (0x0504, GlError::StackUnderflow, "GL_STACK_UNDERFLOW"),
    (0x0505, GlError::OutOfMemory, "GL_OUT_OF_MEMORY"),
    (
        0x0506,
        GlError::InvalidFramebufferOperation,
        "GL_INVALID_FRAMEBUFFER_OPERATION",
    ),
];

impl GlError {
    pub fn from_code(code: u32) -> Self {
        GL_ERRORS
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, e, _)| *e)
            .unwrap_or(GlError::Unknown(code))
    }

    pub fn code(&self) -> u32 {
        match self {
            GlError::Unknown(c) => *c,
            e => GL_ERRORS
                .iter()
                .find(|(_, k, _)| k == e)
                .map(|(c, _, _)| *c)
                .unwrap_or(0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        GL_ERRORS
            .iter()
            .find(|(_, k, _)| k == self)
            .map(|(_, _, s)| *s)
            .unwrap_or("GL_UNKNOWN_ERROR")
    }
}

impl std::fmt::Display for GlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlError::Unknown(c) => write!(f, "GL_UNKNOWN_ERROR(0x{:04x})", c),
            e => write!(f, "{}", e.as_str()),
        }
    }
}

/// Polls the backend error flag after an allocation or upload.
/// Out of memory terminates the process, anything else is logged.
pub fn check_gl_error(gl: &mut dyn GpuBackend, context: &str) {
    match gl.get_error() {
        GlError::NoError => {}
        GlError::OutOfMemory => {
            error!("{}: {}, aborting", context, GlError::OutOfMemory);
            std::process::exit(1);
        }
        e => warn!("{}: {}", context, e),
    }
}
