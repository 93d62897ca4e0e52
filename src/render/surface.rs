// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! Surface: an RGBA texture that can be drawn from (texture source) and
//! drawn on (render target).
//!
//! The texture is allocated with power-of-two dimensions unless `force_npot`
//! is asked, `w`/`h` keep the logical size. The framebuffer is created on
//! the first `draw_on`, except for blank surfaces which are meant to be
//! drawn on and get it right away.

use crate::render::backend::{FilterMode, FramebufferHandle, GpuBackend, TextureHandle};
use crate::render::error::{check_gl_error, DisplayError, DisplayResult};
use crate::util::{is_pot, next_pot};
use log::{debug, info};

/// largest image accepted by the load path
pub const MAX_SURFACE_SIZE: u32 = 2048;

#[derive(Debug)]
pub struct Surface {
    pub w: u32,
    pub h: u32,
    pub texw: u32,
    pub texh: u32,
    pub tex: TextureHandle,
    pub fbo: Option<FramebufferHandle>,
    pub filter: FilterMode,
    pub has_mipmap: bool,
    pub npot: bool,
}

impl Surface {
    fn alloc(
        gl: &mut dyn GpuBackend,
        w: u32,
        h: u32,
        force_npot: bool,
        pixels: Option<&[u8]>,
    ) -> DisplayResult<Self> {
        let too_big = || DisplayError::InvalidSize(w as i64, h as i64);
        let (texw, texh) = if force_npot {
            (w, h)
        } else {
            (
                next_pot(w).ok_or_else(too_big)?,
                next_pot(h).ok_or_else(too_big)?,
            )
        };
        byte_len(texw, texh).ok_or_else(too_big)?;
        let padded;
        let data = match pixels {
            Some(p) if (texw, texh) != (w, h) => {
                padded = pad_pixels(p, w, h, texw, texh);
                Some(padded.as_slice())
            }
            other => other,
        };
        let tex = gl
            .create_texture(texw, texh, data)
            .map_err(DisplayError::Backend)?;
        check_gl_error(gl, "create_texture");
        let filter = FilterMode::Linear;
        gl.set_texture_filter(tex, filter);
        debug!("surface {}x{} tex {}x{}", w, h, texw, texh);
        Ok(Self {
            w,
            h,
            texw,
            texh,
            tex,
            fbo: None,
            filter,
            has_mipmap: false,
            npot: !is_pot(texw) || !is_pot(texh),
        })
    }

    /// Blank surface, cleared to transparent. Leaves its framebuffer bound,
    /// the caller restores its own target.
    pub fn new(gl: &mut dyn GpuBackend, w: u32, h: u32, force_npot: bool) -> DisplayResult<Self> {
        let mut s = Self::alloc(gl, w, h, force_npot, None)?;
        s.bind_as_target(gl)?;
        gl.viewport(0, 0, s.texw as i32, s.texh as i32);
        gl.clear(0.0, 0.0, 0.0, 0.0);
        Ok(s)
    }

    /// Surface from raw RGBA8 pixels, `w * h * 4` bytes, row 0 first.
    pub fn from_pixels(
        gl: &mut dyn GpuBackend,
        w: u32,
        h: u32,
        pixels: &[u8],
        force_npot: bool,
    ) -> DisplayResult<Self> {
        let need = byte_len(w, h).ok_or(DisplayError::InvalidSize(w as i64, h as i64))?;
        if pixels.len() < need {
            return Err(DisplayError::InvalidArgument(format!(
                "{} bytes of pixels for a {}x{} surface",
                pixels.len(),
                w,
                h
            )));
        }
        Self::alloc(gl, w, h, force_npot, Some(pixels))
    }

    /// Decodes an image file into a power-of-two surface.
    #[cfg(feature = "image")]
    pub fn load(gl: &mut dyn GpuBackend, path: &str) -> DisplayResult<Self> {
        let img =
            image::open(path).map_err(|e| DisplayError::ImageLoad(format!("{}: {}", path, e)))?;
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        if w == 0 || h == 0 {
            return Err(DisplayError::InvalidSize(w as i64, h as i64));
        }
        if w > MAX_SURFACE_SIZE || h > MAX_SURFACE_SIZE {
            return Err(DisplayError::ImageTooLarge(w, h));
        }
        info!("load surface {} {}x{}", path, w, h);
        Self::from_pixels(gl, w, h, rgba.as_raw(), false)
    }

    #[cfg(not(feature = "image"))]
    pub fn load(_gl: &mut dyn GpuBackend, path: &str) -> DisplayResult<Self> {
        Err(DisplayError::ImageLoad(format!(
            "{}: built without image support",
            path
        )))
    }

    /// Binds the framebuffer, creating it on first use. Drawing on the
    /// surface invalidates its mipmaps.
    pub fn bind_as_target(&mut self, gl: &mut dyn GpuBackend) -> DisplayResult<()> {
        let fbo = match self.fbo {
            Some(f) => f,
            None => {
                let f = gl.create_framebuffer(self.tex).map_err(DisplayError::Backend)?;
                check_gl_error(gl, "create_framebuffer");
                self.fbo = Some(f);
                f
            }
        };
        self.has_mipmap = false;
        gl.bind_framebuffer(Some(fbo));
        Ok(())
    }

    /// Binds the texture, building mipmaps on demand for mipmapped filters.
    pub fn bind_as_source(&mut self, gl: &mut dyn GpuBackend) {
        gl.bind_texture(Some(self.tex));
        if self.filter.uses_mipmap() && !self.npot && !self.has_mipmap {
            gl.generate_mipmap(self.tex);
            self.has_mipmap = true;
        }
    }

    pub fn set_filter(&mut self, gl: &mut dyn GpuBackend, filter: FilterMode) {
        self.filter = filter;
        // npot textures cannot sample mipmaps
        let effective = if self.npot && filter.uses_mipmap() {
            FilterMode::Linear
        } else {
            filter
        };
        gl.set_texture_filter(self.tex, effective);
        if filter.uses_mipmap() && !self.npot && !self.has_mipmap {
            gl.generate_mipmap(self.tex);
            self.has_mipmap = true;
        }
    }

    pub fn free(self, gl: &mut dyn GpuBackend) {
        if let Some(f) = self.fbo {
            gl.delete_framebuffer(f);
        }
        gl.delete_texture(self.tex);
    }
}

/// RGBA8 byte count of a `w` x `h` image, None if it does not fit a usize
fn byte_len(w: u32, h: u32) -> Option<usize> {
    (w as usize).checked_mul(h as usize)?.checked_mul(4)
}

/// Copies a `w` x `h` image into the lower left of a transparent `tw` x `th`
/// one. Both sizes were checked with `byte_len`.
fn pad_pixels(src: &[u8], w: u32, h: u32, tw: u32, th: u32) -> Vec<u8> {
    let (w, h, tw, th) = (w as usize, h as usize, tw as usize, th as usize);
    let mut out = vec![0u8; tw * th * 4];
    let row = w * 4;
    let n = row.min(tw * 4);
    for y in 0..h.min(th) {
        let (s, d) = (y * row, y * tw * 4);
        out[d..d + n].copy_from_slice(&src[s..s + n]);
    }
    out
}
