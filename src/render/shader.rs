// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! Shader: a pair of linked programs sharing one vertex stage.
//!
//! The colour program shades untextured geometry, the textured program
//! samples the current texture source. Sources left out (or empty) fall back
//! to the built-in stages, and the GLSL ES prefix is injected in front of
//! every stage. A compile or link failure reports the first non-empty log of
//! the vertex stage, the fragment stages, then the link step.

use crate::render::backend::{
    GpuBackend, ProgramHandle, ShaderObject, ShaderStage, UniformHandle, ATTRIB_BINDINGS,
};
use crate::render::error::{DisplayError, DisplayResult};
use crate::render::shader_source::*;
use log::{info, warn};

/// program variant used for a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Color = 0,
    Textured = 1,
}

/// uniform locations of the built-in vertex stage
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformLocations {
    pub dx: Option<UniformHandle>,
    pub dy: Option<UniformHandle>,
    pub zoom: Option<UniformHandle>,
    pub rotation_matrix: Option<UniformHandle>,
    pub destination_size: Option<UniformHandle>,
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderProgram {
    pub program: ProgramHandle,
    pub locations: UniformLocations,
}

#[derive(Debug)]
pub struct Shader {
    programs: [ShaderProgram; 2],
    vert: ShaderObject,
    frag_color: ShaderObject,
    frag_tex: ShaderObject,
}

fn source_or<'a>(src: Option<&'a str>, default: &'a str) -> &'a str {
    match src {
        Some(s) if !s.trim().is_empty() => s,
        _ => default,
    }
}

impl Shader {
    /// Compiles and links both programs, falling back to the default
    /// stage for each missing source.
    pub fn new(
        gl: &mut dyn GpuBackend,
        vert: Option<&str>,
        frag_color: Option<&str>,
        frag_tex: Option<&str>,
    ) -> DisplayResult<Self> {
        let vsrc = format!("{}{}", SHADER_PREFIX, source_or(vert, DEFAULT_VERTEX_SHADER));
        let fcsrc = format!(
            "{}{}",
            SHADER_PREFIX,
            source_or(frag_color, DEFAULT_FRAGMENT_SHADER_COLOR)
        );
        let ftsrc = format!(
            "{}{}",
            SHADER_PREFIX,
            source_or(frag_tex, DEFAULT_FRAGMENT_SHADER_TEX)
        );

        let vert = gl
            .compile_shader(ShaderStage::Vertex, &vsrc)
            .map_err(DisplayError::ShaderCompile)?;
        let frag_color = match gl.compile_shader(ShaderStage::Fragment, &fcsrc) {
            Ok(f) => f,
            Err(e) => {
                gl.delete_shader(vert);
                return Err(DisplayError::ShaderCompile(e));
            }
        };
        let frag_tex = match gl.compile_shader(ShaderStage::Fragment, &ftsrc) {
            Ok(f) => f,
            Err(e) => {
                gl.delete_shader(vert);
                gl.delete_shader(frag_color);
                return Err(DisplayError::ShaderCompile(e));
            }
        };

        let release = |gl: &mut dyn GpuBackend| {
            gl.delete_shader(vert);
            gl.delete_shader(frag_color);
            gl.delete_shader(frag_tex);
        };
        let prog_color = match gl.link_program(vert, frag_color, &ATTRIB_BINDINGS) {
            Ok(p) => p,
            Err(e) => {
                release(gl);
                return Err(DisplayError::ShaderCompile(e));
            }
        };
        let prog_tex = match gl.link_program(vert, frag_tex, &ATTRIB_BINDINGS) {
            Ok(p) => p,
            Err(e) => {
                gl.delete_program(prog_color);
                release(gl);
                return Err(DisplayError::ShaderCompile(e));
            }
        };

        let programs = [
            ShaderProgram {
                program: prog_color,
                locations: Self::locate(gl, prog_color),
            },
            ShaderProgram {
                program: prog_tex,
                locations: Self::locate(gl, prog_tex),
            },
        ];
        info!("shader linked {:?} {:?}", prog_color, prog_tex);
        Ok(Self {
            programs,
            vert,
            frag_color,
            frag_tex,
        })
    }

    fn locate(gl: &mut dyn GpuBackend, p: ProgramHandle) -> UniformLocations {
        UniformLocations {
            dx: gl.uniform_location(p, "cameraDx"),
            dy: gl.uniform_location(p, "cameraDy"),
            zoom: gl.uniform_location(p, "cameraZoom"),
            rotation_matrix: gl.uniform_location(p, "rotationMatrix"),
            destination_size: gl.uniform_location(p, "destinationSize"),
        }
    }

    pub fn program(&self, kind: ProgramKind) -> &ShaderProgram {
        &self.programs[kind as usize]
    }

    /// Sets float uniform `name` on every program declaring it.
    /// Returns false, with a warning, when neither program has it.
    pub fn feed(&self, gl: &mut dyn GpuBackend, name: &str, value: f32) -> bool {
        let mut found = false;
        for p in self.programs.iter() {
            if let Some(loc) = gl.uniform_location(p.program, name) {
                gl.use_program(Some(p.program));
                gl.uniform_1f(Some(loc), value);
                found = true;
            }
        }
        if !found {
            warn!("no uniform named {}", name);
        }
        found
    }

    /// releases programs and stages
    pub fn free(self, gl: &mut dyn GpuBackend) {
        for p in self.programs.iter() {
            gl.delete_program(p.program);
        }
        gl.delete_shader(self.vert);
        gl.delete_shader(self.frag_color);
        gl.delete_shader(self.frag_tex);
    }
}
