//! GPU resource records (§3 `Texture`, `Buffer`, `Shader`, `Program`,
//! `InputLayout`). These hold driver handles by value with no destructor:
//! lifecycle is externally controlled by step submission, matching the
//! source's raw-handle-ownership design. Only [`crate::framebuffer::Framebuffer`]
//! carries an explicit destructor.

use crate::api as gl;
use fxhash::FxHashMap;
use std::cell::Cell;
use std::rc::Rc;

pub type Handle = gl::types::GLuint;

/// GPU texture object (§3 `Texture`). Created by `CreateTexture` or
/// [`crate::handles::TextureNamePool::alloc`], populated by `TextureImage`.
/// The core never deletes it during step execution.
#[derive(Debug, Default, Clone)]
pub struct Texture {
    pub handle: Handle,
    pub target: gl::types::GLenum,
    pub level: u32,
    pub format: gl::types::GLenum,
    pub ty: gl::types::GLenum,
    pub width: u32,
    pub height: u32,
    pub sampler: SamplerState,
}

/// Sampler state tracked per texture so `TextureSampler`/`TextureLod`
/// commands and `TextureImage`'s implicit clamp/filter setup can be applied
/// without round-tripping through the driver to read it back.
#[derive(Debug, Clone, Copy)]
pub struct SamplerState {
    pub wrap_s: gl::types::GLenum,
    pub wrap_t: gl::types::GLenum,
    pub min_filter: gl::types::GLenum,
    pub mag_filter: gl::types::GLenum,
    pub lod_min: f32,
    pub lod_max: f32,
    pub lod_bias: f32,
    pub anisotropy: f32,
}

impl Default for SamplerState {
    fn default() -> Self {
        SamplerState {
            wrap_s: gl::CLAMP_TO_EDGE,
            wrap_t: gl::CLAMP_TO_EDGE,
            min_filter: gl::LINEAR,
            mag_filter: gl::LINEAR,
            lod_min: -1000.0,
            lod_max: 1000.0,
            lod_bias: 0.0,
            anisotropy: 1.0,
        }
    }
}

/// GPU buffer object (§3 `Buffer`). `BufferSubData`'s attached data block is
/// heap-owned and freed on consumption iff the step flags it.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    pub handle: Handle,
    pub target: gl::types::GLenum,
    pub size: usize,
    pub usage: gl::types::GLenum,
}

/// Compiled shader stage (§3 `Shader`).
#[derive(Debug, Clone)]
pub struct Shader {
    pub handle: Handle,
    pub stage: ShaderStage,
    /// Always `true` once `CreateShader` runs to completion, even on a
    /// compile failure — a preserved quirk of the source, see DESIGN.md and
    /// SPEC_FULL.md §9.
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_glenum(self) -> gl::types::GLenum {
        match self {
            ShaderStage::Vertex => gl::VERTEX_SHADER,
            ShaderStage::Fragment => gl::FRAGMENT_SHADER,
        }
    }
}

/// Where a uniform upload command resolves its location from (§4.2
/// Uniform4f/Uniform4i/UniformMatrix4): a shared cell the producer cached
/// from a previous lookup, or a name to resolve through the current
/// program's uniform table.
#[derive(Clone)]
pub enum UniformLocation {
    Cached(Rc<Cell<gl::types::GLint>>),
    Named(String),
}

/// A uniform initializer run once, right after link (§4.1 `CreateProgram`).
/// Only the integer-sampler kind is defined by the source.
#[derive(Clone)]
pub enum UniformInitializer {
    IntSampler {
        slot: Rc<Cell<gl::types::GLint>>,
        value: gl::types::GLint,
    },
}

/// A deferred uniform-location query: resolved into `slot` right after a
/// successful link.
#[derive(Clone)]
pub struct UniformQuery {
    pub name: String,
    pub slot: Rc<Cell<gl::types::GLint>>,
}

/// Linked program (§3 `Program`). Queries and initializers are evaluated
/// only after a successful link.
#[derive(Clone)]
pub struct Program {
    pub handle: Handle,
    pub valid: bool,
    pub attribute_bindings: Vec<(String, u32)>,
    pub uniform_queries: Vec<UniformQuery>,
    pub uniform_initializers: Vec<UniformInitializer>,
    pub support_dual_source: bool,
    /// Name -> location cache populated lazily as `Uniform4f`/`Uniform4i`
    /// commands resolve `UniformLocation::Named` entries.
    pub uniform_cache: FxHashMap<String, gl::types::GLint>,
}

impl Program {
    pub fn new(handle: Handle, support_dual_source: bool) -> Program {
        Program {
            handle,
            valid: false,
            attribute_bindings: Vec::new(),
            uniform_queries: Vec::new(),
            uniform_initializers: Vec::new(),
            support_dual_source,
            uniform_cache: FxHashMap::default(),
        }
    }

    /// Resolves a named uniform through the cache, querying the driver once
    /// and memoizing. Negative locations (not found) are cached too, so a
    /// command that references a stripped/unused uniform doesn't re-query
    /// every frame.
    pub fn resolve_uniform(
        &mut self,
        gl: &gl::Gl,
        name: &str,
    ) -> gl::types::GLint {
        if let Some(&loc) = self.uniform_cache.get(name) {
            return loc;
        }
        let cname = std::ffi::CString::new(name).unwrap();
        let loc = unsafe { gl.GetUniformLocation(self.handle, cname.as_ptr()) };
        self.uniform_cache.insert(name.to_owned(), loc);
        loc
    }
}

/// One entry of a vertex input layout (§3 `InputLayout`).
#[derive(Clone, Copy, Debug)]
pub struct AttributeEntry {
    pub location: u32,
    pub components: i32,
    pub component_type: gl::types::GLenum,
    pub normalized: bool,
    pub stride: i32,
    pub offset: u32,
}

/// Vertex attribute layout (§3 `InputLayout`). Invariant: attribute indices
/// occupy `[0, 7)`; `semantics_mask` equals the set of `entry.location`s.
#[derive(Clone, Debug, Default)]
pub struct InputLayout {
    pub semantics_mask: u8,
    pub entries: smallvec::SmallVec<[AttributeEntry; 8]>,
}

impl InputLayout {
    pub fn new(entries: smallvec::SmallVec<[AttributeEntry; 8]>) -> InputLayout {
        let mut mask = 0u8;
        for e in &entries {
            debug_assert!(e.location < 8, "attribute index out of [0, 7) range");
            mask |= 1 << e.location;
        }
        InputLayout {
            semantics_mask: mask,
            entries,
        }
    }
}
