//! Tagged step and command data (§3, §9 "tagged commands"). Both the init
//! step list and the render command list are modeled as sum types with one
//! variant per kind, carrying only the fields that variant uses, rather than
//! a single fat struct with union semantics.

use crate::api as gl;
use crate::framebuffer::Framebuffer;
use crate::resource::{
    AttributeEntry, Buffer, InputLayout, Program, Shader, ShaderStage, Texture, UniformInitializer,
    UniformLocation, UniformQuery,
};
use std::cell::RefCell;
use std::rc::Rc;

pub type Shared<T> = Rc<RefCell<T>>;

bitflags::bitflags! {
    /// Which channels a `Clear` command touches (§4.2 `Clear`).
    pub struct ClearMask: u8 {
        const COLOR   = 0b001;
        const DEPTH   = 0b010;
        const STENCIL = 0b100;
    }
}

// -------------------------------------------------------------------------
// Init steps (§4.1)
// -------------------------------------------------------------------------

/// One entry of an init step list (§2 "Init interpreter", §4.1).
pub enum InitStep {
    CreateTexture {
        texture: Shared<Texture>,
        target: gl::types::GLenum,
    },
    CreateBuffer {
        buffer: Shared<Buffer>,
        target: gl::types::GLenum,
        size: usize,
        usage: gl::types::GLenum,
    },
    BufferSubData {
        buffer: Shared<Buffer>,
        offset: usize,
        data: Vec<u8>,
        delete_data: bool,
    },
    CreateShader {
        shader: Shared<Shader>,
        stage: ShaderStage,
        source: Vec<u8>,
    },
    CreateProgram {
        program: Shared<Program>,
        shaders: Vec<Option<Shared<Shader>>>,
        attribute_bindings: Vec<(String, u32)>,
        support_dual_source: bool,
        uniform_queries: Vec<UniformQuery>,
        uniform_initializers: Vec<UniformInitializer>,
    },
    /// No-op at init time; binding work happens per draw via `BindInputLayout`.
    CreateInputLayout {
        layout: Shared<InputLayout>,
        entries: smallvec::SmallVec<[AttributeEntry; 8]>,
    },
    CreateFramebuffer {
        framebuffer: Shared<Option<Framebuffer>>,
        width: u32,
        height: u32,
    },
    TextureImage {
        texture: Shared<Texture>,
        level: u32,
        format: gl::types::GLenum,
        ty: gl::types::GLenum,
        width: u32,
        height: u32,
        data: Vec<u8>,
        linear_filter: bool,
    },
    /// Reserved; currently a no-op (§9 open question: sub-rectangle upload
    /// vs. truly reserved is unspecified by the source).
    TextureSubData,
}

// -------------------------------------------------------------------------
// Render commands (§4.2)
// -------------------------------------------------------------------------

/// One command inside a `Render` frame step (§4.2).
pub enum RenderCommand {
    Depth {
        enable: bool,
        write_mask: bool,
        func: gl::types::GLenum,
    },
    Blend {
        enable: bool,
        color_eq: gl::types::GLenum,
        alpha_eq: gl::types::GLenum,
        src_color: gl::types::GLenum,
        dst_color: gl::types::GLenum,
        src_alpha: gl::types::GLenum,
        dst_alpha: gl::types::GLenum,
        /// Low four bits select which color channels are written.
        mask: u8,
    },
    Clear {
        clear_mask: ClearMask,
        /// Packed RGBA byte quad, converted to four normalized floats.
        color: [u8; 4],
        depth: f32,
        stencil: i32,
    },
    BlendColor {
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    },
    Viewport {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        depth_near: f32,
        depth_far: f32,
    },
    Scissor {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Uniform4f {
        location: UniformLocation,
        count: u8,
        values: [f32; 4],
    },
    Uniform4i {
        location: UniformLocation,
        count: u8,
        values: [gl::types::GLint; 4],
    },
    UniformMatrix4 {
        location: UniformLocation,
        transpose: bool,
        values: [f32; 16],
    },
    StencilFunc {
        enable: bool,
        func: gl::types::GLenum,
        reference: gl::types::GLint,
        mask: u32,
    },
    StencilOp {
        sfail: gl::types::GLenum,
        dpfail: gl::types::GLenum,
        dppass: gl::types::GLenum,
        write_mask: u32,
    },
    BindTexture {
        unit: u32,
        texture: Option<Shared<Texture>>,
    },
    BindFBTexture {
        unit: u32,
        framebuffer: Shared<Framebuffer>,
    },
    BindProgram {
        program: Option<Shared<Program>>,
    },
    BindInputLayout {
        layout: Shared<InputLayout>,
        base_offset: u32,
    },
    BindBuffer {
        target: gl::types::GLenum,
        buffer: gl::types::GLuint,
    },
    /// Generates the mipmap chain on whichever 2D texture is currently
    /// bound; does not re-bind.
    GenMips,
    Draw {
        topology: gl::types::GLenum,
        first: u32,
        count: u32,
    },
    DrawIndexed {
        topology: gl::types::GLenum,
        index_type: gl::types::GLenum,
        first_index: u32,
        count: u32,
        base_vertex: i32,
        instances: u32,
    },
    TextureSampler {
        texture: Shared<Texture>,
        wrap_s: gl::types::GLenum,
        wrap_t: gl::types::GLenum,
        min_filter: gl::types::GLenum,
        mag_filter: gl::types::GLenum,
        anisotropy: f32,
    },
    TextureLod {
        texture: Shared<Texture>,
        lod_min: f32,
        lod_max: f32,
        lod_bias: f32,
    },
    Raster {
        cull_enable: bool,
        front_face: gl::types::GLenum,
        cull_face: gl::types::GLenum,
        dither_enable: bool,
    },
}

/// A `RENDER` frame step: the target framebuffer (`None` = default
/// backbuffer) and its ordered command list (§3 "per-pass transient state").
pub struct RenderStep {
    pub target: Option<Shared<Framebuffer>>,
    pub commands: Vec<RenderCommand>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CopyAspect {
    Color,
    /// Reserved; a depth copy is currently a fatal "unimplemented" path
    /// (§7 category 3, §4.4).
    Depth,
}

/// Cross-framebuffer texel copy (§4.4 `Copy`). Level and Z are always 0,
/// depth 1.
pub struct CopyStep {
    pub src: Shared<Texture>,
    pub dst: Shared<Texture>,
    pub src_x: u32,
    pub src_y: u32,
    pub dst_x: u32,
    pub dst_y: u32,
    pub width: u32,
    pub height: u32,
    pub aspect: CopyAspect,
}

/// Interface placeholder (§4.4, §9 open question). The signature is part of
/// the core contract; the algorithm is not yet specified by the source.
pub struct BlitStep {
    pub src: Shared<Framebuffer>,
    pub dst: Option<Shared<Framebuffer>>,
    pub src_rect: (i32, i32, i32, i32),
    pub dst_rect: (i32, i32, i32, i32),
}

/// Interface placeholder (§4.4, §9 open question).
pub struct ReadbackStep {
    pub src: Shared<Framebuffer>,
    pub rect: (i32, i32, u32, u32),
}

/// Interface placeholder (§4.4, §9 open question).
pub struct ReadbackImageStep {
    pub src: Shared<Texture>,
    pub level: u32,
}

/// One entry of a frame step list (§2 "Blit/Copy/Readback", §6 `RunSteps`).
pub enum FrameStep {
    Render(RenderStep),
    Copy(CopyStep),
    Blit(BlitStep),
    Readback(ReadbackStep),
    ReadbackImage(ReadbackImageStep),
}
