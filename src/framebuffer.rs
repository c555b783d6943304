//! Framebuffer lifecycle and binding cache (§3 `Framebuffer`, `BinderState`,
//! §4.3). `FramebufferBinder` provides draw/read target separation when blit
//! is supported and suppresses redundant bind traffic; the builder chooses
//! one of three depth/stencil layouts depending on dialect and extension
//! support.

use crate::api as gl;
use crate::handles;
use crate::probe::{FboDialect, FeatureProbe};
use log::warn;

/// Depth/stencil attachment layout actually built, mirroring the §3
/// invariant that exactly one configuration is populated.
#[derive(Copy, Clone, Debug, Default)]
pub struct DepthStencilAttachments {
    pub z_stencil_buffer: gl::types::GLuint,
    pub z_buffer: gl::types::GLuint,
    pub stencil_buffer: gl::types::GLuint,
}

/// Color + depth/stencil render target (§3 `Framebuffer`). The destructor
/// deletes the color texture, renderbuffers, and the framebuffer object
/// using the same entry-point dialect used at creation.
#[derive(Debug)]
pub struct Framebuffer {
    pub handle: gl::types::GLuint,
    pub width: u32,
    pub height: u32,
    pub color_texture: gl::types::GLuint,
    pub depth_stencil: DepthStencilAttachments,
    dialect: FboDialect,
}

impl Framebuffer {
    pub fn color_attachment(&self) -> gl::types::GLuint {
        self.color_texture
    }

    /// Deletes the color texture, depth/stencil renderbuffer(s), and the
    /// framebuffer object itself, using the same entry-point dialect used at
    /// creation. Consumes `self`: there is no implicit `Drop` here because
    /// the GL function table is not reachable from a destructor (lifecycle
    /// is externally controlled by step submission, matching §9's
    /// raw-handle-ownership design).
    pub fn destroy(self, gl: &gl::Gl) {
        if self.depth_stencil.z_stencil_buffer != 0 {
            delete_renderbuffers(gl, self.dialect, &[self.depth_stencil.z_stencil_buffer]);
        }
        if self.depth_stencil.z_buffer != 0 {
            delete_renderbuffers(gl, self.dialect, &[self.depth_stencil.z_buffer]);
        }
        if self.depth_stencil.stencil_buffer != 0 {
            delete_renderbuffers(gl, self.dialect, &[self.depth_stencil.stencil_buffer]);
        }
        if self.color_texture != 0 {
            unsafe { gl.DeleteTextures(1, &self.color_texture) };
        }
        delete_framebuffers(gl, self.dialect, &[self.handle]);
    }
}

#[derive(Debug)]
pub enum FramebufferIncompleteError {
    Incomplete(gl::types::GLenum),
}

impl std::fmt::Display for FramebufferIncompleteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FramebufferIncompleteError::Incomplete(status) => {
                write!(f, "framebuffer incomplete: {}", status_mnemonic(*status))
            }
        }
    }
}

impl std::error::Error for FramebufferIncompleteError {}

fn status_mnemonic(status: gl::types::GLenum) -> &'static str {
    match status {
        gl::FRAMEBUFFER_UNSUPPORTED => "FRAMEBUFFER_UNSUPPORTED",
        gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => "FRAMEBUFFER_INCOMPLETE_ATTACHMENT",
        gl::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => "FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT",
        _ => "FRAMEBUFFER_INCOMPLETE_OTHER",
    }
}

/// Builds a framebuffer with an RGBA8 color attachment at `width x height`
/// and a dialect/extension-appropriate depth/stencil attachment (§4.3
/// builder table).
pub fn build(
    gl: &gl::Gl,
    probe: &FeatureProbe,
    width: u32,
    height: u32,
) -> Result<Framebuffer, FramebufferIncompleteError> {
    let dialect = probe.fbo_dialect();
    let fbo = gen_framebuffers(gl, dialect, 1)[0];

    let mut color_texture = 0;
    unsafe {
        gl.GenTextures(1, &mut color_texture);
        gl.BindTexture(gl::TEXTURE_2D, color_texture);
        gl.TexImage2D(
            gl::TEXTURE_2D,
            0,
            gl::RGBA8 as gl::types::GLint,
            width as gl::types::GLsizei,
            height as gl::types::GLsizei,
            0,
            gl::RGBA,
            gl::UNSIGNED_BYTE,
            std::ptr::null(),
        );
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as gl::types::GLint);
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as gl::types::GLint);
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as gl::types::GLint);
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as gl::types::GLint);
    }

    bind_framebuffer(gl, dialect, gl::FRAMEBUFFER, fbo);
    unsafe {
        framebuffer_texture_2d(gl, dialect, gl::COLOR_ATTACHMENT0, color_texture);
    }

    let depth_stencil = if probe.is_gles {
        if probe.oes_packed_depth_stencil {
            build_packed_depth_stencil(gl, dialect, width, height, gl::DEPTH24_STENCIL8_OES)
        } else {
            let depth_format = if probe.oes_depth24 {
                gl::DEPTH_COMPONENT24
            } else {
                gl::DEPTH_COMPONENT16
            };
            build_separate_depth_stencil(gl, dialect, width, height, depth_format)
        }
    } else {
        build_packed_depth_stencil(gl, dialect, width, height, gl::DEPTH24_STENCIL8)
    };

    let status = check_framebuffer_status(gl, dialect, gl::FRAMEBUFFER);

    unsafe {
        gl.BindRenderbuffer(gl::RENDERBUFFER, 0);
        gl.BindTexture(gl::TEXTURE_2D, 0);
    }

    if status != gl::FRAMEBUFFER_COMPLETE {
        warn!("framebuffer incomplete: {}", status_mnemonic(status));
        return Err(FramebufferIncompleteError::Incomplete(status));
    }

    Ok(Framebuffer {
        handle: fbo,
        width,
        height,
        color_texture,
        depth_stencil,
        dialect,
    })
}

fn build_packed_depth_stencil(
    gl: &gl::Gl,
    dialect: FboDialect,
    width: u32,
    height: u32,
    internal_format: gl::types::GLenum,
) -> DepthStencilAttachments {
    let rb = gen_renderbuffers(gl, dialect, 1)[0];
    bind_renderbuffer(gl, dialect, rb);
    renderbuffer_storage(gl, dialect, internal_format, width, height);
    framebuffer_renderbuffer(gl, dialect, gl::DEPTH_ATTACHMENT, rb);
    framebuffer_renderbuffer(gl, dialect, gl::STENCIL_ATTACHMENT, rb);
    DepthStencilAttachments {
        z_stencil_buffer: rb,
        z_buffer: 0,
        stencil_buffer: 0,
    }
}

fn build_separate_depth_stencil(
    gl: &gl::Gl,
    dialect: FboDialect,
    width: u32,
    height: u32,
    depth_internal_format: gl::types::GLenum,
) -> DepthStencilAttachments {
    let rbs = gen_renderbuffers(gl, dialect, 2);
    let (depth_rb, stencil_rb) = (rbs[0], rbs[1]);

    bind_renderbuffer(gl, dialect, depth_rb);
    renderbuffer_storage(gl, dialect, depth_internal_format, width, height);
    framebuffer_renderbuffer(gl, dialect, gl::DEPTH_ATTACHMENT, depth_rb);

    bind_renderbuffer(gl, dialect, stencil_rb);
    renderbuffer_storage(gl, dialect, gl::STENCIL_INDEX8, width, height);
    framebuffer_renderbuffer(gl, dialect, gl::STENCIL_ATTACHMENT, stencil_rb);

    DepthStencilAttachments {
        z_stencil_buffer: 0,
        z_buffer: depth_rb,
        stencil_buffer: stencil_rb,
    }
}

// -------------------------------------------------------------------------
// ARB/core vs EXT dispatch (§9 "route ARB/EXT/OES/NV variants through one
// internal dispatcher per operation rather than scattering #ifs").
// -------------------------------------------------------------------------

// The `EXT_framebuffer_object` entry points only exist in the desktop
// registry generated by build.rs (the ES registry never advertises the
// extension, so `gl_generator` never emits the symbols for a `gles` build).
// `FeatureProbe::fbo_dialect` never returns `FboDialect::Ext` on ES, so the
// `unreachable!()` arms below are never hit at runtime.

fn gen_framebuffers(gl: &gl::Gl, dialect: FboDialect, n: usize) -> Vec<gl::types::GLuint> {
    let mut names = vec![0; n];
    unsafe {
        match dialect {
            FboDialect::ArbCore => gl.GenFramebuffers(n as gl::types::GLsizei, names.as_mut_ptr()),
            #[cfg(not(feature = "gles"))]
            FboDialect::Ext => gl.GenFramebuffersEXT(n as gl::types::GLsizei, names.as_mut_ptr()),
            #[cfg(feature = "gles")]
            FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
        }
    }
    names
}

fn delete_framebuffers(gl: &gl::Gl, dialect: FboDialect, names: &[gl::types::GLuint]) {
    unsafe {
        match dialect {
            FboDialect::ArbCore => gl.DeleteFramebuffers(names.len() as gl::types::GLsizei, names.as_ptr()),
            #[cfg(not(feature = "gles"))]
            FboDialect::Ext => gl.DeleteFramebuffersEXT(names.len() as gl::types::GLsizei, names.as_ptr()),
            #[cfg(feature = "gles")]
            FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
        }
    }
}

pub fn bind_framebuffer(gl: &gl::Gl, dialect: FboDialect, target: gl::types::GLenum, handle: gl::types::GLuint) {
    unsafe {
        match dialect {
            FboDialect::ArbCore => gl.BindFramebuffer(target, handle),
            #[cfg(not(feature = "gles"))]
            FboDialect::Ext => gl.BindFramebufferEXT(target, handle),
            #[cfg(feature = "gles")]
            FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
        }
    }
}

unsafe fn framebuffer_texture_2d(gl: &gl::Gl, dialect: FboDialect, attachment: gl::types::GLenum, texture: gl::types::GLuint) {
    match dialect {
        FboDialect::ArbCore => gl.FramebufferTexture2D(gl::FRAMEBUFFER, attachment, gl::TEXTURE_2D, texture, 0),
        #[cfg(not(feature = "gles"))]
        FboDialect::Ext => gl.FramebufferTexture2DEXT(gl::FRAMEBUFFER, attachment, gl::TEXTURE_2D, texture, 0),
        #[cfg(feature = "gles")]
        FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
    }
}

fn gen_renderbuffers(gl: &gl::Gl, dialect: FboDialect, n: usize) -> Vec<gl::types::GLuint> {
    let mut names = vec![0; n];
    unsafe {
        match dialect {
            FboDialect::ArbCore => gl.GenRenderbuffers(n as gl::types::GLsizei, names.as_mut_ptr()),
            #[cfg(not(feature = "gles"))]
            FboDialect::Ext => gl.GenRenderbuffersEXT(n as gl::types::GLsizei, names.as_mut_ptr()),
            #[cfg(feature = "gles")]
            FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
        }
    }
    names
}

fn delete_renderbuffers(gl: &gl::Gl, dialect: FboDialect, names: &[gl::types::GLuint]) {
    unsafe {
        match dialect {
            FboDialect::ArbCore => gl.DeleteRenderbuffers(names.len() as gl::types::GLsizei, names.as_ptr()),
            #[cfg(not(feature = "gles"))]
            FboDialect::Ext => gl.DeleteRenderbuffersEXT(names.len() as gl::types::GLsizei, names.as_ptr()),
            #[cfg(feature = "gles")]
            FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
        }
    }
}

fn bind_renderbuffer(gl: &gl::Gl, dialect: FboDialect, handle: gl::types::GLuint) {
    unsafe {
        match dialect {
            FboDialect::ArbCore => gl.BindRenderbuffer(gl::RENDERBUFFER, handle),
            #[cfg(not(feature = "gles"))]
            FboDialect::Ext => gl.BindRenderbufferEXT(gl::RENDERBUFFER, handle),
            #[cfg(feature = "gles")]
            FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
        }
    }
}

fn renderbuffer_storage(gl: &gl::Gl, dialect: FboDialect, internal_format: gl::types::GLenum, width: u32, height: u32) {
    unsafe {
        match dialect {
            FboDialect::ArbCore => gl.RenderbufferStorage(
                gl::RENDERBUFFER,
                internal_format,
                width as gl::types::GLsizei,
                height as gl::types::GLsizei,
            ),
            #[cfg(not(feature = "gles"))]
            FboDialect::Ext => gl.RenderbufferStorageEXT(
                gl::RENDERBUFFER,
                internal_format,
                width as gl::types::GLsizei,
                height as gl::types::GLsizei,
            ),
            #[cfg(feature = "gles")]
            FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
        }
    }
}

fn framebuffer_renderbuffer(gl: &gl::Gl, dialect: FboDialect, attachment: gl::types::GLenum, handle: gl::types::GLuint) {
    unsafe {
        match dialect {
            FboDialect::ArbCore => {
                gl.FramebufferRenderbuffer(gl::FRAMEBUFFER, attachment, gl::RENDERBUFFER, handle)
            }
            #[cfg(not(feature = "gles"))]
            FboDialect::Ext => {
                gl.FramebufferRenderbufferEXT(gl::FRAMEBUFFER, attachment, gl::RENDERBUFFER, handle)
            }
            #[cfg(feature = "gles")]
            FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
        }
    }
}

fn check_framebuffer_status(gl: &gl::Gl, dialect: FboDialect, target: gl::types::GLenum) -> gl::types::GLenum {
    unsafe {
        match dialect {
            FboDialect::ArbCore => gl.CheckFramebufferStatus(target),
            #[cfg(not(feature = "gles"))]
            FboDialect::Ext => gl.CheckFramebufferStatusEXT(target),
            #[cfg(feature = "gles")]
            FboDialect::Ext => unreachable!("EXT framebuffer dialect is never selected on ES"),
        }
    }
}

// -------------------------------------------------------------------------
// Binding cache (§3 `BinderState`, §4.3 target selection)
// -------------------------------------------------------------------------

/// Draw/read target separation and redundant-bind suppression. One instance
/// lives on `GraphicsDevice` for the lifetime of the context.
pub struct FramebufferBinder {
    dialect: FboDialect,
    blit_supported: bool,
    current_draw: gl::types::GLuint,
    current_read: gl::types::GLuint,
    target_width: u32,
    target_height: u32,
}

impl FramebufferBinder {
    pub fn new(probe: &FeatureProbe) -> FramebufferBinder {
        FramebufferBinder {
            dialect: probe.fbo_dialect(),
            blit_supported: probe.blit_supported(),
            current_draw: 0,
            current_read: 0,
            target_width: 0,
            target_height: 0,
        }
    }

    pub fn set_backbuffer_size(&mut self, width: u32, height: u32) {
        self.target_width = width;
        self.target_height = height;
    }

    pub fn backbuffer_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Pure decision logic for §8's "framebuffer handle cache" property:
    /// returns the handle to actually bind, or `None` to suppress a
    /// redundant call.
    fn decide_bind(cached: gl::types::GLuint, requested: gl::types::GLuint) -> Option<gl::types::GLuint> {
        if cached == requested {
            None
        } else {
            Some(requested)
        }
    }

    fn draw_target_enum(&self) -> gl::types::GLenum {
        if self.blit_supported {
            gl::DRAW_FRAMEBUFFER
        } else {
            gl::FRAMEBUFFER
        }
    }

    pub fn bind_draw(&mut self, gl: &gl::Gl, handle: gl::types::GLuint) {
        if let Some(h) = Self::decide_bind(self.current_draw, handle) {
            self.current_draw = h;
            bind_framebuffer(gl, self.dialect, self.draw_target_enum(), h);
        }
    }

    pub fn bind_read(&mut self, gl: &gl::Gl, handle: gl::types::GLuint) {
        if !self.blit_supported {
            return;
        }
        if let Some(h) = Self::decide_bind(self.current_read, handle) {
            self.current_read = h;
            bind_framebuffer(gl, self.dialect, gl::READ_FRAMEBUFFER, h);
        }
    }

    /// Binds `handle` as both draw and read target (the common case of
    /// entering a render pass).
    pub fn bind(&mut self, gl: &gl::Gl, handle: gl::types::GLuint) {
        self.bind_draw(gl, handle);
        self.bind_read(gl, handle);
    }

    /// Binds `g_defaultFBO` and resets both cached handles to 0 (§4.3
    /// Unbind), regardless of the actual value bound — a preserved quirk,
    /// see DESIGN.md.
    pub fn unbind(&mut self, gl: &gl::Gl) {
        let default = handles::default_framebuffer();
        self.bind(gl, default);
        self.current_draw = 0;
        self.current_read = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_redundant_bind_to_same_handle() {
        assert_eq!(FramebufferBinder::decide_bind(7, 7), None);
        assert_eq!(FramebufferBinder::decide_bind(7, 9), Some(9));
    }

    #[test]
    fn status_mnemonics_cover_known_statuses() {
        assert_eq!(status_mnemonic(gl::FRAMEBUFFER_UNSUPPORTED), "FRAMEBUFFER_UNSUPPORTED");
        assert_eq!(
            status_mnemonic(gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT),
            "FRAMEBUFFER_INCOMPLETE_ATTACHMENT"
        );
        assert_eq!(status_mnemonic(0xDEAD), "FRAMEBUFFER_INCOMPLETE_OTHER");
    }
}
