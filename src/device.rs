//! `GraphicsDevice` facade (§4.5, §6 External Interfaces). The single
//! entry point an embedding layer talks to: owns the probed capabilities, the
//! framebuffer binding cache, the texture-name pool, and the global VAO that
//! every render pass binds as its vertex-state anchor.

use crate::api as gl;
use crate::copy;
use crate::framebuffer::FramebufferBinder;
use crate::handles::TextureNamePool;
use crate::init;
use crate::probe::FeatureProbe;
use crate::cmd;
use crate::steps::{FrameStep, InitStep};
use log::{debug, log, Level};
use std::os::raw::c_void;
use std::{ffi::CStr, os::raw::c_char, slice, str};

extern "system" fn debug_callback(
    _source: gl::types::GLenum,
    _ty: gl::types::GLenum,
    _id: gl::types::GLuint,
    severity: gl::types::GLenum,
    length: gl::types::GLsizei,
    msg: *const gl::types::GLchar,
    _user_param: *mut c_void,
) {
    let text = unsafe {
        str::from_utf8(slice::from_raw_parts(msg as *const u8, length.max(0) as usize))
            .unwrap_or("<non-utf8 GL debug message>")
    };
    let level = match severity {
        gl::DEBUG_SEVERITY_HIGH => Level::Error,
        gl::DEBUG_SEVERITY_MEDIUM => Level::Warn,
        gl::DEBUG_SEVERITY_LOW => Level::Info,
        gl::DEBUG_SEVERITY_NOTIFICATION => Level::Debug,
        _ => Level::Debug,
    };
    log!(level, "(GL) {}", text);
}

/// Owns the per-context state this core needs across init, render, and
/// copy/readback step execution: the probed capability record, the
/// framebuffer binding cache, the texture-name pool, and the shared VAO.
pub struct GraphicsDevice {
    gl: gl::Gl,
    probe: FeatureProbe,
    binder: FramebufferBinder,
    texture_names: TextureNamePool,
    global_vao: gl::types::GLuint,
}

impl GraphicsDevice {
    /// Creates device objects against the current context: loads the
    /// function table via `loader`, installs the debug callback, detects
    /// capabilities, and allocates the global VAO. Must be called once, with
    /// a current GL context, before any other method.
    pub fn create_device_objects(
        loader: impl FnMut(&'static str) -> *const c_void,
    ) -> GraphicsDevice {
        let gl = gl::Gl::load_with(loader);

        unsafe {
            gl.Enable(gl::DEBUG_OUTPUT_SYNCHRONOUS);
            gl.DebugMessageCallback(Some(debug_callback), std::ptr::null());
            gl.DebugMessageControl(gl::DONT_CARE, gl::DONT_CARE, gl::DONT_CARE, 0, std::ptr::null(), gl::TRUE);
        }

        let probe = FeatureProbe::detect(&gl);

        unsafe {
            let vendor = CStr::from_ptr(gl.GetString(gl::VENDOR) as *const c_char);
            let renderer = CStr::from_ptr(gl.GetString(gl::RENDERER) as *const c_char);
            debug!(
                "graphics device created (vendor: {:?}, renderer: {:?}, gles: {})",
                vendor, renderer, probe.is_gles
            );
        }

        let mut global_vao = 0;
        unsafe {
            gl.GenVertexArrays(1, &mut global_vao);
        }

        GraphicsDevice {
            binder: FramebufferBinder::new(&probe),
            texture_names: TextureNamePool::new(),
            gl,
            probe,
            global_vao,
        }
    }

    /// Releases the global VAO and every still-unused pre-generated texture
    /// name. Idempotent: safe to call on an already-destroyed device (the
    /// second call is a no-op because the pool and VAO are already empty).
    pub fn destroy_device_objects(&mut self) {
        self.texture_names.drain(&self.gl);
        if self.global_vao != 0 {
            unsafe { self.gl.DeleteVertexArrays(1, &self.global_vao) };
            self.global_vao = 0;
        }
    }

    pub fn feature_probe(&self) -> &FeatureProbe {
        &self.probe
    }

    /// Records the default backbuffer's size, consulted by `RENDER` steps
    /// that target `None` (§4.3).
    pub fn set_backbuffer_size(&mut self, width: u32, height: u32) {
        self.binder.set_backbuffer_size(width, height);
    }

    /// Runs an init step list to completion (§4.1). Takes ownership of
    /// `list`: each step, and any heap payload it carries, is released by
    /// the interpreter as that step completes (§2, §5, §6).
    pub fn run_init_steps(&self, list: Vec<InitStep>) {
        init::run_init_steps(&self.gl, &self.probe, list);
    }

    /// Runs a frame step list to completion (§4.2, §4.4). Takes ownership of
    /// `list`: each step object is released once it has been executed (§6
    /// `RunSteps`), rather than borrowed for the whole run.
    pub fn run_steps(&mut self, list: Vec<FrameStep>) {
        for step in list {
            match step {
                FrameStep::Render(render_step) => {
                    cmd::execute_render_step(&self.gl, &self.probe, &mut self.binder, self.global_vao, &render_step);
                }
                FrameStep::Copy(copy_step) => copy::execute_copy_step(&self.gl, &self.probe, &copy_step),
                FrameStep::Blit(blit_step) => copy::execute_blit_step(&self.gl, &self.probe, &blit_step),
                FrameStep::Readback(readback_step) => {
                    copy::execute_readback_step(&self.gl, &self.probe, &readback_step)
                }
                FrameStep::ReadbackImage(readback_image_step) => {
                    copy::execute_readback_image_step(&self.gl, &self.probe, &readback_image_step)
                }
            }
        }
    }

    /// Diagnostic placeholder: logs the step list contents at debug level
    /// without executing anything. Useful for producers validating a step
    /// list before submission.
    pub fn log_steps(&self, list: &[FrameStep]) {
        for (i, step) in list.iter().enumerate() {
            match step {
                FrameStep::Render(r) => debug!("step {}: Render ({} commands)", i, r.commands.len()),
                FrameStep::Copy(_) => debug!("step {}: Copy", i),
                FrameStep::Blit(_) => debug!("step {}: Blit", i),
                FrameStep::Readback(_) => debug!("step {}: Readback", i),
                FrameStep::ReadbackImage(_) => debug!("step {}: ReadbackImage", i),
            }
        }
    }

    /// Allocates one texture name out of the pre-generated pool, refilling in
    /// batches of 16 from the driver when empty (§6 `AllocTextureName`).
    pub fn alloc_texture_name(&mut self) -> gl::types::GLuint {
        self.texture_names.alloc(&self.gl)
    }

    /// Interface placeholder (§9 open question): signature is part of the
    /// core contract, algorithm is unspecified by the source.
    pub fn copy_readback_buffer(
        &self,
        _width: u32,
        _height: u32,
        _src_format: gl::types::GLenum,
        _dest_format: gl::types::GLenum,
        _pixel_stride: u32,
        _pixels: &mut [u8],
    ) {
        log::warn!("CopyReadbackBuffer is not implemented by this core; call ignored");
    }

    pub fn gl(&self) -> &gl::Gl {
        &self.gl
    }
}
