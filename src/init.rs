//! Init step interpreter (§4.1). Runs an `InitStep` list once, creating the
//! device-side objects a producer's earlier passes referenced by name. Errors
//! here are recoverable (shader compile failure, program link failure): they
//! are logged and leave the resource record marked invalid rather than
//! aborting the remaining list.

use crate::api as gl;
use crate::probe::FeatureProbe;
use crate::resource::{Program, Shader};
use crate::steps::InitStep;
use log::{error, warn};
use std::error::Error;
use std::ffi::CString;
use std::fmt;

#[derive(Debug)]
pub struct ShaderCompileError(pub String);

impl fmt::Display for ShaderCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shader compile failed: {}", self.0)
    }
}

impl Error for ShaderCompileError {}

#[derive(Debug)]
pub struct ProgramLinkError(pub String);

impl fmt::Display for ProgramLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program link failed: {}", self.0)
    }
}

impl Error for ProgramLinkError {}

/// Runs every step in `list`, in order (§4.1). Takes ownership of the list:
/// each step (and any heap-owned payload it carries, e.g. `BufferSubData`'s
/// or `TextureImage`'s `data`) is moved into, and dropped by, the interpreter
/// as that step finishes, rather than merely borrowed out of the caller's
/// list for the run's duration (§2, §5, §8 "payload ownership").
pub fn run_init_steps(gl: &gl::Gl, probe: &FeatureProbe, list: Vec<InitStep>) {
    for step in list {
        run_init_step(gl, probe, step);
    }
}

fn run_init_step(gl: &gl::Gl, probe: &FeatureProbe, step: InitStep) {
    match step {
        InitStep::CreateTexture { texture, target } => {
            let mut tex = texture.borrow_mut();
            let mut handle = 0;
            unsafe {
                gl.GenTextures(1, &mut handle);
            }
            tex.handle = handle;
            tex.target = target;
        }
        InitStep::CreateBuffer { buffer, target, size, usage } => {
            let mut buf = buffer.borrow_mut();
            let mut handle = 0;
            unsafe {
                gl.GenBuffers(1, &mut handle);
                gl.BindBuffer(target, handle);
                gl.BufferData(target, size as gl::types::GLsizeiptr, std::ptr::null(), usage);
                gl.BindBuffer(target, 0);
            }
            buf.handle = handle;
            buf.target = target;
            buf.size = size;
            buf.usage = usage;
        }
        InitStep::BufferSubData { buffer, offset, data, delete_data } => {
            run_buffer_sub_data(gl, &buffer, offset, &data);
            // `delete_data` only controls whether the producer intended the
            // payload to be freed after upload; `data` is dropped here
            // regardless, at the end of this step's only exit path.
            let _ = delete_data;
        }
        InitStep::CreateShader { shader, stage, source } => {
            run_create_shader(gl, &shader, stage, &source);
        }
        InitStep::CreateProgram {
            program,
            shaders,
            attribute_bindings,
            support_dual_source,
            uniform_queries,
            uniform_initializers,
        } => {
            run_create_program(
                gl,
                probe,
                &program,
                shaders,
                attribute_bindings,
                support_dual_source,
                uniform_queries,
                uniform_initializers,
            );
        }
        InitStep::CreateInputLayout { .. } => {
            // Binding work happens per draw via `BindInputLayout`; nothing to
            // do at init time.
        }
        InitStep::CreateFramebuffer { framebuffer, width, height } => {
            run_create_framebuffer(gl, probe, &framebuffer, width, height);
        }
        InitStep::TextureImage {
            texture,
            level,
            format,
            ty,
            width,
            height,
            data,
            linear_filter,
        } => {
            run_texture_image(gl, &texture, level, format, ty, width, height, &data, linear_filter);
        }
        InitStep::TextureSubData => {
            // Reserved; currently a documented no-op (§9).
        }
    }
}

fn run_buffer_sub_data(gl: &gl::Gl, buffer: &crate::steps::Shared<crate::resource::Buffer>, offset: usize, data: &[u8]) {
    let handle = buffer.borrow().handle;
    unsafe {
        // The source always binds `ARRAY_BUFFER` to upload, regardless of the
        // buffer's declared target — a preserved quirk, see DESIGN.md.
        gl.BindBuffer(gl::ARRAY_BUFFER, handle);
        gl.BufferSubData(
            gl::ARRAY_BUFFER,
            offset as gl::types::GLintptr,
            data.len() as gl::types::GLsizeiptr,
            data.as_ptr() as *const std::ffi::c_void,
        );
        gl.BindBuffer(gl::ARRAY_BUFFER, 0);
    }
}

fn get_shader_info_log(gl: &gl::Gl, obj: gl::types::GLuint) -> String {
    unsafe {
        let mut log_len = 0;
        gl.GetShaderiv(obj, gl::INFO_LOG_LENGTH, &mut log_len);
        if log_len <= 0 {
            return String::new();
        }
        let mut buf = vec![0u8; log_len as usize];
        let mut written = 0;
        gl.GetShaderInfoLog(obj, log_len, &mut written, buf.as_mut_ptr() as *mut i8);
        buf.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn get_program_info_log(gl: &gl::Gl, obj: gl::types::GLuint) -> String {
    unsafe {
        let mut log_len = 0;
        gl.GetProgramiv(obj, gl::INFO_LOG_LENGTH, &mut log_len);
        if log_len <= 0 {
            return String::new();
        }
        let mut buf = vec![0u8; log_len as usize];
        let mut written = 0;
        gl.GetProgramInfoLog(obj, log_len, &mut written, buf.as_mut_ptr() as *mut i8);
        buf.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn run_create_shader(gl: &gl::Gl, shader: &crate::steps::Shared<Shader>, stage: crate::resource::ShaderStage, source: &[u8]) {
    let glenum_stage = stage.to_glenum();
    let obj = unsafe { gl.CreateShader(glenum_stage) };
    unsafe {
        let src_ptr = source.as_ptr() as *const i8;
        let src_len = source.len() as gl::types::GLint;
        gl.ShaderSource(obj, 1, &src_ptr, &src_len);
        gl.CompileShader(obj);
    }

    let mut status = 0;
    unsafe { gl.GetShaderiv(obj, gl::COMPILE_STATUS, &mut status) };

    let mut sh = shader.borrow_mut();
    if status != gl::TRUE as gl::types::GLint {
        let log = get_shader_info_log(gl, obj);
        error!("{}", ShaderCompileError(log));
        unsafe { gl.DeleteShader(obj) };
        sh.handle = 0;
    } else {
        sh.handle = obj;
    }
    sh.stage = stage;
    // Always true once this step runs to completion, even on a compile
    // failure — preserved quirk, see DESIGN.md and SPEC_FULL.md §9.
    sh.valid = true;
}

#[allow(clippy::too_many_arguments)]
fn run_create_program(
    gl: &gl::Gl,
    probe: &FeatureProbe,
    program: &crate::steps::Shared<Program>,
    shaders: Vec<Option<crate::steps::Shared<Shader>>>,
    attribute_bindings: Vec<(String, u32)>,
    support_dual_source: bool,
    uniform_queries: Vec<crate::resource::UniformQuery>,
    uniform_initializers: Vec<crate::resource::UniformInitializer>,
) {
    let obj = unsafe { gl.CreateProgram() };

    // Driver-level assertions (§7 category 3, §4.1): a null shader pointer or
    // a program with no attached shader is impossible to recover from and
    // crashes the process, same as the source.
    assert!(
        shaders.iter().all(Option::is_some),
        "CreateProgram: null shader pointer"
    );

    let mut attached = 0u32;
    for shader in shaders.iter().flatten() {
        let handle = shader.borrow().handle;
        if handle != 0 {
            unsafe { gl.AttachShader(obj, handle) };
            attached += 1;
        }
    }
    assert!(attached > 0, "CreateProgram: zero-shader program");

    for (name, location) in &attribute_bindings {
        let cname = CString::new(name.as_str()).unwrap();
        unsafe { gl.BindAttribLocation(obj, *location, cname.as_ptr()) };
    }

    bind_fragment_outputs(gl, probe, obj, support_dual_source);

    unsafe { gl.LinkProgram(obj) };

    let mut status = 0;
    unsafe { gl.GetProgramiv(obj, gl::LINK_STATUS, &mut status) };

    let mut prog = program.borrow_mut();
    if status != gl::TRUE as gl::types::GLint {
        let log = get_program_info_log(gl, obj);
        error!("{}", ProgramLinkError(log));
        unsafe { gl.DeleteProgram(obj) };
        prog.handle = 0;
        prog.valid = false;
        return;
    }

    prog.handle = obj;
    prog.valid = true;
    prog.attribute_bindings = attribute_bindings;
    prog.uniform_queries = uniform_queries;
    prog.uniform_initializers = uniform_initializers;
    prog.support_dual_source = support_dual_source;

    for query in &prog.uniform_queries {
        let cname = CString::new(query.name.as_str()).unwrap();
        let loc = unsafe { gl.GetUniformLocation(obj, cname.as_ptr()) };
        query.slot.set(loc);
    }

    unsafe { gl.UseProgram(obj) };
    for initializer in &prog.uniform_initializers {
        match initializer {
            crate::resource::UniformInitializer::IntSampler { slot, value } => {
                let loc = slot.get();
                if loc >= 0 {
                    unsafe { gl.Uniform1i(loc, *value) };
                }
            }
        }
    }
    unsafe { gl.UseProgram(0) };
}

/// Binds the fragment color output(s) (§4.1 `CreateProgram`, §8 scenario 3):
/// `fragColor0` at (color 0, index 0) unconditionally, and `fragColor1` at
/// (color 0, index 1) only when dual-source blending was requested and the
/// driver supports it. On ES3 the extension's entry point carries an `EXT`
/// suffix; on desktop the core entry point is used.
fn bind_fragment_outputs(gl: &gl::Gl, probe: &FeatureProbe, obj: gl::types::GLuint, support_dual_source: bool) {
    let color0 = CString::new("fragColor0").unwrap();
    unsafe {
        if probe.is_gles {
            gl.BindFragDataLocationIndexedEXT(obj, 0, 0, color0.as_ptr());
        } else {
            gl.BindFragDataLocationIndexed(obj, 0, 0, color0.as_ptr());
        }
    }

    if !support_dual_source {
        return;
    }
    if !probe.supports_dual_source_blend() {
        warn!("dual-source blend requested but not supported by this driver; binding fragColor0 only");
        return;
    }
    let color1 = CString::new("fragColor1").unwrap();
    unsafe {
        if probe.is_gles {
            gl.BindFragDataLocationIndexedEXT(obj, 0, 1, color1.as_ptr());
        } else {
            gl.BindFragDataLocationIndexed(obj, 0, 1, color1.as_ptr());
        }
    }
}

fn run_create_framebuffer(
    gl: &gl::Gl,
    probe: &FeatureProbe,
    framebuffer: &crate::steps::Shared<Option<crate::framebuffer::Framebuffer>>,
    width: u32,
    height: u32,
) {
    match crate::framebuffer::build(gl, probe, width, height) {
        Ok(fb) => *framebuffer.borrow_mut() = Some(fb),
        Err(e) => {
            error!("{}", e);
            *framebuffer.borrow_mut() = None;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_texture_image(
    gl: &gl::Gl,
    texture: &crate::steps::Shared<crate::resource::Texture>,
    level: u32,
    format: gl::types::GLenum,
    ty: gl::types::GLenum,
    width: u32,
    height: u32,
    data: &[u8],
    linear_filter: bool,
) {
    let mut tex = texture.borrow_mut();
    unsafe {
        gl.BindTexture(gl::TEXTURE_2D, tex.handle);
        gl.TexImage2D(
            gl::TEXTURE_2D,
            level as gl::types::GLint,
            format as gl::types::GLint,
            width as gl::types::GLsizei,
            height as gl::types::GLsizei,
            0,
            format,
            ty,
            if data.is_empty() {
                std::ptr::null()
            } else {
                data.as_ptr() as *const std::ffi::c_void
            },
        );
        let filter = if linear_filter { gl::LINEAR } else { gl::NEAREST };
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as gl::types::GLint);
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as gl::types::GLint);
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, filter as gl::types::GLint);
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, filter as gl::types::GLint);
        gl.BindTexture(gl::TEXTURE_2D, 0);
    }
    tex.level = level;
    tex.format = format;
    tex.ty = ty;
    tex.width = width;
    tex.height = height;
    tex.sampler.min_filter = filter_enum(linear_filter);
    tex.sampler.mag_filter = filter_enum(linear_filter);
}

fn filter_enum(linear: bool) -> gl::types::GLenum {
    if linear {
        gl::LINEAR
    } else {
        gl::NEAREST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_enum_maps_linear_and_nearest() {
        assert_eq!(filter_enum(true), gl::LINEAR);
        assert_eq!(filter_enum(false), gl::NEAREST);
    }

    #[test]
    fn shader_compile_error_display_includes_log() {
        let err = ShaderCompileError("0:1: syntax error".to_owned());
        assert!(format!("{}", err).contains("0:1: syntax error"));
    }

    #[test]
    fn program_link_error_display_includes_log() {
        let err = ProgramLinkError("missing main".to_owned());
        assert!(format!("{}", err).contains("missing main"));
    }
}
