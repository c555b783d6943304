//! Render-pass command interpreter (§4.2). Owns the tracked GL state machine
//! for the duration of one `RENDER` step: bound framebuffer, active texture
//! unit, bound array/element buffers, enabled vertex attribute mask, current
//! program and its uniform-location cache, scissor enablement around clears,
//! and viewport Y-flip depending on framebuffer target.

use crate::framebuffer::{Framebuffer, FramebufferBinder};
use crate::probe::FeatureProbe;
use crate::resource::{Program, UniformLocation};
use crate::steps::{ClearMask, RenderCommand, RenderStep, Shared};
use crate::api as gl;

/// Per-pass transient state (§3 "Per-pass transient state"): exists only for
/// the duration of one `RENDER` step, reset on entry and torn down on exit.
struct PassState {
    cur_fb_width: u32,
    cur_fb_height: u32,
    is_default_fb: bool,
    cur_program: Option<Shared<Program>>,
    active_texture: u32,
    attr_mask: u8,
    cur_array_buffer: gl::types::GLuint,
    cur_elem_array_buffer: gl::types::GLuint,
    bound_texture: [gl::types::GLuint; 32],
}

impl PassState {
    fn new() -> PassState {
        PassState {
            cur_fb_width: 0,
            cur_fb_height: 0,
            is_default_fb: true,
            cur_program: None,
            active_texture: 0,
            attr_mask: 0,
            cur_array_buffer: 0,
            cur_elem_array_buffer: 0,
            bound_texture: [0; 32],
        }
    }
}

/// Executes one `RENDER` frame step against `binder`'s currently tracked
/// framebuffer cache (§4.2).
pub fn execute_render_step(
    gl: &gl::Gl,
    probe: &FeatureProbe,
    binder: &mut FramebufferBinder,
    global_vao: gl::types::GLuint,
    step: &RenderStep,
) {
    let mut state = PassState::new();

    match &step.target {
        Some(fb) => {
            let fb = fb.borrow();
            binder.bind(gl, fb.handle);
            state.cur_fb_width = fb.width;
            state.cur_fb_height = fb.height;
            state.is_default_fb = false;
        }
        None => {
            binder.unbind(gl);
            let (w, h) = binder.backbuffer_size();
            state.cur_fb_width = w;
            state.cur_fb_height = h;
            state.is_default_fb = true;
        }
    }

    unsafe {
        gl.Enable(gl::SCISSOR_TEST);
        gl.BindVertexArray(global_vao);
        gl.ActiveTexture(gl::TEXTURE0);
    }
    state.active_texture = 0;

    for command in &step.commands {
        execute_command(gl, probe, &mut state, command);
    }

    // Pass exit: disable every attribute index currently enabled, reset
    // active texture, clear buffer bindings, unbind VAO, disable scissor.
    unsafe {
        for i in 0..8 {
            if state.attr_mask & (1 << i) != 0 {
                gl.DisableVertexAttribArray(i as gl::types::GLuint);
            }
        }
        if state.active_texture != 0 {
            gl.ActiveTexture(gl::TEXTURE0);
        }
        gl.BindBuffer(gl::ARRAY_BUFFER, 0);
        gl.BindBuffer(gl::ELEMENT_ARRAY_BUFFER, 0);
        gl.BindVertexArray(0);
        gl.Disable(gl::SCISSOR_TEST);
    }
}

fn execute_command(gl: &gl::Gl, probe: &FeatureProbe, state: &mut PassState, command: &RenderCommand) {
    match command {
        RenderCommand::Depth { enable, write_mask, func } => cmd_depth(gl, *enable, *write_mask, *func),
        RenderCommand::Blend {
            enable,
            color_eq,
            alpha_eq,
            src_color,
            dst_color,
            src_alpha,
            dst_alpha,
            mask,
        } => cmd_blend(gl, *enable, *color_eq, *alpha_eq, *src_color, *dst_color, *src_alpha, *dst_alpha, *mask),
        RenderCommand::Clear { clear_mask, color, depth, stencil } => {
            cmd_clear(gl, probe, *clear_mask, *color, *depth, *stencil)
        }
        RenderCommand::BlendColor { r, g, b, a } => unsafe { gl.BlendColor(*r, *g, *b, *a) },
        RenderCommand::Viewport { x, y, width, height, depth_near, depth_far } => {
            cmd_viewport(gl, state, *x, *y, *width, *height, *depth_near, *depth_far)
        }
        RenderCommand::Scissor { x, y, width, height } => cmd_scissor(gl, state, *x, *y, *width, *height),
        RenderCommand::Uniform4f { location, count, values } => {
            cmd_uniform4f(gl, state, location, *count, *values)
        }
        RenderCommand::Uniform4i { location, count, values } => {
            cmd_uniform4i(gl, state, location, *count, *values)
        }
        RenderCommand::UniformMatrix4 { location, transpose, values } => {
            cmd_uniform_matrix4(gl, state, location, *transpose, values)
        }
        RenderCommand::StencilFunc { enable, func, reference, mask } => {
            cmd_stencil_func(gl, *enable, *func, *reference, *mask)
        }
        RenderCommand::StencilOp { sfail, dpfail, dppass, write_mask } => unsafe {
            gl.StencilOp(*sfail, *dpfail, *dppass);
            gl.StencilMask(*write_mask);
        },
        RenderCommand::BindTexture { unit, texture } => cmd_bind_texture(gl, state, *unit, texture.as_ref()),
        RenderCommand::BindFBTexture { unit, framebuffer } => {
            cmd_bind_fb_texture(gl, state, *unit, framebuffer)
        }
        RenderCommand::BindProgram { program } => cmd_bind_program(gl, state, program.clone()),
        RenderCommand::BindInputLayout { layout, base_offset } => {
            cmd_bind_input_layout(gl, state, layout, *base_offset)
        }
        RenderCommand::BindBuffer { target, buffer } => cmd_bind_buffer(gl, state, *target, *buffer),
        RenderCommand::GenMips => unsafe { gl.GenerateMipmap(gl::TEXTURE_2D) },
        RenderCommand::Draw { topology, first, count } => unsafe {
            gl.DrawArrays(*topology, *first as gl::types::GLint, *count as gl::types::GLsizei);
        },
        RenderCommand::DrawIndexed {
            topology,
            index_type,
            first_index,
            count,
            base_vertex,
            instances: _,
        } => cmd_draw_indexed(gl, *topology, *index_type, *first_index, *count, *base_vertex),
        RenderCommand::TextureSampler { texture, wrap_s, wrap_t, min_filter, mag_filter, anisotropy } => {
            cmd_texture_sampler(gl, probe, state, texture, *wrap_s, *wrap_t, *min_filter, *mag_filter, *anisotropy)
        }
        RenderCommand::TextureLod { texture, lod_min, lod_max, lod_bias } => {
            cmd_texture_lod(gl, probe, state, texture, *lod_min, *lod_max, *lod_bias)
        }
        RenderCommand::Raster { cull_enable, front_face, cull_face, dither_enable } => {
            cmd_raster(gl, *cull_enable, *front_face, *cull_face, *dither_enable)
        }
    }
}

fn cmd_depth(gl: &gl::Gl, enable: bool, write_mask: bool, func: gl::types::GLenum) {
    unsafe {
        if enable {
            gl.Enable(gl::DEPTH_TEST);
            gl.DepthMask(write_mask as gl::types::GLboolean);
            gl.DepthFunc(func);
        } else {
            gl.Disable(gl::DEPTH_TEST);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_blend(
    gl: &gl::Gl,
    enable: bool,
    color_eq: gl::types::GLenum,
    alpha_eq: gl::types::GLenum,
    src_color: gl::types::GLenum,
    dst_color: gl::types::GLenum,
    src_alpha: gl::types::GLenum,
    dst_alpha: gl::types::GLenum,
    mask: u8,
) {
    unsafe {
        if enable {
            gl.Enable(gl::BLEND);
            gl.BlendEquationSeparate(color_eq, alpha_eq);
            gl.BlendFuncSeparate(src_color, dst_color, src_alpha, dst_alpha);
        } else {
            gl.Disable(gl::BLEND);
        }
        let (r, g, b, a) = color_write_mask(mask);
        gl.ColorMask(r, g, b, a);
    }
}

/// Low four bits of `mask` select the RGBA color write channels (§4.2 Blend).
fn color_write_mask(mask: u8) -> (gl::types::GLboolean, gl::types::GLboolean, gl::types::GLboolean, gl::types::GLboolean) {
    (
        ((mask & 0b0001) != 0) as gl::types::GLboolean,
        ((mask & 0b0010) != 0) as gl::types::GLboolean,
        ((mask & 0b0100) != 0) as gl::types::GLboolean,
        ((mask & 0b1000) != 0) as gl::types::GLboolean,
    )
}

/// Packed 32-bit RGBA byte quad to four normalized floats (§4.2 Clear).
fn unpack_clear_color(color: [u8; 4]) -> [f32; 4] {
    [
        color[0] as f32 / 255.0,
        color[1] as f32 / 255.0,
        color[2] as f32 / 255.0,
        color[3] as f32 / 255.0,
    ]
}

fn cmd_clear(gl: &gl::Gl, probe: &FeatureProbe, clear_mask: ClearMask, color: [u8; 4], depth: f32, stencil: i32) {
    let rgba = unpack_clear_color(color);
    unsafe {
        gl.Disable(gl::SCISSOR_TEST);
        gl.ColorMask(gl::TRUE, gl::TRUE, gl::TRUE, gl::TRUE);

        let mut bits: gl::types::GLbitfield = 0;
        if clear_mask.contains(ClearMask::COLOR) {
            gl.ClearColor(rgba[0], rgba[1], rgba[2], rgba[3]);
            bits |= gl::COLOR_BUFFER_BIT;
        }
        if clear_mask.contains(ClearMask::DEPTH) {
            if probe.is_gles {
                gl.ClearDepthf(depth);
            } else {
                gl.ClearDepth(depth as gl::types::GLdouble);
            }
            bits |= gl::DEPTH_BUFFER_BIT;
        }
        if clear_mask.contains(ClearMask::STENCIL) {
            gl.ClearStencil(stencil);
            bits |= gl::STENCIL_BUFFER_BIT;
        }
        gl.Clear(bits);

        gl.Enable(gl::SCISSOR_TEST);
    }
}

/// Flips the Y coordinate when the pass targets the default backbuffer
/// (§4.2 Viewport/Scissor, §8 Y-flip invariance).
fn flip_y_if_default(is_default_fb: bool, fb_height: u32, y: i32, height: i32) -> i32 {
    if is_default_fb {
        fb_height as i32 - y - height
    } else {
        y
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_viewport(gl: &gl::Gl, state: &PassState, x: i32, y: i32, width: i32, height: i32, depth_near: f32, depth_far: f32) {
    let y = flip_y_if_default(state.is_default_fb, state.cur_fb_height, y, height);
    unsafe {
        gl.Viewport(x, y, width, height);
        gl.DepthRangef(depth_near, depth_far);
    }
}

fn cmd_scissor(gl: &gl::Gl, state: &PassState, x: i32, y: i32, width: i32, height: i32) {
    let y = flip_y_if_default(state.is_default_fb, state.cur_fb_height, y, height);
    unsafe { gl.Scissor(x, y, width, height) };
}

/// Resolves a uniform location command source to the actual GL location,
/// or `None` to skip the upload (§4.2, §8 "uniform skip").
fn resolve_location(gl: &gl::Gl, state: &mut PassState, location: &UniformLocation) -> Option<gl::types::GLint> {
    let loc = match location {
        UniformLocation::Cached(cell) => cell.get(),
        UniformLocation::Named(name) => {
            let program = state.cur_program.as_ref()?;
            program.borrow_mut().resolve_uniform(gl, name)
        }
    };
    skip_if_negative(loc)
}

/// Pure decision for §8's "uniform skip" property.
fn skip_if_negative(location: gl::types::GLint) -> Option<gl::types::GLint> {
    if location < 0 {
        None
    } else {
        Some(location)
    }
}

fn cmd_uniform4f(gl: &gl::Gl, state: &mut PassState, location: &UniformLocation, count: u8, values: [f32; 4]) {
    if let Some(loc) = resolve_location(gl, state, location) {
        unsafe {
            match count {
                1 => gl.Uniform1f(loc, values[0]),
                2 => gl.Uniform2f(loc, values[0], values[1]),
                3 => gl.Uniform3f(loc, values[0], values[1], values[2]),
                _ => gl.Uniform4f(loc, values[0], values[1], values[2], values[3]),
            }
        }
    }
}

fn cmd_uniform4i(gl: &gl::Gl, state: &mut PassState, location: &UniformLocation, count: u8, values: [gl::types::GLint; 4]) {
    if let Some(loc) = resolve_location(gl, state, location) {
        unsafe {
            match count {
                1 => gl.Uniform1i(loc, values[0]),
                2 => gl.Uniform2i(loc, values[0], values[1]),
                3 => gl.Uniform3i(loc, values[0], values[1], values[2]),
                _ => gl.Uniform4i(loc, values[0], values[1], values[2], values[3]),
            }
        }
    }
}

fn cmd_uniform_matrix4(gl: &gl::Gl, state: &mut PassState, location: &UniformLocation, transpose: bool, values: &[f32; 16]) {
    if let Some(loc) = resolve_location(gl, state, location) {
        unsafe {
            gl.UniformMatrix4fv(loc, 1, transpose as gl::types::GLboolean, values.as_ptr());
        }
    }
}

fn cmd_stencil_func(gl: &gl::Gl, enable: bool, func: gl::types::GLenum, reference: gl::types::GLint, mask: u32) {
    unsafe {
        if enable {
            gl.Enable(gl::STENCIL_TEST);
            gl.StencilFunc(func, reference, mask);
        } else {
            gl.Disable(gl::STENCIL_TEST);
        }
    }
}

fn cmd_bind_texture(gl: &gl::Gl, state: &mut PassState, unit: u32, texture: Option<&Shared<crate::resource::Texture>>) {
    set_active_texture(gl, state, unit);
    let handle = texture.map(|t| t.borrow().handle).unwrap_or(0);
    bind_2d_texture(gl, state, unit, handle);
}

fn cmd_bind_fb_texture(gl: &gl::Gl, state: &mut PassState, unit: u32, framebuffer: &Shared<Framebuffer>) {
    set_active_texture(gl, state, unit);
    let handle = framebuffer.borrow().color_attachment();
    bind_2d_texture(gl, state, unit, handle);
}

/// Pure decision for §4.2 BindTexture: whether an `ActiveTexture` call is
/// needed before binding.
fn needs_active_texture_switch(current: u32, requested: u32) -> bool {
    current != requested
}

fn set_active_texture(gl: &gl::Gl, state: &mut PassState, unit: u32) {
    if needs_active_texture_switch(state.active_texture, unit) {
        state.active_texture = unit;
        unsafe { gl.ActiveTexture(gl::TEXTURE0 + unit) };
    }
}

fn bind_2d_texture(gl: &gl::Gl, state: &mut PassState, unit: u32, handle: gl::types::GLuint) {
    let slot = unit as usize % state.bound_texture.len();
    if state.bound_texture[slot] != handle {
        state.bound_texture[slot] = handle;
        unsafe { gl.BindTexture(gl::TEXTURE_2D, handle) };
    }
}

fn cmd_bind_program(gl: &gl::Gl, state: &mut PassState, program: Option<Shared<Program>>) {
    let handle = program.as_ref().map(|p| p.borrow().handle).unwrap_or(0);
    state.cur_program = program;
    unsafe { gl.UseProgram(handle) };
}

/// Pure decision for §8's "attribute mask closure" / scenario 5: which
/// attribute indices to enable/disable and the resulting tracked mask.
fn attr_mask_transition(current_mask: u8, new_mask: u8) -> (u8, u8, u8) {
    let enable = new_mask & !current_mask;
    let disable = !new_mask & current_mask;
    (enable, disable, new_mask)
}

fn cmd_bind_input_layout(gl: &gl::Gl, state: &mut PassState, layout: &Shared<crate::resource::InputLayout>, base_offset: u32) {
    let layout = layout.borrow();
    let (enable, disable, new_mask) = attr_mask_transition(state.attr_mask, layout.semantics_mask);
    unsafe {
        for i in 0..8u32 {
            if enable & (1 << i) != 0 {
                gl.EnableVertexAttribArray(i);
            }
            if disable & (1 << i) != 0 {
                gl.DisableVertexAttribArray(i);
            }
        }
        for entry in layout.entries.iter() {
            let offset = base_offset + entry.offset;
            gl.VertexAttribPointer(
                entry.location,
                entry.components,
                entry.component_type,
                entry.normalized as gl::types::GLboolean,
                entry.stride,
                offset as *const std::ffi::c_void,
            );
        }
    }
    state.attr_mask = new_mask;
}

/// Pure decision for §8's "state-change filtering" property (`BindBuffer`).
fn needs_buffer_bind(tracked: gl::types::GLuint, requested: gl::types::GLuint, tracked_target: bool) -> bool {
    !tracked_target || tracked != requested
}

fn cmd_bind_buffer(gl: &gl::Gl, state: &mut PassState, target: gl::types::GLenum, buffer: gl::types::GLuint) {
    match target {
        gl::ARRAY_BUFFER => {
            if needs_buffer_bind(state.cur_array_buffer, buffer, true) {
                state.cur_array_buffer = buffer;
                unsafe { gl.BindBuffer(gl::ARRAY_BUFFER, buffer) };
            }
        }
        gl::ELEMENT_ARRAY_BUFFER => {
            if needs_buffer_bind(state.cur_elem_array_buffer, buffer, true) {
                state.cur_elem_array_buffer = buffer;
                unsafe { gl.BindBuffer(gl::ELEMENT_ARRAY_BUFFER, buffer) };
            }
        }
        other => unsafe { gl.BindBuffer(other, buffer) },
    }
}

fn cmd_draw_indexed(
    gl: &gl::Gl,
    topology: gl::types::GLenum,
    index_type: gl::types::GLenum,
    first_index: u32,
    count: u32,
    base_vertex: i32,
) {
    let index_size = match index_type {
        gl::UNSIGNED_BYTE => 1,
        gl::UNSIGNED_SHORT => 2,
        _ => 4,
    };
    let offset = (first_index as usize * index_size) as *const std::ffi::c_void;
    unsafe {
        if base_vertex == 0 {
            gl.DrawElements(topology, count as gl::types::GLsizei, index_type, offset);
        } else {
            gl.DrawElementsBaseVertex(
                topology,
                count as gl::types::GLsizei,
                index_type,
                offset,
                base_vertex,
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_texture_sampler(
    gl: &gl::Gl,
    probe: &FeatureProbe,
    state: &mut PassState,
    texture: &Shared<crate::resource::Texture>,
    wrap_s: gl::types::GLenum,
    wrap_t: gl::types::GLenum,
    min_filter: gl::types::GLenum,
    mag_filter: gl::types::GLenum,
    anisotropy: f32,
) {
    let handle = {
        let mut tex = texture.borrow_mut();
        tex.sampler.wrap_s = wrap_s;
        tex.sampler.wrap_t = wrap_t;
        tex.sampler.min_filter = min_filter;
        tex.sampler.mag_filter = mag_filter;
        tex.sampler.anisotropy = anisotropy;
        tex.handle
    };
    bind_2d_texture(gl, state, state.active_texture, handle);
    unsafe {
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, wrap_s as gl::types::GLint);
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, wrap_t as gl::types::GLint);
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, min_filter as gl::types::GLint);
        gl.TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, mag_filter as gl::types::GLint);
        if anisotropy > 0.0 {
            let clamped = anisotropy.min(probe.max_anisotropy);
            gl.TexParameterf(gl::TEXTURE_2D, gl::TEXTURE_MAX_ANISOTROPY_EXT, clamped);
        }
    }
}

fn cmd_texture_lod(
    gl: &gl::Gl,
    probe: &FeatureProbe,
    state: &mut PassState,
    texture: &Shared<crate::resource::Texture>,
    lod_min: f32,
    lod_max: f32,
    lod_bias: f32,
) {
    let handle = {
        let mut tex = texture.borrow_mut();
        tex.sampler.lod_min = lod_min;
        tex.sampler.lod_max = lod_max;
        tex.sampler.lod_bias = lod_bias;
        tex.handle
    };
    bind_2d_texture(gl, state, state.active_texture, handle);
    unsafe {
        gl.TexParameterf(gl::TEXTURE_2D, gl::TEXTURE_MIN_LOD, lod_min);
        gl.TexParameterf(gl::TEXTURE_2D, gl::TEXTURE_MAX_LOD, lod_max);
        if !probe.is_gles {
            gl.TexParameterf(gl::TEXTURE_2D, gl::TEXTURE_LOD_BIAS, lod_bias);
        }
    }
}

fn cmd_raster(gl: &gl::Gl, cull_enable: bool, front_face: gl::types::GLenum, cull_face: gl::types::GLenum, dither_enable: bool) {
    unsafe {
        if cull_enable {
            gl.Enable(gl::CULL_FACE);
            gl.FrontFace(front_face);
            gl.CullFace(cull_face);
        } else {
            gl.Disable(gl::CULL_FACE);
        }
        if dither_enable {
            gl.Enable(gl::DITHER);
        } else {
            gl.Disable(gl::DITHER);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn y_flip_applies_only_to_default_target() {
        assert_eq!(flip_y_if_default(false, 600, 10, 20), 10);
        assert_eq!(flip_y_if_default(true, 600, 10, 20), 600 - 10 - 20);
    }

    #[test]
    fn attribute_mask_transition_matches_scenario_five() {
        let (enable, disable, new_mask) = attr_mask_transition(0b0000011, 0b0001100);
        assert_eq!(enable, 0b0001100);
        assert_eq!(disable, 0b0000011);
        assert_eq!(new_mask, 0b0001100);
    }

    #[test]
    fn attribute_mask_closes_to_empty() {
        let (_, disable, new_mask) = attr_mask_transition(0b0001100, 0);
        assert_eq!(disable, 0b0001100);
        assert_eq!(new_mask, 0);
    }

    #[test]
    fn negative_uniform_location_is_skipped() {
        assert_eq!(skip_if_negative(-1), None);
        assert_eq!(skip_if_negative(0), Some(0));
        assert_eq!(skip_if_negative(4), Some(4));
    }

    #[test]
    fn color_write_mask_reads_low_four_bits() {
        assert_eq!(color_write_mask(0b0000), (0, 0, 0, 0));
        assert_eq!(color_write_mask(0b1111), (1, 1, 1, 1));
        assert_eq!(color_write_mask(0b0101), (1, 0, 1, 0));
    }

    #[test]
    fn unpacks_clear_color_to_normalized_floats() {
        assert_eq!(unpack_clear_color([255, 0, 0, 255]), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn buffer_bind_suppressed_only_for_tracked_targets() {
        assert!(!needs_buffer_bind(5, 5, true));
        assert!(needs_buffer_bind(5, 6, true));
        assert!(needs_buffer_bind(5, 5, false));
    }

    #[test]
    fn active_texture_switch_only_on_unit_change() {
        assert!(!needs_active_texture_switch(0, 0));
        assert!(needs_active_texture_switch(0, 1));
    }
}
