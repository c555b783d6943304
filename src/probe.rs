//! Immutable record of driver capabilities, populated once at device creation
//! (§3 `FeatureProbe`, §4.5 `GraphicsDevice::create_device_objects`). Every
//! dialect branch elsewhere in the crate consults this record instead of
//! re-querying the driver.

use crate::api as gl;
use std::collections::HashSet;
use std::ffi::CStr;
use std::os::raw::c_char;

/// Detected driver capabilities and version. Frozen after
/// [`FeatureProbe::detect`] returns; never mutated again.
#[derive(Clone, Debug)]
pub struct FeatureProbe {
    pub is_gles: bool,
    pub gles3: bool,
    pub arb_framebuffer_object: bool,
    pub ext_framebuffer_object: bool,
    pub arb_copy_image: bool,
    pub nv_copy_image: bool,
    pub oes_copy_image: bool,
    pub nv_framebuffer_blit: bool,
    pub oes_packed_depth_stencil: bool,
    pub oes_depth24: bool,
    pub dual_source_blend: bool,
    pub max_anisotropy: f32,
    version: (u32, u32, u32),
}

impl FeatureProbe {
    /// Queries `GL_VERSION` and the extension string (or `glGetStringi` table
    /// on core profile) and freezes the result. Must be called once, with a
    /// current GL context, before any other interpreter runs.
    pub fn detect(gl: &gl::Gl) -> FeatureProbe {
        let version_str = unsafe { cstr_from_gl(gl.GetString(gl::VERSION)) };
        let is_gles = version_str.contains("OpenGL ES");
        let version = parse_gl_version(&version_str).unwrap_or((1, 0, 0));

        let extensions = read_extensions(gl);
        let has = |name: &str| extensions.contains(name);

        let gles3 = is_gles && version.0 >= 3;
        let arb_framebuffer_object = !is_gles && (version.0 > 3 || (version.0 == 3 && version.1 >= 0) || has("GL_ARB_framebuffer_object"));
        let ext_framebuffer_object = has("GL_EXT_framebuffer_object");
        let arb_copy_image = !is_gles && (version.0 > 4 || (version.0 == 4 && version.1 >= 3) || has("GL_ARB_copy_image"));
        let nv_copy_image = has("GL_NV_copy_image");
        let oes_copy_image = is_gles && has("GL_OES_copy_image");
        let nv_framebuffer_blit = has("GL_NV_framebuffer_blit");
        let oes_packed_depth_stencil = has("GL_OES_packed_depth_stencil");
        let oes_depth24 = has("GL_OES_depth24");
        let dual_source_blend = if is_gles {
            gles3 && has("GL_EXT_blend_func_extended")
        } else {
            version.0 > 3 || (version.0 == 3 && version.1 >= 3) || has("GL_ARB_blend_func_extended")
        };

        let max_anisotropy = if has("GL_EXT_texture_filter_anisotropic") {
            let mut v: gl::types::GLfloat = 1.0;
            unsafe { gl.GetFloatv(gl::MAX_TEXTURE_MAX_ANISOTROPY_EXT, &mut v) };
            v
        } else {
            1.0
        };

        FeatureProbe {
            is_gles,
            gles3,
            arb_framebuffer_object,
            ext_framebuffer_object,
            arb_copy_image,
            nv_copy_image,
            oes_copy_image,
            nv_framebuffer_blit,
            oes_packed_depth_stencil,
            oes_depth24,
            dual_source_blend,
            max_anisotropy,
            version,
        }
    }

    pub fn version_at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        self.version >= (major, minor, patch)
    }

    pub fn supports_dual_source_blend(&self) -> bool {
        self.dual_source_blend
    }

    /// Whether draw/read framebuffer targets can be bound independently
    /// (§4.3 target selection: desktop ARB, or ES3, or the NV blit
    /// extension).
    pub fn blit_supported(&self) -> bool {
        (!self.is_gles && self.arb_framebuffer_object) || self.gles3 || self.nv_framebuffer_blit
    }

    /// Entry-point dialect chosen once per process for framebuffer object
    /// calls: ARB/core when ARB framebuffer object is present or on any ES,
    /// EXT otherwise.
    pub fn fbo_dialect(&self) -> FboDialect {
        if self.is_gles || self.arb_framebuffer_object {
            FboDialect::ArbCore
        } else {
            FboDialect::Ext
        }
    }
}

/// Which entry-point family is used for framebuffer object creation and
/// destruction, fixed at device-creation time per [`FeatureProbe::fbo_dialect`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FboDialect {
    ArbCore,
    Ext,
}

unsafe fn cstr_from_gl(ptr: *const u8) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr as *const c_char)
        .to_string_lossy()
        .into_owned()
}

fn read_extensions(gl: &gl::Gl) -> HashSet<String> {
    let mut count: gl::types::GLint = 0;
    unsafe { gl.GetIntegerv(gl::NUM_EXTENSIONS, &mut count) };
    if count > 0 {
        (0..count as u32)
            .map(|i| unsafe { cstr_from_gl(gl.GetStringi(gl::EXTENSIONS, i)) })
            .collect()
    } else {
        let blob = unsafe { cstr_from_gl(gl.GetString(gl::EXTENSIONS)) };
        blob.split_whitespace().map(str::to_owned).collect()
    }
}

/// Parses the `(major, minor, patch)` triple out of a `GL_VERSION` string,
/// which may be prefixed with `"OpenGL ES "`.
fn parse_gl_version(raw: &str) -> Option<(u32, u32, u32)> {
    let numeric = raw
        .trim_start_matches("OpenGL ES ")
        .split_whitespace()
        .next()?;
    let mut parts = numeric.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    let patch: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some((major, minor, patch))
}

#[cfg(test)]
impl FeatureProbe {
    /// Builds a blank probe for unit tests exercising dialect-dispatch
    /// decisions, without requiring a live GL context.
    pub(crate) fn test_stub() -> FeatureProbe {
        FeatureProbe {
            is_gles: false,
            gles3: false,
            arb_framebuffer_object: false,
            ext_framebuffer_object: false,
            arb_copy_image: false,
            nv_copy_image: false,
            oes_copy_image: false,
            nv_framebuffer_blit: false,
            oes_packed_depth_stencil: false,
            oes_depth24: false,
            dual_source_blend: false,
            max_anisotropy: 1.0,
            version: (0, 0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_desktop_version() {
        assert_eq!(parse_gl_version("4.6.0 NVIDIA 550.54"), Some((4, 6, 0)));
    }

    #[test]
    fn parses_gles_version() {
        assert_eq!(
            parse_gl_version("OpenGL ES 3.2 build 1.0"),
            Some((3, 2, 0))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_gl_version(""), None);
    }
}
