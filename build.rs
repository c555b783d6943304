extern crate gl_generator;

use gl_generator::{Api, Fallbacks, Profile, Registry};
use std::env;
use std::fs::File;
use std::path::Path;

// Generates the raw FFI surface consumed by `crate::api`. Two largely
// disjoint registries are generated depending on the `gles` feature, because
// a single driver never exports both the desktop ARB/EXT framebuffer-object
// entry points and the ES-only OES_packed_depth_stencil/OES_depth24 tokens;
// the runtime FeatureProbe (src/probe.rs) does the remaining ARB-vs-EXT and
// packed-vs-separate branching within whichever half got linked in here.
fn main() {
    let dest = env::var("OUT_DIR").unwrap();
    let mut file = File::create(Path::new(&dest).join("bindings.rs")).unwrap();

    if cfg!(feature = "gles") {
        Registry::new(
            Api::Gles2,
            (3, 2),
            Profile::Core,
            Fallbacks::All,
            [
                "GL_OES_packed_depth_stencil",
                "GL_OES_depth24",
                "GL_EXT_blend_func_extended",
                "GL_NV_framebuffer_blit",
                "GL_OES_EGL_image_external",
                "GL_NV_copy_image",
                "GL_OES_copy_image",
                "GL_EXT_texture_filter_anisotropic",
                "GL_KHR_debug",
            ],
        )
        .write_bindings(gl_generator::StructGenerator, &mut file)
        .unwrap();
    } else {
        Registry::new(
            Api::Gl,
            (4, 3),
            Profile::Compatibility,
            Fallbacks::All,
            [
                "GL_ARB_framebuffer_object",
                "GL_EXT_framebuffer_object",
                "GL_ARB_copy_image",
                "GL_NV_copy_image",
                "GL_NV_framebuffer_blit",
                "GL_ARB_blend_func_extended",
                "GL_EXT_texture_filter_anisotropic",
                "GL_KHR_debug",
            ],
        )
        .write_bindings(gl_generator::StructGenerator, &mut file)
        .unwrap();
    }
}
