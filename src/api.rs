//! Raw FFI surface, generated at build time by `build.rs` from the Khronos
//! registry (desktop GL or GLES2/3 depending on the `gles` feature). Every
//! other module reaches the driver only through `crate::api as gl`, matching
//! the rest of the crate's unsafe call sites.

#![allow(non_upper_case_globals, non_snake_case, dead_code)]

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
