//! Blit, Copy, and Readback frame steps (§4.4). `Copy` is a texel-for-texel
//! cross-texture copy dispatched through whichever dialect the driver
//! advertises; `Blit`/`Readback`/`ReadbackImage` are documented interface
//! placeholders per the open question in §9 — they log and return without
//! issuing driver calls.

use crate::api as gl;
use crate::probe::FeatureProbe;
use crate::steps::{BlitStep, CopyAspect, CopyStep, ReadbackImageStep, ReadbackStep};
use log::warn;

/// Dispatch priority for `Copy` (§9 open question, resolved): prefer
/// `ARB_copy_image`/core 4.3, fall back to `NV_copy_image`, fall back to the
/// ES `OES_copy_image` path. A depth-aspect copy is not implemented by any
/// source path and is a fatal condition.
pub fn execute_copy_step(gl: &gl::Gl, probe: &FeatureProbe, step: &CopyStep) {
    if step.aspect == CopyAspect::Depth {
        unimplemented!("depth-aspect texture copy is not implemented");
    }

    let src = step.src.borrow();
    let dst = step.dst.borrow();

    let copy_fn = copy_dispatch(probe);
    match copy_fn {
        CopyDispatch::ArbCore => unsafe {
            gl.CopyImageSubData(
                src.handle,
                src.target,
                0,
                step.src_x as gl::types::GLint,
                step.src_y as gl::types::GLint,
                0,
                dst.handle,
                dst.target,
                0,
                step.dst_x as gl::types::GLint,
                step.dst_y as gl::types::GLint,
                0,
                step.width as gl::types::GLsizei,
                step.height as gl::types::GLsizei,
                1,
            );
        },
        CopyDispatch::Nv => unsafe {
            gl.CopyImageSubDataNV(
                src.handle,
                src.target,
                0,
                step.src_x as gl::types::GLint,
                step.src_y as gl::types::GLint,
                0,
                dst.handle,
                dst.target,
                0,
                step.dst_x as gl::types::GLint,
                step.dst_y as gl::types::GLint,
                0,
                step.width as gl::types::GLsizei,
                step.height as gl::types::GLsizei,
                1,
            );
        },
        CopyDispatch::Oes => unsafe {
            gl.CopyImageSubDataOES(
                src.handle,
                src.target,
                0,
                step.src_x as gl::types::GLint,
                step.src_y as gl::types::GLint,
                0,
                dst.handle,
                dst.target,
                0,
                step.dst_x as gl::types::GLint,
                step.dst_y as gl::types::GLint,
                0,
                step.width as gl::types::GLsizei,
                step.height as gl::types::GLsizei,
                1,
            );
        },
        CopyDispatch::Unsupported => {
            warn!("no CopyImageSubData dialect available on this driver; copy skipped");
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum CopyDispatch {
    ArbCore,
    Nv,
    Oes,
    Unsupported,
}

/// Pure decision: which `CopyImageSubData` entry point to use, given probed
/// capabilities (§4.4, §9): desktop ARB/core first, NV fallback, then the ES
/// `OES_copy_image` path. The spec's "(non-iOS)" qualifier on the OES path is
/// a platform fact this probe cannot observe from GL state alone — it has no
/// counterpart here and is left to whatever layer knows the target platform.
fn copy_dispatch(probe: &FeatureProbe) -> CopyDispatch {
    if probe.arb_copy_image {
        CopyDispatch::ArbCore
    } else if probe.nv_copy_image {
        CopyDispatch::Nv
    } else if probe.oes_copy_image {
        CopyDispatch::Oes
    } else {
        CopyDispatch::Unsupported
    }
}

/// Interface placeholder (§9 open question: the algorithm for this command is
/// not specified by the source). Logs and returns without issuing any driver
/// calls.
pub fn execute_blit_step(_gl: &gl::Gl, _probe: &FeatureProbe, _step: &BlitStep) {
    warn!("Blit is not implemented by this core; step skipped");
}

/// Interface placeholder (§9 open question).
pub fn execute_readback_step(_gl: &gl::Gl, _probe: &FeatureProbe, _step: &ReadbackStep) {
    warn!("Readback is not implemented by this core; step skipped");
}

/// Interface placeholder (§9 open question).
pub fn execute_readback_image_step(_gl: &gl::Gl, _probe: &FeatureProbe, _step: &ReadbackImageStep) {
    warn!("ReadbackImage is not implemented by this core; step skipped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_with(arb: bool, nv: bool, oes: bool) -> FeatureProbe {
        let mut p = FeatureProbe::test_stub();
        p.arb_copy_image = arb;
        p.nv_copy_image = nv;
        p.oes_copy_image = oes;
        p
    }

    #[test]
    fn prefers_arb_over_nv_and_oes() {
        assert_eq!(copy_dispatch(&probe_with(true, true, true)), CopyDispatch::ArbCore);
    }

    #[test]
    fn falls_back_to_nv_over_oes() {
        assert_eq!(copy_dispatch(&probe_with(false, true, true)), CopyDispatch::Nv);
    }

    #[test]
    fn falls_back_to_oes() {
        assert_eq!(copy_dispatch(&probe_with(false, false, true)), CopyDispatch::Oes);
    }

    #[test]
    fn unsupported_when_none_present() {
        assert_eq!(copy_dispatch(&probe_with(false, false, false)), CopyDispatch::Unsupported);
    }
}
