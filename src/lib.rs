//! Command-queue execution core for a retained-mode OpenGL/GLES renderer.
//!
//! A producer builds an init step list and per-frame step lists out of the
//! types in [`steps`] and [`resource`], then hands them to a [`device::GraphicsDevice`]
//! to execute against the current GL context. The core never allocates
//! resource names itself outside of [`device::GraphicsDevice::alloc_texture_name`]
//! and the init interpreter; lifecycle beyond that is externally controlled.

mod api;
mod cmd;
mod copy;
pub mod device;
mod framebuffer;
mod handles;
mod init;
mod probe;
mod resource;
mod steps;

pub use device::GraphicsDevice;
pub use framebuffer::{Framebuffer, FramebufferIncompleteError};
pub use handles::{default_framebuffer, set_default_framebuffer};
pub use init::{ProgramLinkError, ShaderCompileError};
pub use probe::{FboDialect, FeatureProbe};
pub use resource::{
    AttributeEntry, Buffer, Handle, InputLayout, Program, SamplerState, Shader, ShaderStage,
    Texture, UniformInitializer, UniformLocation, UniformQuery,
};
pub use steps::{
    BlitStep, ClearMask, CopyAspect, CopyStep, FrameStep, InitStep, ReadbackImageStep,
    ReadbackStep, RenderCommand, RenderStep, Shared,
};
