//! Handle cache (§2 "Handle cache", §6 `AllocTextureName`): a pre-allocated
//! pool of texture names refilled in batches of 16, plus the process-wide
//! default-framebuffer cell that the host embedding layer writes into.

use crate::api as gl;
use std::sync::atomic::{AtomicU32, Ordering};

const TEXTURE_NAME_BATCH: usize = 16;

/// Process-wide default framebuffer handle. Written by the host embedding
/// layer (e.g. an emulator frontend supplying its own compositor FBO) before
/// any step that may unbind to the backbuffer; read by the core only at
/// unbind time, never written by it. Intentionally not encapsulated behind
/// `GraphicsDevice` — see the design note on `g_defaultFBO`.
pub static G_DEFAULT_FBO: AtomicU32 = AtomicU32::new(0);

pub fn set_default_framebuffer(handle: u32) {
    G_DEFAULT_FBO.store(handle, Ordering::Relaxed);
}

pub fn default_framebuffer() -> u32 {
    G_DEFAULT_FBO.load(Ordering::Relaxed)
}

/// Pool of pre-generated texture names, refilled `TEXTURE_NAME_BATCH` at a
/// time. `alloc_with` takes the actual name generator as a parameter so the
/// refill-counting logic (§8 scenario 6) can be unit tested without a GL
/// context.
pub struct TextureNamePool {
    available: Vec<gl::types::GLuint>,
    refills: u32,
}

impl TextureNamePool {
    pub fn new() -> TextureNamePool {
        TextureNamePool {
            available: Vec::new(),
            refills: 0,
        }
    }

    pub fn refill_count(&self) -> u32 {
        self.refills
    }

    /// Pops a name from the pool, refilling via `generate` (which must
    /// return exactly `TEXTURE_NAME_BATCH` fresh names) when empty.
    pub fn alloc_with(
        &mut self,
        generate: impl FnOnce(usize) -> Vec<gl::types::GLuint>,
    ) -> gl::types::GLuint {
        if self.available.is_empty() {
            self.available = generate(TEXTURE_NAME_BATCH);
            self.refills += 1;
        }
        self.available
            .pop()
            .expect("texture name generator returned an empty batch")
    }

    /// Allocates one texture name, refilling the pool from the driver in
    /// batches of 16 (§6 `AllocTextureName`).
    pub fn alloc(&mut self, gl: &gl::Gl) -> gl::types::GLuint {
        self.alloc_with(|n| {
            let mut names = vec![0; n];
            unsafe { gl.GenTextures(n as gl::types::GLsizei, names.as_mut_ptr()) };
            names
        })
    }

    /// Drains the pool, deleting every still-unused pre-generated name.
    /// Called from `GraphicsDevice::destroy_device_objects`.
    pub fn drain(&mut self, gl: &gl::Gl) {
        if !self.available.is_empty() {
            unsafe {
                gl.DeleteTextures(
                    self.available.len() as gl::types::GLsizei,
                    self.available.as_ptr(),
                )
            };
            self.available.clear();
        }
    }
}

impl Default for TextureNamePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refills_in_batches_of_sixteen() {
        let mut pool = TextureNamePool::new();
        let mut next_name = 1u32;
        let mut generated_batches = 0u32;

        for _ in 0..17 {
            pool.alloc_with(|n| {
                generated_batches += 1;
                (0..n as u32).map(|i| next_name + i).collect()
            });
            next_name += TEXTURE_NAME_BATCH as u32;
        }

        assert_eq!(pool.refill_count(), 2);
        assert_eq!(generated_batches, 2);
    }

    #[test]
    fn default_framebuffer_round_trips() {
        set_default_framebuffer(42);
        assert_eq!(default_framebuffer(), 42);
        set_default_framebuffer(0);
    }
}
