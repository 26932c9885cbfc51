// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod error;
mod extent;
mod frame;
mod scene;

pub use error::{AllocationError, InitError, RenderError, RenderResult};
pub use extent::{wait_for_drawable_extent, ExtentSource};
pub use frame::{
    Acquired, FrameBackend, FrameController, FrameOutcome, RebuildReason, SlotState,
    SurfaceStatus,
};
pub use scene::{FrameUniforms, InstanceData, MeshData, SceneDesc, TextureData, Vertex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Zero in either dimension; nothing can be presented at this size.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Multisampling request. There is no silent fallback: asking for more than
/// the device supports fails initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Msaa {
    #[default]
    Max,
    Samples(u32),
}

/// Opaque compiled shader blobs for the vertex and fragment stages.
#[derive(Clone, Debug)]
pub struct ShaderBlobs {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub msaa: Msaa,
    pub fence_timeout: Duration,
    /// `None` uses the backend's built-in shaders.
    pub shaders: Option<ShaderBlobs>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: false,
            msaa: Msaa::Max,
            fence_timeout: Duration::from_secs(5),
            shaders: None,
        }
    }
}

pub trait Renderer {
    /// `extent` is waited on until the window is drawable, so a renderer can
    /// be created for a window that starts minimized.
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        extent: &dyn ExtentSource,
        scene: &SceneDesc,
        options: &RenderOptions,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Notes a new window size; the surface is rebuilt on the next frame.
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self, window: &dyn ExtentSource) -> Result<FrameOutcome>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_vsync(&mut self, _on: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_sizes() {
        assert!(RenderSize::new(0, 0).is_degenerate());
        assert!(RenderSize::new(0, 10).is_degenerate());
        assert!(RenderSize::new(10, 0).is_degenerate());
        assert!(!RenderSize::new(1, 1).is_degenerate());
    }

    #[test]
    fn aspect_guards_zero_height() {
        assert_eq!(RenderSize::new(1600, 800).aspect(), 2.0);
        assert_eq!(RenderSize::new(10, 0).aspect(), 1.0);
    }
}
