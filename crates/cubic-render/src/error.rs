// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use thiserror::Error;

pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Everything the core can fail with. Stale surfaces are not errors: they are
/// reported as [`crate::SurfaceStatus::Stale`] and recovered by rebuilding.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitError),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("acquire failed: {0}")]
    Acquire(String),

    #[error("present failed: {0}")]
    Present(String),

    #[error("allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("unsupported layout transition {from} -> {to}")]
    UnsupportedTransition { from: String, to: String },

    #[error("shader bytecode rejected: {0}")]
    ShaderCompilation(String),

    #[error("frame slot {slot} did not complete within {timeout:?}")]
    FenceTimeout { slot: usize, timeout: Duration },

    #[error("{op} failed: {detail}")]
    Device { op: &'static str, detail: String },
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("no compatible rendering device")]
    NoCompatibleDevice,

    #[error("missing extension {0}")]
    MissingExtension(String),

    #[error("missing layer {0}")]
    MissingLayer(String),

    #[error("sample count {requested} not supported (max {max})")]
    UnsupportedSampleCount { requested: u32, max: u32 },

    #[error("no supported depth format")]
    NoDepthFormat,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("zero-sized allocation")]
    ZeroSize,

    #[error("no memory type in mask {type_bits:#x} has flags {requested}")]
    NoSuitableMemory { type_bits: u32, requested: String },

    #[error("upload of {len} bytes exceeds resource size {capacity}")]
    Overflow { len: u64, capacity: u64 },

    #[error("device memory exhausted: {0}")]
    OutOfMemory(String),
}

impl RenderError {
    /// Wraps a failing API call that has no dedicated kind.
    pub fn device(op: &'static str, err: impl std::fmt::Debug) -> Self {
        RenderError::Device {
            op,
            detail: format!("{err:?}"),
        }
    }

    pub fn is_allocation(&self) -> bool {
        matches!(self, RenderError::Allocation(_))
    }
}
