//! Error types for lumen_gpu

use thiserror::Error;

/// Fatal picture replay failures
///
/// Degenerate geometry and missing resources never surface here; those
/// draws are skipped and the flush continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlushError {
    /// A `restore` closed more states than were saved
    #[error("restore at command {index} has no matching save")]
    UnmatchedRestore { index: usize },

    /// Replay finished with saves or layers still open
    #[error("picture ended with {depth} unclosed save(s)")]
    UnbalancedPicture { depth: usize },

    /// Paint shader variant the engine cannot draw
    #[error("unsupported shader: {kind}")]
    UnsupportedShader { kind: &'static str },

    /// Draw command variant the engine cannot replay
    #[error("unsupported draw command: {kind}")]
    UnsupportedCommand { kind: &'static str },
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for the expected schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors from the wgpu executor
#[derive(Error, Debug)]
pub enum RendererError {
    /// Failed to request GPU adapter
    #[error("no suitable GPU adapter found")]
    AdapterNotFound,

    /// Failed to request GPU device
    #[error("failed to request GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    /// Reading the rendered target back to the CPU failed
    #[error("readback failed: {0}")]
    Readback(String),

    /// The picture could not be replayed
    #[error(transparent)]
    Flush(#[from] FlushError),
}

/// Result type for picture replay
pub type Result<T> = std::result::Result<T, FlushError>;
