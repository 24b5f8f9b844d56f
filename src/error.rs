//! Central error types for the presentation engine.
//!
//! Every fallible engine operation returns [`PresentResult`]. Errors implement
//! `Serialize` (as their display string) so embedders can forward them over IPC
//! boundaries unchanged.

use serde::Serialize;
use thiserror::Error;

use crate::rendering::lifecycle::DeviceState;

/// Main error type for presentation operations.
#[derive(Error, Debug)]
pub enum PresentError {
    /// Null, zero-sized or out-of-range input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation needs a surface or device that has not been created yet
    #[error("Not ready: {0}")]
    NotReady(String),

    /// The device is lost or waiting for a reset
    #[error("Device unavailable (state: {0:?})")]
    DeviceUnavailable(DeviceState),

    /// Surface, texture or device creation failed
    #[error("Allocation failed: {0}")]
    AllocationError(String),

    /// Shader failed to parse, validate or match its entry point.
    /// Carries the compiler diagnostic text.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilationError(String),

    /// Pixel or subsampling format without a conversion path
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Configuration could not be read or parsed
    #[error("Config error: {0}")]
    ConfigError(String),

    /// File access failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Serialize for PresentError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<image::ImageError> for PresentError {
    fn from(err: image::ImageError) -> Self {
        PresentError::InvalidArgument(format!("image decode failed: {}", err))
    }
}

impl From<serde_json::Error> for PresentError {
    fn from(err: serde_json::Error) -> Self {
        PresentError::ConfigError(err.to_string())
    }
}

/// Extension trait turning missing resources into [`PresentError::NotReady`].
pub trait OptionExt<T> {
    /// Convert `None` to `NotReady` with the given message.
    fn not_ready(self, msg: &str) -> PresentResult<T>;

    /// Convert `None` to `InvalidArgument` with a lazily built message.
    fn or_invalid<F: FnOnce() -> String>(self, f: F) -> PresentResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn not_ready(self, msg: &str) -> PresentResult<T> {
        self.ok_or_else(|| PresentError::NotReady(msg.to_string()))
    }

    fn or_invalid<F: FnOnce() -> String>(self, f: F) -> PresentResult<T> {
        self.ok_or_else(|| PresentError::InvalidArgument(f()))
    }
}

/// Extension trait for tagging foreign errors as allocation failures.
pub trait ResultExt<T> {
    /// Map any displayable error to `AllocationError`, prefixed with context.
    fn alloc_context(self, msg: &str) -> PresentResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn alloc_context(self, msg: &str) -> PresentResult<T> {
        self.map_err(|e| PresentError::AllocationError(format!("{}: {}", msg, e)))
    }
}

/// Type alias for Results using PresentError.
pub type PresentResult<T> = Result<T, PresentError>;
