//! Bridge error taxonomy.
//!
//! Every fallible bridge call returns [`Result`]. Errors are reported
//! synchronously by the call that detected them; the C ABI maps each variant to
//! a stable status code through [`BridgeError::status_code`].

use thiserror::Error;

use crate::animation::AnimationId;

/// Errors surfaced to the host.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An unknown, destroyed, or wrong-kind handle was used.
    #[error("invalid or destroyed handle {0:#x}")]
    InvalidHandle(u64),

    /// No compatible adapter/device could be obtained.
    #[error("no compatible GPU device: {0}")]
    DeviceUnavailable(String),

    /// The surface could not be created or configured for presentation.
    #[error("surface configuration failed: {0}")]
    SurfaceConfig(String),

    /// The presentable target is gone; the host should recreate the session.
    #[error("presentation surface lost")]
    SurfaceLost,

    /// Pipeline or bind group mismatch while building or encoding a frame.
    #[error("frame encode failed: {0}")]
    Encode(String),

    /// The animation id is not registered.
    #[error("unknown animation id {0}")]
    UnknownAnimation(AnimationId),

    /// The device was lost; the owning session or job is terminated.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// A compute job configuration failed validation.
    #[error("invalid job configuration: {0}")]
    InvalidJobConfig(String),

    /// The worker thread for a compute job could not be spawned.
    #[error("failed to spawn job worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result alias used across the bridge.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

impl BridgeError {
    /// Stable numeric code for foreign callers. `0` is reserved for success.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidHandle(_) => 1,
            Self::DeviceUnavailable(_) => 2,
            Self::SurfaceConfig(_) => 3,
            Self::SurfaceLost => 4,
            Self::Encode(_) => 5,
            Self::UnknownAnimation(_) => 6,
            Self::DeviceLost(_) => 7,
            Self::InvalidJobConfig(_) => 8,
            Self::Spawn(_) => 9,
        }
    }

    /// Whether the host can recover without restarting the process.
    ///
    /// `SurfaceLost` is handled by recreating the session; everything else is
    /// either a caller bug or terminal for the owning handle.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SurfaceLost)
    }
}
