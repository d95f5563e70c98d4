//! wgpu bridge crate.
//!
//! Lets a foreign host (JNI, C, a managed runtime) own GPU render sessions and
//! long-running compute jobs through opaque integer handles.
//!
//! - [`Bridge`] is the handle-based entry point
//! - [`session`] holds the per-surface state machine and frame driver
//! - [`job`] runs cancellable compute searches on dedicated worker threads
//! - [`ffi`] exposes the same surface over the C ABI

pub mod animation;
pub mod bridge;
pub mod device;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod job;
pub mod logging;
pub mod session;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{Bridge, BridgeConfig};
pub use error::{BridgeError, Result};
pub use handle::Handle;
