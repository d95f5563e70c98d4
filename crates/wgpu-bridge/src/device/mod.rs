//! GPU device + surface management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue ([`GpuContext`])
//! - translating host surface references into wgpu surfaces ([`SurfaceSource`])
//! - configuring the presentation surface and acquiring frames ([`SurfaceBinding`])

mod error;
mod frame;
mod gpu;
mod init;
mod surface;
mod target;

pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use gpu::GpuContext;
pub use init::GpuInit;
pub use surface::SurfaceBinding;
pub use target::{RawSurfaceHandles, SurfacePlatform, SurfaceSize, SurfaceSource};
