//! Render sessions: one surface, one device, one active animation.
//!
//! A session moves `Bound -> Rendering -> Destroyed`. `Bound` means the surface
//! is configured and the active animation's program is built but nothing has
//! been presented since creation or the last animation change.

mod backend;
mod frame;
mod lifecycle;
mod wgpu_backend;

pub use backend::SessionBackend;
pub use frame::FrameStatus;
pub use lifecycle::{Session, SessionPhase, SessionSnapshot};
pub use wgpu_backend::{WgpuBackend, WgpuProgram};
