//! Animations selectable inside a live session.
//!
//! An animation is a pipeline factory plus a per-frame encode routine, looked up
//! by [`AnimationId`] in an immutable [`AnimationRegistry`]. Animation-local
//! state ([`AnimationState`]) lives in the session and is advanced by the frame
//! driver, never by the animation itself.

mod builtin;
mod orbit;
mod registry;
mod state;
mod triangle;

pub use builtin::{ORBIT, ROTATING_TRIANGLE};
pub use orbit::OrbitProgram;
pub use registry::{AnimationDescriptor, AnimationId, AnimationRegistry, BuildFn, EncodeFn};
pub use state::AnimationState;
pub use triangle::TriangleProgram;
