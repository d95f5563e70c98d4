//! Time subsystem.
//!
//! Batch timing for the compute job runner, kept free of any GPU types so it
//! can be driven from tests:
//! - one `BatchClock` per job
//! - call `tick()` once per completed batch to obtain `BatchTime`

mod batch_clock;

pub use batch_clock::{BatchClock, BatchTime};
