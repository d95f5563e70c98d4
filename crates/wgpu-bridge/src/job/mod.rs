//! Cancellable compute jobs.
//!
//! A job searches a nonce range for SHA-256 digests accepted by an
//! [`AcceptancePredicate`], one GPU dispatch per batch, on a dedicated worker
//! thread. Progress is reported as text lines through a [`LineSink`]; the
//! sequence ends with exactly one `completed:` or `error:` line.

mod backend;
mod config;
mod digest;
mod event;
mod miner;
mod predicate;
mod runner;
mod sink;

pub use backend::{
    BackendFactory, BatchOutput, BatchRequest, Candidate, ComputeBackend, ComputeError,
};
pub use config::{JobConfig, NonceRange, SEED_LEN};
pub use digest::{message, Digest};
pub use event::{Completion, JobEvent, JobTotals};
pub use miner::{WgpuMiner, MAX_CANDIDATES};
pub use predicate::{AcceptancePredicate, AtMostTarget, LeadingZeroBits};
pub use runner::{Job, JobPhase, JobSpec};
pub use sink::{ChannelSink, LineSink};
