use thiserror::Error;

use super::{Digest, JobConfig};

/// One dispatch worth of work.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BatchRequest {
    /// First nonce of the batch; the backend covers `JobConfig::batch_span`
    /// nonces from here.
    pub base_nonce: u64,
    /// Minimum leading zero bits for a digest to be returned at all.
    pub prefilter_bits: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Candidate {
    pub nonce: u64,
    pub digest: Digest,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BatchOutput {
    pub candidates: Vec<Candidate>,
    /// Candidates found but not returned for lack of readback space.
    pub dropped: u32,
}

/// Failures of a compute backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComputeError {
    #[error("compute device unavailable: {0}")]
    Unavailable(String),

    /// The readback did not complete within the poll timeout. Retryable.
    #[error("readback stalled")]
    Stalled,

    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("readback failed: {0}")]
    Readback(String),
}

impl ComputeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Stalled)
    }
}

/// Runs batches for a job. Lives on, and is only used from, the worker thread.
pub trait ComputeBackend {
    fn run_batch(&mut self, request: &BatchRequest) -> Result<BatchOutput, ComputeError>;
}

/// Creates a job's backend on its worker thread.
pub type BackendFactory =
    Box<dyn FnOnce(&JobConfig) -> Result<Box<dyn ComputeBackend>, ComputeError> + Send>;
