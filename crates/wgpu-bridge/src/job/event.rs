use std::fmt;
use std::time::Duration;

use num_format::{Locale, ToFormattedString};

use super::{Digest, JobConfig};

/// Why a job stopped without an error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Completion {
    Cancelled,
    RangeExhausted,
}

/// Cumulative counters of a job.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct JobTotals {
    pub batches: u64,
    pub hashes: u64,
    pub found: u64,
}

/// Everything a job reports, one log line each.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started {
        config: JobConfig,
        predicate: String,
    },
    Batch {
        index: u64,
        base: u64,
        elapsed: Duration,
        hashes: u64,
        rate: u64,
    },
    Found {
        nonce: u64,
        digest: Digest,
    },
    /// Candidates the GPU found but could not fit in its readback buffer.
    Dropped {
        index: u64,
        count: u32,
    },
    Retrying {
        attempt: u32,
        reason: String,
    },
    Completed {
        reason: Completion,
        totals: JobTotals,
    },
    Failed {
        message: String,
    },
}

impl JobEvent {
    /// Whether this is the last event a job emits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { config, predicate } => write!(
                f,
                "started: workgroup_size={} dispatch={} iterations={} difficulty={} ({predicate}), nonces {}, {} per batch",
                config.workgroup_size,
                config.dispatch_count,
                config.iterations,
                config.difficulty,
                config.nonce_range,
                config.batch_span().to_formatted_string(&Locale::en),
            ),
            Self::Batch {
                index,
                base,
                elapsed,
                hashes,
                rate,
            } => write!(
                f,
                "batch: {index}, start: {base:016x}, elapsed: {:.3}s, hashes: {}, hashrate: {} H/s",
                elapsed.as_secs_f64(),
                hashes.to_formatted_string(&Locale::en),
                rate.to_formatted_string(&Locale::en),
            ),
            Self::Found { nonce, digest } => {
                write!(f, "found: nonce {nonce} ({nonce:#018x}), sha256 {digest}")
            }
            Self::Dropped { index, count } => write!(
                f,
                "batch: {index}, {count} candidate(s) beyond readback capacity dropped"
            ),
            Self::Retrying { attempt, reason } => {
                write!(f, "retrying batch (attempt {attempt}): {reason}")
            }
            Self::Completed { reason, totals } => {
                let why = match reason {
                    Completion::Cancelled => "cancelled",
                    Completion::RangeExhausted => "nonce range exhausted",
                };
                write!(
                    f,
                    "completed: {why} after {} batches, {} hashes, {} found",
                    totals.batches.to_formatted_string(&Locale::en),
                    totals.hashes.to_formatted_string(&Locale::en),
                    totals.found,
                )
            }
            Self::Failed { message } => write!(f, "error: {message}"),
        }
    }
}
