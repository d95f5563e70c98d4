use std::fmt;

use crate::error::{BridgeError, Result};

/// Bytes of fixed seed following the nonce in every hashed message.
pub const SEED_LEN: usize = 24;

/// Device limits guaranteed by `wgpu::Limits::default()`.
const MAX_WORKGROUP_SIZE: u32 = 256;
const MAX_DISPATCH: u32 = 65_535;

/// Half-open range of nonces a job may examine. `end: None` is unbounded
/// (up to `u64::MAX`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct NonceRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl NonceRange {
    /// Every nonce from zero.
    pub const FULL: NonceRange = NonceRange {
        start: 0,
        end: None,
    };

    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn starting_at(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn contains(&self, nonce: u64) -> bool {
        nonce >= self.start && self.end.is_none_or(|end| nonce < end)
    }

    pub fn is_empty(&self) -> bool {
        self.end.is_some_and(|end| end <= self.start)
    }

    /// Number of nonces of `[base, base + span)` inside the range.
    pub fn clamp_span(&self, base: u64, span: u64) -> u64 {
        if !self.contains(base) {
            return 0;
        }
        let limit = self.end.unwrap_or(u64::MAX);
        span.min(limit - base)
    }
}

impl Default for NonceRange {
    fn default() -> Self {
        Self::FULL
    }
}

impl fmt::Display for NonceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {})", self.start, end),
            None => write!(f, "[{}, ..)", self.start),
        }
    }
}

/// Parameters of one compute job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    /// Invocations per workgroup.
    pub workgroup_size: u32,
    /// Workgroups per dispatch (X dimension).
    pub dispatch_count: u32,
    /// Nonces hashed by each invocation per dispatch.
    pub iterations: u32,
    /// Required leading zero bits of an accepted digest.
    pub difficulty: u32,
    pub nonce_range: NonceRange,
    pub seed: [u8; SEED_LEN],
}

impl JobConfig {
    pub fn new(workgroup_size: u32, dispatch_count: u32, iterations: u32, difficulty: u32) -> Self {
        Self {
            workgroup_size,
            dispatch_count,
            iterations,
            difficulty,
            nonce_range: NonceRange::FULL,
            seed: [0; SEED_LEN],
        }
    }

    pub fn with_nonce_range(mut self, range: NonceRange) -> Self {
        self.nonce_range = range;
        self
    }

    pub fn with_seed(mut self, seed: [u8; SEED_LEN]) -> Self {
        self.seed = seed;
        self
    }

    /// Nonces examined by one dispatch.
    pub fn batch_span(&self) -> u64 {
        self.workgroup_size as u64 * self.dispatch_count as u64 * self.iterations as u64
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(BridgeError::InvalidJobConfig(msg));

        for (name, value) in [
            ("workgroup size", self.workgroup_size),
            ("dispatch count", self.dispatch_count),
            ("iteration count", self.iterations),
            ("difficulty", self.difficulty),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }
        if self.workgroup_size > MAX_WORKGROUP_SIZE {
            return invalid(format!(
                "workgroup size {} exceeds {MAX_WORKGROUP_SIZE}",
                self.workgroup_size
            ));
        }
        if self.dispatch_count > MAX_DISPATCH {
            return invalid(format!(
                "dispatch count {} exceeds {MAX_DISPATCH}",
                self.dispatch_count
            ));
        }
        if self.difficulty > 256 {
            return invalid(format!(
                "difficulty {} exceeds the 256-bit digest",
                self.difficulty
            ));
        }
        // The shader offsets nonces with 32-bit arithmetic.
        if self.batch_span() > u32::MAX as u64 {
            return invalid(format!(
                "batch of {} nonces does not fit in 32 bits",
                self.batch_span()
            ));
        }
        if self.nonce_range.is_empty() {
            return invalid(format!("nonce range {} is empty", self.nonce_range));
        }
        Ok(())
    }
}
