use std::fmt::Debug;

use super::Digest;

/// Decides whether a digest is reported as an accepted candidate.
///
/// The GPU only filters by [`prefilter_bits`](Self::prefilter_bits); every
/// candidate it returns is re-checked with [`accepts`](Self::accepts).
pub trait AcceptancePredicate: Send + Sync + Debug {
    fn accepts(&self, digest: &Digest) -> bool;

    /// Leading zero bits every accepted digest is guaranteed to have. Must not
    /// exceed what `accepts` requires, or accepted digests get filtered out.
    fn prefilter_bits(&self) -> u32;

    /// Short human-readable form for log lines.
    fn describe(&self) -> String;
}

/// Accept digests with at least `n` leading zero bits.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LeadingZeroBits(pub u32);

impl AcceptancePredicate for LeadingZeroBits {
    fn accepts(&self, digest: &Digest) -> bool {
        digest.leading_zero_bits() >= self.0
    }

    fn prefilter_bits(&self) -> u32 {
        self.0
    }

    fn describe(&self) -> String {
        format!("leading zero bits >= {}", self.0)
    }
}

/// Accept digests numerically at most `target` (big-endian).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AtMostTarget(pub Digest);

impl AcceptancePredicate for AtMostTarget {
    fn accepts(&self, digest: &Digest) -> bool {
        *digest <= self.0
    }

    fn prefilter_bits(&self) -> u32 {
        // Anything at most the target shares at least its leading zeros.
        self.0.leading_zero_bits()
    }

    fn describe(&self) -> String {
        format!("digest <= {}", self.0)
    }
}
