//! Scoring model trait

use cervixnet_core::Result;
use ndarray::Array4;

/// A loaded network that maps one normalized image to a scalar score.
///
/// Calls are blocking and run on the inference worker pool. Implementations
/// must be safe to share read-only across requests.
pub trait ScoringModel: Send + Sync {
    /// Run one forward pass on a batch of size 1 and return the raw output
    fn score(&self, input: &Array4<f32>) -> Result<f32>;

    /// Model name, for logs and `/health`
    fn name(&self) -> &str;
}
