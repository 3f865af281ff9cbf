//! IR-MAD configuration

use madchange_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters for the IR-MAD iteration
///
/// Deserializes with missing fields taken from [`Default`], so a job
/// description only needs to name what it overrides:
///
/// ```ignore
/// let params: ImadParams = serde_json::from_str(r#"{"max_iterations": 10}"#)?;
/// assert_eq!(params.min_delta, 0.02);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImadParams {
    /// Upper bound on reweighting iterations (>= 1, default 25).
    /// This is the only bound on the cost of a call.
    pub max_iterations: usize,
    /// Stop once the summed absolute change of the canonical correlations
    /// between two iterations drops to this value (> 0, default 0.02)
    pub min_delta: f64,
}

impl Default for ImadParams {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            min_delta: 0.02,
        }
    }
}

impl ImadParams {
    /// Check the configuration before any work is done
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iterations",
                value: self.max_iterations.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        if !(self.min_delta.is_finite() && self.min_delta > 0.0) {
            return Err(Error::InvalidParameter {
                name: "min_delta",
                value: self.min_delta.to_string(),
                reason: "must be a finite positive number".into(),
            });
        }
        Ok(())
    }
}
