//! Configuration and scoring inputs for the scheduler crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the filter-then-score algorithm and its admission retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of times to re-run filter-then-score after a CAS conflict
    /// before giving up (§4.3 admission race, §9 resolved default).
    pub admission_retry_budget: u32,
    /// Base delay before each retry; actual delay is randomized in
    /// `[0, base)` to avoid synchronized retry storms.
    pub admission_retry_base_delay: Duration,
    /// Weight given to bin-packing utilisation in the composite score.
    pub bin_packing_weight: f64,
    /// Weight given to anti-affinity spread, when opted in.
    pub anti_affinity_weight: f64,
    /// Weight given to topology peer preference, when opted in.
    pub topology_weight: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            admission_retry_budget: 3,
            admission_retry_base_delay: Duration::from_millis(50),
            bin_packing_weight: 1.0,
            anti_affinity_weight: 0.5,
            topology_weight: 0.25,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from environment variables, falling back to
    /// [`SchedulerConfig::default`] for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("SCHEDULER_ADMISSION_RETRY_BUDGET") {
            if let Ok(n) = val.parse() {
                config.admission_retry_budget = n;
            }
        }
        if let Ok(val) = std::env::var("SCHEDULER_ADMISSION_RETRY_BASE_DELAY_MS") {
            if let Ok(n) = val.parse() {
                config.admission_retry_base_delay = Duration::from_millis(n);
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_budget_is_three() {
        assert_eq!(SchedulerConfig::default().admission_retry_budget, 3);
    }
}
