//! Simulation statistics tracking.
//!
//! [`SpringBoneStats`] accumulates per-update step counts and divergence
//! events reported by the scheduler.

use bevy::prelude::*;
use springbone_chain::TickReport;
use springbone_core::types::ChainId;

// ---------------------------------------------------------------------------
// SpringBoneStats
// ---------------------------------------------------------------------------

/// Bevy resource with cumulative spring-bone statistics.
#[derive(Resource, Clone, Debug, PartialEq, Eq)]
pub struct SpringBoneStats {
    /// App updates in which the simulate system ran.
    pub ticks: u64,
    /// Fixed steps taken across all updates.
    pub steps: u64,
    /// Chain steps (one per chain per fixed step).
    pub chain_steps: u64,
    pub bones_stepped: u64,
    /// Divergence events, counted per chain per step.
    pub divergences: u64,
    /// Chain that most recently diverged.
    pub last_diverged: Option<ChainId>,
    /// Chain steps that did not run: skipped after a failed refresh, or
    /// lost to a scheduler error.
    pub failed_steps: u64,
}

impl Default for SpringBoneStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SpringBoneStats {
    pub const fn new() -> Self {
        Self {
            ticks: 0,
            steps: 0,
            chain_steps: 0,
            bones_stepped: 0,
            divergences: 0,
            last_diverged: None,
            failed_steps: 0,
        }
    }

    /// Fold one scheduler step into the totals.
    pub fn record(&mut self, report: &TickReport) {
        self.steps += 1;
        self.chain_steps += report.chains_stepped as u64;
        self.failed_steps += report.skipped.len() as u64;
        self.bones_stepped += report.bones_stepped as u64;
        self.divergences += report.diverged.len() as u64;
        if let Some(&last) = report.diverged.last() {
            self.last_diverged = Some(last);
        }
    }

    /// Mean bones integrated per fixed step.
    pub fn mean_bones_per_step(&self) -> Option<f64> {
        if self.steps == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.bones_stepped as f64 / self.steps as f64)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_default_empty() {
        let stats = SpringBoneStats::new();
        assert_eq!(stats.steps, 0);
        assert!(stats.last_diverged.is_none());
        assert!(stats.mean_bones_per_step().is_none());
    }

    #[test]
    fn record_accumulates() {
        let mut stats = SpringBoneStats::default();
        stats.record(&TickReport {
            chains_stepped: 2,
            bones_stepped: 6,
            ..TickReport::default()
        });
        stats.record(&TickReport {
            chains_stepped: 2,
            bones_stepped: 6,
            diverged: vec![ChainId(1)],
            skipped: vec![ChainId(0)],
        });
        assert_eq!(stats.steps, 2);
        assert_eq!(stats.chain_steps, 4);
        assert_eq!(stats.bones_stepped, 12);
        assert_eq!(stats.divergences, 1);
        assert_eq!(stats.last_diverged, Some(ChainId(1)));
        assert_eq!(stats.failed_steps, 1);
        assert_eq!(stats.mean_bones_per_step(), Some(6.0));
    }

    #[test]
    fn reset_clears() {
        let mut stats = SpringBoneStats::new();
        stats.record(&TickReport::default());
        stats.ticks = 3;
        stats.reset();
        assert_eq!(stats, SpringBoneStats::new());
    }
}
