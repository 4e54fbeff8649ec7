use std::fmt;
use std::time::Duration;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::config::{ClockMode, SpringBoneConfig};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn secs_to_nanos(secs: f64) -> u64 {
    (secs * NANOS_PER_SEC) as u64
}

// ---------------------------------------------------------------------------
// SimTime
// ---------------------------------------------------------------------------

/// Integer-nanosecond simulation time.
///
/// Advances only by whole fixed steps, so two runs with the same step count
/// report exactly the same time.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Resource,
)]
pub struct SimTime {
    nanos: u64,
}

impl SimTime {
    #[must_use]
    pub const fn new() -> Self {
        Self { nanos: 0 }
    }

    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    #[must_use]
    pub fn from_secs(secs: f64) -> Self {
        Self {
            nanos: secs_to_nanos(secs),
        }
    }

    #[must_use]
    pub const fn nanos(&self) -> u64 {
        self.nanos
    }

    /// Elapsed seconds as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC
    }

    /// Elapsed seconds as `f32`, for driving anchor motion.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn secs_f32(&self) -> f32 {
        self.secs_f64() as f32
    }

    pub const fn advance(&mut self, delta_nanos: u64) {
        self.nanos = self.nanos.saturating_add(delta_nanos);
    }

    pub const fn reset(&mut self) {
        self.nanos = 0;
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.nanos / 1_000_000_000;
        let millis = (self.nanos % 1_000_000_000) / 1_000_000;
        write!(f, "{total_secs}.{millis:03}s")
    }
}

// ---------------------------------------------------------------------------
// StepClock
// ---------------------------------------------------------------------------

/// Turns host frame deltas into a number of fixed simulation steps.
///
/// In [`ClockMode::Accumulated`] mode this is the usual fixed-timestep
/// accumulator. Each tick runs at most `max_substeps` steps; whole steps
/// beyond the cap are dropped so a long stall cannot snowball into ever
/// longer frames. In [`ClockMode::FixedPerUpdate`] mode every tick yields
/// exactly one step.
#[derive(Debug, Clone, Resource)]
pub struct StepClock {
    mode: ClockMode,
    timestep_nanos: u64,
    timestep_secs: f64,
    max_substeps: u32,
    accumulated: u64,
    time: SimTime,
    total_steps: u64,
    dropped_steps: u64,
}

impl StepClock {
    /// Create a clock with the given fixed timestep in seconds.
    pub fn new(timestep_secs: f64, mode: ClockMode) -> Self {
        Self {
            mode,
            timestep_nanos: secs_to_nanos(timestep_secs),
            timestep_secs,
            max_substeps: 4,
            accumulated: 0,
            time: SimTime::new(),
            total_steps: 0,
            dropped_steps: 0,
        }
    }

    #[must_use]
    pub const fn with_max_substeps(mut self, max_substeps: u32) -> Self {
        self.max_substeps = max_substeps;
        self
    }

    pub fn from_config(config: &SpringBoneConfig) -> Self {
        Self::new(config.fixed_dt, config.clock).with_max_substeps(config.max_substeps)
    }

    /// Feed one host frame and return how many fixed steps to run for it.
    ///
    /// Simulation time advances by the returned number of steps.
    pub fn tick(&mut self, delta: Duration) -> u32 {
        let steps = match self.mode {
            ClockMode::FixedPerUpdate => 1,
            ClockMode::Accumulated => self.drain(delta),
        };
        self.time
            .advance(self.timestep_nanos.saturating_mul(u64::from(steps)));
        self.total_steps += u64::from(steps);
        steps
    }

    #[allow(clippy::cast_possible_truncation)]
    fn drain(&mut self, delta: Duration) -> u32 {
        if self.timestep_nanos == 0 {
            return 0;
        }
        self.accumulated = self
            .accumulated
            .saturating_add(u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX));
        let available = self.accumulated / self.timestep_nanos;
        let steps = available.min(u64::from(self.max_substeps));
        self.dropped_steps += available - steps;
        self.accumulated %= self.timestep_nanos;
        steps as u32
    }

    #[must_use]
    pub const fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Current simulation time.
    #[must_use]
    pub const fn time(&self) -> SimTime {
        self.time
    }

    /// The fixed timestep in seconds.
    #[must_use]
    pub const fn timestep(&self) -> f64 {
        self.timestep_secs
    }

    #[must_use]
    pub const fn max_substeps(&self) -> u32 {
        self.max_substeps
    }

    /// Steps run since creation or the last reset.
    #[must_use]
    pub const fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Whole steps discarded because a tick hit the substep cap.
    #[must_use]
    pub const fn dropped_steps(&self) -> u64 {
        self.dropped_steps
    }

    /// How far into the next step the accumulator has progressed, in `[0, 1)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn alpha(&self) -> f32 {
        if self.timestep_nanos == 0 {
            return 0.0;
        }
        self.accumulated as f32 / self.timestep_nanos as f32
    }

    pub const fn reset(&mut self) {
        self.accumulated = 0;
        self.time.reset();
        self.total_steps = 0;
        self.dropped_steps = 0;
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::from_config(&SpringBoneConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- SimTime ----

    #[test]
    fn simtime_from_secs() {
        let t = SimTime::from_secs(2.5);
        assert_eq!(t.nanos(), 2_500_000_000);
        assert!((t.secs_f64() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn simtime_advance_saturates() {
        let mut t = SimTime::from_nanos(u64::MAX - 1);
        t.advance(10);
        assert_eq!(t.nanos(), u64::MAX);
    }

    #[test]
    fn simtime_display() {
        assert_eq!(SimTime::from_nanos(1_250_000_000).to_string(), "1.250s");
        assert_eq!(SimTime::new().to_string(), "0.000s");
    }

    // ---- StepClock: fixed per update ----

    #[test]
    fn fixed_per_update_always_one_step() {
        let mut clock = StepClock::new(0.01, ClockMode::FixedPerUpdate);
        assert_eq!(clock.tick(Duration::ZERO), 1);
        assert_eq!(clock.tick(Duration::from_secs(5)), 1);
        assert_eq!(clock.total_steps(), 2);
        assert_eq!(clock.time().nanos(), 20_000_000);
    }

    // ---- StepClock: accumulated ----

    #[test]
    fn accumulated_counts_whole_steps() {
        let mut clock = StepClock::new(0.01, ClockMode::Accumulated).with_max_substeps(10);
        assert_eq!(clock.tick(Duration::from_millis(25)), 2);
        assert!((clock.alpha() - 0.5).abs() < 1e-4);
        assert_eq!(clock.tick(Duration::from_millis(5)), 1);
        assert!(clock.alpha().abs() < 1e-4);
        assert_eq!(clock.time().nanos(), 30_000_000);
    }

    #[test]
    fn accumulated_small_delta_yields_zero_steps() {
        let mut clock = StepClock::new(0.01, ClockMode::Accumulated);
        assert_eq!(clock.tick(Duration::from_millis(3)), 0);
        assert_eq!(clock.tick(Duration::from_millis(3)), 0);
        assert_eq!(clock.tick(Duration::from_millis(4)), 1);
    }

    #[test]
    fn accumulated_caps_and_drops_excess() {
        let mut clock = StepClock::new(0.01, ClockMode::Accumulated).with_max_substeps(3);
        assert_eq!(clock.tick(Duration::from_millis(105)), 3);
        assert_eq!(clock.dropped_steps(), 7);
        // The remainder below one step is kept, the dropped steps are not.
        assert_eq!(clock.tick(Duration::from_millis(5)), 1);
    }

    #[test]
    fn from_config_uses_config_values() {
        let cfg = SpringBoneConfig {
            fixed_dt: 0.02,
            max_substeps: 6,
            clock: ClockMode::Accumulated,
            ..SpringBoneConfig::default()
        };
        let clock = StepClock::from_config(&cfg);
        assert_eq!(clock.mode(), ClockMode::Accumulated);
        assert_eq!(clock.max_substeps(), 6);
        assert!((clock.timestep() - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_clears_everything() {
        let mut clock = StepClock::new(0.01, ClockMode::Accumulated);
        clock.tick(Duration::from_millis(15));
        clock.reset();
        assert_eq!(clock.time(), SimTime::new());
        assert_eq!(clock.total_steps(), 0);
        assert!(clock.alpha().abs() < f32::EPSILON);
    }
}
