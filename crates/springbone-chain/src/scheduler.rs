//! Orchestration of many chains per tick.
//!
//! Ordering per tick: every refresh for every chain, then every submit,
//! then every await. A chain whose refresh failed is not submitted until a
//! later refresh succeeds. The scheduler holds no physics of its own.

use std::collections::{BTreeMap, BTreeSet};

use bevy::log::{debug, warn};
use springbone_core::error::{SetupError, SimError, SpringBoneError};
use thiserror::Error;
use springbone_core::types::ChainId;

use crate::controller::{BoneSource, ChainController, ColliderSpec};
use crate::executor::{InlineExecutor, StepExecutor, StepHandle};
use crate::pose::{PoseSink, PoseSource};

/// Scheduler behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Restore diverged chains to rest after reporting them.
    pub reset_on_divergence: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            reset_on_divergence: true,
        }
    }
}

/// Summary of one batch of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub chains_stepped: usize,
    pub bones_stepped: usize,
    /// Chains whose step produced non-finite state.
    pub diverged: Vec<ChainId>,
    /// Chains left out because their last refresh failed.
    pub skipped: Vec<ChainId>,
}

impl TickReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.chains_stepped += other.chains_stepped;
        self.bones_stepped += other.bones_stepped;
        for id in other.diverged {
            if !self.diverged.contains(&id) {
                self.diverged.push(id);
            }
        }
        for id in other.skipped {
            if !self.skipped.contains(&id) {
                self.skipped.push(id);
            }
        }
    }
}

/// A batch operation that failed part way.
///
/// `report` covers the chains that were stepped before or alongside the
/// failure, including any that diverged.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct BatchError {
    pub error: SimError,
    pub report: TickReport,
}

impl BatchError {
    fn new(error: SimError, report: TickReport) -> Self {
        Self { error, report }
    }
}

impl From<BatchError> for SimError {
    fn from(err: BatchError) -> Self {
        err.error
    }
}

impl From<BatchError> for SpringBoneError {
    fn from(err: BatchError) -> Self {
        Self::Simulation(err.error)
    }
}

// ---------------------------------------------------------------------------
// BatchScheduler
// ---------------------------------------------------------------------------

/// Owns a set of [`ChainController`]s and steps them together.
///
/// # Example
///
/// ```
/// use nalgebra::{Isometry3, Vector3};
/// use springbone_chain::prelude::*;
/// use springbone_core::types::NodeId;
/// use springbone_solver::BoneParams;
///
/// let anchor = NodeId(0);
/// let mut world = PoseMap::new().with(anchor, Isometry3::translation(0.0, 1.0, 0.0));
/// let mut scheduler = BatchScheduler::new(InlineExecutor);
/// let id = scheduler
///     .add_chain(
///         &[BoneSource::root(
///             NodeId(1),
///             anchor,
///             Isometry3::identity(),
///             Vector3::new(0.0, -0.2, 0.0),
///             BoneParams::default(),
///         )],
///         &[],
///         &world,
///     )
///     .unwrap();
///
/// let report = scheduler.tick(&world, 1.0 / 60.0).unwrap();
/// assert_eq!(report.chains_stepped, 1);
/// scheduler.writeback_all(&mut world).unwrap();
/// assert!(world.get(NodeId(1)).is_some());
/// # let _ = id;
/// ```
pub struct BatchScheduler {
    chains: BTreeMap<ChainId, ChainController>,
    /// Chains whose latest refresh failed.
    stale: BTreeSet<ChainId>,
    next_id: u32,
    executor: Box<dyn StepExecutor>,
    options: SchedulerOptions,
}

impl BatchScheduler {
    pub fn new(executor: impl StepExecutor) -> Self {
        Self::with_executor(Box::new(executor))
    }

    #[must_use]
    pub fn with_executor(executor: Box<dyn StepExecutor>) -> Self {
        Self {
            chains: BTreeMap::new(),
            stale: BTreeSet::new(),
            next_id: 0,
            executor,
            options: SchedulerOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn set_executor(&mut self, executor: Box<dyn StepExecutor>) {
        debug!("springbone: scheduler executor set to {}", executor.name());
        self.executor = executor;
    }

    #[must_use]
    pub fn executor_name(&self) -> &str {
        self.executor.name()
    }

    #[must_use]
    pub const fn options(&self) -> SchedulerOptions {
        self.options
    }

    // -- Chain registry --

    /// Set up a new chain and register it.
    pub fn add_chain(
        &mut self,
        bones: &[BoneSource],
        colliders: &[ColliderSpec],
        source: &impl PoseSource,
    ) -> Result<ChainId, SetupError> {
        let id = ChainId(self.next_id);
        let controller = ChainController::setup(id, bones, colliders, source)?;
        self.next_id += 1;
        self.chains.insert(id, controller);
        Ok(id)
    }

    /// Unregister a chain and tear it down.
    pub fn remove_chain(&mut self, id: ChainId) -> Result<(), SimError> {
        let controller = self.chains.remove(&id).ok_or(SimError::ChainNotFound(id))?;
        self.stale.remove(&id);
        controller.teardown();
        Ok(())
    }

    #[must_use]
    pub fn chain(&self, id: ChainId) -> Option<&ChainController> {
        self.chains.get(&id)
    }

    pub fn chain_mut(&mut self, id: ChainId) -> Option<&mut ChainController> {
        self.chains.get_mut(&id)
    }

    /// Registered chain ids in registration order.
    pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.chains.keys().copied()
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainController> {
        self.chains.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Chains that will be skipped until their next successful refresh.
    pub fn stale_chains(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.stale.iter().copied()
    }

    /// Total bones across all chains.
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.chains.values().map(ChainController::bone_count).sum()
    }

    // -- Tick phases --

    /// Refresh anchors and colliders of every chain.
    ///
    /// A failure on one chain does not stop the others. Failed chains are
    /// returned and stay out of every step until a later refresh succeeds.
    pub fn refresh_all(&mut self, source: &impl PoseSource) -> Vec<ChainId> {
        self.stale.clear();
        for (&id, controller) in &mut self.chains {
            let refreshed = controller
                .refresh_anchors(source)
                .and_then(|()| controller.refresh_colliders(source));
            if let Err(err) = refreshed {
                warn!("springbone: {id} refresh failed, skipping its steps: {err}");
                self.stale.insert(id);
            }
        }
        self.stale.iter().copied().collect()
    }

    /// Submit one step for every chain that is not stale.
    ///
    /// If a submission fails, the steps already submitted are awaited before
    /// the error is returned so no chain is left without its arrays. Their
    /// outcome is carried in [`BatchError::report`].
    pub fn submit_all(&mut self, dt: f32) -> Result<Vec<StepHandle>, BatchError> {
        let mut handles = Vec::with_capacity(self.chains.len());
        let mut failure = None;
        for (id, controller) in &mut self.chains {
            if self.stale.contains(id) {
                continue;
            }
            match controller.step_async(dt, self.executor.as_ref()) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        match failure {
            None => Ok(handles),
            Some(err) => {
                let report = match self.await_all(handles) {
                    Ok(report) => report,
                    Err(awaited) => awaited.report,
                };
                Err(BatchError::new(err, report))
            }
        }
    }

    /// Await every handle.
    ///
    /// Diverged chains are reported (and reset if configured) rather than
    /// treated as errors. Any other failure is returned after every handle
    /// has been awaited.
    pub fn await_all(&mut self, handles: Vec<StepHandle>) -> Result<TickReport, BatchError> {
        let mut report = TickReport::default();
        let mut failure = None;
        for handle in handles {
            let id = handle.chain();
            let Some(controller) = self.chains.get_mut(&id) else {
                failure.get_or_insert(SimError::ChainNotFound(id));
                continue;
            };
            match controller.await_step(handle) {
                Ok(()) => {}
                Err(SimError::Diverged(id)) => {
                    if self.options.reset_on_divergence {
                        warn!("springbone: {id} diverged, resetting to rest");
                        controller.reset();
                    } else {
                        warn!("springbone: {id} diverged");
                    }
                    report.diverged.push(id);
                }
                Err(err) => {
                    failure.get_or_insert(err);
                    continue;
                }
            }
            report.chains_stepped += 1;
            report.bones_stepped += controller.bone_count();
        }
        match failure {
            None => Ok(report),
            Some(err) => Err(BatchError::new(err, report)),
        }
    }

    /// Step every chain once over its current staged inputs.
    ///
    /// Stale chains are listed in [`TickReport::skipped`].
    pub fn step(&mut self, dt: f32) -> Result<TickReport, BatchError> {
        let skipped: Vec<ChainId> = self.stale.iter().copied().collect();
        match self.submit_all(dt).and_then(|handles| self.await_all(handles)) {
            Ok(mut report) => {
                report.skipped = skipped;
                Ok(report)
            }
            Err(mut err) => {
                err.report.skipped = skipped;
                Err(err)
            }
        }
    }

    /// Refresh, step and await every chain.
    ///
    /// Chains whose refresh fails are skipped for this tick; the rest are
    /// stepped on their fresh inputs.
    pub fn tick(&mut self, source: &impl PoseSource, dt: f32) -> Result<TickReport, BatchError> {
        self.refresh_all(source);
        self.step(dt)
    }

    /// Write every chain's bone poses to `sink`.
    pub fn writeback_all(&self, sink: &mut impl PoseSink) -> Result<(), SimError> {
        for controller in self.chains.values() {
            controller.writeback(sink)?;
        }
        Ok(())
    }

    /// Reset every chain to rest.
    pub fn reset_all(&mut self) {
        for controller in self.chains.values_mut() {
            controller.reset();
        }
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(InlineExecutor)
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("chains", &self.chains.len())
            .field("executor", &self.executor.name())
            .field("options", &self.options)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TaskPoolExecutor;
    use crate::pose::PoseMap;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Vector3};
    use springbone_core::types::NodeId;
    use springbone_solver::BoneParams;

    const DT: f32 = 1.0 / 60.0;

    /// Chain of `n` bones under anchor node `anchor`, bone nodes starting at
    /// `first_node`.
    fn strand(anchor: NodeId, first_node: u64, n: u64, params: BoneParams) -> Vec<BoneSource> {
        let tail = Vector3::new(0.0, -0.25, 0.0);
        (0..n)
            .map(|i| {
                let node = NodeId(first_node + i);
                if i == 0 {
                    BoneSource::root(node, anchor, Isometry3::identity(), tail, params)
                } else {
                    BoneSource::child(node, Isometry3::translation(0.0, -0.25, 0.0), tail, params)
                }
            })
            .collect()
    }

    fn world() -> PoseMap {
        PoseMap::new()
            .with(NodeId(1000), Isometry3::translation(-1.0, 2.0, 0.0))
            .with(NodeId(1001), Isometry3::translation(1.0, 2.0, 0.0))
    }

    fn two_chain_scheduler(executor: impl StepExecutor) -> BatchScheduler {
        let mut s = BatchScheduler::new(executor);
        let params = BoneParams::default();
        s.add_chain(&strand(NodeId(1000), 0, 4, params), &[], &world())
            .unwrap();
        s.add_chain(&strand(NodeId(1001), 10, 3, params), &[], &world())
            .unwrap();
        s
    }

    #[test]
    fn chain_ids_in_registration_order() {
        let s = two_chain_scheduler(InlineExecutor);
        assert_eq!(s.chain_ids().collect::<Vec<_>>(), vec![ChainId(0), ChainId(1)]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.bone_count(), 7);
        assert_eq!(s.executor_name(), "inline");
    }

    #[test]
    fn failed_setup_does_not_consume_id() {
        let mut s = BatchScheduler::default();
        assert!(s.add_chain(&[], &[], &world()).is_err());
        let id = s
            .add_chain(&strand(NodeId(1000), 0, 1, BoneParams::default()), &[], &world())
            .unwrap();
        assert_eq!(id, ChainId(0));
    }

    #[test]
    fn remove_chain() {
        let mut s = two_chain_scheduler(InlineExecutor);
        s.remove_chain(ChainId(0)).unwrap();
        assert_eq!(s.len(), 1);
        assert!(s.chain(ChainId(0)).is_none());
        assert_eq!(
            s.remove_chain(ChainId(0)),
            Err(SimError::ChainNotFound(ChainId(0)))
        );
        // Ids are not reused.
        let id = s
            .add_chain(&strand(NodeId(1000), 0, 1, BoneParams::default()), &[], &world())
            .unwrap();
        assert_eq!(id, ChainId(2));
    }

    #[test]
    fn tick_reports_every_chain() {
        let mut s = two_chain_scheduler(InlineExecutor);
        let report = s.tick(&world(), DT).unwrap();
        assert_eq!(report.chains_stepped, 2);
        assert_eq!(report.bones_stepped, 7);
        assert!(report.diverged.is_empty());
        assert!(s.chains().all(|c| c.steps() == 1));
    }

    #[test]
    fn refresh_happens_before_any_step() {
        let mut s = two_chain_scheduler(InlineExecutor);
        let moved = PoseMap::new()
            .with(NodeId(1000), Isometry3::translation(-1.0, 5.0, 0.0))
            .with(NodeId(1001), Isometry3::translation(1.0, 5.0, 0.0));
        s.tick(&moved, DT).unwrap();
        for c in s.chains() {
            assert_relative_eq!(c.bones().unwrap()[0].global_position.y, 5.0);
        }
    }

    #[test]
    fn failed_refresh_skips_only_that_chain() {
        let mut s = two_chain_scheduler(InlineExecutor);
        let partial = PoseMap::new().with(NodeId(1001), Isometry3::translation(1.0, 5.0, 0.0));

        let report = s.tick(&partial, DT).unwrap();
        assert_eq!(report.skipped, vec![ChainId(0)]);
        assert_eq!(report.chains_stepped, 1);
        assert_eq!(report.bones_stepped, 3);
        assert_eq!(s.stale_chains().collect::<Vec<_>>(), vec![ChainId(0)]);

        let first = s.chain(ChainId(0)).unwrap();
        assert_eq!(first.steps(), 0);
        assert!(!first.is_in_flight());
        // The chain after the failing one still sees its moved anchor.
        let second = s.chain(ChainId(1)).unwrap();
        assert_eq!(second.steps(), 1);
        assert_relative_eq!(second.bones().unwrap()[0].global_position.y, 5.0);

        // Further steps on the same inputs keep skipping it.
        assert_eq!(s.step(DT).unwrap().skipped, vec![ChainId(0)]);
        assert_eq!(s.chain(ChainId(0)).unwrap().steps(), 0);

        let report = s.tick(&world(), DT).unwrap();
        assert!(report.skipped.is_empty());
        assert_eq!(report.chains_stepped, 2);
        assert_eq!(s.chain(ChainId(0)).unwrap().steps(), 1);
    }

    #[test]
    fn removing_stale_chain_clears_it() {
        let mut s = two_chain_scheduler(InlineExecutor);
        assert_eq!(s.refresh_all(&PoseMap::new()), vec![ChainId(0), ChainId(1)]);
        s.remove_chain(ChainId(0)).unwrap();
        assert_eq!(s.stale_chains().collect::<Vec<_>>(), vec![ChainId(1)]);
    }

    #[test]
    fn failed_submit_awaits_earlier_chains() {
        let mut s = two_chain_scheduler(InlineExecutor);
        let err = s.submit_all(-1.0).unwrap_err();
        assert_eq!(err.error, SimError::NonPositiveDt(-1.0));
        assert_eq!(err.report, TickReport::default());
        assert!(s.chains().all(|c| !c.is_in_flight()));
    }

    #[test]
    fn failed_submit_reports_chains_already_stepped() {
        let mut s = two_chain_scheduler(InlineExecutor);
        let bad = world().with(NodeId(1000), Isometry3::translation(f32::NAN, 0.0, 0.0));
        assert!(s.refresh_all(&bad).is_empty());

        // Chain 1 is busy, so its submission fails after chain 0 went out.
        let busy = s
            .chain_mut(ChainId(1))
            .unwrap()
            .step_async(DT, &InlineExecutor)
            .unwrap();
        let err = s.step(DT).unwrap_err();
        assert_eq!(err.error, SimError::StepInFlight(ChainId(1)));
        assert_eq!(err.report.chains_stepped, 1);
        assert_eq!(err.report.bones_stepped, 4);
        assert_eq!(err.report.diverged, vec![ChainId(0)]);
        assert!(!s.chain(ChainId(0)).unwrap().is_in_flight());

        s.chain_mut(ChainId(1)).unwrap().await_step(busy).unwrap();
        let top: SpringBoneError = err.into();
        assert!(matches!(top, SpringBoneError::Simulation(SimError::StepInFlight(_))));
    }

    #[test]
    fn submit_then_await_all() {
        let mut s = two_chain_scheduler(InlineExecutor);
        let handles = s.submit_all(DT).unwrap();
        assert_eq!(handles.len(), 2);
        assert!(s.chains().all(ChainController::is_in_flight));
        let report = s.await_all(handles).unwrap();
        assert_eq!(report.chains_stepped, 2);
        assert!(s.chains().all(|c| !c.is_in_flight()));
    }

    #[test]
    fn await_for_removed_chain_is_error_but_others_complete() {
        let mut s = two_chain_scheduler(InlineExecutor);
        let handles = s.submit_all(DT).unwrap();
        s.chains.remove(&ChainId(0));
        let err = s.await_all(handles).unwrap_err();
        assert_eq!(err.error, SimError::ChainNotFound(ChainId(0)));
        assert_eq!(err.report.chains_stepped, 1);
        assert!(!s.chain(ChainId(1)).unwrap().is_in_flight());
    }

    #[test]
    fn diverged_chain_is_reset_and_reported() {
        let mut s = two_chain_scheduler(InlineExecutor);
        let rest = s.chain(ChainId(1)).unwrap().bones().unwrap().to_vec();
        let bad = world().with(NodeId(1001), Isometry3::translation(f32::NAN, 0.0, 0.0));
        let report = s.tick(&bad, DT).unwrap();
        assert_eq!(report.diverged, vec![ChainId(1)]);
        assert_eq!(report.chains_stepped, 2);
        assert_eq!(s.chain(ChainId(1)).unwrap().bones().unwrap(), rest.as_slice());
    }

    #[test]
    fn diverged_chain_kept_when_reset_disabled() {
        let mut s = two_chain_scheduler(InlineExecutor).with_options(SchedulerOptions {
            reset_on_divergence: false,
        });
        let bad = world().with(NodeId(1001), Isometry3::translation(f32::NAN, 0.0, 0.0));
        let report = s.tick(&bad, DT).unwrap();
        assert_eq!(report.diverged, vec![ChainId(1)]);
        assert!(!s.chain(ChainId(1)).unwrap().bones().unwrap()[0].is_finite());
    }

    #[test]
    fn parallel_and_inline_agree() {
        let mut inline = two_chain_scheduler(InlineExecutor);
        let mut pooled = two_chain_scheduler(TaskPoolExecutor::with_threads(4));
        let mut time = 0.0_f32;
        for _ in 0..30 {
            time += DT;
            let moving = PoseMap::new()
                .with(NodeId(1000), Isometry3::translation(time.sin(), 2.0, 0.0))
                .with(NodeId(1001), Isometry3::translation(1.0, 2.0, time.cos()));
            inline.tick(&moving, DT).unwrap();
            pooled.tick(&moving, DT).unwrap();
        }
        for id in inline.chain_ids() {
            assert_eq!(
                inline.chain(id).unwrap().bones().unwrap(),
                pooled.chain(id).unwrap().bones().unwrap()
            );
        }
    }

    #[test]
    fn writeback_all_covers_every_bone() {
        let s = two_chain_scheduler(InlineExecutor);
        let mut sink = PoseMap::new();
        s.writeback_all(&mut sink).unwrap();
        assert_eq!(sink.len(), 7);
    }

    #[test]
    fn tick_report_merge() {
        let mut a = TickReport {
            chains_stepped: 1,
            bones_stepped: 3,
            diverged: vec![ChainId(0)],
            skipped: Vec::new(),
        };
        a.merge(TickReport {
            chains_stepped: 2,
            bones_stepped: 4,
            diverged: vec![ChainId(0), ChainId(2)],
            skipped: vec![ChainId(5)],
        });
        assert_eq!(a.chains_stepped, 3);
        assert_eq!(a.bones_stepped, 7);
        assert_eq!(a.diverged, vec![ChainId(0), ChainId(2)]);
        assert_eq!(a.skipped, vec![ChainId(5)]);
    }
}
