//! Execution boundary: "run this chain step, then wait for it".
//!
//! A [`ChainJob`] owns everything one integration needs, so it can cross to
//! another thread and come back without sharing any state with the
//! controller that submitted it.

use bevy::tasks::{Task, TaskPool, TaskPoolBuilder, block_on};
use springbone_core::types::ChainId;
use springbone_solver::{BoneState, ChainIntegrator, ColliderState, ParentAnchor};

// ---------------------------------------------------------------------------
// ChainBuffers / ChainJob
// ---------------------------------------------------------------------------

/// The arrays one integration reads and writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainBuffers {
    pub bones: Vec<BoneState>,
    pub anchors: Vec<ParentAnchor>,
    pub colliders: Vec<ColliderState>,
}

impl ChainBuffers {
    /// Whether every bone is free of NaN and infinities.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.bones.iter().all(BoneState::is_finite)
    }
}

/// One submitted integration step.
#[derive(Debug)]
pub struct ChainJob {
    pub chain: ChainId,
    /// Reset generation of the submitting controller.
    pub generation: u64,
    pub dt: f32,
    pub integrator: ChainIntegrator,
    pub buffers: ChainBuffers,
}

impl ChainJob {
    /// Run the integration in place.
    pub fn run(&mut self) {
        let ChainBuffers {
            bones,
            anchors,
            colliders,
        } = &mut self.buffers;
        self.integrator.integrate(bones, anchors, colliders, self.dt);
    }
}

// ---------------------------------------------------------------------------
// StepHandle
// ---------------------------------------------------------------------------

enum Pending {
    Ready(ChainJob),
    Running(Task<ChainJob>),
}

/// Completion handle for a submitted [`ChainJob`].
///
/// Must be handed back to the owning controller; dropping it loses the
/// step's arrays until the controller is reset.
#[must_use = "a step handle must be awaited or the chain's arrays are lost"]
pub struct StepHandle {
    chain: ChainId,
    generation: u64,
    pending: Pending,
}

impl StepHandle {
    /// Handle for a job that has already run.
    pub fn ready(job: ChainJob) -> Self {
        Self {
            chain: job.chain,
            generation: job.generation,
            pending: Pending::Ready(job),
        }
    }

    /// Handle for a job running as a task.
    pub fn running(chain: ChainId, generation: u64, task: Task<ChainJob>) -> Self {
        Self {
            chain,
            generation,
            pending: Pending::Running(task),
        }
    }

    /// Chain that submitted the job.
    #[must_use]
    pub const fn chain(&self) -> ChainId {
        self.chain
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the job has finished. Never blocks.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.pending {
            Pending::Ready(_) => true,
            Pending::Running(task) => task.is_finished(),
        }
    }

    /// Block until the job completes and take it back.
    pub fn wait(self) -> ChainJob {
        match self.pending {
            Pending::Ready(job) => job,
            Pending::Running(task) => block_on(task),
        }
    }
}

impl std::fmt::Debug for StepHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepHandle")
            .field("chain", &self.chain)
            .field("generation", &self.generation)
            .field("finished", &self.is_finished())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// Runs chain jobs somewhere and hands back a completion handle.
pub trait StepExecutor: Send + Sync + 'static {
    fn submit(&self, job: ChainJob) -> StepHandle;

    /// Human-readable executor name (e.g., "inline").
    fn name(&self) -> &str;
}

/// Runs every job on the caller's thread during `submit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl StepExecutor for InlineExecutor {
    fn submit(&self, mut job: ChainJob) -> StepHandle {
        job.run();
        StepHandle::ready(job)
    }

    fn name(&self) -> &str {
        "inline"
    }
}

/// Runs jobs on a task pool owned by the executor.
///
/// The pool is private so a caller blocked in [`StepHandle::wait`] never
/// occupies a thread the job itself needs.
pub struct TaskPoolExecutor {
    pool: TaskPool,
}

impl TaskPoolExecutor {
    /// Pool sized to the machine's available parallelism.
    #[must_use]
    pub fn new() -> Self {
        Self::build(TaskPoolBuilder::new())
    }

    /// Pool with exactly `threads` workers (at least one).
    #[must_use]
    pub fn with_threads(threads: usize) -> Self {
        Self::build(TaskPoolBuilder::new().num_threads(threads.max(1)))
    }

    fn build(builder: TaskPoolBuilder) -> Self {
        Self {
            pool: builder.thread_name("springbone".to_string()).build(),
        }
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.pool.thread_num()
    }
}

impl Default for TaskPoolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepExecutor for TaskPoolExecutor {
    fn submit(&self, mut job: ChainJob) -> StepHandle {
        let (chain, generation) = (job.chain, job.generation);
        let task = self.pool.spawn(async move {
            job.run();
            job
        });
        StepHandle::running(chain, generation, task)
    }

    fn name(&self) -> &str {
        "task_pool"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, Vector3};
    use springbone_solver::{BoneParams, place_chain_at_rest};

    fn job(chain: u32) -> ChainJob {
        let params = BoneParams::inert().with_spring(Vector3::new(0.1, 0.0, 0.0));
        let mut bones = vec![
            BoneState::new(&Isometry3::identity(), &Vector3::new(0.0, -1.0, 0.0), &params, true)
                .unwrap(),
        ];
        let anchors = vec![ParentAnchor::identity()];
        place_chain_at_rest(&mut bones, &anchors);
        ChainJob {
            chain: ChainId(chain),
            generation: 0,
            dt: 1.0 / 60.0,
            integrator: ChainIntegrator::new(),
            buffers: ChainBuffers {
                bones,
                anchors,
                colliders: Vec::new(),
            },
        }
    }

    #[test]
    fn trait_is_object_safe() {
        fn _accepts_boxed(_: Box<dyn StepExecutor>) {}
    }

    #[test]
    fn trait_is_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Box<dyn StepExecutor>>();
    }

    #[test]
    fn job_is_send() {
        fn _assert_send<T: Send + 'static>() {}
        _assert_send::<ChainJob>();
    }

    #[test]
    fn inline_runs_during_submit() {
        let handle = InlineExecutor.submit(job(3));
        assert!(handle.is_finished());
        assert_eq!(handle.chain(), ChainId(3));
        let done = handle.wait();
        assert!(done.buffers.bones[0].current_endpoint.x > 0.0);
    }

    #[test]
    fn task_pool_matches_inline() {
        let executor = TaskPoolExecutor::with_threads(2);
        assert_eq!(executor.name(), "task_pool");
        assert_eq!(executor.thread_count(), 2);

        let handles: Vec<_> = (0..8).map(|i| executor.submit(job(i))).collect();
        let expected = InlineExecutor.submit(job(0)).wait().buffers;
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.chain(), ChainId(u32::try_from(i).unwrap()));
            let done = handle.wait();
            assert_eq!(done.buffers, expected);
        }
    }

    #[test]
    fn buffers_finite_check() {
        let mut buffers = job(0).buffers;
        assert!(buffers.is_finite());
        buffers.bones[0].global_position.y = f32::INFINITY;
        assert!(!buffers.is_finite());
    }
}
