//! Framework-agnostic spring-bone runtime.
//!
//! A [`ChainController`] owns one chain's arrays and bridges host poses in
//! and out through the [`PoseSource`] / [`PoseSink`] traits. A
//! [`BatchScheduler`] drives many controllers per tick: refresh all, submit
//! all to a [`StepExecutor`], await all.
//!
//! ```text
//! PoseSource ──► refresh ──► step_async ──► StepExecutor ──► await ──► writeback ──► PoseSink
//! ```
//!
//! Chains never share mutable state, so the executor is free to run them in
//! parallel. Bones inside a chain are always integrated sequentially.

pub mod controller;
pub mod executor;
pub mod pose;
pub mod scheduler;

pub use controller::{BoneSource, ChainController, ColliderSpec};
pub use executor::{
    ChainBuffers, ChainJob, InlineExecutor, StepExecutor, StepHandle, TaskPoolExecutor,
};
pub use pose::{PoseMap, PoseSink, PoseSource};
pub use scheduler::{BatchError, BatchScheduler, SchedulerOptions, TickReport};

pub mod prelude {
    pub use crate::{
        BatchError, BatchScheduler, BoneSource, ChainController, ColliderSpec, InlineExecutor,
        PoseMap, PoseSink, PoseSource, SchedulerOptions, StepExecutor, StepHandle,
        TaskPoolExecutor, TickReport,
    };
}
