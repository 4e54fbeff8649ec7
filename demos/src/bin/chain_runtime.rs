//! Framework-agnostic runtime, no ECS.
//!
//! Drives a `BatchScheduler` directly through the `PoseSource`/`PoseSink`
//! seams using an in-memory `PoseMap` as the host scene.
//!
//! Run: `cargo run -p springbone-demos --bin chain_runtime`

use nalgebra::{Isometry3, Vector3};
use springbone_chain::prelude::*;
use springbone_core::types::NodeId;
use springbone_solver::{BoneParams, ParamPreset};

const ANCHOR: NodeId = NodeId(100);
const COLLIDER: NodeId = NodeId(200);
const DT: f32 = 1.0 / 60.0;

fn strand(first_node: u64, count: u64, params: BoneParams) -> Vec<BoneSource> {
    let tail = Vector3::new(0.0, -0.1, 0.0);
    (0..count)
        .map(|i| {
            let node = NodeId(first_node + i);
            if i == 0 {
                BoneSource::root(node, ANCHOR, Isometry3::identity(), tail, params)
            } else {
                BoneSource::child(node, Isometry3::translation(0.0, -0.1, 0.0), tail, params)
            }
        })
        .collect()
}

fn main() {
    println!("=== Chain Runtime Example ===\n");

    // ---------------------------------------------------------------
    // 1. Host scene and chains
    // ---------------------------------------------------------------
    let mut scene = PoseMap::new()
        .with(ANCHOR, Isometry3::translation(0.0, 1.0, 0.0))
        .with(COLLIDER, Isometry3::translation(0.06, 0.75, 0.0));
    let colliders = [ColliderSpec::new(COLLIDER, Vector3::zeros(), 0.08)];

    let mut scheduler = BatchScheduler::new(TaskPoolExecutor::with_threads(2));
    let hair = scheduler
        .add_chain(&strand(0, 5, ParamPreset::Hair.params()), &colliders, &scene)
        .expect("hair setup failed");
    let tail = scheduler
        .add_chain(&strand(10, 5, ParamPreset::Tail.params()), &colliders, &scene)
        .expect("tail setup failed");
    println!(
        "{} chains, {} bones on the '{}' executor",
        scheduler.len(),
        scheduler.bone_count(),
        scheduler.executor_name()
    );

    // ---------------------------------------------------------------
    // 2. Tick: move the anchor, refresh, step, write back
    // ---------------------------------------------------------------
    let mut out = PoseMap::new();
    for tick in 0..120_u16 {
        let t = f32::from(tick) * DT;
        scene.insert(
            ANCHOR,
            Isometry3::translation(0.1 * (t * 6.0).sin(), 1.0, 0.0),
        );

        let report = scheduler.tick(&scene, DT).expect("tick failed");
        scheduler.writeback_all(&mut out).expect("writeback failed");

        if tick % 30 == 0 {
            let hair_tip = out.get(NodeId(4)).map(|p| p.translation.vector);
            let tail_tip = out.get(NodeId(14)).map(|p| p.translation.vector);
            println!(
                "  tick {tick:>3}: stepped {} chains, hair bone 4 at {:?}, tail bone 4 at {:?}",
                report.chains_stepped,
                hair_tip.map(|v| (v.x, v.y)),
                tail_tip.map(|v| (v.x, v.y)),
            );
        }
    }

    // ---------------------------------------------------------------
    // 3. Teardown
    // ---------------------------------------------------------------
    for id in [hair, tail] {
        let steps = scheduler.chain(id).map_or(0, ChainController::steps);
        println!("{id}: {steps} steps");
        scheduler.remove_chain(id).expect("remove failed");
    }
    println!("chains left: {}", scheduler.len());
}
