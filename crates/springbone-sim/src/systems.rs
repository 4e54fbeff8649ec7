//! Spring-bone systems, one group per [`SpringBoneSet`](springbone_core::SpringBoneSet).
//!
//! ```text
//! Refresh:   advance_clock → drive_anchor_motion → refresh_chains
//! Simulate:  simulate_chains (PendingSteps × scheduler.step)
//! Writeback: write_back_chains
//! ```

use std::collections::HashMap;
use std::time::Duration;

use bevy::prelude::*;
use bevy::transform::helper::TransformHelper;
use nalgebra::Isometry3;
use springbone_core::time::{SimTime, StepClock};

use crate::bridge::{EcsPoseSource, PoseLog, apply_isometry, global_to_isometry};
use crate::components::{AnchorMotion, SpringBone};
use crate::stats::SpringBoneStats;
use crate::world::SpringBoneWorld;

// ---------------------------------------------------------------------------
// PendingSteps
// ---------------------------------------------------------------------------

/// Fixed steps the current update owes the simulation.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSteps(pub u32);

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

/// Feed the frame delta into the [`StepClock`].
///
/// Without a `Time` resource every update counts as one fixed timestep.
#[allow(clippy::needless_pass_by_value)]
pub fn advance_clock(
    time: Option<Res<Time>>,
    mut clock: ResMut<StepClock>,
    mut sim_time: ResMut<SimTime>,
    mut pending: ResMut<PendingSteps>,
) {
    let delta = time.map_or_else(|| Duration::from_secs_f64(clock.timestep()), |t| t.delta());
    pending.0 = clock.tick(delta);
    *sim_time = clock.time();
}

/// Move anchors that carry an [`AnchorMotion`].
#[allow(clippy::needless_pass_by_value)]
pub fn drive_anchor_motion(
    sim_time: Res<SimTime>,
    mut anchors: Query<(&AnchorMotion, &mut Transform)>,
) {
    let t = sim_time.secs_f32();
    for (motion, mut transform) in &mut anchors {
        transform.translation = motion.translation_at(t);
    }
}

/// Stage anchor and collider world poses for every chain.
///
/// Chains that cannot be refreshed sit out this update's steps.
#[allow(clippy::needless_pass_by_value)]
pub fn refresh_chains(mut sb: ResMut<SpringBoneWorld>, helper: TransformHelper) {
    let SpringBoneWorld {
        scheduler,
        entities,
        ..
    } = &mut *sb;
    let source = EcsPoseSource::new(&helper, entities);
    let stale = scheduler.refresh_all(&source);
    if !stale.is_empty() {
        debug!("springbone: {} chains skipped this update", stale.len());
    }
}

// ---------------------------------------------------------------------------
// Simulate
// ---------------------------------------------------------------------------

/// Run the steps owed for this update.
#[allow(clippy::needless_pass_by_value)]
pub fn simulate_chains(
    mut sb: ResMut<SpringBoneWorld>,
    clock: Res<StepClock>,
    pending: Res<PendingSteps>,
    mut stats: ResMut<SpringBoneStats>,
) {
    stats.ticks += 1;
    #[allow(clippy::cast_possible_truncation)]
    let dt = clock.timestep() as f32;
    for _ in 0..pending.0 {
        match sb.scheduler.step(dt) {
            Ok(report) => stats.record(&report),
            Err(err) => {
                error!("springbone step failed: {err}");
                stats.record(&err.report);
                stats.failed_steps += 1;
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Writeback
// ---------------------------------------------------------------------------

/// Convert simulated world poses into local `Transform`s.
///
/// A bone's parent pose is taken from the same pass when the parent was
/// written earlier, otherwise from the current transform hierarchy.
#[allow(clippy::needless_pass_by_value)]
pub fn write_back_chains(
    sb: Res<SpringBoneWorld>,
    parents: Query<&ChildOf>,
    mut params: ParamSet<(TransformHelper, Query<&mut Transform, With<SpringBone>>)>,
    mut log: Local<PoseLog>,
) {
    log.clear();
    if let Err(err) = sb.scheduler.writeback_all(&mut *log) {
        warn!("springbone writeback skipped: {err}");
        return;
    }

    let mut written: HashMap<Entity, Isometry3<f32>> = HashMap::with_capacity(log.entries.len());
    let mut locals = Vec::with_capacity(log.entries.len());
    {
        let helper = params.p0();
        for (node, pose) in &log.entries {
            let Some(entity) = sb.entity(*node) else {
                continue;
            };
            let parent_pose = match parents.get(entity) {
                Ok(child_of) => {
                    let parent = child_of.parent();
                    if let Some(pose) = written.get(&parent) {
                        *pose
                    } else if let Ok(global) = helper.compute_global_transform(parent) {
                        global_to_isometry(&global)
                    } else {
                        continue;
                    }
                }
                Err(_) => Isometry3::identity(),
            };
            locals.push((entity, parent_pose.inverse() * pose));
            written.insert(entity, *pose);
        }
    }

    let mut transforms = params.p1();
    for (entity, local) in &locals {
        if let Ok(mut transform) = transforms.get_mut(*entity) {
            apply_isometry(&mut transform, local);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpringBoneSimPlugin;
    use crate::bridge::{ChainDescriptor, register_chain};
    use crate::components::SpringBoneCollider;
    use approx::assert_relative_eq;
    use bevy::ecs::system::SystemState;
    use nalgebra::Vector3;
    use springbone_core::config::{ClockMode, SpringBoneConfig};
    use springbone_solver::BoneParams;

    fn test_app(clock: ClockMode) -> App {
        let mut app = App::new();
        app.insert_resource(SpringBoneConfig {
            clock,
            parallel: false,
            ..SpringBoneConfig::default()
        });
        app.add_plugins(SpringBoneSimPlugin);
        app.finish();
        app.cleanup();
        app
    }

    fn spawn_strand(app: &mut App, origin: Vec3, n: usize, params: BoneParams) -> (Entity, Vec<Entity>) {
        let world = app.world_mut();
        let anchor = world.spawn(Transform::from_translation(origin)).id();
        let mut parent = anchor;
        let mut bones = Vec::new();
        for i in 0..n {
            let offset = if i == 0 { Vec3::ZERO } else { Vec3::new(0.0, -0.25, 0.0) };
            let bone = world
                .spawn((Transform::from_translation(offset), ChildOf(parent)))
                .id();
            bones.push(bone);
            parent = bone;
        }
        let d = ChainDescriptor::strand(anchor, bones.clone(), Vec3::new(0.0, -0.25, 0.0), params);
        register_chain(world, &d).unwrap();
        (anchor, bones)
    }

    fn world_position(app: &mut App, entity: Entity) -> Vec3 {
        let world = app.world_mut();
        let mut state = SystemState::<TransformHelper>::new(world);
        let helper = state.get(world);
        helper.compute_global_transform(entity).unwrap().translation()
    }

    fn sideways() -> BoneParams {
        BoneParams::inert().with_spring(Vector3::new(0.002, 0.0, 0.0))
    }

    #[test]
    fn fixed_clock_runs_one_step_per_update() {
        let mut app = test_app(ClockMode::FixedPerUpdate);
        spawn_strand(&mut app, Vec3::ZERO, 3, sideways());
        for _ in 0..5 {
            app.update();
        }
        let stats = app.world().resource::<SpringBoneStats>();
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.steps, 5);
        assert_eq!(stats.bones_stepped, 15);
        let expected = app.world().resource::<StepClock>().timestep() * 5.0;
        assert_relative_eq!(app.world().resource::<SimTime>().secs_f64(), expected, epsilon = 1e-6);
    }

    #[test]
    fn accumulated_clock_uses_time_delta() {
        let mut app = test_app(ClockMode::Accumulated);
        app.init_resource::<Time>();
        spawn_strand(&mut app, Vec3::ZERO, 2, sideways());

        let dt = app.world().resource::<StepClock>().timestep();
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_secs_f64(dt * 2.5));
        app.update();
        assert_eq!(app.world().resource::<PendingSteps>().0, 2);
        assert_eq!(app.world().resource::<SpringBoneStats>().steps, 2);

        app.world_mut().resource_mut::<Time>().advance_by(Duration::ZERO);
        app.update();
        assert_eq!(app.world().resource::<PendingSteps>().0, 0);
        assert_eq!(app.world().resource::<SpringBoneStats>().steps, 2);
    }

    #[test]
    fn writeback_matches_simulated_poses() {
        let mut app = test_app(ClockMode::FixedPerUpdate);
        let (_, bones) = spawn_strand(&mut app, Vec3::new(0.0, 1.0, 0.0), 3, sideways());
        for _ in 0..20 {
            app.update();
        }

        let first = app.world().get::<Transform>(bones[0]).unwrap();
        assert!(first.rotation.angle_between(Quat::IDENTITY) > 1e-3);

        let id = app.world().get::<SpringBone>(bones[2]).unwrap().chain;
        let simulated: Vec<Vector3<f32>> = app
            .world()
            .resource::<SpringBoneWorld>()
            .scheduler
            .chain(id)
            .unwrap()
            .bones()
            .unwrap()
            .iter()
            .map(|b| b.global_position)
            .collect();
        for (bone, expected) in bones.iter().zip(&simulated) {
            let actual = world_position(&mut app, *bone);
            assert_relative_eq!(actual.x, expected.x, epsilon = 1e-4);
            assert_relative_eq!(actual.y, expected.y, epsilon = 1e-4);
            assert_relative_eq!(actual.z, expected.z, epsilon = 1e-4);
        }
        // Swung toward +X.
        assert!(simulated[2].x > 0.0);
    }

    #[test]
    fn anchor_motion_drags_chain() {
        let mut app = test_app(ClockMode::FixedPerUpdate);
        let (anchor, bones) = spawn_strand(&mut app, Vec3::ZERO, 2, BoneParams::default());
        app.world_mut()
            .entity_mut(anchor)
            .insert(AnchorMotion::new(Vec3::ZERO, Vec3::new(0.3, 0.0, 0.0), 1.0));

        for _ in 0..10 {
            app.update();
        }
        let anchor_pos = app.world().get::<Transform>(anchor).unwrap().translation;
        assert!(anchor_pos.x > 0.1);
        let root = world_position(&mut app, bones[0]);
        assert_relative_eq!(root.x, anchor_pos.x, epsilon = 1e-4);
    }

    #[test]
    fn non_finite_anchor_is_reported_as_divergence() {
        let mut app = test_app(ClockMode::FixedPerUpdate);
        let (anchor, bones) = spawn_strand(&mut app, Vec3::ZERO, 2, BoneParams::default());
        let id = app.world().get::<SpringBone>(bones[0]).unwrap().chain;

        app.world_mut().get_mut::<Transform>(anchor).unwrap().translation = Vec3::NAN;
        app.update();

        let stats = app.world().resource::<SpringBoneStats>();
        assert_eq!(stats.divergences, 1);
        assert_eq!(stats.last_diverged, Some(id));
        assert_eq!(stats.failed_steps, 0);
    }

    #[test]
    fn despawned_collider_only_stalls_its_own_chain() {
        let mut app = test_app(ClockMode::FixedPerUpdate);
        let world = app.world_mut();
        let collider = world
            .spawn((Transform::from_xyz(5.0, 0.0, 0.0), SpringBoneCollider::new(0.1)))
            .id();
        let tip = Vec3::new(0.0, -0.25, 0.0);

        let first_anchor = world.spawn(Transform::default()).id();
        let first_bone = world.spawn((Transform::default(), ChildOf(first_anchor))).id();
        let first = register_chain(
            world,
            &ChainDescriptor::strand(first_anchor, [first_bone], tip, BoneParams::default())
                .with_colliders(vec![collider]),
        )
        .unwrap();

        let second_anchor = world.spawn(Transform::from_xyz(2.0, 0.0, 0.0)).id();
        let second_bone = world.spawn((Transform::default(), ChildOf(second_anchor))).id();
        let second = register_chain(
            world,
            &ChainDescriptor::strand(second_anchor, [second_bone], tip, BoneParams::default())
                .with_colliders(Vec::new()),
        )
        .unwrap();

        app.update();
        assert_eq!(app.world().resource::<SpringBoneStats>().failed_steps, 0);

        assert!(app.world_mut().despawn(collider));
        app.world_mut()
            .get_mut::<Transform>(second_anchor)
            .unwrap()
            .translation = Vec3::new(2.0, 3.0, 0.0);
        app.update();

        let sb = app.world().resource::<SpringBoneWorld>();
        assert_eq!(sb.scheduler.stale_chains().collect::<Vec<_>>(), vec![first]);
        assert_eq!(sb.scheduler.chain(first).unwrap().steps(), 1);
        let root = sb.scheduler.chain(second).unwrap().bones().unwrap()[0].global_position;
        assert_relative_eq!(root.y, 3.0, epsilon = 1e-6);
        assert_relative_eq!(root.x, 2.0, epsilon = 1e-6);

        let stats = app.world().resource::<SpringBoneStats>();
        assert_eq!(stats.steps, 2);
        assert_eq!(stats.chain_steps, 3);
        assert_eq!(stats.failed_steps, 1);
    }

    #[test]
    fn idle_world_steps_nothing() {
        let mut app = test_app(ClockMode::FixedPerUpdate);
        app.update();
        let stats = app.world().resource::<SpringBoneStats>();
        assert_eq!(stats.steps, 1);
        assert_eq!(stats.bones_stepped, 0);
    }
}
