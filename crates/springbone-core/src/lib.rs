//! Shared foundations for the springbone crates: ids, errors, configuration,
//! the fixed-step clock and the system ordering used by the Bevy adapter.
//!
//! The numeric solver and the chain runtime depend on this crate only for
//! its plain types; nothing here schedules work on its own.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

use bevy::prelude::*;

use crate::config::SpringBoneConfig;
use crate::time::{SimTime, StepClock};

// ---------------------------------------------------------------------------
// SpringBoneSet
// ---------------------------------------------------------------------------

/// Per-update phases of the spring-bone pipeline, chained in `Update`.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpringBoneSet {
    /// Move anchors and read their poses into the chains.
    Refresh,
    /// Run the fixed steps for this update.
    Simulate,
    /// Copy bone poses back onto the host transforms.
    Writeback,
}

// ---------------------------------------------------------------------------
// SpringBoneCorePlugin
// ---------------------------------------------------------------------------

/// Registers configuration, the step clock and [`SpringBoneSet`] ordering.
///
/// Insert a custom [`SpringBoneConfig`] before adding the plugin to override
/// the defaults.
pub struct SpringBoneCorePlugin;

impl Plugin for SpringBoneCorePlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<SpringBoneConfig>()
            .cloned()
            .unwrap_or_default();
        if let Err(err) = config.validate() {
            warn!("invalid springbone config ({err}), falling back to defaults");
            app.insert_resource(SpringBoneConfig::default());
            app.insert_resource(StepClock::default());
        } else {
            app.insert_resource(StepClock::from_config(&config));
            app.insert_resource(config);
        }
        app.init_resource::<SimTime>();

        app.configure_sets(
            Update,
            (
                SpringBoneSet::Refresh,
                SpringBoneSet::Simulate,
                SpringBoneSet::Writeback,
            )
                .chain(),
        );
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        SpringBoneCorePlugin, SpringBoneSet,
        config::{ChainConfig, ClockMode, ColliderConfig, MotionConfig, RigConfig, SpringBoneConfig},
        error::{ConfigError, SetupError, SimError, SpringBoneError},
        time::{SimTime, StepClock},
        types::{ChainId, NodeId},
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClockMode;

    #[test]
    fn plugin_inserts_defaults() {
        let mut app = App::new();
        app.add_plugins(SpringBoneCorePlugin);
        app.finish();
        app.cleanup();

        let config = app.world().resource::<SpringBoneConfig>();
        assert_eq!(*config, SpringBoneConfig::default());
        assert!(app.world().get_resource::<StepClock>().is_some());
        assert!(app.world().get_resource::<SimTime>().is_some());
    }

    #[test]
    fn plugin_respects_preinserted_config() {
        let mut app = App::new();
        app.insert_resource(SpringBoneConfig {
            fixed_dt: 0.005,
            clock: ClockMode::Accumulated,
            ..SpringBoneConfig::default()
        });
        app.add_plugins(SpringBoneCorePlugin);

        let clock = app.world().resource::<StepClock>();
        assert_eq!(clock.mode(), ClockMode::Accumulated);
        assert!((clock.timestep() - 0.005).abs() < f64::EPSILON);
    }

    #[test]
    fn plugin_replaces_invalid_config() {
        let mut app = App::new();
        app.insert_resource(SpringBoneConfig {
            max_substeps: 0,
            ..SpringBoneConfig::default()
        });
        app.add_plugins(SpringBoneCorePlugin);

        assert_eq!(app.world().resource::<SpringBoneConfig>().max_substeps, 4);
    }

    #[test]
    fn sets_are_chained_and_app_updates() {
        let mut app = App::new();
        app.add_plugins(SpringBoneCorePlugin);

        #[derive(Resource, Default)]
        struct Order(Vec<&'static str>);

        app.init_resource::<Order>();
        app.add_systems(
            Update,
            (
                (|mut o: ResMut<Order>| o.0.push("writeback")).in_set(SpringBoneSet::Writeback),
                (|mut o: ResMut<Order>| o.0.push("simulate")).in_set(SpringBoneSet::Simulate),
                (|mut o: ResMut<Order>| o.0.push("refresh")).in_set(SpringBoneSet::Refresh),
            ),
        );
        app.finish();
        app.cleanup();
        app.update();

        assert_eq!(
            app.world().resource::<Order>().0,
            vec!["refresh", "simulate", "writeback"]
        );
    }
}
