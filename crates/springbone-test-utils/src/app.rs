//! Bevy test app builders.

use bevy::prelude::*;
use springbone_core::config::{ClockMode, SpringBoneConfig};

/// Create a minimal test app with only the core plugin.
///
/// Provides `SpringBoneSet` ordering, the step clock and `SimTime`, but no
/// chain systems.
pub fn minimal_test_app() -> App {
    let mut app = App::new();
    app.add_plugins(springbone_core::SpringBoneCorePlugin);
    app.finish();
    app.cleanup();
    app
}

/// Create a full spring-bone app stepping once per update on the calling
/// thread.
pub fn sim_test_app() -> App {
    let mut app = App::new();
    app.insert_resource(SpringBoneConfig {
        clock: ClockMode::FixedPerUpdate,
        parallel: false,
        ..SpringBoneConfig::default()
    });
    app.add_plugins(springbone_sim::SpringBoneSimPlugin);
    app.finish();
    app.cleanup();
    app
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
