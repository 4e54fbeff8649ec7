//! Headless ponytail simulation.
//!
//! Tests the full pipeline: rig TOML -> RigBuilder -> anchor motion ->
//! refresh/simulate/writeback -> stats.
//!
//! Run: `cargo run -p springbone-demos --bin ponytail_headless`

use bevy::prelude::*;
use springbone_core::config::{RigConfig, SpringBoneConfig};
use springbone_demos::{PONYTAIL_RIG, chain_tip, max_length_error};
use springbone_sim::{RigBuilder, SpringBoneStats};

fn main() {
    println!("=== Ponytail Headless Example ===\n");

    // ---------------------------------------------------------------
    // 1. Parse rig and build the app
    // ---------------------------------------------------------------
    let rig = RigConfig::from_toml_str(PONYTAIL_RIG).expect("failed to parse ponytail rig");
    let config = SpringBoneConfig {
        parallel: false,
        ..SpringBoneConfig::default()
    };
    let mut spawned = RigBuilder::new()
        .with_config(config)
        .with_rig(rig)
        .build()
        .expect("failed to build rig");

    let ponytail = spawned.chain("ponytail").expect("missing ponytail chain").clone();
    println!(
        "Chain {} loaded: {} bones, {} colliders",
        ponytail.id,
        ponytail.bones.len(),
        spawned.colliders.len()
    );

    // ---------------------------------------------------------------
    // 2. Step and trace the tip
    // ---------------------------------------------------------------
    for tick in 0..180 {
        spawned.app.update();

        if tick % 20 == 0 {
            let tip = chain_tip(spawned.app.world(), ponytail.id).expect("chain has no bones");
            let anchor = spawned
                .app
                .world()
                .get::<Transform>(ponytail.anchor)
                .expect("anchor has no transform")
                .translation;
            println!(
                "  tick {tick:>3}: anchor.x={:+.4}  tip=({:+.4}, {:+.4}, {:+.4})",
                anchor.x, tip.x, tip.y, tip.z
            );
        }
    }

    // ---------------------------------------------------------------
    // 3. Summary
    // ---------------------------------------------------------------
    let world = spawned.app.world();
    let stats = world.resource::<SpringBoneStats>();
    println!(
        "\nticks={}, steps={}, bones_stepped={}, divergences={}",
        stats.ticks, stats.steps, stats.bones_stepped, stats.divergences
    );
    println!("max bone length error: {:.2e}", max_length_error(world));
}
