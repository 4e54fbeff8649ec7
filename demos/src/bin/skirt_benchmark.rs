//! Skirt benchmark: many independent chains, inline vs task pool.
//!
//! Builds the same skirt rig twice, steps both, and checks that the
//! executors produce identical poses.
//!
//! Run: `cargo run -p springbone-demos --bin skirt_benchmark --release`

use std::time::Instant;

use springbone_core::config::SpringBoneConfig;
use springbone_demos::{chain_tip, skirt_rig};
use springbone_sim::{RigBuilder, SpawnedRig, SpringBoneStats, SpringBoneWorld};

const STRANDS: usize = 64;
const BONES_PER_STRAND: u32 = 6;
const TICKS: u32 = 600;

fn build(parallel: bool) -> SpawnedRig {
    RigBuilder::new()
        .with_config(SpringBoneConfig {
            parallel,
            ..SpringBoneConfig::default()
        })
        .with_rig(skirt_rig(STRANDS, BONES_PER_STRAND))
        .build()
        .expect("failed to build skirt rig")
}

fn run(label: &str, spawned: &mut SpawnedRig) -> f64 {
    let start = Instant::now();
    spawned.run(TICKS);
    let elapsed = start.elapsed().as_secs_f64();

    let world = spawned.app.world();
    let stats = world.resource::<SpringBoneStats>();
    let executor = world.resource::<SpringBoneWorld>().scheduler.executor_name().to_string();
    #[allow(clippy::cast_precision_loss)]
    let bones_per_sec = stats.bones_stepped as f64 / elapsed;
    println!(
        "{label:<10} executor={executor:<10} {elapsed:>7.3}s  {bones_per_sec:>12.0} bones/s  divergences={}",
        stats.divergences
    );
    elapsed
}

fn main() {
    println!("=== Skirt Benchmark ===");
    println!("{STRANDS} strands x {BONES_PER_STRAND} bones, {TICKS} ticks\n");

    let mut inline = build(false);
    let mut pooled = build(true);

    let t_inline = run("inline", &mut inline);
    let t_pooled = run("task_pool", &mut pooled);
    println!("\nspeedup: {:.2}x", t_inline / t_pooled);

    let mut mismatches = 0;
    for (name, chain) in &inline.chains {
        let a = chain_tip(inline.app.world(), chain.id);
        let b = pooled
            .chain(name)
            .and_then(|c| chain_tip(pooled.app.world(), c.id));
        if a != b {
            mismatches += 1;
        }
    }
    println!("tip mismatches between executors: {mismatches}");
}
