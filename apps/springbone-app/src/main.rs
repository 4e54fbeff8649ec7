//! Springbone rig runner CLI.
//!
//! Provides three modes of operation:
//! - `run`: Build a headless app from a rig file, step it and print tip positions
//! - `validate`: Parse and validate rig/config files and print a summary
//! - `info`: Print workspace crate versions

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use springbone_core::prelude::*;
use springbone_sim::{RigBuilder, SpawnedRig, SpringBoneStats, SpringBoneWorld};
use springbone_solver::BoneParams;

/// Rig used when no subcommand is given.
const DEFAULT_RIG: &str = r#"
[[chains]]
name = "ponytail"
anchor = [0.0, 1.6, -0.1]
direction = [0.0, -1.0, -0.2]
bone_count = 5
bone_length = 0.08
preset = "hair"
motion = { amplitude = [0.05, 0.0, 0.0], frequency_hz = 1.5 }

[[colliders]]
position = [0.0, 1.45, 0.0]
radius = 0.12
"#;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Spring-bone secondary motion runner.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Step a rig headlessly and print per-chain tip positions.
    Run {
        /// Rig description (TOML).
        #[arg(short, long)]
        rig: PathBuf,

        /// Simulation settings (TOML). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of app updates to run.
        #[arg(short, long, default_value_t = 120)]
        ticks: u32,

        /// Step chains on a worker pool.
        #[arg(long, conflicts_with = "inline")]
        parallel: bool,

        /// Step chains on the main thread.
        #[arg(long)]
        inline: bool,
    },

    /// Parse and validate a rig without running it.
    Validate {
        /// Rig description (TOML).
        #[arg(short, long)]
        rig: PathBuf,

        /// Simulation settings (TOML).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print crate information.
    Info,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<SpringBoneConfig, ConfigError> {
    path.map_or_else(|| Ok(SpringBoneConfig::default()), SpringBoneConfig::from_file)
}

fn print_summary(spawned: &SpawnedRig, rig: &RigConfig) {
    let world = spawned.app.world();
    let sb = world.resource::<SpringBoneWorld>();

    println!("chains:");
    for chain in &rig.chains {
        let Some(handle) = spawned.chain(&chain.name) else {
            continue;
        };
        let tip = sb
            .scheduler
            .chain(handle.id)
            .and_then(|c| c.bones().ok())
            .and_then(|bones| bones.last())
            .map(|bone| bone.current_endpoint);
        match tip {
            Some(tip) => println!(
                "  {:<16} {}  tip=({:.4}, {:.4}, {:.4})",
                chain.name, handle.id, tip.x, tip.y, tip.z
            ),
            None => println!("  {:<16} {}  tip=<unavailable>", chain.name, handle.id),
        }
    }

    let stats = world.resource::<SpringBoneStats>();
    let time = world.resource::<SimTime>();
    println!(
        "\ntotal: ticks={}, steps={}, bones_stepped={}, divergences={}, sim_time={time}",
        stats.ticks, stats.steps, stats.bones_stepped, stats.divergences
    );
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn run_rig(
    rig: &RigConfig,
    mut config: SpringBoneConfig,
    ticks: u32,
    parallel: Option<bool>,
) -> Result<(), SpringBoneError> {
    if let Some(parallel) = parallel {
        config.parallel = parallel;
    }
    println!(
        "running {} chains ({} bones) for {ticks} ticks at {:.1} Hz, {}",
        rig.chains.len(),
        rig.bone_count(),
        config.step_hz(),
        if config.parallel { "parallel" } else { "inline" }
    );

    let mut spawned = RigBuilder::new()
        .with_config(config)
        .with_rig(rig.clone())
        .build()?;
    spawned.run(ticks);
    print_summary(&spawned, rig);
    Ok(())
}

fn run_validate(rig_path: &Path, config_path: Option<&Path>) -> Result<(), SpringBoneError> {
    let config = load_config(config_path)?;
    let rig = RigConfig::from_file(rig_path)?;

    println!(
        "config: dt={:.5}s ({:.1} Hz), max_substeps={}, clock={:?}, parallel={}, reset_on_divergence={}",
        config.fixed_dt,
        config.step_hz(),
        config.max_substeps,
        config.clock,
        config.parallel,
        config.reset_on_divergence
    );
    println!(
        "rig: {} chains, {} bones, {} colliders",
        rig.chains.len(),
        rig.bone_count(),
        rig.colliders.len()
    );
    for chain in &rig.chains {
        let params = BoneParams::from_chain_config(chain)?;
        println!(
            "  {:<16} bones={} length={:.3} preset={} stiffness={} drag={} radius={}",
            chain.name,
            chain.bone_count,
            chain.total_length(),
            chain.preset.as_deref().unwrap_or("-"),
            params.stiffness_force,
            params.drag_force,
            params.radius
        );
    }
    println!("ok");
    Ok(())
}

fn run_info() {
    println!("springbone v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  springbone-core   {}", env!("CARGO_PKG_VERSION"));
    println!("  springbone-solver {}", env!("CARGO_PKG_VERSION"));
    println!("  springbone-chain  {}", env!("CARGO_PKG_VERSION"));
    println!("  springbone-sim    {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("edition: 2024");
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Run {
            rig,
            config,
            ticks,
            parallel,
            inline,
        }) => {
            let mode = match (parallel, inline) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            RigConfig::from_file(&rig)
                .map_err(SpringBoneError::from)
                .and_then(|rig| {
                    let config = load_config(config.as_deref())?;
                    run_rig(&rig, config, ticks, mode)
                })
        }
        Some(Commands::Validate { rig, config }) => run_validate(&rig, config.as_deref()),
        Some(Commands::Info) => {
            run_info();
            Ok(())
        }
        None => {
            // Default: run the built-in rig with defaults
            RigConfig::from_toml_str(DEFAULT_RIG)
                .map_err(SpringBoneError::from)
                .and_then(|rig| run_rig(&rig, SpringBoneConfig::default(), 120, Some(false)))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
