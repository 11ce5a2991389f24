// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Neulite Build Tool

Prepares a network for compartmental simulation.

Usage:
  cargo run --bin neulite-build -- convert
  cargo run --bin neulite-build -- connect network.json --workers 4
  cargo run --bin neulite-build -- build network.json

Settings come from `neulite_configuration.toml` (defaults when none is found),
then `NEULITE_*` environment variables, then command line flags.
Per-crate debug logging: `--debug-neulite-connectome` or `--debug-all`.

Copyright 2025 Neuraville Inc.
Licensed under the Apache License, Version 2.0
*/

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use neulite_config::{
    apply_cli_overrides, apply_environment_overrides, load_config, validate_config, ConfigError,
    NeuliteConfig,
};
use neulite_connectome::{
    run_local, synthesize_connections, Cluster, DirectorySkeletonLoader, EdgeSortKey,
    NetworkDescription, SortOptions, SynthesisOptions, SynthesisSummary,
};
use neulite_morphology::prepare_morphologies;
use neulite_observability::{debug_flags_help, init_logging, parse_debug_flags};

/// Canonical morphology preparation and connection synthesis
#[derive(Parser, Debug)]
#[command(name = "neulite-build", version, author, after_help = debug_flags_help())]
struct Args {
    /// Configuration file (searched for when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the raw `*.swc` reconstructions
    #[arg(long, global = true)]
    morphologies_dir: Option<PathBuf>,

    /// Root of all generated files
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Default log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Canonicalize every skeleton of the morphologies directory
    Convert,
    /// Write connection tables for every population pair of a network
    Connect(ConnectArgs),
    /// Convert, then connect
    Build(ConnectArgs),
}

#[derive(clap::Args, Debug)]
struct ConnectArgs {
    /// Network description (JSON)
    network: PathBuf,

    /// Number of cooperating workers
    #[arg(long)]
    workers: Option<usize>,

    /// Seed for compartment sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Edge table ordering: target_node_id, source_node_id, edge_type_id or none
    #[arg(long)]
    sort_by: Option<String>,
}

fn main() -> Result<()> {
    let debug_flags = parse_debug_flags();
    // --debug-* flags belong to the logging layer
    let args = Args::parse_from(std::env::args().filter(|a| !a.starts_with("--debug-")));

    let config = resolve_config(&args)?;
    validate_config(&config)?;

    let logging = neulite::logging_settings(&config).map_err(anyhow::Error::msg)?;
    let _guard = init_logging(&debug_flags, &logging)?;

    info!(target: "neulite-build", "neulite-build {}", neulite::VERSION);

    match &args.command {
        Command::Convert => convert(&config),
        Command::Connect(_) => connect(&config, &args),
        Command::Build(_) => {
            convert(&config)?;
            connect(&config, &args)
        }
    }
}

fn resolve_config(args: &Args) -> Result<NeuliteConfig> {
    let mut overrides = HashMap::new();
    if let Some(dir) = &args.morphologies_dir {
        overrides.insert("morphologies_dir".to_string(), dir.display().to_string());
    }
    if let Some(dir) = &args.output_dir {
        overrides.insert("output_dir".to_string(), dir.display().to_string());
    }
    if let Some(level) = &args.log_level {
        overrides.insert("log_level".to_string(), level.clone());
    }
    if let Command::Connect(connect) | Command::Build(connect) = &args.command {
        if let Some(workers) = connect.workers {
            overrides.insert("workers".to_string(), workers.to_string());
        }
        if let Some(seed) = connect.seed {
            overrides.insert("seed".to_string(), seed.to_string());
        }
        if let Some(sort_by) = &connect.sort_by {
            overrides.insert("sort_by".to_string(), sort_by.clone());
        }
    }

    match load_config(args.config.as_deref(), Some(&overrides)) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) if args.config.is_none() => {
            let mut config = NeuliteConfig::default();
            apply_environment_overrides(&mut config);
            apply_cli_overrides(&mut config, &overrides);
            Ok(config)
        }
        Err(e) => Err(e).context("Failed to load configuration"),
    }
}

fn convert(config: &NeuliteConfig) -> Result<()> {
    let src = &config.paths.morphologies_dir;
    let dst = config.paths.converted_swc_dir();
    info!(
        target: "neulite-build",
        "Converting skeletons: {} -> {}",
        src.display(),
        dst.display()
    );
    let summary = prepare_morphologies(src, &dst)
        .with_context(|| format!("Failed to convert skeletons in {}", src.display()))?;
    println!(
        "Converted {} skeletons into {}",
        summary.converted.len(),
        summary.output_dir.display()
    );
    Ok(())
}

fn connect(config: &NeuliteConfig, args: &Args) -> Result<()> {
    let (Command::Connect(connect) | Command::Build(connect)) = &args.command else {
        return Ok(());
    };

    let network = NetworkDescription::load(&connect.network)
        .with_context(|| format!("Failed to load network {}", connect.network.display()))?;
    let pairs = network.population_pairs();
    if pairs.is_empty() {
        warn!(target: "neulite-build", "Network {} has no edges", connect.network.display());
        return Ok(());
    }
    let input = network
        .resolve(&config.paths.synaptic_models_dir)
        .context("Failed to build node and edge type catalogs")?;

    let loader = DirectorySkeletonLoader::new(
        &config.paths.morphologies_dir,
        Some(config.paths.converted_swc_dir()),
    );
    let sort_key: EdgeSortKey = config.synthesis.sort_by.parse()?;
    let workers = config.synthesis.workers;

    for (source, target) in pairs {
        let options = SynthesisOptions {
            sort_key,
            sort: SortOptions {
                max_in_memory_rows: config.synthesis.max_in_memory_rows,
                spill_dir: config.synthesis.spill_dir.clone(),
            },
            seed: config.synthesis.seed,
            ..SynthesisOptions::new(&source, &target, &config.paths.output_dir)
        };

        let results = run_local(workers, |cluster| {
            let input = cluster.is_leader().then_some(&input);
            synthesize_connections(cluster, input, &options, &loader)
        })
        .with_context(|| format!("Connection synthesis failed for {} -> {}", source, target))?;

        if let Some(summary) = results.into_iter().next().flatten() {
            report(&summary, &config.paths.output_dir);
        }
    }
    Ok(())
}

fn report(summary: &SynthesisSummary, output_dir: &Path) {
    let stats = &summary.stats;
    println!("{} -> {}", summary.source_population, summary.target_population);
    println!("   Edges:    {}", summary.edges);
    println!("   Synapses: {} ({} kept, {} dropped)", stats.synapses, stats.kept, stats.dropped());
    match &summary.output {
        Some(path) => println!("   Output:   {}", path.display()),
        None => println!("   Output:   none written to {}", output_dir.display()),
    }
}
