use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sente_core::{Position, Symmetry};
use sente_net::{Ensemble, Network, NetworkConfig, Precision, heatmap};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Load a Go network and measure evaluation throughput", long_about = None)]
struct Args {
    /// Weight file (plain text, gzip or zlib)
    #[arg(short, long)]
    weights: PathBuf,

    /// Evaluation threads
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Never use an accelerated backend
    #[arg(long)]
    cpu_only: bool,

    /// Accelerator precision: auto, single or half
    #[arg(long, default_value_t = Precision::Auto)]
    precision: Precision,

    /// Evaluations to run; 0 runs for --seconds instead
    #[arg(short, long, default_value_t = 1600)]
    iterations: usize,

    /// Length of the timed benchmark when --iterations is 0
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Disable the cpu cross-check of accelerated results
    #[arg(long)]
    no_selfcheck: bool,

    /// Softmax temperature for the policy
    #[arg(long, default_value_t = 1.0)]
    softmax_temperature: f32,

    /// Komi of the evaluated position
    #[arg(long, default_value_t = 7.5)]
    komi: f32,

    /// Print the empty-board policy and the most likely moves
    #[arg(long)]
    heatmap: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    info!("sente starting");

    let config = NetworkConfig {
        threads: args.threads,
        cpu_only: args.cpu_only,
        precision: args.precision,
        selfcheck: !args.no_selfcheck,
        softmax_temperature: args.softmax_temperature,
        ..NetworkConfig::default()
    };

    // GPU kernels are provided by embedding hosts; standalone runs on the cpu.
    let network = Network::initialize(config, &args.weights, None)
        .with_context(|| format!("failed to initialize network from {}", args.weights.display()))?;

    let mut position = Position::default();
    position.set_komi(args.komi);
    let report = if args.iterations > 0 {
        network.benchmark(&position, args.iterations)?
    } else {
        network.benchmark_for(&position, Duration::from_secs(args.seconds))?
    };
    println!(
        "{:5} evaluations in {:5.2} seconds -> {} n/s",
        report.evaluations,
        report.elapsed.as_secs_f64(),
        report.per_second() as u64
    );

    if args.heatmap {
        let result = network
            .get_output(&position, Ensemble::Direct(Symmetry::IDENTITY), true)
            .context("evaluation failed")?;
        print!("{}", heatmap::render(&position, &result, true));
    }

    network.cache().dump_stats();
    Ok(())
}
