//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - installs logging
//! - parses CLI arguments
//! - runs the evaluation pipeline
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{BinArgs, Command, EvalArgs};
use crate::error::AppError;
use crate::plot::AsciiVisualizer;

pub mod pipeline;

/// Entry point for the `qnoise` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Eval(args) => handle_eval(args),
        Command::Bin(args) => handle_bin(args),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_eval(args: EvalArgs) -> Result<(), AppError> {
    let mut vis = AsciiVisualizer::new(args.width, args.height);
    let focus = args.focus;
    let output = pipeline::run_eval(
        &args.problem,
        &args.signals,
        args.trajectory.as_deref(),
        |config| {
            if let Some(focus) = focus {
                config.info_focus = focus;
            }
        },
        &mut vis,
    )?;

    let config = &output.problem.config;
    println!(
        "{}",
        crate::report::format_run_summary(config, &output.problem.sequence, &output.run)
    );

    if args.plot {
        for page in vis.pages() {
            println!("{page}");
        }
    }

    if let Some(path) = &args.export {
        crate::io::export::write_results_json(path, &output.run, config)?;
    }
    if let Some(path) = &args.export_cells {
        crate::io::export::write_cells_csv(path, &output.run)?;
    }

    Ok(())
}

fn handle_bin(args: BinArgs) -> Result<(), AppError> {
    let grid = pipeline::run_bin(&args.problem, args.trajectory.as_deref())?;
    println!("{}", crate::report::format_occupancy(&grid, args.width, args.height));
    Ok(())
}
