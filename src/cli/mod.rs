//! Command-line parsing for the `qnoise` evaluator.
//!
//! Argument parsing and command dispatch stay separate from the numeric code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::InfoFocus;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "qnoise", version, about = "Fisher noise/information evaluator for qMRI sequences")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate noise, information and B1 sensitivity of a sequence.
    Eval(EvalArgs),
    /// Bin the trajectory only and print the cell occupancy map.
    Bin(BinArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct EvalArgs {
    /// Problem JSON (configuration + sequence).
    #[arg(long, value_name = "JSON")]
    pub problem: PathBuf,

    /// Precomputed signal table JSON.
    #[arg(long, value_name = "JSON")]
    pub signals: PathBuf,

    /// Trajectory CSV (`rep,ky,kz`), replacing the problem's trajectory.
    #[arg(long, value_name = "CSV")]
    pub trajectory: Option<PathBuf>,

    /// Override the configured information focus.
    #[arg(long, value_enum)]
    pub focus: Option<InfoFocus>,

    /// Render the configured plot events as ASCII pages.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export evaluation and per-probe summaries to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Export per-cell diagnostics to CSV.
    #[arg(long = "export-cells", value_name = "CSV")]
    pub export_cells: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct BinArgs {
    /// Problem JSON (configuration + sequence).
    #[arg(long, value_name = "JSON")]
    pub problem: PathBuf,

    /// Trajectory CSV (`rep,ky,kz`), replacing the problem's trajectory.
    #[arg(long, value_name = "CSV")]
    pub trajectory: Option<PathBuf>,

    /// Map width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Map height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn eval_arguments_parse() {
        let cli = Cli::parse_from([
            "qnoise", "eval", "--problem", "p.json", "--signals", "s.json", "--focus", "weighted", "--plot",
            "--export-cells", "cells.csv",
        ]);
        let Command::Eval(args) = cli.command else {
            panic!("expected eval");
        };
        assert_eq!(args.focus, Some(InfoFocus::Weighted));
        assert!(args.plot);
        assert_eq!(args.export_cells, Some(PathBuf::from("cells.csv")));
        assert_eq!(args.width, 100);
    }
}
