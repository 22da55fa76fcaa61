//! SPlot command line front end
//!
//! Imports one data file, runs the formula list against it and prints the
//! outcome of every formula. Optionally writes a project file.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use splot::app::Workspace;
use splot::engine::FormulaOutcome;
use splot::formula::FormulaStore;
use splot::importer::ImportOptions;
use splot::settings::Settings;
use splot::trace::{XSource, YSide};
use splot::transform::TransformKind;

#[derive(Parser)]
#[command(name = "splot", version, about = "Import a data file and evaluate the formula list against it")]
struct Cli {
    /// Data file to import (csv, dat, tsv or json)
    data_file: PathBuf,

    /// Formula file to use instead of the configured one
    #[arg(short, long)]
    formulas: Option<PathBuf>,

    /// Write a project with one trace per derived variable
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Transform for the project traces: none, log10, moving_average[:N], cumulative_sum
    #[arg(short, long, value_parser = parse_transform, default_value = "none")]
    transform: TransformKind,

    /// Autoscale margin as a fraction of the data range
    #[arg(long)]
    margin: Option<f64>,

    /// Round autoscaled limits to nice numbers
    #[arg(long)]
    nice_rounding: bool,

    /// Persist --margin and --nice-rounding as the new defaults
    #[arg(long)]
    save_settings: bool,
}

fn parse_transform(value: &str) -> std::result::Result<TransformKind, String> {
    TransformKind::parse(value).ok_or_else(|| format!("unknown transform '{}'", value))
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut settings = Settings::load();
    if let Some(margin) = cli.margin {
        settings.autoscale_margin = margin;
    }
    if cli.nice_rounding {
        settings.nice_rounding = true;
    }
    if cli.save_settings {
        settings.save().map_err(|e| anyhow!(e))?;
        tracing::info!("Saved settings to {:?}", Settings::get_settings_path());
    }

    let mut workspace = match &cli.formulas {
        Some(path) => {
            let formulas = FormulaStore::load(path)
                .with_context(|| format!("loading formulas from {}", path.display()))?;
            Workspace::with_formulas(settings, formulas)
        }
        None => Workspace::new(settings),
    };

    let outcome = workspace
        .import_file(&cli.data_file, &ImportOptions::default())
        .with_context(|| format!("importing {}", cli.data_file.display()))?;

    let report = match outcome.report {
        Some(report) => report,
        None => workspace.calculate_formulas(&outcome.dataset)?.report,
    };

    if let Some(dataset) = workspace.dataset(&outcome.dataset) {
        println!("{}: {} variables, {} samples", dataset.name, dataset.variables().len(), dataset.len());
    }
    for (name, result) in report.entries() {
        match result {
            FormulaOutcome::Success { len } => println!("  ok       {} ({} values)", name, len),
            FormulaOutcome::Skipped => println!("  skipped  {}", name),
            FormulaOutcome::Failure { message } => println!("  failed   {}: {}", name, message),
            FormulaOutcome::Rejected { message } => println!("  rejected {}: {}", name, message),
        }
    }
    println!("{}", report.summary());

    if let Some(path) = &cli.project {
        // One trace per derived variable so the project opens with something to look at
        let derived: Vec<String> = workspace
            .dataset(&outcome.dataset)
            .map(|d| {
                d.variables()
                    .iter()
                    .filter(|v| v.is_derived())
                    .map(|v| v.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        for name in derived {
            let id = workspace.plot(&outcome.dataset, XSource::Index, &name, 0, YSide::Left)?;
            workspace.set_transform(&id, cli.transform)?;
            println!("  plotted  {} as {} [{}]", name, id, cli.transform.label());
        }

        workspace
            .save_project(path)
            .with_context(|| format!("writing project {}", path.display()))?;
        println!("Project written to {}", path.display());
    }

    Ok(())
}
