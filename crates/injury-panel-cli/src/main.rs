// Injury panel entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, RUST_LOG aware)
// 2. Parse the subcommand and --base (clap)
// 3. Load config (seeding config/ from defaults/ when missing)
// 4. Dispatch: build the panel, write the report tables, or print the taxonomy

use injury_panel::config::{self, Config};
use injury_panel::export;
use injury_panel::ingest;
use injury_panel::pipeline::{self, PipelineSettings};
use injury_panel::report;
use injury_panel::taxonomy::PositionTaxonomy;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "injury-panel")]
#[command(about = "Build the weekly NFL team injury panel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Project directory holding config/ and the relative input paths
    #[arg(long, global = true, default_value = ".")]
    base: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Command {
    /// Build the panel CSV and its manifest (default)
    Build,
    /// Write the descriptive tables from an existing panel
    Report,
    /// Print the position taxonomy as CSV
    Taxonomy,
}

fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let config = config::load_config(&cli.base).with_context(|| {
        format!("failed to load configuration from {}", cli.base.display())
    })?;
    info!("Config loaded from {}", cli.base.join("config").display());

    match cli.command.unwrap_or(Command::Build) {
        Command::Build => build(&config),
        Command::Report => write_report(&config),
        Command::Taxonomy => print_taxonomy(&config),
    }
}

fn load_taxonomy(config: &Config) -> anyhow::Result<PositionTaxonomy> {
    match &config.taxonomy_path {
        Some(path) => {
            let path = config.resolve(path);
            PositionTaxonomy::load(&path)
                .with_context(|| format!("failed to load taxonomy from {}", path.display()))
        }
        None => Ok(PositionTaxonomy::builtin()),
    }
}

fn build(config: &Config) -> anyhow::Result<()> {
    let taxonomy = load_taxonomy(config)?;
    info!("Taxonomy {} ({} codes)", taxonomy.version(), taxonomy.len());

    let tables = ingest::load_all(config).context("failed to load input tables")?;
    let output = pipeline::run(tables, &taxonomy, &PipelineSettings::from_config(config))
        .context("pipeline run failed")?;

    let report = &output.report;
    if !report.duplicates.conflicting.is_empty() {
        warn!(
            "{} conflicting player-week duplicates kept their first occurrence",
            report.duplicates.conflicting.len()
        );
    }

    let panel_path = config.resolve(&config.output.panel);
    let manifest_path = config.resolve(&config.output.manifest);
    export::write_outputs(&panel_path, &manifest_path, &output.panel.rows, report)
        .with_context(|| {
            format!(
                "failed to write panel {} and manifest {}",
                panel_path.display(),
                manifest_path.display()
            )
        })?;

    info!(
        "Panel written: {} rows to {} (manifest {})",
        report.panel_rows,
        panel_path.display(),
        manifest_path.display()
    );
    Ok(())
}

fn write_report(config: &Config) -> anyhow::Result<()> {
    let panel_path = config.resolve(&config.output.panel);
    let rows = export::read_panel(&panel_path).with_context(|| {
        format!("failed to read panel from {} (run `build` first)", panel_path.display())
    })?;

    let dir = config.resolve(&config.output.report_dir);
    let written = report::write_reports(&dir, &rows)
        .with_context(|| format!("failed to write report tables to {}", dir.display()))?;
    for path in written {
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn print_taxonomy(config: &Config) -> anyhow::Result<()> {
    let taxonomy = load_taxonomy(config)?;
    println!("# taxonomy {}", taxonomy.version());
    println!("code,bucket");
    for (code, bucket) in taxonomy.entries() {
        println!("{code},{}", bucket.label());
    }
    Ok(())
}

/// Initialize tracing to stderr so stdout stays free for `taxonomy` output.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("injury_panel=info,injury_panel_cli=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
