//! `cellmech` - strain analysis of paired object surfaces.
//!
//! ```text
//! cellmech reference/ deformed/ --config run.json -v
//! ```
//!
//! Surfaces in the two directories are paired by file stem. Results are
//! written to the deformed directory unless `--output` is given, and a
//! per-object table is printed.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cell_mech::{
    export_analysis, Analysis, CellMech, CellMechConfig, EcmStrain, ExportOptions, ObjectOutcome,
    SurfaceStore,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Cell deformation and strain quantification
#[derive(Parser)]
#[command(name = "cellmech")]
#[command(about = "Strain analysis of paired reference and deformed object surfaces", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory of reference surfaces (.stl, .obj)
    #[arg(name = "REFERENCE_DIR")]
    reference: PathBuf,

    /// Directory of deformed surfaces with the same file stems
    #[arg(name = "DEFORMED_DIR")]
    deformed: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory (default: the deformed directory)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Skip the rigid pre-alignment
    #[arg(long)]
    no_rigid: bool,

    /// Write finite element packages
    #[arg(long)]
    export_fea: bool,

    /// ICP iteration cap
    #[arg(long)]
    max_iterations: Option<u32>,

    /// ICP convergence threshold
    #[arg(long)]
    max_mean_distance: Option<f64>,

    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn configuration(&self) -> Result<CellMechConfig> {
        let mut config = match &self.config {
            Some(path) => CellMechConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => CellMechConfig::default(),
        };
        if self.no_rigid {
            config.rigid_prefit = false;
        }
        if self.export_fea {
            config.export_fea_package = true;
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(d) = self.max_mean_distance {
            config.max_mean_distance = d;
        }
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.configuration()?;
    let store = SurfaceStore::open(&cli.reference, &cli.deformed).context("pairing surfaces")?;
    let analysis = CellMech::new(config.clone())?
        .run(&store)
        .context("analysis failed")?;

    let output = cli.output.as_ref().unwrap_or(&cli.deformed);
    let written = export_analysis(&analysis, output, &ExportOptions::from_config(&config))
        .with_context(|| format!("exporting to {}", output.display()))?;

    print_summary(&analysis);
    println!();
    println!("Wrote {} files to {}", written.len(), output.display());
    Ok(())
}

fn print_summary(analysis: &Analysis) {
    println!(
        "{:>4}  {:16}  {:>12}  {:>12}  {:>9}  {:>9}  {:>9}  {:>9}  {:>6}",
        "#", "object", "V ref", "V def", "dV/V", "E1", "E2", "E3", "iters"
    );
    for (slot, outcome) in analysis.objects().iter().enumerate() {
        match outcome {
            ObjectOutcome::Complete(record) => {
                let [e1, e2, e3] = record.strain.principal_strains();
                println!(
                    "{:>4}  {:16}  {:>12.4}  {:>12.4}  {:>9.4}  {:>9.4}  {:>9.4}  {:>9.4}  {:>6}",
                    slot + 1,
                    truncate(&record.name, 16),
                    record.reference_properties.volume,
                    record.deformed_properties.volume,
                    record.volumetric_strain,
                    e1,
                    e2,
                    e3,
                    record.registration.iterations
                );
            }
            ObjectOutcome::Failed(failure) => {
                println!(
                    "{:>4}  {:16}  failed at {}: {}",
                    slot + 1,
                    truncate(&failure.name, 16),
                    failure.stage,
                    failure.message
                );
            }
        }
    }

    println!();
    match analysis.ecm() {
        EcmStrain::Available {
            strain,
            vertices,
            quality,
            ..
        } => {
            let [e1, e2, e3] = strain.principal_strains();
            println!(
                "ECM strain: principal {e1:.4} {e2:.4} {e3:.4} (objects {vertices:?}, quality {quality:.3})"
            );
        }
        EcmStrain::Unavailable { reason } => println!("ECM strain: unavailable ({reason:?})"),
    }
    for warning in analysis.warnings() {
        println!("warning: {warning}");
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max - 3).collect();
        format!("{kept}...")
    }
}
