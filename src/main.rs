use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use log::info;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use osm_loader::{parse_with, InputFormat, Result, UserConfig};

/// Loads an OSM extract and prints a JSON report of what it contained.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// .osm, .osm.zip, .osm.gz, .osm.xz, .o5m or .pbf file.
    #[arg(required_unless_present = "config")]
    input: Option<PathBuf>,

    /// JSON config file; a positional input overrides its data_path.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    format: Option<InputFormat>,

    #[arg(long)]
    log_level: Option<String>,

    /// Write the report here instead of stdout.
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<UserConfig> {
        let mut config = match &self.config {
            Some(path) => UserConfig::from_path(path)?,
            None => UserConfig::for_input(self.input.clone().unwrap_or_default()),
        };
        if let Some(input) = self.input {
            config.data_path = input;
        }
        if self.format.is_some() {
            config.format = self.format;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.report.is_some() {
            config.report_path = self.report;
        }
        Ok(config)
    }
}

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stderr()))
        .init();
}

fn write_report(config: &UserConfig, load: &osm_loader::Load) -> Result<()> {
    let report = load.report();
    match &config.report_path {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut out, &report)?;
            out.flush()?;
            info!(report = path.display().to_string().as_str(); "Wrote report");
        }
        None => {
            let mut out = io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;
    setup_logging(&config.log_level);

    let load = parse_with(&config.data_path, &config.load_options())?;
    write_report(&config, &load)
}
