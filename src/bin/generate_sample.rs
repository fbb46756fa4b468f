use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use guatecompras_dashboard::data::export::{write_csv, write_parquet};
use guatecompras_dashboard::sample::{generate_projects, DEFAULT_SEED};

/// Write a synthetic Guatecompras dataset as CSV and Parquet.
#[derive(Debug, Parser)]
struct Args {
    /// Number of projects
    #[arg(long, default_value_t = 500)]
    count: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Output path without extension
    #[arg(long, default_value = "proyectos_guatecompras")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let projects = generate_projects(args.count, args.seed);
    let awarded = projects.iter().filter(|p| p.is_awarded()).count();

    let csv_path = args.output.with_extension("csv");
    let parquet_path = args.output.with_extension("parquet");
    write_csv(&projects, &csv_path)?;
    write_parquet(&projects, &parquet_path)?;

    println!(
        "Wrote {} projects ({awarded} awarded) to {} and {}",
        projects.len(),
        csv_path.display(),
        parquet_path.display()
    );
    Ok(())
}
