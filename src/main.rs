use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;

use guatecompras_dashboard::config::DashboardConfig;
use guatecompras_dashboard::data::aggregate::{group_aggregate, AggOp, GroupKey, Metric};
use guatecompras_dashboard::data::cache::DatasetCache;
use guatecompras_dashboard::data::error::LoadError;
use guatecompras_dashboard::data::export::write_file;
use guatecompras_dashboard::data::filter::{
    amount_bounds, date_bounds, AmountRange, Choice, DateRange, Selection,
};
use guatecompras_dashboard::data::loader::{parse_date, LoadOptions};
use guatecompras_dashboard::data::model::{DateColumn, ProjectTable};
use guatecompras_dashboard::geo::ShapeCache;
use guatecompras_dashboard::report::{
    format_amount, format_count, render_json, render_options, render_rows, render_text,
};
use guatecompras_dashboard::sample::load_or_generate;
use guatecompras_dashboard::state::DashboardState;

/// Filter Guatecompras procurement projects and print the dashboard figures.
#[derive(Debug, Parser)]
#[command(name = "guatecompras-dashboard", version)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source file (.csv or .parquet); overrides the configuration
    #[arg(long)]
    source: Option<PathBuf>,

    /// JSON file holding a filter selection; flags below override it
    #[arg(long)]
    selection: Option<PathBuf>,

    #[arg(long)]
    region: Option<String>,

    #[arg(long)]
    department: Option<String>,

    #[arg(long)]
    project_type: Option<String>,

    #[arg(long)]
    status: Option<String>,

    #[arg(long)]
    min_amount: Option<f64>,

    #[arg(long)]
    max_amount: Option<f64>,

    #[arg(long, value_parser = parse_date_arg)]
    date_from: Option<NaiveDate>,

    #[arg(long, value_parser = parse_date_arg)]
    date_to: Option<NaiveDate>,

    /// Date column the date range applies to
    #[arg(long, value_enum)]
    date_column: Option<DateColumn>,

    /// Print a single grouped table instead of the full report
    #[arg(long, value_enum)]
    group_by: Option<GroupKey>,

    #[arg(long, value_enum, default_value = "amount")]
    metric: Metric,

    #[arg(long, value_enum, default_value = "sum")]
    op: AggOp,

    /// Rows in ranked tables
    #[arg(long)]
    top: Option<usize>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Write the filtered projects to this .csv or .parquet file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Skip fetching department boundary shapes
    #[arg(long)]
    no_shapes: bool,

    /// List the available filter values and exit
    #[arg(long)]
    options: bool,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).ok_or_else(|| format!("'{s}' is not a date (expected YYYY-MM-DD or DD/MM/YYYY)"))
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => DashboardConfig::from_file(path)?,
        None => DashboardConfig::default(),
    };
    if let Some(source) = &args.source {
        config.source = source.clone();
    }
    if let Some(n) = args.top {
        config.view.top_n = n;
    }
    if args.no_shapes {
        config.shapes_url = None;
    }

    let base = match load_base(&config, &config.load_options()) {
        Ok(table) => table,
        Err(e) if e.is_fatal() => {
            eprintln!("Error: {e}");
            return Ok(ExitCode::from(2));
        }
        Err(e) => {
            log::warn!("Showing no data: {e}");
            Arc::new(ProjectTable::empty())
        }
    };

    let mut state = DashboardState::new(config.view.clone());
    state.set_dataset(base);
    let selection = build_selection(&args, &state)?;

    let mut out = io::stdout().lock();
    if args.options {
        state.selection.region = selection.region;
        if let Some(options) = state.options() {
            render_options(&options, &mut out)?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.group_by.is_none() {
        if let Some(url) = &config.shapes_url {
            state.shapes = ShapeCache::global().shapes_or_fallback(url);
        }
    }
    state.set_selection(selection);

    if let Some(path) = &args.export {
        write_file(&state.filtered.projects, path)
            .with_context(|| format!("exporting to {}", path.display()))?;
    }

    if let Some(key) = args.group_by {
        let rows = group_aggregate(&state.filtered, key, args.metric, args.op, args.top);
        if args.json {
            serde_json::to_writer_pretty(&mut out, &rows)?;
            writeln!(out)?;
        } else {
            let fmt: fn(f64) -> String = match (args.metric, args.op) {
                (Metric::Amount, AggOp::Sum | AggOp::Mean) => format_amount,
                _ => format_count,
            };
            render_rows(&mut out, &format!("{key:?} / {:?} / {:?}", args.metric, args.op), &rows, fmt)?;
        }
    } else if let Some(view) = &state.view {
        if args.json {
            render_json(view, &mut out)?;
        } else {
            if let Some(msg) = &state.status_message {
                writeln!(out, "{msg}")?;
            }
            render_text(view, &mut out)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// The configured source through the process cache, or sample data when
/// the source does not exist.
fn load_base(config: &DashboardConfig, options: &LoadOptions) -> Result<Arc<ProjectTable>, LoadError> {
    if config.source.exists() {
        DatasetCache::global().get_or_load(&config.source, options)
    } else {
        load_or_generate(&config.source, &config.sample_cache, config.sample_size, options)
            .map(Arc::new)
    }
}

/// Start from `--selection` (if any) and apply the individual flags. A
/// one-sided range is completed with the data's own bounds.
fn build_selection(args: &Args, state: &DashboardState) -> Result<Selection> {
    let mut selection = match &args.selection {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading selection {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing selection {}", path.display()))?
        }
        None => Selection::default(),
    };

    let choices = [
        (&args.region, &mut selection.region),
        (&args.department, &mut selection.department),
        (&args.project_type, &mut selection.project_type),
        (&args.status, &mut selection.status),
    ];
    for (flag, slot) in choices {
        if let Some(value) = flag {
            *slot = Choice::only(value.as_str());
        }
    }

    let empty = ProjectTable::empty();
    let base = state.base.as_deref().unwrap_or(&empty);

    if args.min_amount.is_some() || args.max_amount.is_some() {
        let (lo, hi) = amount_bounds(base);
        selection.amount_range = Some(AmountRange {
            min: args.min_amount.unwrap_or(lo),
            max: args.max_amount.unwrap_or(hi),
        });
    }

    if args.date_from.is_some() || args.date_to.is_some() {
        let column = args.date_column.unwrap_or_default();
        let (lo, hi) = date_bounds(base, column).unwrap_or((NaiveDate::MIN, NaiveDate::MAX));
        selection.date_range = Some(DateRange {
            column,
            start: args.date_from.unwrap_or(lo),
            end: args.date_to.unwrap_or(hi),
        });
    } else if let (Some(column), Some(range)) = (args.date_column, selection.date_range.as_mut()) {
        range.column = column;
    }

    Ok(selection)
}
