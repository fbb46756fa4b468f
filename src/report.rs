//! Plain-text and JSON rendering of a [`DashboardView`] for the terminal.

use std::io::{self, Write};

use arrow::util::pretty::pretty_format_batches;

use crate::data::aggregate::GroupRow;
use crate::data::export::projects_to_batch;
use crate::data::filter::FilterOptions;
use crate::data::model::Column;
use crate::geo::DepartmentView;
use crate::state::DashboardView;

/// Leading columns of the recent-projects table; the date it is ordered
/// by is appended.
const RECENT_COLUMNS: [Column; 5] = [
    Column::Nog,
    Column::Region,
    Column::Department,
    Column::Status,
    Column::AwardAmount,
];

/// Quetzal amount with thousands separators, e.g. `Q1,234.50`.
pub fn format_amount(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}Q{grouped}.{:02}", cents % 100)
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

/// One titled block of `key  value` lines.
pub fn render_rows(
    out: &mut impl Write,
    title: &str,
    rows: &[GroupRow],
    fmt: fn(f64) -> String,
) -> io::Result<()> {
    writeln!(out, "\n{title}")?;
    if rows.is_empty() {
        return writeln!(out, "  (sin datos)");
    }
    for row in rows {
        writeln!(out, "  {:<36} {:>18}", row.key.to_string(), or_dash(row.value.map(fmt)))?;
    }
    Ok(())
}

pub fn format_count(v: f64) -> String {
    format!("{v:.0}")
}

pub fn render_text(view: &DashboardView, out: &mut impl Write) -> io::Result<()> {
    let m = &view.metrics;
    writeln!(out, "Métricas clave")?;
    writeln!(out, "  Proyectos:           {}", m.total_count)?;
    writeln!(
        out,
        "  Adjudicados:         {} ({})",
        m.awarded_count,
        or_dash(m.awarded_pct.map(|p| format!("{p:.1}%")))
    )?;
    writeln!(out, "  Monto total:         {}", format_amount(m.total_amount))?;
    writeln!(out, "  Monto promedio:      {}", or_dash(m.mean_amount.map(format_amount)))?;
    writeln!(
        out,
        "  Ofertas promedio:    {}",
        or_dash(m.mean_offer_count.map(|v| format!("{v:.1}")))
    )?;
    writeln!(out, "  Proveedores únicos:  {}", m.unique_suppliers)?;
    writeln!(
        out,
        "  Período:             {}",
        or_dash(m.period.map(|(a, b)| format!("{a} a {b}")))
    )?;

    render_rows(out, "Monto por región", &view.amount_by_region, format_amount)?;
    match &view.departments {
        DepartmentView::Spatial { matched, unmatched } => {
            writeln!(out, "\nMonto por departamento (mapa)")?;
            for dept in matched {
                writeln!(out, "  {:<36} {:>18}", dept.name, format_amount(dept.amount))?;
            }
            if !unmatched.is_empty() {
                render_rows(out, "Departamentos sin geometría", unmatched, format_amount)?;
            }
        }
        DepartmentView::Tabular { rows } => {
            render_rows(out, "Monto por departamento", rows, format_amount)?;
        }
    }
    render_rows(out, "Principales proveedores", &view.top_suppliers, format_amount)?;
    render_rows(out, "Adjudicaciones por año", &view.awards_timeline, format_count)?;
    render_rows(out, "Proyectos por tipo", &view.projects_by_type, format_count)?;
    render_rows(out, "Proyectos por estatus", &view.status_breakdown, format_count)?;

    writeln!(out, "\nProyectos recientes")?;
    if view.recent.is_empty() {
        return writeln!(out, "  (sin datos)");
    }
    let table = projects_to_batch(&view.recent)
        .and_then(|batch| {
            let schema = batch.schema();
            let indices = RECENT_COLUMNS
                .into_iter()
                .chain([view.recent_by.column()])
                .map(|c| schema.index_of(c.header()))
                .collect::<Result<Vec<_>, _>>()?;
            batch.project(&indices)
        })
        .and_then(|batch| pretty_format_batches(&[batch]).map(|t| t.to_string()))
        .map_err(io::Error::other)?;
    writeln!(out, "{table}")
}

pub fn render_json(view: &DashboardView, out: &mut impl Write) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, view)?;
    writeln!(out)
}

/// Selector choices, as a sidebar would list them.
pub fn render_options(options: &FilterOptions, out: &mut impl Write) -> io::Result<()> {
    let list = |values: &[String]| {
        if values.is_empty() {
            "-".to_string()
        } else {
            values.join(", ")
        }
    };
    writeln!(out, "Regiones:       {}", list(&options.regions))?;
    writeln!(out, "Departamentos:  {}", list(&options.departments))?;
    writeln!(out, "Tipos:          {}", list(&options.project_types))?;
    writeln!(out, "Estatus:        {}", list(&options.statuses))?;
    let (lo, hi) = options.amount_bounds;
    writeln!(out, "Montos:         {} a {}", format_amount(lo), format_amount(hi))?;
    writeln!(
        out,
        "Publicación:    {}",
        or_dash(options.publication_bounds.map(|(a, b)| format!("{a} a {b}")))
    )
}
