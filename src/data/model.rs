use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Status value marking a project whose supplier and amount were finalized.
pub const AWARDED_STATUS: &str = "Adjudicado";

/// Whether a status string denotes an awarded project.
pub fn is_awarded(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.trim().eq_ignore_ascii_case(AWARDED_STATUS))
}

// ---------------------------------------------------------------------------
// Column – the known source columns
// ---------------------------------------------------------------------------

/// A column of the source file. Headers are matched case-insensitively
/// against the canonical (Spanish) name and a few English aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Nog,
    Description,
    Region,
    Department,
    ProjectType,
    Status,
    AwardAmount,
    OfferCount,
    Supplier,
    PublicationDate,
    SubmissionDate,
    ClosingDate,
    AwardDate,
}

impl Column {
    pub const ALL: [Column; 13] = [
        Column::Nog,
        Column::Description,
        Column::Region,
        Column::Department,
        Column::ProjectType,
        Column::Status,
        Column::AwardAmount,
        Column::OfferCount,
        Column::Supplier,
        Column::PublicationDate,
        Column::SubmissionDate,
        Column::ClosingDate,
        Column::AwardDate,
    ];

    /// Columns whose absence makes a source unusable.
    pub const REQUIRED: [Column; 5] = [
        Column::Region,
        Column::Department,
        Column::ProjectType,
        Column::Status,
        Column::AwardAmount,
    ];

    /// Columns offered as categorical selectors / group keys.
    pub const CATEGORICAL: [Column; 5] = [
        Column::Region,
        Column::Department,
        Column::ProjectType,
        Column::Status,
        Column::Supplier,
    ];

    /// Canonical header as written in the Guatecompras export.
    pub fn header(self) -> &'static str {
        match self {
            Column::Nog => "nog",
            Column::Description => "descripcion",
            Column::Region => "region",
            Column::Department => "departamento",
            Column::ProjectType => "tipo_proyecto",
            Column::Status => "estatus",
            Column::AwardAmount => "monto_adjudicado",
            Column::OfferCount => "cantidad_ofertas",
            Column::Supplier => "proveedor",
            Column::PublicationDate => "fecha_publicacion",
            Column::SubmissionDate => "fecha_presentacion",
            Column::ClosingDate => "fecha_cierre",
            Column::AwardDate => "fecha_adjudicacion",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Nog => &["id", "identifier"],
            Column::Description => &["description"],
            Column::Region => &[],
            Column::Department => &["department"],
            Column::ProjectType => &["project_type"],
            Column::Status => &["status"],
            Column::AwardAmount => &["award_amount"],
            Column::OfferCount => &["offer_count", "numero_ofertas"],
            Column::Supplier => &["supplier"],
            Column::PublicationDate => &["publication_date"],
            Column::SubmissionDate => &["submission_date"],
            Column::ClosingDate => &["closing_date"],
            Column::AwardDate => &["award_date"],
        }
    }

    pub fn is_required(self) -> bool {
        Column::REQUIRED.contains(&self)
    }

    /// Resolve a raw header cell to a known column.
    pub fn from_header(raw: &str) -> Option<Column> {
        let wanted = raw.trim().to_lowercase();
        Column::ALL.into_iter().find(|col| {
            col.header() == wanted || col.aliases().iter().any(|a| *a == wanted)
        })
    }

    /// The text value of a categorical column for one project.
    pub fn text<'a>(self, project: &'a Project) -> Option<&'a str> {
        match self {
            Column::Nog => project.nog.as_deref(),
            Column::Description => project.description.as_deref(),
            Column::Region => project.region.as_deref(),
            Column::Department => project.department.as_deref(),
            Column::ProjectType => project.project_type.as_deref(),
            Column::Status => project.status.as_deref(),
            Column::Supplier => project.supplier.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

// ---------------------------------------------------------------------------
// DateColumn – the four date-valued columns
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DateColumn {
    #[default]
    Publication,
    Submission,
    Closing,
    Award,
}

impl DateColumn {
    pub fn get(self, project: &Project) -> Option<NaiveDate> {
        match self {
            DateColumn::Publication => project.publication_date,
            DateColumn::Submission => project.submission_date,
            DateColumn::Closing => project.closing_date,
            DateColumn::Award => project.award_date,
        }
    }

    pub fn column(self) -> Column {
        match self {
            DateColumn::Publication => Column::PublicationDate,
            DateColumn::Submission => Column::SubmissionDate,
            DateColumn::Closing => Column::ClosingDate,
            DateColumn::Award => Column::AwardDate,
        }
    }
}

// ---------------------------------------------------------------------------
// Project – one row of the base table
// ---------------------------------------------------------------------------

/// A single procurement project. Every field is optional because the
/// source is only coerced, never validated.
///
/// Serde names follow the source headers so a serialized table can be
/// loaded back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub nog: Option<String>,
    #[serde(rename = "descripcion")]
    pub description: Option<String>,
    pub region: Option<String>,
    #[serde(rename = "departamento")]
    pub department: Option<String>,
    #[serde(rename = "tipo_proyecto")]
    pub project_type: Option<String>,
    #[serde(rename = "estatus")]
    pub status: Option<String>,
    #[serde(rename = "monto_adjudicado")]
    pub award_amount: Option<f64>,
    #[serde(rename = "cantidad_ofertas")]
    pub offer_count: Option<i64>,
    #[serde(rename = "proveedor")]
    pub supplier: Option<String>,
    #[serde(rename = "fecha_publicacion")]
    pub publication_date: Option<NaiveDate>,
    #[serde(rename = "fecha_presentacion")]
    pub submission_date: Option<NaiveDate>,
    #[serde(rename = "fecha_cierre")]
    pub closing_date: Option<NaiveDate>,
    #[serde(rename = "fecha_adjudicacion")]
    pub award_date: Option<NaiveDate>,
    /// Derived from `award_date`.
    #[serde(rename = "anio_adjudicacion")]
    pub award_year: Option<i32>,
}

impl Project {
    pub fn is_awarded(&self) -> bool {
        is_awarded(self.status.as_deref())
    }

    /// Recompute derived fields after the source fields are set.
    pub fn derive(mut self) -> Self {
        self.award_year = self.award_date.map(|d| d.year());
        self
    }
}

// ---------------------------------------------------------------------------
// ProjectTable – a loaded (or filtered) set of projects
// ---------------------------------------------------------------------------

/// An immutable table of projects with pre-computed categorical indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectTable {
    /// All projects (rows), in source order.
    pub projects: Vec<Project>,
    /// Source columns that were present in the loaded file.
    pub present_columns: BTreeSet<Column>,
    /// For each categorical column the sorted set of observed values.
    pub unique_values: BTreeMap<Column, BTreeSet<String>>,
}

impl ProjectTable {
    /// Build categorical indices from the loaded projects.
    pub fn from_projects(projects: Vec<Project>, present_columns: BTreeSet<Column>) -> Self {
        let mut unique_values: BTreeMap<Column, BTreeSet<String>> = BTreeMap::new();
        for col in Column::CATEGORICAL {
            unique_values.insert(col, BTreeSet::new());
        }

        for project in &projects {
            for col in Column::CATEGORICAL {
                if let Some(value) = col.text(project) {
                    unique_values
                        .entry(col)
                        .or_default()
                        .insert(value.to_string());
                }
            }
        }

        ProjectTable {
            projects,
            present_columns,
            unique_values,
        }
    }

    /// A table with no rows, used when a source cannot be read.
    pub fn empty() -> Self {
        Self::from_projects(Vec::new(), BTreeSet::new())
    }

    /// A new table over `projects` sharing this table's column set.
    pub fn derived(&self, projects: Vec<Project>) -> Self {
        Self::from_projects(projects, self.present_columns.clone())
    }

    /// Sorted observed values of a categorical column.
    pub fn values(&self, column: Column) -> impl Iterator<Item = &str> {
        self.unique_values
            .get(&column)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.present_columns.contains(&column)
    }

    /// Number of projects.
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(region: &str, department: &str) -> Project {
        Project {
            region: Some(region.to_string()),
            department: Some(department.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn headers_resolve_with_aliases_and_case() {
        assert_eq!(Column::from_header(" Departamento "), Some(Column::Department));
        assert_eq!(Column::from_header("offer_count"), Some(Column::OfferCount));
        assert_eq!(Column::from_header("NOG"), Some(Column::Nog));
        assert_eq!(Column::from_header("unknown"), None);
    }

    #[test]
    fn awarded_status_is_trimmed_and_case_insensitive() {
        assert!(is_awarded(Some(" adjudicado ")));
        assert!(!is_awarded(Some("Pendiente")));
        assert!(!is_awarded(None));
    }

    #[test]
    fn derive_sets_award_year() {
        let p = Project {
            award_date: NaiveDate::from_ymd_opt(2022, 7, 1),
            ..Default::default()
        }
        .derive();
        assert_eq!(p.award_year, Some(2022));
        assert_eq!(Project::default().derive().award_year, None);
    }

    #[test]
    fn unique_values_are_sorted_and_skip_nulls() {
        let mut nameless = project("Sur", "Escuintla");
        nameless.region = None;
        let table = ProjectTable::from_projects(
            vec![project("Norte", "Alta Verapaz"), project("Central", "Escuintla"), nameless],
            BTreeSet::new(),
        );
        let regions: Vec<&str> = table.values(Column::Region).collect();
        assert_eq!(regions, vec!["Central", "Norte"]);
        assert_eq!(table.values(Column::Supplier).count(), 0);
    }
}
