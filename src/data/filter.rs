use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::model::{Column, DateColumn, Project, ProjectTable};

// ---------------------------------------------------------------------------
// Choice: a single-value selector with an "all" sentinel
// ---------------------------------------------------------------------------

/// Strings that mean "no constraint" for a selector.
pub const ALL_SENTINELS: [&str; 3] = ["all", "todos", "todas"];

/// A dropdown selection: everything, or exactly one value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Choice {
    #[default]
    All,
    Only(String),
}

impl Choice {
    pub fn only(value: impl Into<String>) -> Self {
        Choice::from(value.into())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Choice::All)
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Choice::All => None,
            Choice::Only(v) => Some(v),
        }
    }
}

impl From<String> for Choice {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || ALL_SENTINELS.iter().any(|a| trimmed.eq_ignore_ascii_case(a)) {
            Choice::All
        } else {
            Choice::Only(trimmed.to_string())
        }
    }
}

impl From<Choice> for String {
    fn from(choice: Choice) -> Self {
        match choice {
            Choice::All => ALL_SENTINELS[0].to_string(),
            Choice::Only(v) => v,
        }
    }
}

// ---------------------------------------------------------------------------
// Selection: the full filter state supplied by the presentation layer
// ---------------------------------------------------------------------------

/// Inclusive bounds over `award_amount`. Projects without an amount are
/// never removed by this range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: f64,
    pub max: f64,
}

impl AmountRange {
    pub fn admits(&self, amount: Option<f64>) -> bool {
        match amount {
            None => true,
            Some(v) => self.min <= v && v <= self.max,
        }
    }
}

/// Inclusive bounds over one date column. Projects with no date in that
/// column are removed while this range is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub column: DateColumn,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn admits(&self, project: &Project) -> bool {
        self.column
            .get(project)
            .is_some_and(|d| self.start <= d && d <= self.end)
    }
}

/// Per-selector filter state. Every field defaults to "no constraint".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    pub region: Choice,
    pub department: Choice,
    pub project_type: Choice,
    pub status: Choice,
    pub amount_range: Option<AmountRange>,
    pub date_range: Option<DateRange>,
}

impl Selection {
    /// Lower the active options into predicates. Inactive options produce
    /// nothing, so an unconstrained selection yields an empty list.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut preds = Vec::new();
        let choices = [
            (Column::Region, &self.region),
            (Column::Department, &self.department),
            (Column::ProjectType, &self.project_type),
            (Column::Status, &self.status),
        ];
        for (column, choice) in choices {
            // a hand-built `Choice::Only` may carry padding or be blank
            match choice.value().map(str::trim) {
                Some(value) if !value.is_empty() => {
                    preds.push(Predicate::Equals(column, value.to_string()));
                }
                _ => {}
            }
        }
        if let Some(range) = self.amount_range {
            preds.push(Predicate::Amount(range));
        }
        if let Some(range) = self.date_range {
            preds.push(Predicate::Date(range));
        }
        preds
    }

    pub fn is_unconstrained(&self) -> bool {
        self.predicates().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Predicates and filtering
// ---------------------------------------------------------------------------

/// One active row constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact match on a categorical column.
    Equals(Column, String),
    Amount(AmountRange),
    Date(DateRange),
}

impl Predicate {
    pub fn matches(&self, project: &Project) -> bool {
        match self {
            Predicate::Equals(column, value) => column.text(project) == Some(value.trim()),
            Predicate::Amount(range) => range.admits(project.award_amount),
            Predicate::Date(range) => range.admits(project),
        }
    }
}

/// Return indices of projects that pass all predicates, in table order.
///
/// Each predicate narrows the surviving indices in turn; once nothing
/// survives the remaining predicates are skipped.
pub fn filtered_indices(table: &ProjectTable, predicates: &[Predicate]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..table.len()).collect();
    for pred in predicates {
        if indices.is_empty() {
            break;
        }
        indices.retain(|&i| pred.matches(&table.projects[i]));
        log::trace!("{pred:?} -> {} rows", indices.len());
    }
    indices
}

/// Build the table of projects passing every predicate.
pub fn apply_predicates(table: &ProjectTable, predicates: &[Predicate]) -> ProjectTable {
    let projects = filtered_indices(table, predicates)
        .into_iter()
        .map(|i| table.projects[i].clone())
        .collect();
    table.derived(projects)
}

/// Apply a selection to a base table. The base table is left untouched.
pub fn apply_filters(table: &ProjectTable, selection: &Selection) -> ProjectTable {
    let filtered = apply_predicates(table, &selection.predicates());
    log::debug!("Filtered {} -> {} projects", table.len(), filtered.len());
    filtered
}

// ---------------------------------------------------------------------------
// Selector options
// ---------------------------------------------------------------------------

/// Fallback slider bounds when no project carries an amount.
pub const DEFAULT_AMOUNT_BOUNDS: (f64, f64) = (0.0, 5_000_000.0);

/// Departments observed within `region` (all departments for `All`).
pub fn available_departments(table: &ProjectTable, region: &Choice) -> BTreeSet<String> {
    match region {
        Choice::All => table.values(Column::Department).map(str::to_string).collect(),
        Choice::Only(region) => table
            .projects
            .iter()
            .filter(|p| p.region.as_deref() == Some(region.as_str()))
            .filter_map(|p| p.department.clone())
            .collect(),
    }
}

/// Min and max of the non-null award amounts.
pub fn amount_bounds(table: &ProjectTable) -> (f64, f64) {
    let mut amounts = table.projects.iter().filter_map(|p| p.award_amount);
    let Some(first) = amounts.next() else {
        return DEFAULT_AMOUNT_BOUNDS;
    };
    amounts.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Earliest and latest date in a date column.
pub fn date_bounds(table: &ProjectTable, column: DateColumn) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = table.projects.iter().filter_map(|p| column.get(p));
    let first = dates.next()?;
    Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

/// Everything a sidebar needs to present the selectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub regions: Vec<String>,
    /// Restricted to the currently selected region.
    pub departments: Vec<String>,
    pub project_types: Vec<String>,
    pub statuses: Vec<String>,
    pub amount_bounds: (f64, f64),
    pub publication_bounds: Option<(NaiveDate, NaiveDate)>,
}

pub fn filter_options(table: &ProjectTable, region: &Choice) -> FilterOptions {
    let values = |col: Column| table.values(col).map(str::to_string).collect::<Vec<_>>();
    FilterOptions {
        regions: values(Column::Region),
        departments: available_departments(table, region).into_iter().collect(),
        project_types: values(Column::ProjectType),
        statuses: values(Column::Status),
        amount_bounds: amount_bounds(table),
        publication_bounds: date_bounds(table, DateColumn::Publication),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(region: &str, status: &str, amount: Option<f64>) -> Project {
        Project {
            region: Some(region.to_string()),
            department: Some(format!("{region}-dep")),
            project_type: Some("Salud".to_string()),
            status: Some(status.to_string()),
            award_amount: amount,
            ..Default::default()
        }
    }

    fn three_rows() -> ProjectTable {
        ProjectTable::from_projects(
            vec![
                project("Norte", "Adjudicado", Some(100.0)),
                project("Norte", "Pendiente", None),
                project("Sur", "Adjudicado", Some(300.0)),
            ],
            BTreeSet::new(),
        )
    }

    fn dated(date: Option<(i32, u32, u32)>) -> Project {
        Project {
            publication_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            ..project("Norte", "Adjudicado", Some(1.0))
        }
    }

    fn permutations(items: &[Predicate]) -> Vec<Vec<Predicate>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn choice_sentinels() {
        assert_eq!(Choice::from("Todas".to_string()), Choice::All);
        assert_eq!(Choice::from(" ALL ".to_string()), Choice::All);
        assert_eq!(Choice::from(String::new()), Choice::All);
        assert_eq!(Choice::only(" Norte "), Choice::Only("Norte".to_string()));
    }

    #[test]
    fn selection_deserializes_from_json() {
        let sel: Selection = serde_json::from_str(
            r#"{"region": "Norte", "status": "Todos", "amount_range": {"min": 1, "max": 2},
                "date_range": {"start": "2023-01-01", "end": "2023-12-31"}}"#,
        )
        .unwrap();
        assert_eq!(sel.region, Choice::only("Norte"));
        assert!(sel.status.is_all());
        assert!(sel.department.is_all());
        assert_eq!(sel.amount_range, Some(AmountRange { min: 1.0, max: 2.0 }));
        assert_eq!(sel.date_range.unwrap().column, DateColumn::Publication);
        assert_eq!(sel.predicates().len(), 3);
    }

    #[test]
    fn unconstrained_selection_returns_everything_in_order() {
        let table = three_rows();
        let out = apply_filters(&table, &Selection::default());
        assert_eq!(out.projects, table.projects);
    }

    #[test]
    fn region_filter_scenario() {
        let table = three_rows();
        let sel = Selection {
            region: Choice::only("Norte"),
            ..Default::default()
        };
        let out = apply_filters(&table, &sel);
        assert_eq!(out.len(), 2);
        assert!(out.projects.iter().all(|p| p.region.as_deref() == Some("Norte")));
    }

    #[test]
    fn padded_choice_matches_trimmed_cells() {
        let table = three_rows();
        let sel = Selection {
            region: Choice::Only(" Norte ".to_string()),
            status: Choice::Only("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(sel.predicates(), vec![Predicate::Equals(Column::Region, "Norte".to_string())]);
        assert_eq!(apply_filters(&table, &sel).len(), 2);

        let direct = Predicate::Equals(Column::Status, "Adjudicado ".to_string());
        assert_eq!(apply_predicates(&table, &[direct]).len(), 2);
    }

    #[test]
    fn amount_range_keeps_null_amounts() {
        let table = three_rows();
        let sel = Selection {
            amount_range: Some(AmountRange { min: 150.0, max: 400.0 }),
            ..Default::default()
        };
        let out = apply_filters(&table, &sel);
        let amounts: Vec<Option<f64>> = out.projects.iter().map(|p| p.award_amount).collect();
        assert_eq!(amounts, vec![None, Some(300.0)]);
    }

    #[test]
    fn amount_range_inclusion_law() {
        let range = AmountRange { min: 100.0, max: 300.0 };
        assert!(range.admits(None));
        assert!(range.admits(Some(100.0)));
        assert!(range.admits(Some(300.0)));
        assert!(!range.admits(Some(99.99)));
        assert!(!range.admits(Some(300.01)));
        let empty = AmountRange { min: 10.0, max: 1.0 };
        assert!(empty.admits(None));
        assert!(!empty.admits(Some(5.0)));
    }

    #[test]
    fn date_range_excludes_null_dates() {
        let table = ProjectTable::from_projects(
            vec![
                dated(Some((2023, 1, 1))),
                dated(None),
                dated(Some((2023, 6, 30))),
                dated(Some((2024, 1, 1))),
            ],
            BTreeSet::new(),
        );
        let sel = Selection {
            date_range: Some(DateRange {
                column: DateColumn::Publication,
                start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
            }),
            ..Default::default()
        };
        let out = apply_filters(&table, &sel);
        assert_eq!(out.len(), 2);
        assert!(out.projects.iter().all(|p| p.publication_date.is_some()));
    }

    #[test]
    fn filtering_is_idempotent() {
        let table = three_rows();
        let sel = Selection {
            status: Choice::only("Adjudicado"),
            amount_range: Some(AmountRange { min: 0.0, max: 200.0 }),
            ..Default::default()
        };
        let once = apply_filters(&table, &sel);
        assert_eq!(once, apply_filters(&table, &sel));
        assert_eq!(apply_filters(&once, &sel).projects, once.projects);
    }

    #[test]
    fn predicate_order_does_not_matter() {
        let mut table = three_rows();
        table.projects.push(dated(Some((2023, 3, 1))));
        table.projects.push(dated(None));
        let sel = Selection {
            region: Choice::only("Norte"),
            status: Choice::only("Adjudicado"),
            amount_range: Some(AmountRange { min: 0.0, max: 150.0 }),
            date_range: Some(DateRange {
                column: DateColumn::Publication,
                start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            }),
            ..Default::default()
        };
        let preds = sel.predicates();
        let expected = filtered_indices(&table, &preds);
        assert_eq!(expected, vec![3]);
        for order in permutations(&preds) {
            assert_eq!(filtered_indices(&table, &order), expected);
        }
    }

    #[test]
    fn unknown_department_yields_empty_result() {
        let table = three_rows();
        let sel = Selection {
            region: Choice::only("Norte"),
            department: Choice::only("Sur-dep"),
            ..Default::default()
        };
        assert!(apply_filters(&table, &sel).is_empty());
    }

    #[test]
    fn dependent_department_options() {
        let mut table = three_rows();
        // A department recorded under two regions stays visible under both.
        table.projects.push(Project {
            department: Some("Norte-dep".to_string()),
            ..project("Sur", "Pendiente", None)
        });
        let table = table.derived(table.projects.clone());

        let norte = available_departments(&table, &Choice::only("Norte"));
        assert_eq!(norte.into_iter().collect::<Vec<_>>(), vec!["Norte-dep"]);
        let sur = available_departments(&table, &Choice::only("Sur"));
        assert_eq!(sur.len(), 2);
        assert_eq!(available_departments(&table, &Choice::All).len(), 2);
        assert!(available_departments(&table, &Choice::only("Oriente")).is_empty());
    }

    #[test]
    fn options_and_bounds() {
        let table = three_rows();
        let opts = filter_options(&table, &Choice::All);
        assert_eq!(opts.regions, vec!["Norte", "Sur"]);
        assert_eq!(opts.statuses, vec!["Adjudicado", "Pendiente"]);
        assert_eq!(opts.amount_bounds, (100.0, 300.0));
        assert_eq!(opts.publication_bounds, None);
        assert_eq!(amount_bounds(&ProjectTable::empty()), DEFAULT_AMOUNT_BOUNDS);
    }
}
