use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::filter::date_bounds;
use super::model::{DateColumn, Project, ProjectTable};

// ---------------------------------------------------------------------------
// Summary metrics
// ---------------------------------------------------------------------------

/// Scalar figures shown above the charts.
///
/// Ratios and means are `None` when there is nothing to divide by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_count: usize,
    pub awarded_count: usize,
    /// Awarded projects as a percentage of all projects.
    pub awarded_pct: Option<f64>,
    /// Sum of the known award amounts; `0.0` when none is known.
    pub total_amount: f64,
    pub mean_amount: Option<f64>,
    pub mean_offer_count: Option<f64>,
    /// Distinct suppliers among awarded projects.
    pub unique_suppliers: usize,
    /// Earliest and latest publication date.
    pub period: Option<(NaiveDate, NaiveDate)>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

pub fn compute_metrics(table: &ProjectTable) -> MetricsSummary {
    let projects = &table.projects;
    let total_count = projects.len();
    let awarded_count = projects.iter().filter(|p| p.is_awarded()).count();
    let awarded_pct =
        (total_count > 0).then(|| awarded_count as f64 / total_count as f64 * 100.0);

    let amounts = || projects.iter().filter_map(|p| p.award_amount);
    let unique_suppliers: BTreeSet<&str> = projects
        .iter()
        .filter(|p| p.is_awarded())
        .filter_map(|p| p.supplier.as_deref())
        .collect();

    MetricsSummary {
        total_count,
        awarded_count,
        awarded_pct,
        total_amount: amounts().sum(),
        mean_amount: mean(amounts()),
        mean_offer_count: mean(projects.iter().filter_map(|p| p.offer_count.map(|n| n as f64))),
        unique_suppliers: unique_suppliers.len(),
        period: date_bounds(table, DateColumn::Publication),
    }
}

// ---------------------------------------------------------------------------
// Group-by
// ---------------------------------------------------------------------------

/// Column a table is grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Region,
    Department,
    ProjectType,
    Status,
    /// Only awarded projects with a known supplier.
    Supplier,
    /// Only awarded projects with a known award date.
    AwardYear,
}

impl GroupKey {
    fn admits(self, project: &Project) -> bool {
        match self {
            GroupKey::Supplier => project.is_awarded() && project.supplier.is_some(),
            GroupKey::AwardYear => project.is_awarded() && project.award_year.is_some(),
            _ => true,
        }
    }

    fn label(self, project: &Project) -> GroupLabel {
        let name = |v: &Option<String>| {
            v.as_ref()
                .map_or(GroupLabel::Missing, |s| GroupLabel::Name(s.clone()))
        };
        match self {
            GroupKey::Region => name(&project.region),
            GroupKey::Department => name(&project.department),
            GroupKey::ProjectType => name(&project.project_type),
            GroupKey::Status => name(&project.status),
            GroupKey::Supplier => name(&project.supplier),
            GroupKey::AwardYear => project.award_year.map_or(GroupLabel::Missing, GroupLabel::Year),
        }
    }
}

/// Numeric column reduced within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Amount,
    OfferCount,
    /// Every row contributes `1.0`; used to count projects.
    Rows,
}

impl Metric {
    fn value(self, project: &Project) -> Option<f64> {
        match self {
            Metric::Amount => project.award_amount,
            Metric::OfferCount => project.offer_count.map(|n| n as f64),
            Metric::Rows => Some(1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AggOp {
    Sum,
    Mean,
    Count,
}

/// Key of one group. Years order numerically; rows with no key value
/// share the `Missing` group, which sorts last.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum GroupLabel {
    Year(i32),
    Name(String),
    Missing,
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupLabel::Year(y) => write!(f, "{y}"),
            GroupLabel::Name(s) => write!(f, "{s}"),
            GroupLabel::Missing => write!(f, "(sin dato)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: GroupLabel,
    /// `None` for the mean of a group with no known values.
    pub value: Option<f64>,
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    n: usize,
}

impl Accumulator {
    fn finish(&self, op: AggOp) -> Option<f64> {
        match op {
            AggOp::Sum => Some(self.sum),
            AggOp::Mean => (self.n > 0).then(|| self.sum / self.n as f64),
            AggOp::Count => Some(self.n as f64),
        }
    }
}

/// Group `table` by `key` and reduce `metric` with `op`, skipping null
/// metric values.
///
/// Without `top_n` the groups come back in ascending key order. With
/// `top_n` only groups with a value are ranked, by value descending and
/// then key ascending; award years are put back in chronological order
/// after ranking.
pub fn group_aggregate(
    table: &ProjectTable,
    key: GroupKey,
    metric: Metric,
    op: AggOp,
    top_n: Option<usize>,
) -> Vec<GroupRow> {
    let mut groups: BTreeMap<GroupLabel, Accumulator> = BTreeMap::new();
    for project in table.projects.iter().filter(|p| key.admits(p)) {
        let acc = groups.entry(key.label(project)).or_default();
        if let Some(v) = metric.value(project) {
            acc.sum += v;
            acc.n += 1;
        }
    }

    let rows: Vec<GroupRow> = groups
        .into_iter()
        .map(|(label, acc)| GroupRow {
            key: label,
            value: acc.finish(op),
        })
        .collect();

    let Some(n) = top_n else {
        return rows;
    };

    let mut ranked: Vec<GroupRow> = rows.into_iter().filter(|r| r.value.is_some()).collect();
    ranked.sort_by(|a, b| {
        let (va, vb) = (a.value.unwrap_or_default(), b.value.unwrap_or_default());
        vb.total_cmp(&va).then_with(|| a.key.cmp(&b.key))
    });
    ranked.truncate(n);
    if key == GroupKey::AwardYear {
        ranked.sort_by(|a, b| a.key.cmp(&b.key));
    }
    ranked
}

// -- Chart tables --

pub fn amount_by_region(table: &ProjectTable) -> Vec<GroupRow> {
    group_aggregate(table, GroupKey::Region, Metric::Amount, AggOp::Sum, None)
}

pub fn amount_by_department(table: &ProjectTable) -> Vec<GroupRow> {
    group_aggregate(table, GroupKey::Department, Metric::Amount, AggOp::Sum, None)
}

/// Suppliers with the largest awarded totals.
pub fn top_suppliers(table: &ProjectTable, n: usize) -> Vec<GroupRow> {
    group_aggregate(table, GroupKey::Supplier, Metric::Amount, AggOp::Sum, Some(n))
}

/// Awarded projects per award year, oldest first.
pub fn awards_timeline(table: &ProjectTable) -> Vec<GroupRow> {
    group_aggregate(table, GroupKey::AwardYear, Metric::Rows, AggOp::Count, None)
}

pub fn projects_by_type(table: &ProjectTable) -> Vec<GroupRow> {
    group_aggregate(table, GroupKey::ProjectType, Metric::Rows, AggOp::Count, None)
}

pub fn status_breakdown(table: &ProjectTable) -> Vec<GroupRow> {
    group_aggregate(table, GroupKey::Status, Metric::Rows, AggOp::Count, None)
}

/// The `n` most recent projects by `by`, newest first. Projects without
/// that date come last; ties keep table order.
pub fn recent_projects(table: &ProjectTable, by: DateColumn, n: usize) -> Vec<Project> {
    let mut rows: Vec<&Project> = table.projects.iter().collect();
    rows.sort_by_key(|p| Reverse(by.get(p)));
    rows.into_iter().take(n).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::{apply_filters, Choice, Selection};

    fn project(region: Option<&str>, status: &str, amount: Option<f64>) -> Project {
        Project {
            region: region.map(str::to_string),
            status: Some(status.to_string()),
            award_amount: amount,
            ..Default::default()
        }
    }

    fn three_rows() -> ProjectTable {
        ProjectTable::from_projects(
            vec![
                project(Some("Norte"), "Adjudicado", Some(100.0)),
                project(Some("Norte"), "Pendiente", None),
                project(Some("Sur"), "Adjudicado", Some(300.0)),
            ],
            BTreeSet::new(),
        )
    }

    fn award(supplier: &str, amount: f64, year: Option<i32>) -> Project {
        Project {
            supplier: Some(supplier.to_string()),
            award_date: year.and_then(|y| NaiveDate::from_ymd_opt(y, 6, 1)),
            ..project(Some("Norte"), "Adjudicado", Some(amount))
        }
        .derive()
    }

    fn label(s: &str) -> GroupLabel {
        GroupLabel::Name(s.to_string())
    }

    #[test]
    fn metrics_after_region_filter() {
        let sel = Selection {
            region: Choice::only("Norte"),
            ..Default::default()
        };
        let m = compute_metrics(&apply_filters(&three_rows(), &sel));
        assert_eq!(m.total_count, 2);
        assert_eq!(m.awarded_count, 1);
        assert_eq!(m.awarded_pct, Some(50.0));
        assert_eq!(m.total_amount, 100.0);
        assert_eq!(m.mean_amount, Some(100.0));
        assert_eq!(m.mean_offer_count, None);
    }

    #[test]
    fn metrics_on_empty_table() {
        let m = compute_metrics(&ProjectTable::empty());
        assert_eq!(m.total_count, 0);
        assert_eq!(m.awarded_count, 0);
        assert_eq!(m.awarded_pct, None);
        assert_eq!(m.total_amount, 0.0);
        assert_eq!(m.mean_amount, None);
        assert_eq!(m.mean_offer_count, None);
        assert_eq!(m.period, None);
    }

    #[test]
    fn inconsistent_award_data_is_tolerated() {
        let table = ProjectTable::from_projects(
            vec![
                project(Some("Norte"), "Adjudicado", None),
                project(Some("Norte"), "Cancelado", Some(50.0)),
            ],
            BTreeSet::new(),
        );
        let m = compute_metrics(&table);
        assert_eq!(m.awarded_count, 1);
        assert_eq!(m.total_amount, 50.0);
        assert_eq!(m.mean_amount, Some(50.0));
    }

    #[test]
    fn sum_by_region_scenario() {
        let rows = amount_by_region(&three_rows());
        assert_eq!(
            rows,
            vec![
                GroupRow { key: label("Norte"), value: Some(100.0) },
                GroupRow { key: label("Sur"), value: Some(300.0) },
            ]
        );
    }

    #[test]
    fn group_sums_conserve_the_total() {
        let mut table = three_rows();
        table.projects.push(project(None, "Adjudicado", Some(42.0)));
        let grouped: f64 = amount_by_region(&table).iter().filter_map(|r| r.value).sum();
        assert_eq!(grouped, compute_metrics(&table).total_amount);
        assert_eq!(amount_by_region(&table).last().unwrap().key, GroupLabel::Missing);
    }

    #[test]
    fn mean_of_all_null_group_is_none_and_not_ranked() {
        let table = three_rows();
        let all = group_aggregate(&table, GroupKey::Status, Metric::Amount, AggOp::Mean, None);
        assert_eq!(all[1], GroupRow { key: label("Pendiente"), value: None });

        let ranked = group_aggregate(&table, GroupKey::Status, Metric::Amount, AggOp::Mean, Some(5));
        assert_eq!(ranked, vec![GroupRow { key: label("Adjudicado"), value: Some(200.0) }]);
    }

    #[test]
    fn count_ignores_null_metric_values() {
        let rows = group_aggregate(&three_rows(), GroupKey::Region, Metric::Amount, AggOp::Count, None);
        assert_eq!(rows[0].value, Some(1.0));
        let rows = projects_by_type(&three_rows());
        assert_eq!(rows, vec![GroupRow { key: GroupLabel::Missing, value: Some(3.0) }]);
    }

    #[test]
    fn top_n_breaks_ties_by_key() {
        let table = ProjectTable::from_projects(
            vec![
                award("Zeta", 100.0, None),
                award("Alfa", 100.0, None),
                award("Beta", 500.0, None),
                award("Gama", 10.0, None),
            ],
            BTreeSet::new(),
        );
        let keys: Vec<GroupLabel> = top_suppliers(&table, 3).into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![label("Beta"), label("Alfa"), label("Zeta")]);
    }

    #[test]
    fn suppliers_only_count_awarded_projects() {
        let mut pending = award("Omega", 900.0, None);
        pending.status = Some("Pendiente".to_string());
        let table = ProjectTable::from_projects(
            vec![pending, award("Alfa", 10.0, None), project(Some("Sur"), "Adjudicado", Some(5.0))],
            BTreeSet::new(),
        );
        assert_eq!(
            top_suppliers(&table, 10),
            vec![GroupRow { key: label("Alfa"), value: Some(10.0) }]
        );
        assert_eq!(compute_metrics(&table).unique_suppliers, 1);
    }

    #[test]
    fn timeline_is_chronological() {
        let mut projects = vec![award("A", 1.0, Some(2023))];
        for _ in 0..5 {
            projects.push(award("B", 1.0, Some(2019)));
        }
        projects.push(award("C", 1.0, Some(2021)));
        projects.push(award("D", 1.0, None));
        let table = ProjectTable::from_projects(projects, BTreeSet::new());

        let timeline = awards_timeline(&table);
        let years: Vec<GroupLabel> = timeline.iter().map(|r| r.key.clone()).collect();
        assert_eq!(years, vec![GroupLabel::Year(2019), GroupLabel::Year(2021), GroupLabel::Year(2023)]);
        assert_eq!(timeline[0].value, Some(5.0));

        let top = group_aggregate(&table, GroupKey::AwardYear, Metric::Rows, AggOp::Count, Some(2));
        let years: Vec<GroupLabel> = top.into_iter().map(|r| r.key).collect();
        assert_eq!(years, vec![GroupLabel::Year(2019), GroupLabel::Year(2021)]);
    }

    #[test]
    fn aggregates_of_empty_table_are_empty() {
        let empty = ProjectTable::empty();
        assert!(amount_by_region(&empty).is_empty());
        assert!(top_suppliers(&empty, 5).is_empty());
        assert!(awards_timeline(&empty).is_empty());
    }

    #[test]
    fn recent_projects_newest_first_nulls_last() {
        let dated = |nog: &str, day: Option<u32>| Project {
            nog: Some(nog.to_string()),
            publication_date: day.and_then(|d| NaiveDate::from_ymd_opt(2024, 1, d)),
            ..Default::default()
        };
        let table = ProjectTable::from_projects(
            vec![dated("a", None), dated("b", Some(3)), dated("c", Some(9)), dated("d", Some(3))],
            BTreeSet::new(),
        );
        let nogs: Vec<String> = recent_projects(&table, DateColumn::Publication, 4)
            .into_iter()
            .filter_map(|p| p.nog)
            .collect();
        assert_eq!(nogs, vec!["c", "b", "d", "a"]);
        assert_eq!(recent_projects(&table, DateColumn::Publication, 1).len(), 1);
    }
}
