use std::sync::Arc;

use serde::Serialize;

use crate::config::ViewSettings;
use crate::data::aggregate::{
    amount_by_department, amount_by_region, awards_timeline, compute_metrics, projects_by_type,
    recent_projects, status_breakdown, top_suppliers, GroupRow, MetricsSummary,
};
use crate::data::filter::{
    apply_filters, available_departments, filter_options, AmountRange, Choice, DateRange,
    FilterOptions, Selection,
};
use crate::data::model::{DateColumn, Project, ProjectTable};
use crate::geo::{join_departments, BoundaryShapes, DepartmentView};

// ---------------------------------------------------------------------------
// DashboardView – everything rendered for one filter state
// ---------------------------------------------------------------------------

/// The numbers and chart tables derived from one filtered table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub metrics: MetricsSummary,
    pub amount_by_region: Vec<GroupRow>,
    pub departments: DepartmentView,
    pub top_suppliers: Vec<GroupRow>,
    pub awards_timeline: Vec<GroupRow>,
    pub projects_by_type: Vec<GroupRow>,
    pub status_breakdown: Vec<GroupRow>,
    pub recent: Vec<Project>,
    /// Date column `recent` is ordered by.
    pub recent_by: DateColumn,
}

impl DashboardView {
    pub fn build(
        filtered: &ProjectTable,
        shapes: Option<&BoundaryShapes>,
        settings: &ViewSettings,
    ) -> Self {
        Self {
            metrics: compute_metrics(filtered),
            amount_by_region: amount_by_region(filtered),
            departments: join_departments(&amount_by_department(filtered), shapes),
            top_suppliers: top_suppliers(filtered, settings.top_n),
            awards_timeline: awards_timeline(filtered),
            projects_by_type: projects_by_type(filtered),
            status_breakdown: status_breakdown(filtered),
            recent: recent_projects(filtered, settings.recent_by, settings.recent_rows),
            recent_by: settings.recent_by,
        }
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// One session's state, independent of rendering.
#[derive(Default)]
pub struct DashboardState {
    /// Loaded base table (None until a source is loaded).
    pub base: Option<Arc<ProjectTable>>,

    /// Current filter selections.
    pub selection: Selection,

    /// Projects passing the current selection (cached).
    pub filtered: ProjectTable,

    /// Derived numbers for `filtered` (cached).
    pub view: Option<DashboardView>,

    /// Department boundaries for the map, when available.
    pub shapes: Option<Arc<BoundaryShapes>>,

    pub settings: ViewSettings,

    /// Status / error message shown to the user.
    pub status_message: Option<String>,
}

impl DashboardState {
    pub fn new(settings: ViewSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Ingest a newly loaded base table and reset the filters.
    pub fn set_dataset(&mut self, table: Arc<ProjectTable>) {
        self.selection = Selection::default();
        self.status_message = table
            .is_empty()
            .then(|| "No data available".to_string());
        self.base = Some(table);
        self.refilter();
    }

    pub fn set_shapes(&mut self, shapes: Option<Arc<BoundaryShapes>>) {
        self.shapes = shapes;
        self.refilter();
    }

    /// Recompute `filtered` and `view` from the base table.
    pub fn refilter(&mut self) {
        let Some(base) = &self.base else {
            return;
        };
        self.filtered = apply_filters(base, &self.selection);
        self.view = Some(DashboardView::build(
            &self.filtered,
            self.shapes.as_deref(),
            &self.settings,
        ));
    }

    /// Replace the whole selection. A department outside the selected
    /// region is kept as given (and matches nothing).
    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        self.refilter();
    }

    /// Change the region; the department resets when it is not offered
    /// under the new region.
    pub fn set_region(&mut self, region: Choice) {
        let department_offered = match (&self.base, &self.selection.department) {
            (Some(base), Choice::Only(dept)) => available_departments(base, &region).contains(dept),
            _ => true,
        };
        if !department_offered {
            self.selection.department = Choice::All;
        }
        self.selection.region = region;
        self.refilter();
    }

    pub fn set_department(&mut self, department: Choice) {
        self.selection.department = department;
        self.refilter();
    }

    pub fn set_project_type(&mut self, project_type: Choice) {
        self.selection.project_type = project_type;
        self.refilter();
    }

    pub fn set_status(&mut self, status: Choice) {
        self.selection.status = status;
        self.refilter();
    }

    pub fn set_amount_range(&mut self, range: Option<AmountRange>) {
        self.selection.amount_range = range;
        self.refilter();
    }

    pub fn set_date_range(&mut self, range: Option<DateRange>) {
        self.selection.date_range = range;
        self.refilter();
    }

    pub fn reset_filters(&mut self) {
        self.selection = Selection::default();
        self.refilter();
    }

    /// Selector options for the current region.
    pub fn options(&self) -> Option<FilterOptions> {
        self.base
            .as_deref()
            .map(|base| filter_options(base, &self.selection.region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::aggregate::GroupLabel;
    use std::collections::BTreeSet;

    fn project(region: &str, department: &str, status: &str, amount: Option<f64>) -> Project {
        Project {
            region: Some(region.to_string()),
            department: Some(department.to_string()),
            status: Some(status.to_string()),
            award_amount: amount,
            ..Default::default()
        }
    }

    fn state() -> DashboardState {
        let table = ProjectTable::from_projects(
            vec![
                project("Norte", "Alta Verapaz", "Adjudicado", Some(100.0)),
                project("Norte", "Baja Verapaz", "Pendiente", None),
                project("Sur", "Escuintla", "Adjudicado", Some(300.0)),
            ],
            BTreeSet::new(),
        );
        let mut state = DashboardState::new(ViewSettings::default());
        state.set_dataset(Arc::new(table));
        state
    }

    #[test]
    fn loading_computes_the_unfiltered_view() {
        let state = state();
        let view = state.view.as_ref().unwrap();
        assert_eq!(view.metrics.total_count, 3);
        assert_eq!(view.metrics.total_amount, 400.0);
        assert!(matches!(view.departments, DepartmentView::Tabular { .. }));
        assert_eq!(state.status_message, None);
    }

    #[test]
    fn region_change_resets_unavailable_department() {
        let mut state = state();
        state.set_department(Choice::only("Escuintla"));
        assert_eq!(state.filtered.len(), 1);

        state.set_region(Choice::only("Norte"));
        assert!(state.selection.department.is_all());
        assert_eq!(state.filtered.len(), 2);

        state.set_department(Choice::only("Alta Verapaz"));
        state.set_region(Choice::All);
        assert_eq!(state.selection.department, Choice::only("Alta Verapaz"));
        assert_eq!(state.options().unwrap().departments.len(), 3);
    }

    #[test]
    fn filters_recompute_the_view() {
        let mut state = state();
        state.set_amount_range(Some(AmountRange { min: 150.0, max: 400.0 }));
        let view = state.view.as_ref().unwrap();
        assert_eq!(view.metrics.total_count, 2);
        assert_eq!(
            view.amount_by_region.iter().map(|r| r.key.clone()).collect::<Vec<_>>(),
            vec![GroupLabel::Name("Norte".to_string()), GroupLabel::Name("Sur".to_string())]
        );

        state.set_status(Choice::only("Nada"));
        let view = state.view.as_ref().unwrap();
        assert_eq!(view.metrics.total_count, 0);
        assert_eq!(view.metrics.awarded_pct, None);

        state.reset_filters();
        assert_eq!(state.filtered.len(), 3);
    }

    #[test]
    fn base_table_is_never_mutated() {
        let mut state = state();
        let base = Arc::clone(state.base.as_ref().unwrap());
        let before = base.projects.clone();
        state.set_region(Choice::only("Sur"));
        state.set_project_type(Choice::only("Salud"));
        assert_eq!(base.projects, before);
    }

    #[test]
    fn empty_dataset_sets_a_status_message() {
        let mut state = DashboardState::default();
        state.set_dataset(Arc::new(ProjectTable::empty()));
        assert!(state.status_message.is_some());
        assert_eq!(state.view.as_ref().unwrap().metrics.total_count, 0);
        assert_eq!(state.options().unwrap().amount_bounds, (0.0, 5_000_000.0));
    }
}
