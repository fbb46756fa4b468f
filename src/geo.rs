//! Department boundary shapes and the amount-by-department map join.
//!
//! Shapes are an optional remote GeoJSON document. Any failure to fetch or
//! match them leaves the per-department amounts as a plain table.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::data::aggregate::{GroupLabel, GroupRow};

/// Guatemala first-level administrative boundaries (departments).
pub const DEFAULT_SHAPES_URL: &str = "https://github.com/wmgeolab/geoBoundaries/raw/main/releaseData/gbOpen/GTM/ADM1/geoBoundaries-GTM-ADM1.geojson";

/// Feature properties searched, in order, for the department name.
pub const NAME_PROPERTIES: [&str; 5] = ["shapeName", "NAME_1", "name", "departamento", "DEPARTAMENTO"];

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("fetching boundary shapes failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("boundary shapes are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed boundary shapes: {0}")]
    Malformed(String),
}

/// Join key between project departments and shape names.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// BoundaryShapes
// ---------------------------------------------------------------------------

/// Geometries keyed by normalized department name.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryShapes {
    geometries: BTreeMap<String, Value>,
}

impl BoundaryShapes {
    /// Read a GeoJSON `FeatureCollection`. Features without a name or a
    /// geometry are skipped; a collection with none left is malformed.
    pub fn from_geojson(doc: &Value) -> Result<Self, GeoError> {
        let features = doc
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| GeoError::Malformed("missing 'features' array".to_string()))?;

        let mut geometries = BTreeMap::new();
        for feature in features {
            let props = feature.get("properties");
            let name = NAME_PROPERTIES
                .iter()
                .find_map(|key| props.and_then(|p| p.get(*key)).and_then(Value::as_str));
            let (Some(name), Some(geometry)) = (name, feature.get("geometry")) else {
                continue;
            };
            geometries.insert(normalize_name(name), geometry.clone());
        }

        if geometries.is_empty() {
            return Err(GeoError::Malformed("no named features".to_string()));
        }
        Ok(Self { geometries })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, GeoError> {
        let doc: Value = serde_json::from_slice(bytes)?;
        Self::from_geojson(&doc)
    }

    pub fn contains(&self, department: &str) -> bool {
        self.geometries.contains_key(&normalize_name(department))
    }

    pub fn geometry(&self, department: &str) -> Option<&Value> {
        self.geometries.get(&normalize_name(department))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.geometries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}

/// One blocking GET, no retry.
pub fn fetch_shapes(url: &str) -> Result<BoundaryShapes, GeoError> {
    log::info!("Fetching boundary shapes from {url}");
    let doc: Value = reqwest::blocking::get(url)?.error_for_status()?.json()?;
    let shapes = BoundaryShapes::from_geojson(&doc)?;
    log::info!("Loaded {} boundary shapes", shapes.len());
    Ok(shapes)
}

// ---------------------------------------------------------------------------
// Map join
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedDepartment {
    /// Normalized name, as found in the shapes.
    pub name: String,
    pub amount: f64,
}

/// Per-department amounts, either joined to shapes or as a plain table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DepartmentView {
    Spatial {
        matched: Vec<MappedDepartment>,
        /// Departments with no shape, kept so no amount disappears.
        unmatched: Vec<GroupRow>,
    },
    Tabular {
        rows: Vec<GroupRow>,
    },
}

/// Match per-department amounts against the shapes by normalized name.
/// Falls back to [`DepartmentView::Tabular`] when there are no shapes or
/// nothing matches.
pub fn join_departments(amounts: &[GroupRow], shapes: Option<&BoundaryShapes>) -> DepartmentView {
    let tabular = || DepartmentView::Tabular {
        rows: amounts.to_vec(),
    };
    let Some(shapes) = shapes else {
        return tabular();
    };

    let mut matched: BTreeMap<String, f64> = BTreeMap::new();
    let mut unmatched = Vec::new();
    for row in amounts {
        match &row.key {
            GroupLabel::Name(name) if shapes.contains(name) => {
                *matched.entry(normalize_name(name)).or_default() += row.value.unwrap_or_default();
            }
            _ => unmatched.push(row.clone()),
        }
    }

    if matched.is_empty() {
        if !amounts.is_empty() {
            log::warn!("No department matched the boundary shapes; showing a table instead");
        }
        return tabular();
    }
    if !unmatched.is_empty() {
        log::info!("{} department(s) have no boundary shape", unmatched.len());
    }

    DepartmentView::Spatial {
        matched: matched
            .into_iter()
            .map(|(name, amount)| MappedDepartment { name, amount })
            .collect(),
        unmatched,
    }
}

// ---------------------------------------------------------------------------
// ShapeCache
// ---------------------------------------------------------------------------

/// Successful shape fetches memoized by URL. Failures are not remembered,
/// so a later render tries again.
#[derive(Default)]
pub struct ShapeCache {
    entries: Mutex<HashMap<String, Arc<BoundaryShapes>>>,
}

static GLOBAL: Lazy<ShapeCache> = Lazy::new(ShapeCache::default);

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static ShapeCache {
        &GLOBAL
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<BoundaryShapes>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_or_fetch(&self, url: &str) -> Result<Arc<BoundaryShapes>, GeoError> {
        self.get_or_fetch_with(url, fetch_shapes)
    }

    pub fn get_or_fetch_with(
        &self,
        url: &str,
        fetch: impl FnOnce(&str) -> Result<BoundaryShapes, GeoError>,
    ) -> Result<Arc<BoundaryShapes>, GeoError> {
        if let Some(shapes) = self.lock().get(url) {
            return Ok(Arc::clone(shapes));
        }
        let shapes = Arc::new(fetch(url)?);
        self.lock().insert(url.to_string(), Arc::clone(&shapes));
        Ok(shapes)
    }

    /// Shapes for `url`, or `None` after logging why they are unavailable.
    pub fn shapes_or_fallback(&self, url: &str) -> Option<Arc<BoundaryShapes>> {
        match self.get_or_fetch(url) {
            Ok(shapes) => Some(shapes),
            Err(e) => {
                log::warn!("Boundary shapes unavailable, using tabular view: {e}");
                None
            }
        }
    }
}
