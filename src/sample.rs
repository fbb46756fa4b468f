//! Synthetic procurement projects used when no real source file exists.

use std::path::Path;

use chrono::{Days, NaiveDate};

use crate::data::error::LoadError;
use crate::data::export::write_csv;
use crate::data::loader::{load_with, LoadOptions};
use crate::data::model::{Column, Project, ProjectTable, AWARDED_STATUS};

/// Regions of Guatemala and their departments.
pub const REGIONS: [(&str, &[&str]); 8] = [
    ("Metropolitana", &["Guatemala"]),
    ("Norte", &["Alta Verapaz", "Baja Verapaz"]),
    ("Nororiente", &["El Progreso", "Izabal", "Zacapa", "Chiquimula"]),
    ("Suroriente", &["Santa Rosa", "Jalapa", "Jutiapa"]),
    ("Central", &["Sacatepéquez", "Chimaltenango", "Escuintla"]),
    (
        "Suroccidente",
        &["Sololá", "Totonicapán", "Quetzaltenango", "Suchitepéquez", "Retalhuleu", "San Marcos"],
    ),
    ("Noroccidente", &["Huehuetenango", "Quiché"]),
    ("Petén", &["Petén"]),
];

const PROJECT_TYPES: [&str; 6] = [
    "Infraestructura vial",
    "Agua y saneamiento",
    "Educación",
    "Salud",
    "Edificación municipal",
    "Energía",
];

const OPEN_STATUSES: [&str; 4] = ["Publicado", "En evaluación", "Desierto", "Cancelado"];

const SUPPLIERS: [&str; 8] = [
    "Constructora Quetzal, S.A.",
    "Ingenieros Asociados del Norte",
    "Desarrollos Maya, S.A.",
    "Obras Civiles Atitlán",
    "Servicios Técnicos Izabal",
    "Consorcio Vial Occidente",
    "Hidro Soluciones, S.A.",
    "Grupo Constructor Petén",
];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len())]
    }

    fn days(&mut self, lo: u64, hi: u64) -> Days {
        Days::new(lo + self.next_u64() % (hi - lo + 1))
    }
}

/// Generate `count` projects. The same seed always yields the same rows.
///
/// Roughly 45% of the projects are awarded; only those carry a supplier,
/// an amount and an award date.
pub fn generate_projects(count: usize, seed: u64) -> Vec<Project> {
    let mut rng = SimpleRng::new(seed);
    let first_day = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or(NaiveDate::MIN);

    (0..count)
        .map(|i| {
            let (region, departments) = *rng.pick(&REGIONS);
            let department = *rng.pick(departments);
            let project_type = *rng.pick(&PROJECT_TYPES);
            let awarded = rng.next_f64() < 0.45;
            let status = if awarded {
                AWARDED_STATUS
            } else {
                *rng.pick(&OPEN_STATUSES)
            };

            let published = first_day + rng.days(0, 5 * 365);
            let submission = published + rng.days(10, 30);
            let closing = submission + rng.days(1, 15);
            let award_date = awarded.then(|| closing + rng.days(15, 90));

            // log-uniform between Q50k and Q5M
            let amount = awarded.then(|| {
                let exponent = 50_000f64.ln() + rng.next_f64() * (100f64).ln();
                (exponent.exp() * 100.0).round() / 100.0
            });
            let offers = (status != "Publicado").then(|| rng.below(9) as i64);

            Project {
                nog: Some((10_000_000 + i).to_string()),
                description: Some(format!("{project_type} en {department}")),
                region: Some(region.to_string()),
                department: Some(department.to_string()),
                project_type: Some(project_type.to_string()),
                status: Some(status.to_string()),
                award_amount: amount,
                offer_count: offers,
                supplier: awarded.then(|| rng.pick(&SUPPLIERS).to_string()),
                publication_date: Some(published),
                submission_date: Some(submission),
                closing_date: Some(closing),
                award_date,
                award_year: None,
            }
            .derive()
        })
        .collect()
}

pub fn sample_table(count: usize, seed: u64) -> ProjectTable {
    ProjectTable::from_projects(generate_projects(count, seed), Column::ALL.into_iter().collect())
}

/// Seed used for the cached fallback dataset.
pub const DEFAULT_SEED: u64 = 42;

/// Load `source`; when it does not exist, load the sample cache instead,
/// generating and writing it first if needed. A failed cache write only
/// costs a regeneration on the next run.
pub fn load_or_generate(
    source: &Path,
    sample_cache: &Path,
    count: usize,
    options: &LoadOptions,
) -> Result<ProjectTable, LoadError> {
    if source.exists() {
        return load_with(source, options);
    }
    log::warn!("{} not found, using sample data", source.display());

    if sample_cache.exists() {
        return load_with(sample_cache, options);
    }

    let table = sample_table(count, DEFAULT_SEED);
    if let Err(e) = write_csv(&table.projects, sample_cache) {
        log::warn!("Could not cache sample data at {}: {e:#}", sample_cache.display());
    }
    Ok(table)
}
