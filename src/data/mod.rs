/// Data layer: project records, loading, filtering and aggregation.
///
/// Architecture:
/// ```text
///  .csv / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  decode + coerce → ProjectTable   (memoized by cache)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ ProjectTable  │  Vec<Project>, categorical indices
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  Selection → predicates → filtered ProjectTable
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ aggregate  │  metrics summary, grouped chart tables
///   └───────────┘
/// ```

pub mod aggregate;
pub mod cache;
pub mod error;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
