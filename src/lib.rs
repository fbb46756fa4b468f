//! Filter and aggregation pipeline behind the Guatecompras projects
//! dashboard: load a project table once, apply a [`data::filter::Selection`],
//! and derive the metrics and grouped tables a presentation layer draws.

pub mod config;
pub mod data;
pub mod geo;
pub mod report;
pub mod sample;
pub mod state;
