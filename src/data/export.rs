use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Date32Array, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Date32Type, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;

use super::model::{Column, Project};

/// Header of the derived award-year column in exported files.
const AWARD_YEAR_HEADER: &str = "anio_adjudicacion";

/// Write projects as CSV with the source headers, so the file loads back.
pub fn write_csv(projects: &[Project], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    if projects.is_empty() {
        // serde only emits the header alongside the first record
        let mut header: Vec<&str> = Column::ALL.iter().map(|c| c.header()).collect();
        header.push(AWARD_YEAR_HEADER);
        writer.write_record(&header)?;
    }
    for project in projects {
        writer.serialize(project).context("writing CSV record")?;
    }
    writer.flush().context("flushing CSV")?;

    log::info!("Wrote {} projects to {}", projects.len(), path.display());
    Ok(())
}

/// Columnar view of the projects, one Arrow column per source column.
pub fn projects_to_batch(projects: &[Project]) -> Result<RecordBatch, ArrowError> {
    let text = |col: Column| -> ArrayRef {
        Arc::new(StringArray::from(
            projects.iter().map(|p| col.text(p)).collect::<Vec<_>>(),
        ))
    };
    let date = |get: fn(&Project) -> Option<NaiveDate>| -> ArrayRef {
        Arc::new(Date32Array::from(
            projects
                .iter()
                .map(|p| get(p).map(Date32Type::from_naive_date))
                .collect::<Vec<_>>(),
        ))
    };

    let schema = Arc::new(Schema::new(vec![
        Field::new(Column::Nog.header(), DataType::Utf8, true),
        Field::new(Column::Description.header(), DataType::Utf8, true),
        Field::new(Column::Region.header(), DataType::Utf8, true),
        Field::new(Column::Department.header(), DataType::Utf8, true),
        Field::new(Column::ProjectType.header(), DataType::Utf8, true),
        Field::new(Column::Status.header(), DataType::Utf8, true),
        Field::new(Column::AwardAmount.header(), DataType::Float64, true),
        Field::new(Column::OfferCount.header(), DataType::Int64, true),
        Field::new(Column::Supplier.header(), DataType::Utf8, true),
        Field::new(Column::PublicationDate.header(), DataType::Date32, true),
        Field::new(Column::SubmissionDate.header(), DataType::Date32, true),
        Field::new(Column::ClosingDate.header(), DataType::Date32, true),
        Field::new(Column::AwardDate.header(), DataType::Date32, true),
        Field::new(AWARD_YEAR_HEADER, DataType::Int32, true),
    ]));

    RecordBatch::try_new(
        schema,
        vec![
            text(Column::Nog),
            text(Column::Description),
            text(Column::Region),
            text(Column::Department),
            text(Column::ProjectType),
            text(Column::Status),
            Arc::new(Float64Array::from(
                projects.iter().map(|p| p.award_amount).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(
                projects.iter().map(|p| p.offer_count).collect::<Vec<_>>(),
            )),
            text(Column::Supplier),
            date(|p| p.publication_date),
            date(|p| p.submission_date),
            date(|p| p.closing_date),
            date(|p| p.award_date),
            Arc::new(Int32Array::from(
                projects.iter().map(|p| p.award_year).collect::<Vec<_>>(),
            )),
        ],
    )
}

/// Write projects as a single-batch Parquet file.
pub fn write_parquet(projects: &[Project], path: &Path) -> Result<()> {
    let batch = projects_to_batch(projects).context("building record batch")?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;

    log::info!("Wrote {} projects to {}", projects.len(), path.display());
    Ok(())
}

/// Write to CSV or Parquet depending on the extension of `path`.
pub fn write_file(projects: &[Project], path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet" | "pq") => write_parquet(projects, path),
        _ => write_csv(projects, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load;

    fn sample() -> Vec<Project> {
        vec![
            Project {
                nog: Some("1001".to_string()),
                description: Some("Mejoramiento camino rural, tramo 2".to_string()),
                region: Some("Norte".to_string()),
                department: Some("Alta Verapaz".to_string()),
                project_type: Some("Infraestructura vial".to_string()),
                status: Some("Adjudicado".to_string()),
                award_amount: Some(1250.5),
                offer_count: Some(3),
                supplier: Some("Constructora Quetzal".to_string()),
                publication_date: NaiveDate::from_ymd_opt(2023, 1, 5),
                award_date: NaiveDate::from_ymd_opt(2023, 3, 15),
                ..Default::default()
            }
            .derive(),
            Project {
                nog: Some("1002".to_string()),
                region: Some("Sur".to_string()),
                department: Some("Escuintla".to_string()),
                project_type: Some("Salud".to_string()),
                status: Some("Publicado".to_string()),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn csv_export_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_file(&sample(), &path).unwrap();
        assert_eq!(load(&path).unwrap().projects, sample());
    }

    #[test]
    fn parquet_export_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        write_file(&sample(), &path).unwrap();
        assert_eq!(load(&path).unwrap().projects, sample());
    }

    #[test]
    fn empty_csv_export_keeps_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_csv(&[], &path).unwrap();
        let table = load(&path).unwrap();
        assert!(table.is_empty());
        assert!(table.has_column(Column::AwardDate));
    }

    #[test]
    fn batch_has_one_row_per_project() {
        let batch = projects_to_batch(&sample()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), Column::ALL.len() + 1);
    }
}
