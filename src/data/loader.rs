use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use arrow::array::Array;
use arrow::util::display::array_value_to_string;
use chrono::{Datelike, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

use super::error::LoadError;
use super::model::{Column, Project, ProjectTable};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Text encodings tried, in order, when decoding a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    /// Read as Windows-1252, the code page spreadsheet exports label "latin-1".
    #[serde(rename = "latin-1")]
    Latin1,
    #[serde(rename = "iso-8859-1")]
    Iso8859_1,
}

impl TextEncoding {
    pub const DEFAULT_ORDER: [TextEncoding; 3] = [
        TextEncoding::Utf8,
        TextEncoding::Latin1,
        TextEncoding::Iso8859_1,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Iso8859_1 => "iso-8859-1",
        }
    }

    /// Decode `bytes`, or `None` if they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(bytes).ok().map(str::to_string)
            }
            TextEncoding::Latin1 => bytes
                .iter()
                .map(|&b| match b {
                    0x80..=0x9F => WINDOWS_1252_C1[(b - 0x80) as usize],
                    _ => Some(char::from(b)),
                })
                .collect(),
            TextEncoding::Iso8859_1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Windows-1252 mapping of 0x80..=0x9F; `None` marks the undefined bytes.
const WINDOWS_1252_C1: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// How a source file is read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadOptions {
    /// Candidate encodings in priority order.
    pub encodings: Vec<TextEncoding>,
    /// Field delimiter; sniffed from the header line when `None`.
    pub delimiter: Option<u8>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            encodings: TextEncoding::DEFAULT_ORDER.to_vec(),
            delimiter: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a project table with default options.
pub fn load(path: &Path) -> Result<ProjectTable, LoadError> {
    load_with(path, &LoadOptions::default())
}

/// Load a project table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.tsv` / `.txt` – delimited text with a header row
/// * `.parquet` / `.pq`       – any flat schema; cells are read as text
///
/// Cells that cannot be coerced to their column's type become null. Only
/// unreadable input and missing required columns are errors.
pub fn load_with(path: &Path, options: &LoadOptions) -> Result<ProjectTable, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "csv" | "tsv" | "txt" => read_delimited(path, options)?,
        "parquet" | "pq" => read_parquet(path)?,
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };

    let table = coerce(raw)?;
    log::info!(
        "Loaded {} projects from {} (columns: {:?})",
        table.len(),
        path.display(),
        table.present_columns
    );
    Ok(table)
}

/// Like [`load_with`], but every non-fatal failure yields an empty table.
pub fn load_or_empty(path: &Path, options: &LoadOptions) -> Result<ProjectTable, LoadError> {
    match load_with(path, options) {
        Ok(table) => Ok(table),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            log::warn!("No data loaded from {}: {e}", path.display());
            Ok(ProjectTable::empty())
        }
    }
}

// ---------------------------------------------------------------------------
// Raw table: header + text cells, shared by every format
// ---------------------------------------------------------------------------

struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

fn clean_cell(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

fn read_delimited(path: &Path, options: &LoadOptions) -> Result<RawTable, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (text, encoding) = options
        .encodings
        .iter()
        .find_map(|enc| enc.decode(&bytes).map(|text| (text, *enc)))
        .ok_or_else(|| LoadError::Encoding {
            path: path.to_path_buf(),
            tried: options.encodings.iter().map(|e| e.name()).collect(),
        })?;
    log::debug!("Decoded {} as {}", path.display(), encoding.name());

    parse_delimited(&text, options.delimiter)
}

fn parse_delimited(text: &str, delimiter: Option<u8>) -> Result<RawTable, LoadError> {
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(text));
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(clean_cell).collect());
    }

    Ok(RawTable { headers, rows })
}

/// Pick the most frequent candidate delimiter on the header line.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    let mut best = (b',', 0);
    for candidate in [b',', b';', b'\t', b'|'] {
        let count = header.bytes().filter(|b| *b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Read every column of a Parquet file as text so it goes through the
/// same coercion as delimited input.
fn read_parquet(path: &Path) -> Result<RawTable, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result?;
        for row in 0..batch.num_rows() {
            let mut cells = Vec::with_capacity(batch.num_columns());
            for col in batch.columns() {
                if col.is_null(row) {
                    cells.push(None);
                } else {
                    cells.push(clean_cell(&array_value_to_string(col.as_ref(), row)?));
                }
            }
            rows.push(cells);
        }
    }

    Ok(RawTable { headers, rows })
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Per-column count of cells that failed to parse and were nulled.
#[derive(Default)]
struct CoercionStats {
    failures: BTreeMap<Column, usize>,
}

impl CoercionStats {
    fn track<T>(
        &mut self,
        column: Column,
        raw: Option<&str>,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        let raw = raw?;
        let parsed = parse(raw);
        if parsed.is_none() {
            log::debug!("Unparsable {column} value {raw:?}");
            *self.failures.entry(column).or_default() += 1;
        }
        parsed
    }
}

fn coerce(raw: RawTable) -> Result<ProjectTable, LoadError> {
    let mut index: BTreeMap<Column, usize> = BTreeMap::new();
    for (i, header) in raw.headers.iter().enumerate() {
        if let Some(col) = Column::from_header(header) {
            index.entry(col).or_insert(i);
        }
    }

    let missing: Vec<&'static str> = Column::REQUIRED
        .iter()
        .filter(|col| !index.contains_key(col))
        .map(|col| col.header())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::Schema { missing });
    }

    let mut stats = CoercionStats::default();
    let projects: Vec<Project> = raw
        .rows
        .iter()
        .map(|row| {
            let cell = |col: Column| -> Option<&str> {
                index
                    .get(&col)
                    .and_then(|&i| row.get(i))
                    .and_then(|c| c.as_deref())
            };
            let text = |col: Column| cell(col).map(str::to_string);

            Project {
                nog: text(Column::Nog),
                description: text(Column::Description),
                region: text(Column::Region),
                department: text(Column::Department),
                project_type: text(Column::ProjectType),
                status: text(Column::Status),
                award_amount: stats.track(Column::AwardAmount, cell(Column::AwardAmount), parse_amount),
                offer_count: stats.track(Column::OfferCount, cell(Column::OfferCount), parse_count),
                supplier: text(Column::Supplier),
                publication_date: stats.track(
                    Column::PublicationDate,
                    cell(Column::PublicationDate),
                    parse_date,
                ),
                submission_date: stats.track(
                    Column::SubmissionDate,
                    cell(Column::SubmissionDate),
                    parse_date,
                ),
                closing_date: stats.track(Column::ClosingDate, cell(Column::ClosingDate), parse_date),
                award_date: stats.track(Column::AwardDate, cell(Column::AwardDate), parse_date),
                award_year: None,
            }
            .derive()
        })
        .collect();

    for (col, n) in &stats.failures {
        log::info!("Coerced {n} unparsable value(s) in '{col}' to null");
    }

    let present: BTreeSet<Column> = index.into_keys().collect();
    Ok(ProjectTable::from_projects(projects, present))
}

/// Parse a calendar date. ISO order is tried first; slash or dash dates
/// ending in a four-digit year are read day-first. A trailing time
/// component is ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];
    let date_part = raw.trim().split([' ', 'T']).next()?;
    FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        // chrono's %Y also takes one to three digits
        .find(|date| date.year() >= 1000)
}

/// Parse a money amount, tolerating a currency prefix and `,` thousands
/// separators. A comma anywhere but between groups of three integer
/// digits makes the cell unparsable.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let s = s
        .strip_prefix('Q')
        .or_else(|| s.strip_prefix('$'))
        .unwrap_or(s);
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if !thousands_grouped(&compact) {
        return None;
    }
    compact.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `1,250,000.5` style grouping, or no comma at all.
fn thousands_grouped(s: &str) -> bool {
    if !s.contains(',') {
        return true;
    }
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if frac_part.contains(',') {
        return false;
    }
    let int_part = int_part.strip_prefix('-').unwrap_or(int_part);
    let mut groups = int_part.split(',');
    let lead_ok = groups
        .next()
        .is_some_and(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()));
    lead_ok && groups.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse a bid count; integral decimals such as `3.0` are accepted.
pub fn parse_count(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    let v = s.parse::<f64>().ok()?;
    (v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64).then_some(v as i64)
}
