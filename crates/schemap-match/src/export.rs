//! Writing match reports to disk and reading column matches back.
//!
//! # Formats
//!
//! - `json`: the full [`MatchReport`] plus `generated_at` and `version`
//! - `csv`: one row per column match, grouped by source table

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local, SecondsFormat, Utc};
use schemap_model::{ColumnMatchRecord, MatchReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

/// Current stored report version.
pub const REPORT_VERSION: &str = "1.0";

/// CSV header, in column order.
pub const CSV_HEADERS: [&str; 7] = [
    "source_table",
    "target_table",
    "table_confidence",
    "source_column",
    "best_match_column",
    "column_confidence",
    "match_source",
];

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExportError {
    #[error("unsupported output format: {0} (expected json or csv)")]
    UnsupportedFormat(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A report as written to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReport {
    /// UTC timestamp, RFC 3339 with a `Z` suffix.
    pub generated_at: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(flatten)]
    pub report: MatchReport,
}

fn default_version() -> String {
    REPORT_VERSION.to_string()
}

impl StoredReport {
    pub fn new(report: MatchReport) -> Self {
        Self::generated_at(report, Utc::now())
    }

    pub fn generated_at(report: MatchReport, at: DateTime<Utc>) -> Self {
        Self {
            generated_at: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            version: default_version(),
            report,
        }
    }
}

/// One CSV row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvRow {
    pub source_table: String,
    pub target_table: Option<String>,
    pub table_confidence: Option<f64>,
    pub source_column: String,
    pub best_match_column: Option<String>,
    pub column_confidence: f64,
    pub match_source: String,
}

/// Flattens a report to one row per column match.
///
/// Rows follow the table order of the report; within a table, column order
/// is kept.
pub fn flatten_rows(report: &MatchReport) -> Vec<CsvRow> {
    let mut rows = Vec::with_capacity(report.column_matches.len());
    for table in &report.table_matches {
        for column in report
            .column_matches
            .iter()
            .filter(|c| c.source.table() == table.source_table)
        {
            rows.push(CsvRow {
                source_table: table.source_table.clone(),
                target_table: table.best_match_table.clone(),
                table_confidence: Some(table.confidence),
                source_column: column.source.to_string(),
                best_match_column: column.best_match.as_ref().map(ToString::to_string),
                column_confidence: column.confidence,
                match_source: column.match_source.to_string(),
            });
        }
    }
    rows
}

/// Writes the flattened CSV. An empty report still gets a header line.
pub fn write_csv<W: Write>(report: &MatchReport, writer: W) -> Result<(), ExportError> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(CSV_HEADERS)?;
    for row in flatten_rows(report) {
        csv.serialize(row)?;
    }
    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_json<W: Write>(stored: &StoredReport, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, stored)?;
    Ok(())
}

/// Writes `report` to `path` in `format`.
pub fn write_report(
    report: &MatchReport,
    path: &Path,
    format: ExportFormat,
) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    match format {
        ExportFormat::Json => {
            write_json(&StoredReport::new(report.clone()), &mut writer)?;
            writer.write_all(b"\n").map_err(|source| ExportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        ExportFormat::Csv => write_csv(report, &mut writer)?,
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), format = %format, "report written");
    Ok(())
}

/// Default output name, e.g. `schemap_output_20260101_120000.csv`.
pub fn default_output_name(format: ExportFormat, at: DateTime<Local>) -> String {
    format!(
        "schemap_output_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        format.as_str()
    )
}

#[derive(Deserialize)]
struct LooseReport {
    #[serde(default, alias = "matches")]
    column_matches: Vec<ColumnMatchRecord>,
}

/// Parses column matches from an exported report.
///
/// Accepts a stored report, a bare array of column matches, or an object
/// with a `matches` array.
pub fn parse_column_records(contents: &str) -> Result<Vec<ColumnMatchRecord>, ExportError> {
    let value: Value = serde_json::from_str(contents)?;
    let records = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        other => serde_json::from_value::<LooseReport>(other)?.column_matches,
    };
    Ok(records)
}

pub fn read_column_records(path: &Path) -> Result<Vec<ColumnMatchRecord>, ExportError> {
    let contents = fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_column_records(&contents)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use insta::assert_snapshot;
    use schemap_model::{
        ColumnMatchResult, ColumnRef, MatchSource, MethodWeights, TableMatchResult,
    };

    use super::*;

    fn col(id: &str) -> ColumnRef {
        ColumnRef::new(id).unwrap()
    }

    fn report() -> MatchReport {
        let column_matches = vec![
            ColumnMatchResult {
                source: col("emp.dept_fk"),
                best_match: Some(col("dept.id")),
                confidence: 0.965,
                match_source: MatchSource::Ensemble,
                candidates: Vec::new(),
            },
            ColumnMatchResult::unmatched(col("emp.notes")),
            ColumnMatchResult {
                source: col("orders.total"),
                best_match: Some(col("sales.amount")),
                confidence: 0.75,
                match_source: MatchSource::EnsembleLlm,
                candidates: Vec::new(),
            },
        ];
        let table_matches = vec![
            TableMatchResult {
                source_table: "orders".to_string(),
                best_match_table: Some("sales".to_string()),
                confidence: 0.75,
                column_match_count: 1,
            },
            TableMatchResult {
                source_table: "emp".to_string(),
                best_match_table: Some("dept".to_string()),
                confidence: 0.4825,
                column_match_count: 2,
            },
        ];
        MatchReport {
            weights: MethodWeights::default(),
            column_match_count: 3,
            table_match_count: 2,
            column_matches,
            table_matches,
            cancelled: false,
        }
    }

    fn empty_report() -> MatchReport {
        MatchReport {
            weights: MethodWeights::default(),
            column_match_count: 0,
            table_match_count: 0,
            column_matches: Vec::new(),
            table_matches: Vec::new(),
            cancelled: false,
        }
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(" json ".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "xlsx".parse::<ExportFormat>(),
            Err(ExportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn csv_groups_rows_by_table() {
        let mut out = Vec::new();
        write_csv(&report(), &mut out).unwrap();
        assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        source_table,target_table,table_confidence,source_column,best_match_column,column_confidence,match_source
        orders,sales,0.75,orders.total,sales.amount,0.75,ensemble+llm
        emp,dept,0.4825,emp.dept_fk,dept.id,0.965,ensemble
        emp,dept,0.4825,emp.notes,,0.0,none
        ");
    }

    #[test]
    fn empty_report_writes_header_only() {
        let mut out = Vec::new();
        write_csv(&empty_report(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", CSV_HEADERS.join(",")));
    }

    #[test]
    fn stored_report_flattens_with_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let stored = StoredReport::generated_at(empty_report(), at);
        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["generated_at"], "2026-01-02T03:04:05Z");
        assert_eq!(value["version"], REPORT_VERSION);
        assert_eq!(value["column_match_count"], 0);
        assert_eq!(value["weights"]["mpnet"], 0.4);
    }

    #[test]
    fn json_export_reads_back_as_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        write_report(&report(), &path, ExportFormat::Json).unwrap();

        let records = read_column_records(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].source, "emp.dept_fk");
        assert_eq!(records[0].best_match.as_deref(), Some("dept.id"));
        assert_eq!(records[1].best_match, None);
        assert_eq!(records[2].match_source.as_deref(), Some("ensemble+llm"));
    }

    #[test]
    fn csv_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        write_report(&report(), &path, ExportFormat::Csv).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 4);
    }

    #[test]
    fn loose_record_shapes_are_accepted() {
        let bare = r#"[{"source": "a.x", "best_match": "b.y", "confidence": 0.5}]"#;
        assert_eq!(parse_column_records(bare).unwrap().len(), 1);

        let legacy = r#"{"method": "hybrid_ensemble", "matches": [{"source": "a.x"}]}"#;
        let records = parse_column_records(legacy).unwrap();
        assert_eq!(records[0].source, "a.x");
        assert_eq!(records[0].confidence, None);

        assert!(parse_column_records("not json").is_err());
    }

    #[test]
    fn null_confidence_only_affects_its_record() {
        let records = parse_column_records(
            r#"[
                {"source": "a.x", "best_match": "b.x", "confidence": null},
                {"source": "a.y", "best_match": "b.y", "confidence": 0.6}
            ]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].confidence, None);
        assert_eq!(records[1].confidence, Some(0.6));
        let tables = crate::TableAggregator::default().aggregate(&records);
        assert_eq!(tables[0].confidence, 0.3);
    }

    #[test]
    fn missing_file_reports_path() {
        let error = read_column_records(Path::new("/definitely/missing.json")).unwrap_err();
        assert!(error.to_string().contains("/definitely/missing.json"));
    }

    #[test]
    fn default_name_uses_local_timestamp() {
        let at = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            default_output_name(ExportFormat::Csv, at),
            "schemap_output_20260304_050607.csv"
        );
    }
}
