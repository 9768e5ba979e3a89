//! CSV / JSON export of breakdown rows

use serde::Serialize;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::aggregate::BreakdownRow;
use crate::calendar::{format_date, DateRange};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::metrics::Dimension;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(AnalyticsError::Validation(format!(
                "unsupported export format '{}'",
                other
            ))),
        }
    }
}

/// A rendered export ready to be sent as an attachment
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
}

#[derive(Serialize)]
struct ExportMetadata {
    dimension: Dimension,
    start: String,
    end: String,
    generated_at: String,
    rows: usize,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    metadata: ExportMetadata,
    data: &'a [BreakdownRow],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdminUsageExportService;

impl AdminUsageExportService {
    pub fn new() -> Self {
        Self
    }

    pub fn filename(dimension: Dimension, range: DateRange, format: ExportFormat) -> String {
        format!(
            "admin-usage-{}-{}-to-{}.{}",
            dimension.as_str(),
            format_date(range.start),
            format_date(range.end),
            format.extension()
        )
    }

    pub fn export(
        &self,
        rows: &[BreakdownRow],
        dimension: Dimension,
        format: ExportFormat,
        range: DateRange,
    ) -> AnalyticsResult<ExportFile> {
        let bytes = match format {
            ExportFormat::Csv => to_csv(rows, dimension)?,
            ExportFormat::Json => to_json(rows, dimension, range)?,
        };

        tracing::info!(
            dimension = %dimension,
            format = format.extension(),
            rows = rows.len(),
            bytes = bytes.len(),
            "Exported admin usage"
        );

        Ok(ExportFile {
            bytes,
            content_type: format.content_type(),
            filename: Self::filename(dimension, range, format),
        })
    }
}

fn dimension_columns(dimension: Dimension) -> &'static [&'static str] {
    match dimension {
        Dimension::User => &["user_id", "username", "email"],
        Dimension::Model => &["model", "model_name", "provider"],
        Dimension::Provider => &["provider", "provider_name"],
        Dimension::ApiKey => &["api_key_id", "api_key_name", "owner"],
    }
}

fn to_csv(rows: &[BreakdownRow], dimension: Dimension) -> AnalyticsResult<Vec<u8>> {
    let mut header = dimension_columns(dimension).to_vec();
    header.extend([
        "requests",
        "successful_requests",
        "failed_requests",
        "success_rate",
        "prompt_tokens",
        "completion_tokens",
        "total_tokens",
        "spend",
    ]);

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.id.clone(), row.name.clone()];
        match dimension {
            Dimension::User => record.push(row.email.clone().unwrap_or_default()),
            Dimension::Model => record.push(row.provider.clone().unwrap_or_default()),
            Dimension::ApiKey => record.push(row.owner.clone().unwrap_or_default()),
            Dimension::Provider => {}
        }
        let m = &row.metrics;
        record.extend([
            m.requests.to_string(),
            m.successful_requests.to_string(),
            m.failed_requests.to_string(),
            format!("{:.2}", row.success_rate),
            m.prompt_tokens.to_string(),
            m.completion_tokens.to_string(),
            m.total_tokens.to_string(),
            format!("{:.6}", m.spend),
        ]);
        wtr.write_record(&record)?;
    }

    wtr.into_inner()
        .map_err(|e| AnalyticsError::Export(format!("CSV finalize error: {}", e)))
}

fn to_json(
    rows: &[BreakdownRow],
    dimension: Dimension,
    range: DateRange,
) -> AnalyticsResult<Vec<u8>> {
    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AnalyticsError::Export(e.to_string()))?;

    let export = JsonExport {
        metadata: ExportMetadata {
            dimension,
            start: format_date(range.start),
            end: format_date(range.end),
            generated_at,
            rows: rows.len(),
        },
        data: rows,
    };
    Ok(serde_json::to_vec_pretty(&export)?)
}
