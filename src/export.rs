//! Analytics export as JSON or CSV.
//!
//! Both formats carry the raw events of the requested window, newest
//! first. The CSV form quotes every data cell and doubles embedded quotes,
//! so queries containing commas, quotes or newlines survive a round trip
//! through any RFC 4180 reader.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::analytics::{format_iso, DateRange, SqliteAnalytics};
use crate::error::{PortalError, PortalResult};
use crate::models::SearchAnalyticsEvent;

pub const CSV_HEADER: &str = "Date,Query,Results Count,User IP,User Agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("Unknown export format '{}'. Must be json or csv.", other)),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportRecord<'a> {
    id: &'a str,
    query: &'a str,
    results_count: u64,
    user_ip: Option<&'a str>,
    user_agent: Option<&'a str>,
    created_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    export_date: String,
    date_range: &'a DateRange,
    record_count: usize,
    data: Vec<ExportRecord<'a>>,
}

/// A rendered export, ready to be served or written to disk.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub format: ExportFormat,
    pub filename: String,
    pub body: String,
}

impl ExportFile {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

pub fn render_csv(events: &[SearchAnalyticsEvent]) -> String {
    let mut out = String::from(CSV_HEADER);
    for e in events {
        let cells = [
            format_iso(e.created_at),
            e.query.clone(),
            e.results_count.to_string(),
            e.user_ip.clone().unwrap_or_default(),
            e.user_agent.clone().unwrap_or_default(),
        ];
        out.push('\n');
        out.push_str(&cells.iter().map(|c| quote(c)).collect::<Vec<_>>().join(","));
    }
    out
}

pub fn render_json(events: &[SearchAnalyticsEvent], range: &DateRange) -> PortalResult<String> {
    let doc = ExportDocument {
        export_date: format_iso(Utc::now().timestamp()),
        date_range: range,
        record_count: events.len(),
        data: events
            .iter()
            .map(|e| ExportRecord {
                id: &e.id,
                query: &e.query,
                results_count: e.results_count,
                user_ip: e.user_ip.as_deref(),
                user_agent: e.user_agent.as_deref(),
                created_at: format_iso(e.created_at),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&doc)
        .map_err(|e| PortalError::upstream("Failed to encode export", e))
}

/// Build an export of the last `days` days.
pub async fn build_export(
    analytics: &SqliteAnalytics,
    format: ExportFormat,
    days: u32,
) -> PortalResult<ExportFile> {
    let (events, range) = analytics.events_since(days).await?;
    let body = match format {
        ExportFormat::Csv => render_csv(&events),
        ExportFormat::Json => render_json(&events, &range)?,
    };
    Ok(ExportFile {
        format,
        filename: format!(
            "search-analytics-{}.{}",
            Utc::now().format("%Y-%m-%d"),
            format.extension()
        ),
        body,
    })
}

/// Write an export to `output`, or to stdout when `None`.
pub async fn run_export(
    analytics: &SqliteAnalytics,
    format: ExportFormat,
    days: u32,
    output: Option<&Path>,
) -> Result<()> {
    let file = build_export(analytics, format, days).await?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &file.body)?;
            eprintln!("Exported analytics to {}", path.display());
        }
        None => {
            println!("{}", file.body);
        }
    }

    Ok(())
}
