//! Wire shapes of the compliance service and their normalization

use crate::error::{Error, Result};
use crate::models::{AnalysisResult, ReportId, ReportRecord, StatisticsSnapshot};
use reqwest::StatusCode;
use serde::Deserialize;

/// `POST /api/analyze` success body
#[derive(Debug, Deserialize)]
struct AnalyzeEnvelope {
    #[serde(default)]
    analysis: Option<AnalysisBody>,

    #[serde(default)]
    report_id: Option<ReportId>,
}

#[derive(Debug, Deserialize)]
struct AnalysisBody {
    #[serde(default)]
    is_compliant: Option<bool>,

    #[serde(default)]
    extracted_text: Option<String>,

    #[serde(default)]
    violations_found: Option<Vec<String>>,

    #[serde(default)]
    violation_count: Option<u32>,

    #[serde(default)]
    status: Option<String>,

    #[serde(default)]
    violation_context: Option<Vec<String>>,
}

/// `GET /api/statistics` body
#[derive(Debug, Deserialize)]
struct StatisticsEnvelope {
    #[serde(default)]
    statistics: Option<StatisticsSnapshot>,
}

/// `GET /api/reports` body; the list may arrive as `data` or `reports`
#[derive(Debug, Deserialize)]
struct ReportsEnvelope {
    #[serde(default)]
    data: Option<Vec<serde_json::Value>>,

    #[serde(default)]
    reports: Option<Vec<serde_json::Value>>,
}

/// `GET /api/reports/{id}` and status update body
#[derive(Debug, Deserialize)]
struct ReportEnvelope {
    #[serde(default)]
    report: Option<ReportRecord>,
}

/// FastAPI style error body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Build an `AnalysisResult` from an analyze response body
///
/// `analysis.is_compliant` is required. A present violation list is
/// authoritative for the count; without a list the count is trusted as sent.
pub fn parse_analysis_response(body: &str) -> Result<AnalysisResult> {
    let envelope: AnalyzeEnvelope = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("invalid analysis JSON: {}", e)))?;

    let analysis = envelope
        .analysis
        .ok_or_else(|| Error::MalformedResponse("missing analysis object".to_string()))?;

    let is_compliant = analysis
        .is_compliant
        .ok_or_else(|| Error::MalformedResponse("missing analysis.is_compliant".to_string()))?;

    let (violations_found, violation_count) =
        normalize_violations(analysis.violations_found, analysis.violation_count);

    Ok(AnalysisResult {
        is_compliant,
        extracted_text: analysis.extracted_text.unwrap_or_default(),
        violations_found,
        violation_count,
        report_id: envelope.report_id,
        status_label: analysis.status,
        violation_context: analysis.violation_context.unwrap_or_default(),
    })
}

fn normalize_violations(list: Option<Vec<String>>, count: Option<u32>) -> (Vec<String>, u32) {
    match (list, count) {
        (Some(list), count) => {
            let len = list.len() as u32;
            if let Some(count) = count.filter(|c| *c != len) {
                tracing::warn!(
                    reported = count,
                    listed = len,
                    "violation_count disagrees with violations_found, using list length"
                );
            }
            (list, len)
        }
        (None, count) => (Vec::new(), count.unwrap_or(0)),
    }
}

pub(crate) fn parse_statistics_response(body: &str) -> Result<StatisticsSnapshot> {
    let envelope: StatisticsEnvelope = serde_json::from_str(body)?;
    envelope
        .statistics
        .ok_or_else(|| Error::Parse("statistics response missing 'statistics'".to_string()))
}

/// Decode a reports list body, preferring `data` over `reports`
///
/// Elements that do not decode as a report are skipped.
pub fn parse_reports_response(body: &str) -> Result<Vec<ReportRecord>> {
    let envelope: ReportsEnvelope = serde_json::from_str(body)?;
    let items = envelope.data.or(envelope.reports).unwrap_or_default();

    let mut reports = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<ReportRecord>(item) {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::warn!(index = index, error = %e, "Skipping undecodable report");
            }
        }
    }
    Ok(reports)
}

pub(crate) fn parse_report_envelope(body: &str) -> Result<ReportRecord> {
    let envelope: ReportEnvelope = serde_json::from_str(body)?;
    envelope
        .report
        .ok_or_else(|| Error::Parse("response missing 'report'".to_string()))
}

/// Human-readable message for an error response
///
/// Uses a string `detail` field when present, then the raw body, then the
/// status reason phrase.
pub fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(ErrorBody {
        detail: serde_json::Value::String(detail),
    }) = serde_json::from_str::<ErrorBody>(body)
    {
        return detail;
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string())
}
