//! Shared models for the capture-analyze-report workflow
//!
//! This module contains types shared across the capture, analysis and
//! report feed components to avoid circular dependencies.

use crate::error::Error;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================
// Image payload
// ============================================

/// How an image was acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// Still frame from a live camera stream
    Camera,
    /// File chosen by the user
    Upload,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::Camera => "camera",
            ImageSource::Upload => "upload",
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            ImageSource::Camera => "capture",
            ImageSource::Upload => "upload",
        }
    }
}

/// Raw image bytes ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    data: Vec<u8>,
    mime_type: String,
    file_name: String,
    source: ImageSource,
    acquired_at: DateTime<Utc>,
}

impl ImagePayload {
    /// Create a payload with a synthetic file name derived from the acquisition time
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, source: ImageSource) -> Self {
        let mime_type = mime_type.into();
        let acquired_at = Utc::now();
        let file_name = format!(
            "{}-{}.{}",
            source.file_prefix(),
            acquired_at.timestamp_millis(),
            extension_for_mime(&mime_type)
        );

        Self {
            data,
            mime_type,
            file_name,
            source,
            acquired_at,
        }
    }

    /// Replace the synthetic file name (e.g. with the name of the picked file)
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> ImageSource {
        self.source
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// True for `image/*` mime types (parameters and case ignored)
pub fn is_image_mime(mime_type: &str) -> bool {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    essence.len() > "image/".len() && essence.to_ascii_lowercase().starts_with("image/")
}

/// File extension used for synthetic names
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/heic" => "heic",
        _ => "img",
    }
}

// ============================================
// Analysis result
// ============================================

/// Opaque report identifier assigned by the service
///
/// Accepts both string and numeric ids on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ReportId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => ReportId(s),
            Raw::Number(n) => ReportId(n.to_string()),
        })
    }
}

/// Display verdict derived from the compliance flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceStatus {
    Compliant,
    Unauthorized,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "Compliant",
            ComplianceStatus::Unauthorized => "Unauthorized",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical outcome of one analysis call. Replaced wholesale on the next call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub is_compliant: bool,
    pub extracted_text: String,
    /// Category labels in detection order
    pub violations_found: Vec<String>,
    pub violation_count: u32,
    pub report_id: Option<ReportId>,
    /// Verdict label echoed by the service, if any
    pub status_label: Option<String>,
    /// Text snippets surrounding each match
    pub violation_context: Vec<String>,
}

impl AnalysisResult {
    pub fn compliance_status(&self) -> ComplianceStatus {
        if self.is_compliant {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::Unauthorized
        }
    }

    pub fn has_violations(&self) -> bool {
        self.violation_count > 0
    }
}

// ============================================
// Reports and statistics
// ============================================

/// Review status of a persisted report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Approved,
    Rejected,
    FlaggedByCitizens,
    Other(String),
}

impl ReportStatus {
    /// Statuses the service accepts on a status update
    pub const UPDATABLE: [&'static str; 4] = ["pending", "approved", "rejected", "resolved"];

    pub fn as_str(&self) -> &str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Approved => "approved",
            ReportStatus::Rejected => "rejected",
            ReportStatus::FlaggedByCitizens => "flagged_by_citizens",
            ReportStatus::Other(s) => s,
        }
    }

    pub fn is_updatable(&self) -> bool {
        Self::UPDATABLE.contains(&self.as_str())
    }
}

impl Default for ReportStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl From<String> for ReportStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "resolved" => Self::Resolved,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "flagged_by_citizens" => Self::FlaggedByCitizens,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ReportStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ReportStatus> for String {
    fn from(status: ReportStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A past analysis persisted by the service. Read-only on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: ReportId,

    /// Absent when the service did not record a verdict
    #[serde(default)]
    pub is_compliant: Option<bool>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ReportStatus,

    #[serde(default, deserialize_with = "null_as_default")]
    pub violation_count: u32,

    #[serde(default, deserialize_with = "null_as_default")]
    pub violations_found: Vec<String>,

    #[serde(default)]
    pub extracted_text: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ReportRecord {
    pub fn compliance_status(&self) -> Option<ComplianceStatus> {
        self.is_compliant.map(|compliant| {
            if compliant {
                ComplianceStatus::Compliant
            } else {
                ComplianceStatus::Unauthorized
            }
        })
    }
}

/// Aggregate counters. The service is the source of truth; no cross-field checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_reports: u64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub pending: u64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub resolved: u64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub this_week: u64,

    #[serde(default)]
    pub flagged_by_citizens: Option<u64>,

    #[serde(default)]
    pub citizen_reports_count: Option<u64>,

    #[serde(default)]
    pub tracked_locations: Option<u64>,

    #[serde(default)]
    pub avg_severity: Option<f64>,
}

// ============================================
// Feed snapshot
// ============================================

/// Feed endpoint identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEndpoint {
    Statistics,
    Reports,
}

impl FeedEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedEndpoint::Statistics => "statistics",
            FeedEndpoint::Reports => "reports",
        }
    }
}

/// One failed fetch within a refresh cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointFailure {
    pub endpoint: FeedEndpoint,
    pub message: String,
}

/// Non-blocking notice raised when a cycle could not refresh every endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedNotice {
    pub sequence: u64,
    pub failures: Vec<EndpointFailure>,
    pub raised_at: DateTime<Utc>,
}

impl FeedNotice {
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.endpoint.as_str(), f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn all_failed(&self) -> bool {
        self.failures.len() >= 2
    }

    pub fn to_error(&self) -> Error {
        Error::FetchDegraded(self.summary())
    }
}

/// Latest known-good aggregate view
///
/// Statistics and reports are retained independently: a failed fetch keeps the
/// previous value of that half.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSnapshot {
    pub statistics: Option<StatisticsSnapshot>,
    /// Most recent first
    pub reports: Option<Vec<ReportRecord>>,
    /// Sequence number of the cycle whose statistics are held
    pub statistics_seq: u64,
    /// Sequence number of the cycle whose report list is held
    pub reports_seq: u64,
    pub statistics_updated_at: Option<DateTime<Utc>>,
    pub reports_updated_at: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    /// Present while the feed is degraded; cleared by a fully successful cycle
    pub degraded: Option<FeedNotice>,
}

impl ReportSnapshot {
    pub fn reports(&self) -> &[ReportRecord] {
        self.reports.as_deref().unwrap_or_default()
    }

    /// Nothing has been fetched successfully yet
    pub fn is_loading(&self) -> bool {
        self.statistics.is_none() && self.reports.is_none()
    }
}

// ============================================
// Serde helpers
// ============================================

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Parse an RFC 3339 or naive ISO 8601 timestamp (naive values are UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_image_mime_detection() {
        assert!(is_image_mime("image/jpeg"));
        assert!(is_image_mime("IMAGE/PNG"));
        assert!(is_image_mime("image/webp; q=0.9"));
        assert!(!is_image_mime("image/"));
        assert!(!is_image_mime("application/pdf"));
        assert!(!is_image_mime(""));
    }

    #[test]
    fn test_synthetic_file_name() {
        let payload = ImagePayload::new(vec![1, 2, 3], "image/jpeg", ImageSource::Camera);
        assert!(payload.file_name().starts_with("capture-"));
        assert!(payload.file_name().ends_with(".jpg"));
        assert_eq!(payload.len(), 3);

        let renamed = payload.with_file_name("billboard.jpg");
        assert_eq!(renamed.file_name(), "billboard.jpg");
    }

    #[test]
    fn test_report_id_accepts_numbers() {
        let id: ReportId = serde_json::from_str("42").unwrap();
        assert_eq!(id.as_str(), "42");
        let id: ReportId = serde_json::from_str("\"r1\"").unwrap();
        assert_eq!(id, ReportId::new("r1"));
    }

    #[test]
    fn test_report_status_roundtrip_unknown() {
        let status: ReportStatus = serde_json::from_str("\"escalated\"").unwrap();
        assert_eq!(status, ReportStatus::Other("escalated".to_string()));
        assert!(!status.is_updatable());
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"escalated\"");
        assert!(ReportStatus::from("resolved").is_updatable());
    }

    #[test]
    fn test_report_record_lenient_fields() {
        let record: ReportRecord = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "is_compliant": false,
            "status": "pending",
            "violation_count": 2,
            "violations_found": null,
            "extracted_text": "buy alcohol",
            "created_at": "2025-03-01T10:20:30.123456"
        }))
        .unwrap();

        assert!(record.violations_found.is_empty());
        assert_eq!(record.violation_count, 2);
        assert_eq!(record.compliance_status(), Some(ComplianceStatus::Unauthorized));
        let created = record.created_at.unwrap();
        assert_eq!(created.year(), 2025);
        assert_eq!(created.hour(), 10);
    }

    #[test]
    fn test_report_record_missing_verdict_is_unknown() {
        let record: ReportRecord = serde_json::from_value(serde_json::json!({
            "id": 9,
            "is_compliant": null,
            "violation_count": 0
        }))
        .unwrap();
        assert_eq!(record.is_compliant, None);
        assert_eq!(record.compliance_status(), None);

        let record: ReportRecord =
            serde_json::from_value(serde_json::json!({"id": "r2"})).unwrap();
        assert!(record.compliance_status().is_none());
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2025-03-01T10:20:30+00:00").is_some());
        assert!(parse_timestamp("2025-03-01T10:20:30").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_snapshot_defaults() {
        let snapshot = ReportSnapshot::default();
        assert!(snapshot.is_loading());
        assert!(snapshot.reports().is_empty());
    }

    #[test]
    fn test_feed_notice_summary() {
        let notice = FeedNotice {
            sequence: 3,
            failures: vec![EndpointFailure {
                endpoint: FeedEndpoint::Statistics,
                message: "HTTP 500".to_string(),
            }],
            raised_at: Utc::now(),
        };
        assert_eq!(notice.summary(), "statistics: HTTP 500");
        assert!(!notice.all_failed());
        assert!(matches!(notice.to_error(), Error::FetchDegraded(_)));
    }
}
