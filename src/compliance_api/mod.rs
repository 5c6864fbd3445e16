//! ComplianceApiClient - Compliance Service Adapter
//!
//! ## Responsibilities
//!
//! - Submit images to `POST /api/analyze` as multipart
//! - Read statistics and recent reports for the feed
//! - Report lookup and review status updates
//! - Normalize the service's response shapes into crate models

pub mod wire;

use crate::analysis_coordinator::AnalysisService;
use crate::error::{Error, Result};
use crate::models::{AnalysisResult, ImagePayload, ReportId, ReportRecord, ReportStatus, StatisticsSnapshot};
use crate::report_feed::ReportFeedSource;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::time::Duration;

pub use wire::{error_message, parse_analysis_response, parse_reports_response};

/// Compliance service client
pub struct ComplianceApiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Option<Duration>,
}

impl ComplianceApiClient {
    /// Create a client without a transport timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, None)
    }

    /// Create a client with an optional transport timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check service health
    pub async fn health_check(&self) -> Result<bool> {
        let url = self.endpoint("/api/health");
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Health check failed");
                Ok(false)
            }
        }
    }

    /// Submit one image for analysis (single attempt)
    pub async fn analyze_image(&self, payload: &ImagePayload) -> Result<AnalysisResult> {
        let url = self.endpoint("/api/analyze");

        let part = Part::bytes(payload.data().to_vec())
            .file_name(payload.file_name().to_string())
            .mime_str(payload.mime_type())?;
        let form = Form::new().part("file", part);

        let resp = self.client.post(&url).multipart(form).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(Error::AnalysisRejected {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        parse_analysis_response(&body)
    }

    /// Aggregate statistics
    pub async fn get_statistics(&self) -> Result<StatisticsSnapshot> {
        let url = self.endpoint("/api/statistics");
        let body = self.get_text(&url, &[]).await?;
        wire::parse_statistics_response(&body)
    }

    /// Most recent reports, newest first
    pub async fn list_reports(&self, limit: u32) -> Result<Vec<ReportRecord>> {
        let url = self.endpoint("/api/reports");
        let body = self.get_text(&url, &[("limit", limit.to_string())]).await?;
        let mut reports = parse_reports_response(&body)?;
        reports.truncate(limit as usize);
        Ok(reports)
    }

    /// Single report by id
    pub async fn get_report(&self, id: &ReportId) -> Result<ReportRecord> {
        let url = self.endpoint(&format!("/api/reports/{}", id));
        let body = self.get_text(&url, &[]).await.map_err(|e| not_found(e, id))?;
        wire::parse_report_envelope(&body)
    }

    /// Change the review status of a report
    pub async fn update_report_status(
        &self,
        id: &ReportId,
        status: &ReportStatus,
    ) -> Result<ReportRecord> {
        if !status.is_updatable() {
            return Err(Error::Validation(format!(
                "Invalid status '{}'. Must be one of {:?}",
                status,
                ReportStatus::UPDATABLE
            )));
        }

        let url = self.endpoint(&format!("/api/reports/{}/status", id));
        let resp = self
            .client
            .patch(&url)
            .query(&[("status", status.as_str())])
            .send()
            .await?;
        let body = check_status(resp).await.map_err(|e| not_found(e, id))?;

        let report = wire::parse_report_envelope(&body)?;
        tracing::info!(report_id = %id, status = %status, "Report status updated");
        Ok(report)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let resp = self.client.get(url).query(query).send().await?;
        check_status(resp).await
    }
}

/// Read the body, turning a non-success status into `Error::Api`
async fn check_status(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(Error::Api {
            status: status.as_u16(),
            message: error_message(status, &body),
        })
    }
}

fn not_found(error: Error, id: &ReportId) -> Error {
    match error {
        Error::Api { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
            Error::NotFound(format!("Report {} not found", id))
        }
        other => other,
    }
}

#[async_trait]
impl AnalysisService for ComplianceApiClient {
    async fn submit_image(&self, payload: ImagePayload) -> Result<AnalysisResult> {
        self.analyze_image(&payload).await
    }
}

#[async_trait]
impl ReportFeedSource for ComplianceApiClient {
    async fn fetch_statistics(&self) -> Result<StatisticsSnapshot> {
        self.get_statistics().await
    }

    async fn fetch_recent_reports(&self, limit: u32) -> Result<Vec<ReportRecord>> {
        self.list_reports(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ComplianceApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.endpoint("/api/analyze"),
            "http://localhost:8000/api/analyze"
        );
        assert!(client.timeout().is_none());
    }

    #[tokio::test]
    async fn test_update_status_rejects_unknown_locally() {
        // unroutable port: a network call would fail with Http, not Validation
        let client = ComplianceApiClient::new("http://127.0.0.1:9").unwrap();
        let result = client
            .update_report_status(&ReportId::new("r1"), &ReportStatus::from("archived"))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_not_found_mapping() {
        let id = ReportId::new("missing");
        let err = not_found(
            Error::Api {
                status: 404,
                message: "Report not found".into(),
            },
            &id,
        );
        assert!(matches!(err, Error::NotFound(_)));

        let err = not_found(
            Error::Api {
                status: 500,
                message: "boom".into(),
            },
            &id,
        );
        assert!(matches!(err, Error::Api { status: 500, .. }));
    }
}
