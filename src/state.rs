//! Application state
//!
//! Holds configuration and the shared workflow components

use crate::analysis_coordinator::AnalysisCoordinator;
use crate::compliance_api::ComplianceApiClient;
use crate::error::{Error, Result};
use crate::report_feed::ReportFeedPoller;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
const DEFAULT_REPORT_LIMIT: u32 = 10;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Compliance service base URL
    pub api_url: String,
    /// Report feed polling interval
    pub poll_interval_ms: u64,
    /// Recent reports page size
    pub report_limit: u32,
    /// Optional transport timeout; none by default
    pub http_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            report_limit: DEFAULT_REPORT_LIMIT,
            http_timeout: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_url: lookup("COMPLIANCE_API_URL").unwrap_or(defaults.api_url),
            poll_interval_ms: parse_or(
                &lookup,
                "FEED_POLL_INTERVAL_MS",
                defaults.poll_interval_ms,
            ),
            report_limit: parse_or(&lookup, "FEED_REPORT_LIMIT", defaults.report_limit),
            http_timeout: lookup("HTTP_TIMEOUT_SECS").and_then(|raw| {
                match raw.trim().parse::<u64>() {
                    Ok(secs) => Some(Duration::from_secs(secs)),
                    Err(e) => {
                        tracing::warn!(
                            key = "HTTP_TIMEOUT_SECS",
                            value = %raw,
                            error = %e,
                            "Ignoring malformed timeout"
                        );
                        None
                    }
                }
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(Error::Config("COMPLIANCE_API_URL is empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "FEED_POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }
        if self.report_limit == 0 {
            return Err(Error::Config(
                "FEED_REPORT_LIMIT must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!(
                key = key,
                value = %raw,
                error = %e,
                default = %default,
                "Malformed config value, using default"
            );
            default
        }),
    }
}

/// Shared components wired from one `AppConfig`
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Compliance service adapter
    pub api: Arc<ComplianceApiClient>,
    /// Single in-flight analysis guard
    pub coordinator: Arc<AnalysisCoordinator>,
    /// Statistics and recent reports poller (not started)
    pub feed: Arc<ReportFeedPoller>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let api = Arc::new(ComplianceApiClient::with_timeout(
            config.api_url.clone(),
            config.http_timeout,
        )?);
        let coordinator = Arc::new(AnalysisCoordinator::new(api.clone()));
        let feed = Arc::new(ReportFeedPoller::new(api.clone(), config.report_limit));

        Ok(Self {
            config,
            api,
            coordinator,
            feed,
        })
    }
}
