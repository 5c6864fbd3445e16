//! Billboard Compliance Client Library
//!
//! Captures or uploads billboard images, submits them for compliance analysis
//! and keeps a live view of report statistics.
//!
//! ## Architecture (4 Components)
//!
//! 1. MediaCaptureController - Camera lifecycle and file selection
//! 2. ComplianceApiClient - Compliance service adapter
//! 3. AnalysisCoordinator - Single in-flight analysis request
//! 4. ReportFeedPoller - Periodic statistics/report refresh
//!
//! ## Design Principles
//!
//! - The camera device is held only between open and capture/close
//! - At most one analysis request in flight
//! - Feed halves fail independently; stale completions never win

pub mod analysis_coordinator;
pub mod compliance_api;
pub mod error;
pub mod media_capture;
pub mod models;
pub mod report_feed;
pub mod state;

pub use error::{Error, Result};
