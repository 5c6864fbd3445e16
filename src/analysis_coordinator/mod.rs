//! AnalysisCoordinator - Single In-Flight Analysis
//!
//! ## Responsibilities
//!
//! - Submit one image payload at a time to the compliance service
//! - Reject overlapping submissions with `AlreadyInProgress`
//! - Publish Idle / InFlight / Completed / Failed state to subscribers
//!
//! No automatic retry: a failed attempt stays visible until the user starts a
//! new one or clears it.

use crate::error::{Error, Result};
use crate::models::{AnalysisResult, ImagePayload, ImageSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// The analysis endpoint, as seen by the coordinator
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Exactly one network call; no retry
    async fn submit_image(&self, payload: ImagePayload) -> Result<AnalysisResult>;
}

/// Published coordinator state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisState {
    Idle,
    InFlight {
        generation: u64,
        file_name: String,
        source: ImageSource,
        started_at: DateTime<Utc>,
    },
    Completed {
        generation: u64,
        result: AnalysisResult,
    },
    Failed {
        generation: u64,
        message: String,
    },
}

impl AnalysisState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, AnalysisState::InFlight { .. })
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            AnalysisState::Completed { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// AnalysisCoordinator instance
pub struct AnalysisCoordinator {
    service: Arc<dyn AnalysisService>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    state: watch::Sender<AnalysisState>,
}

impl AnalysisCoordinator {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        let (state, _) = watch::channel(AnalysisState::Idle);
        Self {
            service,
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            state,
        }
    }

    /// Submit a payload for analysis
    ///
    /// Fails immediately with `AlreadyInProgress` while another call is pending.
    /// Dropping the returned future releases the slot.
    pub async fn analyze(&self, payload: ImagePayload) -> Result<AnalysisResult> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Analysis rejected: another call is in flight");
            return Err(Error::AlreadyInProgress);
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let _slot = InFlightSlot {
            flag: &self.in_flight,
            state: &self.state,
            generation,
        };

        tracing::info!(
            generation = generation,
            file_name = %payload.file_name(),
            source = payload.source().as_str(),
            size = payload.len(),
            "Submitting image for analysis"
        );

        self.state.send_replace(AnalysisState::InFlight {
            generation,
            file_name: payload.file_name().to_string(),
            source: payload.source(),
            started_at: Utc::now(),
        });

        let started = Instant::now();
        let outcome = self.service.submit_image(payload).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(result) => {
                tracing::info!(
                    generation = generation,
                    elapsed_ms = elapsed_ms,
                    compliance = %result.compliance_status(),
                    violation_count = result.violation_count,
                    report_id = ?result.report_id,
                    "Analysis completed"
                );
                self.state.send_replace(AnalysisState::Completed {
                    generation,
                    result: result.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(
                    generation = generation,
                    elapsed_ms = elapsed_ms,
                    error = %e,
                    "Analysis failed"
                );
                self.state.send_replace(AnalysisState::Failed {
                    generation,
                    message: e.to_string(),
                });
            }
        }

        outcome
    }

    /// Dismiss a completed or failed outcome. Ignored while a call is in flight.
    pub fn clear(&self) {
        self.state.send_if_modified(|state| {
            if state.is_in_flight() || *state == AnalysisState::Idle {
                false
            } else {
                *state = AnalysisState::Idle;
                true
            }
        });
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn state(&self) -> AnalysisState {
        self.state.borrow().clone()
    }

    pub fn last_result(&self) -> Option<AnalysisResult> {
        self.state.borrow().result().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisState> {
        self.state.subscribe()
    }
}

/// Releases the in-flight flag on every exit path, including cancellation
struct InFlightSlot<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<AnalysisState>,
    generation: u64,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let generation = self.generation;
        let cancelled = self.state.send_if_modified(|state| match state {
            AnalysisState::InFlight { generation: g, .. } if *g == generation => {
                *state = AnalysisState::Idle;
                true
            }
            _ => false,
        });
        if cancelled {
            tracing::debug!(generation = generation, "Analysis cancelled before completion");
        }
        self.flag.store(false, Ordering::Release);
    }
}
