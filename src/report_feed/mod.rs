//! ReportFeedPoller - Periodic Statistics/Report Refresh
//!
//! ## Responsibilities
//!
//! - Fixed-interval refresh of aggregate statistics and recent reports
//! - Per-endpoint failure isolation (last good value of each half is kept)
//! - Sequence-tagged completions: a stale result never overwrites a newer one
//! - One aggregated `FetchDegraded` notice per cycle with failures
//!
//! Each timer tick dispatches its cycle as its own task, so a slow fetch does
//! not hold up the timer. At most `MAX_TIMER_CYCLES_IN_FLIGHT` timer cycles
//! run at once; further ticks are skipped until one finishes. `stop()` cancels
//! the timer only; cycles already dispatched run to completion and are
//! discarded if superseded.

use crate::error::{Error, Result};
use crate::models::{
    EndpointFailure, FeedEndpoint, FeedNotice, ReportRecord, ReportSnapshot, StatisticsSnapshot,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Notice channel capacity
const NOTICE_CHANNEL_CAPACITY: usize = 32;

/// Timer-dispatched cycles allowed to be pending at once
pub const MAX_TIMER_CYCLES_IN_FLIGHT: usize = 4;

/// The two read endpoints the poller consumes
#[async_trait]
pub trait ReportFeedSource: Send + Sync {
    async fn fetch_statistics(&self) -> Result<StatisticsSnapshot>;

    /// Most recent first, at most `limit` records
    async fn fetch_recent_reports(&self, limit: u32) -> Result<Vec<ReportRecord>>;
}

/// What happened to one endpoint's completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome {
    /// Newest data so far; written into the snapshot
    Applied,
    /// A newer cycle already delivered data for this endpoint
    Stale,
    Failed(String),
}

/// Result of one refresh cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub sequence: u64,
    pub statistics: EndpointOutcome,
    pub reports: EndpointOutcome,
}

impl CycleOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self.statistics, EndpointOutcome::Failed(_))
            || matches!(self.reports, EndpointOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum CycleTrigger {
    Timer,
    Manual,
}

impl CycleTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            CycleTrigger::Timer => "timer",
            CycleTrigger::Manual => "manual",
        }
    }
}

/// State shared between the poller handle, its timer task and dispatched cycles
struct FeedShared {
    source: Arc<dyn ReportFeedSource>,
    report_limit: u32,
    next_sequence: AtomicU64,
    timer_cycles: AtomicUsize,
    snapshot: watch::Sender<ReportSnapshot>,
    notices: broadcast::Sender<FeedNotice>,
}

impl FeedShared {
    async fn run_cycle(&self, trigger: CycleTrigger) -> CycleOutcome {
        let sequence = self.next_sequence.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(sequence = sequence, trigger = trigger.as_str(), "Refresh cycle started");

        let (statistics, reports) = tokio::join!(
            async {
                let result = self.source.fetch_statistics().await;
                self.apply_statistics(sequence, result)
            },
            async {
                let result = self.source.fetch_recent_reports(self.report_limit).await;
                self.apply_reports(sequence, result)
            },
        );

        self.finish_cycle(sequence, &statistics, &reports);

        CycleOutcome {
            sequence,
            statistics,
            reports,
        }
    }

    fn apply_statistics(
        &self,
        sequence: u64,
        result: Result<StatisticsSnapshot>,
    ) -> EndpointOutcome {
        let statistics = match result {
            Ok(statistics) => statistics,
            Err(e) => return Self::fetch_failed(sequence, FeedEndpoint::Statistics, &e),
        };

        let applied = self.snapshot.send_if_modified(|snapshot| {
            if sequence <= snapshot.statistics_seq {
                return false;
            }
            snapshot.statistics = Some(statistics);
            snapshot.statistics_seq = sequence;
            snapshot.statistics_updated_at = Some(Utc::now());
            true
        });

        Self::applied_or_stale(sequence, FeedEndpoint::Statistics, applied)
    }

    fn apply_reports(&self, sequence: u64, result: Result<Vec<ReportRecord>>) -> EndpointOutcome {
        let reports = match result {
            Ok(reports) => reports,
            Err(e) => return Self::fetch_failed(sequence, FeedEndpoint::Reports, &e),
        };

        let count = reports.len();
        let applied = self.snapshot.send_if_modified(|snapshot| {
            if sequence <= snapshot.reports_seq {
                return false;
            }
            snapshot.reports = Some(reports);
            snapshot.reports_seq = sequence;
            snapshot.reports_updated_at = Some(Utc::now());
            true
        });

        if applied {
            tracing::debug!(sequence = sequence, count = count, "Report list refreshed");
        }
        Self::applied_or_stale(sequence, FeedEndpoint::Reports, applied)
    }

    fn applied_or_stale(sequence: u64, endpoint: FeedEndpoint, applied: bool) -> EndpointOutcome {
        if applied {
            EndpointOutcome::Applied
        } else {
            tracing::debug!(
                sequence = sequence,
                endpoint = endpoint.as_str(),
                "Discarding stale completion"
            );
            EndpointOutcome::Stale
        }
    }

    fn fetch_failed(sequence: u64, endpoint: FeedEndpoint, error: &Error) -> EndpointOutcome {
        tracing::warn!(
            sequence = sequence,
            endpoint = endpoint.as_str(),
            error = %error,
            "Feed fetch failed"
        );
        EndpointOutcome::Failed(error.to_string())
    }

    fn finish_cycle(&self, sequence: u64, statistics: &EndpointOutcome, reports: &EndpointOutcome) {
        let failures: Vec<EndpointFailure> = [
            (FeedEndpoint::Statistics, statistics),
            (FeedEndpoint::Reports, reports),
        ]
        .into_iter()
        .filter_map(|(endpoint, outcome)| match outcome {
            EndpointOutcome::Failed(message) => Some(EndpointFailure {
                endpoint,
                message: message.clone(),
            }),
            _ => None,
        })
        .collect();

        if failures.is_empty() {
            self.snapshot.send_modify(|snapshot| {
                snapshot.cycles_completed += 1;
                if snapshot
                    .degraded
                    .as_ref()
                    .is_some_and(|notice| notice.sequence < sequence)
                {
                    snapshot.degraded = None;
                }
            });
            return;
        }

        let notice = FeedNotice {
            sequence,
            failures,
            raised_at: Utc::now(),
        };

        tracing::warn!(
            sequence = sequence,
            all_failed = notice.all_failed(),
            failures = %notice.summary(),
            "Feed degraded, keeping last good data"
        );

        self.snapshot.send_modify(|snapshot| {
            snapshot.cycles_completed += 1;
            if snapshot
                .degraded
                .as_ref()
                .map_or(true, |current| current.sequence < sequence)
            {
                snapshot.degraded = Some(notice.clone());
            }
        });

        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}

/// Counts a timer cycle as pending until dropped
struct TimerCycleSlot<'a>(&'a AtomicUsize);

impl Drop for TimerCycleSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct TimerHandle {
    task: JoinHandle<()>,
    period: Duration,
}

/// ReportFeedPoller instance
pub struct ReportFeedPoller {
    shared: Arc<FeedShared>,
    timer: Mutex<Option<TimerHandle>>,
}

impl ReportFeedPoller {
    /// Create a poller fetching `report_limit` recent reports per cycle
    pub fn new(source: Arc<dyn ReportFeedSource>, report_limit: u32) -> Self {
        let (snapshot, _) = watch::channel(ReportSnapshot::default());
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(FeedShared {
                source,
                report_limit,
                next_sequence: AtomicU64::new(0),
                timer_cycles: AtomicUsize::new(0),
                snapshot,
                notices,
            }),
            timer: Mutex::new(None),
        }
    }

    /// Start the periodic refresh; the first cycle runs immediately
    ///
    /// Calling this while already running is a no-op.
    pub async fn start(&self, interval_ms: u64) -> Result<()> {
        if interval_ms == 0 {
            return Err(Error::Validation(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        let mut timer = self.timer.lock().await;
        if let Some(existing) = timer.as_ref() {
            tracing::debug!(
                interval_ms = existing.period.as_millis() as u64,
                "Report feed poller already running"
            );
            return Ok(());
        }

        let period = Duration::from_millis(interval_ms);
        let shared = self.shared.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let pending = shared.timer_cycles.load(Ordering::Acquire);
                if pending >= MAX_TIMER_CYCLES_IN_FLIGHT {
                    tracing::warn!(
                        pending = pending,
                        "Skipping refresh tick, earlier cycles still pending"
                    );
                    continue;
                }

                shared.timer_cycles.fetch_add(1, Ordering::AcqRel);
                let shared = shared.clone();
                tokio::spawn(async move {
                    let _slot = TimerCycleSlot(&shared.timer_cycles);
                    shared.run_cycle(CycleTrigger::Timer).await;
                });
            }
        });

        *timer = Some(TimerHandle { task, period });
        tracing::info!(
            interval_ms = interval_ms,
            report_limit = self.shared.report_limit,
            "Report feed poller started"
        );
        Ok(())
    }

    /// Cancel the timer. Idempotent.
    pub async fn stop(&self) {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.task.abort();
            tracing::info!("Report feed poller stopped");
        }
    }

    /// Run one cycle now, independent of the timer phase
    pub async fn refresh_now(&self) -> CycleOutcome {
        self.shared.run_cycle(CycleTrigger::Manual).await
    }

    pub async fn is_running(&self) -> bool {
        self.timer.lock().await.is_some()
    }

    pub fn snapshot(&self) -> ReportSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReportSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<FeedNotice> {
        self.shared.notices.subscribe()
    }

    pub fn report_limit(&self) -> u32 {
        self.shared.report_limit
    }
}

impl Drop for ReportFeedPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.task.abort();
            tracing::debug!("Report feed poller dropped, timer cancelled");
        }
    }
}
