//! One poll cycle over the watchlist.
//!
//! Cubes are read strictly one after another with a pause in between. A
//! failing cube is logged and recorded; it never stops the cycle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PollConfig;
use crate::cube::{
    BasicInfo, ClientContext, CubeError, CubeId, RebalancingEvent, StatusReport,
};

/// Everything learned about one cube in a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CubeSnapshot {
    /// `None` when status checks are disabled.
    pub status: Option<StatusReport>,
    pub name: String,
    pub created_on: NaiveDate,
    pub current_value: f64,
    /// Matching rebalances; empty when none were made or when the history
    /// could not be read (see `events_error`).
    pub events: Vec<RebalancingEvent>,
    pub events_error: Option<String>,
}

impl CubeSnapshot {
    fn new(status: Option<StatusReport>, info: BasicInfo) -> Self {
        Self {
            status,
            name: info.name,
            created_on: info.created_on,
            current_value: info.value,
            events: Vec::new(),
            events_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CubeOutcome {
    Reported(CubeSnapshot),
    /// The status check found the cube not worth reading.
    Skipped { status: StatusReport },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CubeResult {
    pub cube_id: CubeId,
    #[serde(flatten)]
    pub outcome: CubeOutcome,
}

/// Result of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Day whose rebalances were collected.
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<CubeResult>,
    /// True when the cycle ended early on a stop request.
    pub stopped: bool,
}

impl CycleReport {
    pub fn reported(&self) -> impl Iterator<Item = (&CubeId, &CubeSnapshot)> {
        self.results.iter().filter_map(|result| match &result.outcome {
            CubeOutcome::Reported(snapshot) => Some((&result.cube_id, snapshot)),
            _ => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|result| matches!(result.outcome, CubeOutcome::Failed { .. }))
            .count()
    }
}

enum Step {
    Done(CubeOutcome),
    Stop,
}

pub struct Poller {
    context: ClientContext,
    settings: PollConfig,
}

impl Poller {
    pub fn new(context: ClientContext, settings: PollConfig) -> Self {
        Self { context, settings }
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    /// Poll every cube in order and collect rebalances made on `date`.
    pub async fn run_cycle(&self, cubes: &[CubeId], date: NaiveDate) -> CycleReport {
        let cancel = &self.context.cancel;
        let started_at = self.context.clock.now();
        let mut results = Vec::with_capacity(cubes.len());
        let mut stopped = false;

        info!(cubes = cubes.len(), date = %date, "starting poll cycle");

        for (index, cube_id) in cubes.iter().enumerate() {
            if cancel.is_cancelled() {
                stopped = true;
                break;
            }

            if index > 0 && !self.settings.cube_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        stopped = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.settings.cube_delay) => {}
                }
            }

            match self.poll_cube(cube_id, date).await {
                Step::Done(outcome) => results.push(CubeResult {
                    cube_id: cube_id.clone(),
                    outcome,
                }),
                Step::Stop => {
                    stopped = true;
                    break;
                }
            }
        }

        if stopped {
            warn!(completed = results.len(), "poll cycle stopped on request");
        }

        let report = CycleReport {
            date,
            started_at,
            finished_at: self.context.clock.now(),
            results,
            stopped,
        };
        info!(
            polled = report.results.len(),
            failed = report.failed_count(),
            "poll cycle finished"
        );
        report
    }

    async fn poll_cube(&self, cube_id: &CubeId, date: NaiveDate) -> Step {
        let client = self.context.client_for(cube_id);
        info!(cube = %cube_id, "reading cube");

        let status = if self.settings.check_status {
            let report = client.inspect_status().await;
            if !report.status.is_active() {
                info!(cube = %cube_id, status = %report.status, "skipping cube");
                return Step::Done(CubeOutcome::Skipped { status: report });
            }
            Some(report)
        } else {
            None
        };

        let info = match client.basic_info().await {
            Ok(info) => info,
            Err(CubeError::Cancelled) => return Step::Stop,
            Err(err) => {
                warn!(
                    cube = %cube_id,
                    error = %err,
                    transient = err.is_transient(),
                    "failed to read cube details"
                );
                return Step::Done(CubeOutcome::Failed {
                    error: err.to_string(),
                });
            }
        };

        let mut snapshot = CubeSnapshot::new(status, info);
        match client.events_on(date).await {
            Ok(events) => {
                info!(cube = %cube_id, events = events.len(), "read rebalances");
                snapshot.events = events;
            }
            Err(err) => {
                warn!(cube = %cube_id, error = %err, "failed to read rebalances");
                snapshot.events_error = Some(err.to_string());
            }
        }

        Step::Done(CubeOutcome::Reported(snapshot))
    }
}
