//! Per-cube query facade: status classification, basic info, and the
//! rebalancing history filtered to one day.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::calendar::CalendarZone;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;

use super::error::CubeError;
use super::http::XueqiuHttp;
use super::id::CubeId;
use super::models::{
    classify_history, classify_nav, BasicInfo, CubeStatus, NavSeries, RebalancingEvent,
    RemoteReply,
};

const POSITION_PATH: &str = "/P/";
const REBALANCE_PATH: &str = "/cubes/rebalancing/history.json?cube_symbol=";
const NAV_DAILY_PATH: &str = "/cubes/nav_daily/all.json?cube_symbol=";

/// Outcome of a status check with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: CubeStatus,
    /// Date of the most recent valuation, when one was seen.
    pub last_valuation: Option<NaiveDate>,
    /// Whole days between `last_valuation` and today.
    pub days_since: Option<i64>,
    /// Set when `days_since` is close enough to the closed threshold that the
    /// classification deserves a manual look.
    pub needs_review: bool,
}

impl StatusReport {
    fn bare(status: CubeStatus) -> Self {
        Self {
            status,
            last_valuation: None,
            days_since: None,
            needs_review: false,
        }
    }
}

/// Query handle bound to one cube.
///
/// Holds no remote state; every call goes to the network.
pub struct CubeClient {
    id: CubeId,
    position_url: String,
    rebalance_url: String,
    nav_url: String,
    http: XueqiuHttp,
    clock: Arc<dyn Clock>,
    zone: CalendarZone,
    policy: ClientConfig,
    cancel: CancellationToken,
}

impl CubeClient {
    /// Bind a client to `raw_id`, normalized to uppercase.
    pub fn new(raw_id: impl AsRef<str>, http: XueqiuHttp) -> Self {
        let id = CubeId::new(raw_id);
        let base = http.base_url().to_string();
        Self {
            position_url: format!("{base}{POSITION_PATH}{id}"),
            rebalance_url: format!("{base}{REBALANCE_PATH}{id}"),
            nav_url: format!("{base}{NAV_DAILY_PATH}{id}"),
            id,
            http,
            clock: Arc::new(SystemClock),
            zone: CalendarZone::default(),
            policy: ClientConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_zone(mut self, zone: CalendarZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_policy(mut self, policy: ClientConfig) -> Self {
        self.policy = policy;
        self
    }

    /// Token observed before each retry in [`CubeClient::basic_info`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> &CubeId {
        &self.id
    }

    /// The cube's public web page.
    pub fn position_url(&self) -> &str {
        &self.position_url
    }

    pub fn rebalance_url(&self) -> &str {
        &self.rebalance_url
    }

    pub fn nav_url(&self) -> &str {
        &self.nav_url
    }

    fn ensure_well_formed(&self) -> Result<(), CubeError> {
        CubeId::parse(self.id.as_str())?;
        Ok(())
    }

    async fn fetch_nav(&self) -> Result<RemoteReply<Vec<NavSeries>>, CubeError> {
        let value = self.http.fetch(&self.nav_url).await?;
        classify_nav(value)
    }

    pub async fn check_status(&self) -> CubeStatus {
        self.inspect_status().await.status
    }

    /// Classify the cube from its valuation history.
    ///
    /// The service has no "closed" flag: a cube whose history is empty or
    /// whose last valuation is older than `stale_after_days` counts as closed.
    /// Network and decode failures surface as [`CubeStatus::UnknownError`].
    pub async fn inspect_status(&self) -> StatusReport {
        if !self.id.is_well_formed() {
            warn!(cube = %self.id, "cube id is in invalid format");
            return StatusReport::bare(CubeStatus::InvalidFormat);
        }

        let reply = match self.fetch_nav().await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(cube = %self.id, error = %err, "cube status check failed");
                return StatusReport::bare(CubeStatus::UnknownError);
            }
        };

        match reply {
            RemoteReply::ErrorEnvelope(envelope) if envelope.is_not_found() => {
                warn!(cube = %self.id, "cube does not exist");
                StatusReport::bare(CubeStatus::NotFound)
            }
            RemoteReply::ErrorEnvelope(envelope) => {
                warn!(cube = %self.id, response = %envelope, "unrecognized error response");
                StatusReport::bare(CubeStatus::UnknownError)
            }
            RemoteReply::Data(series) => self.assess_staleness(&series),
        }
    }

    fn assess_staleness(&self, series: &[NavSeries]) -> StatusReport {
        // Cubes closed on the day they were created have no valuations at all.
        let Some(last) = series.first().and_then(|cube| cube.list.last()) else {
            info!(cube = %self.id, "cube closed (no valuation history)");
            return StatusReport::bare(CubeStatus::Closed);
        };

        let today = self.clock.today_in(&self.zone);
        let days_since = (today - last.date).num_days();
        let threshold = i64::from(self.policy.stale_after_days);
        let margin = u64::from(self.policy.review_margin_days);

        let status = if days_since > threshold {
            CubeStatus::Closed
        } else {
            CubeStatus::Active
        };
        let needs_review = margin > 0 && (days_since - threshold).unsigned_abs() <= margin;

        if needs_review {
            warn!(
                cube = %self.id,
                last_valuation = %last.date,
                days_since,
                threshold,
                status = %status,
                "cube staleness is near the closed threshold; review manually"
            );
        } else {
            debug!(cube = %self.id, days_since, status = %status, "cube status");
        }

        StatusReport {
            status,
            last_valuation: Some(last.date),
            days_since: Some(days_since),
            needs_review,
        }
    }

    /// Fetch the valuation series, retrying while the service answers with
    /// an error envelope.
    async fn nav_with_retry(&self) -> Result<Vec<NavSeries>, CubeError> {
        let retry = &self.policy.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let envelope = match self.fetch_nav().await? {
                RemoteReply::Data(series) => return Ok(series),
                RemoteReply::ErrorEnvelope(envelope) => envelope,
            };

            // A missing cube will not appear by asking again.
            if envelope.is_not_found() {
                return Err(CubeError::Remote(envelope));
            }
            if attempt >= max_attempts {
                return Err(CubeError::RetriesExhausted {
                    attempts: max_attempts,
                    last: envelope,
                });
            }
            if self.cancel.is_cancelled() {
                return Err(CubeError::Cancelled);
            }

            let delay = retry.delay_for(attempt);
            warn!(
                cube = %self.id,
                attempt,
                max_attempts,
                delay = %crate::duration::format_duration(delay),
                response = %envelope,
                "valuation request refused; retrying"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(CubeError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Name, creation date, and latest net value.
    pub async fn basic_info(&self) -> Result<BasicInfo, CubeError> {
        self.ensure_well_formed()?;

        let series = self.nav_with_retry().await?;
        let cube = series.first().ok_or(CubeError::NoValuationData)?;
        let (Some(first), Some(last)) = (cube.list.first(), cube.list.last()) else {
            return Err(CubeError::NoValuationData);
        };

        Ok(BasicInfo {
            name: cube.name.clone(),
            created_on: first.date,
            value: last.value,
        })
    }

    async fn fetch_history(&self) -> Result<Vec<RebalancingEvent>, CubeError> {
        let value = self.http.fetch(&self.rebalance_url).await?;
        match classify_history(value)? {
            RemoteReply::Data(page) => Ok(page.into_events()),
            RemoteReply::ErrorEnvelope(envelope) => Err(CubeError::Remote(envelope)),
        }
    }

    /// Every rebalance the service lists for this cube, unfiltered.
    pub async fn rebalance_history(&self) -> Result<Vec<RebalancingEvent>, CubeError> {
        self.ensure_well_formed()?;

        let result = self.fetch_history().await;
        if let Err(err) = &result {
            warn!(cube = %self.id, error = %err, "failed to get cube rebalances");
        }
        result
    }

    /// Successful owner-initiated rebalances dated `date` in the client's zone.
    ///
    /// `Ok` with an empty vector means the history was read and nothing
    /// matched; an unreadable history is an `Err`.
    pub async fn events_on(&self, date: NaiveDate) -> Result<Vec<RebalancingEvent>, CubeError> {
        let history = self.rebalance_history().await?;
        Ok(filter_events_on(history, date, &self.zone))
    }
}

/// Keep successful `user_rebalancing` events whose `updated_at` falls on `date`.
/// Events without a timestamp never match.
pub fn filter_events_on(
    events: impl IntoIterator<Item = RebalancingEvent>,
    date: NaiveDate,
    zone: &CalendarZone,
) -> Vec<RebalancingEvent> {
    events
        .into_iter()
        .filter(RebalancingEvent::is_successful_user_rebalance)
        .filter(|event| {
            event
                .updated_at
                .and_then(|at| zone.date_of_millis(at))
                == Some(date)
        })
        .collect()
}

/// Shared settings for building one [`CubeClient`] per watched cube.
#[derive(Clone)]
pub struct ClientContext {
    pub http: XueqiuHttp,
    pub clock: Arc<dyn Clock>,
    pub zone: CalendarZone,
    pub policy: ClientConfig,
    pub cancel: CancellationToken,
}

impl ClientContext {
    pub fn new(http: XueqiuHttp) -> Self {
        Self {
            http,
            clock: Arc::new(SystemClock),
            zone: CalendarZone::default(),
            policy: ClientConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn client_for(&self, id: &CubeId) -> CubeClient {
        CubeClient::new(id.as_str(), self.http.clone())
            .with_clock(self.clock.clone())
            .with_zone(self.zone)
            .with_policy(self.policy.clone())
            .with_cancellation(self.cancel.clone())
    }
}
