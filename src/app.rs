//! Command implementations shared by the CLI and the daemon. Each returns a
//! serializable value; callers decide how to print it.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::calendar::parse_target_date;
use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::cube::{ClientContext, CubeId, RebalancingEvent, StatusReport, XueqiuHttp};
use crate::notify::{deliver_all, notifiers_from_config};
use crate::poll::Poller;
use crate::report;
use crate::watchlist::configured_cubes;

/// Build the per-cube client settings from configuration.
///
/// Loads the token, so this fails when no token is available.
pub fn client_context(
    config: &ResolvedConfig,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> Result<ClientContext> {
    let source = config.token_source();
    let token = source
        .load()
        .with_context(|| format!("Failed to load xueqiu token from {}", source.describe()))?;

    let settings = &config.config.client;
    let mut http = XueqiuHttp::new(token)
        .context("Failed to build HTTP client")?
        .with_timeout(settings.request_timeout);
    if let Some(base_url) = &settings.base_url {
        http = http.with_base_url(base_url.clone());
    }

    let mut context = ClientContext::new(http);
    context.clock = clock;
    context.zone = config.config.timezone;
    context.policy = settings.clone();
    context.cancel = cancel;
    Ok(context)
}

/// Context with the system clock and a fresh cancellation token.
pub fn default_client_context(config: &ResolvedConfig) -> Result<ClientContext> {
    client_context(config, Arc::new(SystemClock), CancellationToken::new())
}

pub fn config_output(config: &ResolvedConfig) -> Result<serde_json::Value> {
    let cubes = configured_cubes(&config.config)?;
    Ok(serde_json::json!({
        "config_file": config.path.display().to_string(),
        "token_source": config.token_source().describe(),
        "timezone": config.config.timezone.to_string(),
        "watchlist": config.config.watchlist.as_ref().map(|p| p.display().to_string()),
        "cubes": cubes,
        "client": config.config.client,
        "poll": config.config.poll,
        "schedule": config.config.schedule,
        "report": config.config.report,
    }))
}

/// Day to report on: `date` when given, otherwise today in the configured zone.
pub fn resolve_target_date(context: &ClientContext, date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(raw) => parse_target_date(raw),
        None => Ok(context.clock.today_in(&context.zone)),
    }
}

/// JSON output for a status check
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub cube_id: CubeId,
    pub position_url: String,
    #[serde(flatten)]
    pub report: StatusReport,
}

pub async fn check_statuses(context: &ClientContext, cubes: &[CubeId]) -> Vec<StatusOutput> {
    let mut output = Vec::with_capacity(cubes.len());
    for cube_id in cubes {
        let client = context.client_for(cube_id);
        let report = client.inspect_status().await;
        output.push(StatusOutput {
            cube_id: client.id().clone(),
            position_url: client.position_url().to_string(),
            report,
        });
    }
    output
}

/// JSON output for basic info
#[derive(Debug, Serialize)]
pub struct InfoOutput {
    pub cube_id: CubeId,
    pub name: String,
    pub created_on: NaiveDate,
    pub value: f64,
    pub position_url: String,
}

pub async fn cube_info(context: &ClientContext, cube_id: &CubeId) -> Result<InfoOutput> {
    let client = context.client_for(cube_id);
    let info = client
        .basic_info()
        .await
        .with_context(|| format!("Failed to read cube {}", client.id()))?;
    Ok(InfoOutput {
        cube_id: client.id().clone(),
        name: info.name,
        created_on: info.created_on,
        value: info.value,
        position_url: client.position_url().to_string(),
    })
}

/// JSON output for one cube's rebalances
#[derive(Debug, Serialize)]
pub struct EventsOutput {
    pub cube_id: CubeId,
    pub date: NaiveDate,
    pub events: Vec<RebalancingEvent>,
}

pub async fn cube_events(
    context: &ClientContext,
    cube_id: &CubeId,
    date: NaiveDate,
) -> Result<EventsOutput> {
    let client = context.client_for(cube_id);
    let events = client
        .events_on(date)
        .await
        .with_context(|| format!("Failed to read rebalances of {}", client.id()))?;
    Ok(EventsOutput {
        cube_id: client.id().clone(),
        date,
        events,
    })
}

/// JSON output for a full report run
#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub date: NaiveDate,
    pub subject: String,
    pub cubes: usize,
    pub reported: usize,
    pub failed: usize,
    pub stopped: bool,
    pub delivery_failures: Vec<String>,
    pub lines: Vec<String>,
}

/// Poll every configured cube, render the report, and deliver it.
pub async fn run_report(
    config: &ResolvedConfig,
    context: ClientContext,
    date: NaiveDate,
) -> Result<RunOutput> {
    let cubes = configured_cubes(&config.config)?;
    if cubes.is_empty() {
        warn!("no cubes configured; the report will be empty");
    }

    let zone = context.zone;
    let poller = Poller::new(context, config.config.poll.clone());
    let cycle = poller.run_cycle(&cubes, date).await;
    let rendered = report::render(&cycle, &zone);

    let notifiers = notifiers_from_config(&config.config.report);
    let failures = deliver_all(&notifiers, date, &rendered).await;
    info!(
        date = %date,
        notifiers = notifiers.len(),
        failed = failures.len(),
        "report delivered"
    );

    Ok(RunOutput {
        date,
        subject: rendered.subject,
        cubes: cubes.len(),
        reported: cycle.reported().count(),
        failed: cycle.failed_count(),
        stopped: cycle.stopped,
        delivery_failures: failures
            .into_iter()
            .map(|(name, err)| format!("{name}: {err:#}"))
            .collect(),
        lines: rendered.lines,
    })
}
