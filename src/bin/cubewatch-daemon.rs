use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use cubewatch::app;
use cubewatch::clock::{Clock, SystemClock};
use cubewatch::config::{default_config_path, ResolvedConfig};
use cubewatch::schedule::next_run_after;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cubewatch-daemon")]
#[command(about = "Long-running cubewatch daemon reporting rebalances on a daily schedule")]
struct Cli {
    /// Path to cubewatch config file.
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Run one cycle immediately, in addition to `schedule.run_on_start`.
    #[arg(long)]
    run_now: bool,

    /// Exit after the startup cycle instead of waiting for the schedule.
    #[arg(long, requires = "run_now")]
    once: bool,
}

struct Daemon {
    config: ResolvedConfig,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    run_on_start: bool,
    once: bool,
}

impl Daemon {
    async fn report_today(&self, reason: &str) -> Result<app::RunOutput> {
        let context = app::client_context(&self.config, self.clock.clone(), self.cancel.clone())?;
        let date = context.clock.today_in(&context.zone);
        info!(reason, date = %date, "cubewatch cycle starting");
        app::run_report(&self.config, context, date).await
    }

    async fn run_cycle(&self, reason: &str) {
        let cycle_result = self.report_today(reason).await;

        match cycle_result {
            Ok(output) => info!(
                reason,
                cubes = output.cubes,
                reported = output.reported,
                failed = output.failed,
                stopped = output.stopped,
                delivery_failures = output.delivery_failures.len(),
                "cubewatch cycle complete"
            ),
            Err(err) => warn!(reason, error = %format!("{err:#}"), "cubewatch cycle failed"),
        }
    }

    fn next_delay(&self) -> Result<(Duration, DateTime<Utc>)> {
        let schedule = &self.config.config.schedule;
        let now = self.clock.now();
        let next = next_run_after(now, schedule, &self.config.config.timezone)
            .context("No run time found in the schedule")?;
        let until = (next - now).to_std().unwrap_or(Duration::ZERO);
        let delay = compute_next_delay(until, schedule.jitter);
        Ok((delay, now + chrono_duration(delay)))
    }

    async fn run(self) -> Result<()> {
        if self.run_on_start {
            self.run_cycle("startup").await;
        }
        if self.once {
            return Ok(());
        }

        while !self.cancel.is_cancelled() {
            let (delay, at) = self.next_delay()?;
            info!(
                next_run = %self.config.config.timezone.naive_of(at),
                "waiting for next scheduled cycle"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => self.run_cycle("scheduled").await,
                _ = self.cancel.cancelled() => break,
            }
        }

        info!("cubewatch daemon stopped");
        Ok(())
    }
}

/// Delay until the next run plus a random offset in `[0, jitter]`.
fn compute_next_delay(until: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return until;
    }

    let jitter_ms = jitter.as_millis().min(u128::from(u64::MAX)) as u64;
    let offset = rand::thread_rng().gen_range(0..=jitter_ms);
    until.saturating_add(Duration::from_millis(offset))
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .json(),
        )
        .init();

    let cli = Cli::parse();

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load cubewatch config: {}", cli.config.display()))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping");
            on_interrupt.cancel();
        }
    });

    let daemon = Daemon {
        run_on_start: cli.run_now || config.config.schedule.run_on_start,
        once: cli.once,
        config,
        clock: Arc::new(SystemClock),
        cancel,
    };

    daemon.run().await
}
