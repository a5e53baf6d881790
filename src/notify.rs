//! Report delivery.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;

use crate::calendar::COMPACT_DATE_FORMAT;
use crate::config::ReportConfig;
use crate::report::Report;

/// Somewhere a rendered report can be sent.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, date: NaiveDate, report: &Report) -> Result<()>;
}

/// Writes every report line to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, _date: NaiveDate, report: &Report) -> Result<()> {
        info!(subject = %report.subject, "report");
        for line in &report.lines {
            info!("{line}");
        }
        Ok(())
    }
}

/// Writes one `cubewatch-YYYYMMDD.txt` per day into a directory.
#[derive(Debug, Clone)]
pub struct FileNotifier {
    dir: PathBuf,
}

impl FileNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("cubewatch-{}.txt", date.format(COMPACT_DATE_FORMAT)))
    }
}

#[async_trait]
impl Notifier for FileNotifier {
    fn name(&self) -> &str {
        "file"
    }

    /// Replaces any earlier report for the same day.
    async fn deliver(&self, date: NaiveDate, report: &Report) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create report directory: {}", self.dir.display()))?;

        let path = self.path_for(date);
        let mut content = format!("{}\n\n", report.subject);
        content.push_str(&report.body());
        content.push('\n');

        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        info!(path = %path.display(), "report written");
        Ok(())
    }
}

/// Notifiers enabled by the report settings.
pub fn notifiers_from_config(config: &ReportConfig) -> Vec<Box<dyn Notifier>> {
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    if config.log_lines {
        notifiers.push(Box::new(LogNotifier));
    }
    if let Some(dir) = &config.output_dir {
        notifiers.push(Box::new(FileNotifier::new(dir.clone())));
    }
    notifiers
}

/// Hand the report to every notifier, collecting failures instead of stopping
/// at the first one.
pub async fn deliver_all(
    notifiers: &[Box<dyn Notifier>],
    date: NaiveDate,
    report: &Report,
) -> Vec<(String, anyhow::Error)> {
    let mut failures = Vec::new();
    for notifier in notifiers {
        if let Err(err) = notifier.deliver(date, report).await {
            tracing::error!(notifier = notifier.name(), error = %err, "report delivery failed");
            failures.push((notifier.name().to_string(), err));
        }
    }
    failures
}
