use crate::builder::RecordBuilder;
use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::config::{COMMIT_INTERVAL, PROGRESS_INTERVAL};
use crate::error::Built;
use crate::models::RawPage;
use crate::sink::RecordSink;
use crate::stats::PipelineStats;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pages between sink flushes; 0 flushes only at the end
    pub commit_interval: u64,
    /// Stop after this many pages, counted across resumed runs
    pub limit: Option<u64>,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commit_interval: COMMIT_INTERVAL,
            limit: None,
            show_progress: false,
        }
    }
}

fn make_spinner(show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn commit<R, S>(
    sink: &mut S,
    stats: &mut PipelineStats,
    checkpoints: Option<&CheckpointManager>,
) -> Result<()>
where
    S: RecordSink<R> + ?Sized,
{
    sink.flush().context("Failed to flush records")?;
    stats.commits += 1;
    if let Some(manager) = checkpoints {
        manager.save(stats.pages, stats)?;
    }
    debug!(pages = stats.pages, emitted = stats.emitted, "Committed");
    Ok(())
}

/// Drives pages from `pages` through `builder` into `sink`.
///
/// Pages that fail to build are logged and counted; they never stop the run.
/// Errors from the page source or the sink are fatal. With `resume`, the
/// pages the checkpoint already covers are read and discarded first.
pub fn run<I, B, S>(
    pages: I,
    builder: &B,
    sink: &mut S,
    config: &PipelineConfig,
    resume: Option<&Checkpoint>,
    checkpoints: Option<&CheckpointManager>,
) -> Result<PipelineStats>
where
    I: IntoIterator<Item = Result<RawPage>>,
    B: RecordBuilder,
    S: RecordSink<B::Record> + ?Sized,
{
    let mut pages = pages.into_iter();
    let mut stats = PipelineStats::new();

    if let Some(cp) = resume {
        let mut skipped = 0;
        while skipped < cp.pages_seen {
            if pages.next().transpose()?.is_none() {
                break;
            }
            skipped += 1;
        }
        stats = cp.stats.clone();
        info!(pages = skipped, "Skipped pages covered by checkpoint");
    }

    let pb = make_spinner(config.show_progress);
    let mut since_commit: u64 = 0;

    loop {
        if config.limit.is_some_and(|limit| stats.pages >= limit) {
            info!(limit = stats.pages, "Page limit reached");
            break;
        }
        let Some(page) = pages.next().transpose()? else {
            break;
        };
        stats.pages += 1;

        let title = page.title.clone();
        match builder.build(page) {
            Built::Record(record) => {
                if sink.write(&record)? {
                    stats.emitted += 1;
                } else {
                    stats.duplicates += 1;
                    trace!(title = %title, "Duplicate ignored");
                }
            }
            Built::Dropped => {
                stats.dropped += 1;
                trace!(title = %title, "No record for page");
            }
            Built::Rejected(e) => {
                stats.rejected += 1;
                warn!(title = %title, error = %e, "Skipping page");
            }
        }

        since_commit += 1;
        if config.commit_interval > 0 && since_commit >= config.commit_interval {
            commit::<B::Record, S>(sink, &mut stats, checkpoints)?;
            since_commit = 0;
        }

        if stats.pages % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!(
                "{} pages, {} records, {} skipped",
                stats.pages,
                stats.emitted,
                stats.skipped()
            ));
        }
    }

    commit::<B::Record, S>(sink, &mut stats, checkpoints)?;
    pb.finish_and_clear();

    info!(
        pages = stats.pages,
        emitted = stats.emitted,
        dropped = stats.dropped,
        rejected = stats.rejected,
        duplicates = stats.duplicates,
        "Pipeline finished"
    );

    Ok(stats)
}
