// Episode refresher - finds recently premiered episodes whose metadata looks
// unfinished and asks the server to re-fetch it.

pub mod placeholder;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::models::{Episode, RefreshOptions};
use crate::services::jellyfin::{MediaLibrary, SiblingFetcher};

pub use placeholder::is_placeholder_title;

/// Decide whether an episode's metadata should be refreshed.
///
/// Only placeholder-titled episodes that do have a synopsis need a look at
/// their season: when every sampled sibling is placeholder-titled too, the
/// series simply doesn't name its episodes and a refresh would be a no-op.
pub async fn should_refresh_episode<F>(episode: &Episode, siblings: &F) -> Result<bool>
where
    F: SiblingFetcher + ?Sized,
{
    if !is_placeholder_title(episode) {
        return Ok(!episode.has_overview());
    }

    if !episode.has_overview() {
        return Ok(true);
    }

    let Some(parent_id) = episode.parent_id.as_deref() else {
        tracing::debug!("Episode {} has no parent season, cannot compare siblings", episode.id);
        return Ok(true);
    };

    let season = siblings.season_siblings(parent_id).await?;

    // Too few episodes to tell a naming convention from a failed lookup
    if season.len() <= 1 {
        return Ok(true);
    }

    Ok(!season.iter().all(is_placeholder_title))
}

/// What happened to a single episode during a batch
#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeOutcome {
    Refreshed,
    Unchanged,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeResult {
    pub episode_id: String,
    pub outcome: EpisodeOutcome,
}

/// Per-episode results of one scan
#[derive(Debug, Default)]
pub struct BatchReport {
    pub found: usize,
    pub results: Vec<EpisodeResult>,
    /// Set when shutdown interrupted the batch before every episode was evaluated
    pub cancelled: bool,
}

impl BatchReport {
    pub fn refreshed(&self) -> usize {
        self.count(|o| matches!(o, EpisodeOutcome::Refreshed))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, EpisodeOutcome::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EpisodeOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&EpisodeOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

async fn process_episode<L>(library: &L, episode: &Episode) -> Result<bool>
where
    L: MediaLibrary + ?Sized,
{
    tracing::debug!(
        "Evaluating {} (premiered {})",
        episode,
        episode.premiere_date.as_deref().unwrap_or("unknown")
    );

    if !should_refresh_episode(episode, library).await? {
        return Ok(false);
    }

    tracing::info!("refreshing {}", episode);
    library
        .refresh_item(&episode.id, &RefreshOptions::full_replace())
        .await?;
    Ok(true)
}

/// Scan episodes premiered in the last `days` days and refresh the ones
/// that need it. Episodes are handled one after another; a failure on one
/// is recorded in the report and the scan moves on.
///
/// Only the initial episode listing can fail the whole batch.
pub async fn refresh_episodes<L>(
    library: &L,
    days: u32,
    cancel: &CancellationToken,
) -> Result<BatchReport>
where
    L: MediaLibrary + ?Sized,
{
    tracing::info!("Scanning for episodes in last {} days…", days);

    let since = Utc::now()
        .checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let episodes = library.recent_episodes(since).await?;

    tracing::info!("Found {} episodes.", episodes.len());

    let mut report = BatchReport {
        found: episodes.len(),
        ..Default::default()
    };

    for episode in &episodes {
        if cancel.is_cancelled() {
            tracing::warn!(
                "Scan interrupted by shutdown, {} episodes not evaluated",
                report.found - report.results.len()
            );
            report.cancelled = true;
            break;
        }

        let outcome = match process_episode(library, episode).await {
            Ok(true) => EpisodeOutcome::Refreshed,
            Ok(false) => EpisodeOutcome::Unchanged,
            Err(e) => {
                tracing::error!("Failed to process episode {} ({}): {:#}", episode.id, episode, e);
                EpisodeOutcome::Failed(format!("{:#}", e))
            }
        };

        report.results.push(EpisodeResult {
            episode_id: episode.id.clone(),
            outcome,
        });
    }

    tracing::info!(
        "Done. {} found, {} refreshed, {} unchanged, {} failed",
        report.found,
        report.refreshed(),
        report.unchanged(),
        report.failed()
    );

    if report.failed() > 0 {
        let failed: Vec<&str> = report
            .results
            .iter()
            .filter(|r| matches!(r.outcome, EpisodeOutcome::Failed(_)))
            .map(|r| r.episode_id.as_str())
            .collect();
        tracing::warn!("Failed episodes: {}", failed.join(", "));
    }

    Ok(report)
}

/// Result of a scheduler tick
#[derive(Debug)]
pub enum TickOutcome {
    Completed(BatchReport),
    /// The previous tick was still running
    Skipped,
}

/// The refresh job as driven by the scheduler. Owns the long-lived client
/// and keeps ticks from overlapping.
pub struct EpisodeRefresher<L: MediaLibrary + ?Sized> {
    library: Arc<L>,
    days: u32,
    running: Mutex<()>,
    cancel: CancellationToken,
}

impl<L: MediaLibrary + ?Sized> EpisodeRefresher<L> {
    pub fn new(library: Arc<L>, days: u32, cancel: CancellationToken) -> Self {
        Self {
            library,
            days,
            running: Mutex::new(()),
            cancel,
        }
    }

    /// Run one scan unless the previous one hasn't finished yet
    pub async fn tick(&self) -> Result<TickOutcome> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::warn!("Previous scan still running, skipping this tick");
            return Ok(TickOutcome::Skipped);
        };

        let report = refresh_episodes(self.library.as_ref(), self.days, &self.cancel).await?;
        Ok(TickOutcome::Completed(report))
    }
}
