use chrono::Utc;
use database::{Database, IndexRun};
use engageboard_core::{CoreError, ErrorReporter, IndexMode};
use feed_client::FeedApiClient;
use scoring_engine::ScoringEngine;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

#[cfg(test)]
mod tests;

/// Where an indexing run gets its raw window of posts.
pub trait PostSource {
    async fn fetch_posts(&self) -> Result<Vec<Value>, CoreError>;
}

/// The community posts API, bound to one community and window size.
pub struct CommunityFeed {
    client: FeedApiClient,
    community_id: String,
    limit: u32,
}

impl CommunityFeed {
    pub fn new(client: FeedApiClient, community_id: String, limit: u32) -> Self {
        Self {
            client,
            community_id,
            limit,
        }
    }
}

impl PostSource for CommunityFeed {
    async fn fetch_posts(&self) -> Result<Vec<Value>, CoreError> {
        self.client
            .fetch_community_posts(&self.community_id, self.limit)
            .await
    }
}

/// Counts from a polling loop that was shut down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub succeeded: u64,
    pub failed: u64,
}

pub struct IndexingService<P> {
    source: P,
    database: Database,
    engine: ScoringEngine,
    polling_interval: Duration,
    reporter: ErrorReporter,
}

impl<P: PostSource> IndexingService<P> {
    pub fn new(source: P, database: Database, polling_interval_minutes: u64) -> Self {
        Self {
            source,
            database,
            engine: ScoringEngine::default(),
            polling_interval: Duration::from_secs(polling_interval_minutes.max(1) * 60),
            reporter: ErrorReporter::new(),
        }
    }

    pub fn with_polling_interval(mut self, polling_interval: Duration) -> Self {
        self.polling_interval = polling_interval;
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// fetch → normalize → aggregate → rank → persist. Any failure other than
    /// a malformed record (already skipped by the normalizer) aborts the run.
    pub async fn run_once(&self, mode: IndexMode) -> Result<IndexRun, CoreError> {
        let started = Instant::now();
        info!(%mode, "Starting indexing run");

        let raw = self.source.fetch_posts().await?;
        let scored = self.engine.score_batch(&raw, Utc::now());

        let run = match mode {
            IndexMode::Upsert => {
                self.database
                    .upsert_batch(&scored.snapshot, &scored.posts)
                    .await?
            }
            IndexMode::Full => {
                self.database
                    .reindex_full(&scored.snapshot, &scored.posts)
                    .await?
            }
        };

        info!(
            run_id = %run.run_id,
            %mode,
            authors = run.author_count,
            posts = run.post_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Indexing run complete"
        );
        Ok(run)
    }

    /// Runs an indexing pass immediately and then once per polling interval
    /// until `shutdown` resolves. A failed pass is reported and the loop
    /// carries on; backoff is left to the interval.
    pub async fn run_forever<F>(&self, mode: IndexMode, shutdown: F) -> WatchSummary
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.polling_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut summary = WatchSummary::default();
        info!(
            interval_secs = self.polling_interval.as_secs(),
            %mode,
            "Watching community feed"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(?summary, "Stopping indexing loop");
                    break;
                }
                _ = interval.tick() => {
                    match self.run_once(mode).await {
                        Ok(_) => summary.succeeded += 1,
                        Err(e) => {
                            summary.failed += 1;
                            error!("Indexing run failed, will retry next interval");
                            self.reporter.report_error(&e);
                        }
                    }
                }
            }
        }

        summary
    }
}
