pub mod aggregator;
pub mod normalizer;
pub mod ranker;


pub use aggregator::{aggregate, group, GroupKey, Grouping};
pub use normalizer::{FieldExtractor, FieldTable, NormalizedBatch, Normalizer};
pub use ranker::rank;

use chrono::{DateTime, Utc};
use engageboard_core::{LeaderboardSnapshot, NormalizedPost};
use serde_json::Value;
use std::collections::HashSet;
use tracing::info;

/// Output of one pass over a raw batch: the ranked snapshot plus the
/// normalized posts the store needs for its post table. Each post's `handle`
/// is rewritten to the handle of the author row it was folded into.
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub snapshot: LeaderboardSnapshot,
    pub posts: Vec<NormalizedPost>,
    pub skipped: usize,
    /// Records dropped because their post id already appeared in the batch.
    pub duplicates: usize,
}

pub struct ScoringEngine {
    normalizer: Normalizer,
    group_key: GroupKey,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(Normalizer::default(), GroupKey::AuthorId)
    }
}

impl ScoringEngine {
    pub fn new(normalizer: Normalizer, group_key: GroupKey) -> Self {
        Self {
            normalizer,
            group_key,
        }
    }

    /// Normalize, aggregate and rank a raw batch. Pure apart from logging.
    /// A post id seen twice in one batch is folded once, first occurrence wins.
    pub fn score_batch(&self, records: &[Value], captured_at: DateTime<Utc>) -> ScoredBatch {
        let NormalizedBatch { mut posts, skipped } = self.normalizer.normalize_batch(records);
        let duplicates = dedupe_post_ids(&mut posts);
        let Grouping { aggregates, owners } = group(&posts, self.group_key);
        for (post, owner) in posts.iter_mut().zip(owners) {
            if post.handle != aggregates[owner].handle {
                post.handle = aggregates[owner].handle.clone();
            }
        }
        let ranked = rank(aggregates);

        info!(
            raw = records.len(),
            posts = posts.len(),
            skipped,
            duplicates,
            authors = ranked.len(),
            "Scored post batch"
        );

        ScoredBatch {
            snapshot: LeaderboardSnapshot::new(captured_at, ranked),
            posts,
            skipped,
            duplicates,
        }
    }
}

fn dedupe_post_ids(posts: &mut Vec<NormalizedPost>) -> usize {
    let before = posts.len();
    let mut seen = HashSet::with_capacity(before);
    posts.retain(|post| seen.insert(post.post_id.clone()));
    before - posts.len()
}
