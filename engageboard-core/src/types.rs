use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of posts kept per author.
pub const RECENT_POST_LIMIT: usize = 5;

pub const LIKE_WEIGHT: u64 = 1;
pub const RETWEET_WEIGHT: u64 = 2;
pub const POST_WEIGHT: u64 = 5;

const AVATAR_PALETTE: [&str; 8] = [
    "#f97316", "#22c55e", "#3b82f6", "#a855f7", "#ec4899", "#eab308", "#14b8a6", "#ef4444",
];

/// Engagement score: likes + 2 * retweets + 5 * posts.
pub fn engagement_score(like_total: u64, retweet_total: u64, post_count: u64) -> u64 {
    like_total
        .saturating_mul(LIKE_WEIGHT)
        .saturating_add(retweet_total.saturating_mul(RETWEET_WEIGHT))
        .saturating_add(post_count.saturating_mul(POST_WEIGHT))
}

/// Stable palette pick for a handle (FNV-1a over the bytes).
pub fn avatar_color(handle: &str) -> String {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in handle.to_lowercase().bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    AVATAR_PALETTE[(hash as usize) % AVATAR_PALETTE.len()].to_string()
}

/// Display form used for every recent post, e.g. `Mar 5, 2024`.
pub fn format_display_date(created_at: Option<&DateTime<Utc>>, raw: Option<&str>) -> String {
    match created_at {
        Some(timestamp) => timestamp.format("%b %-d, %Y").to_string(),
        None => raw.unwrap_or_default().to_string(),
    }
}

/// Which of the two store write operations an indexing run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Idempotent keyed upsert; existing rows survive.
    #[default]
    Upsert,
    /// Clear both tables, then insert.
    Full,
}

impl IndexMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMode::Upsert => "upsert",
            IndexMode::Full => "full",
        }
    }
}

impl std::fmt::Display for IndexMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IndexMode {
    type Err = crate::CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "upsert" => Ok(IndexMode::Upsert),
            "full" => Ok(IndexMode::Full),
            other => Err(crate::CoreError::InvalidInput {
                message: format!("unknown index mode: {}", other),
            }),
        }
    }
}

/// A raw upstream post after field probing.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPost {
    pub post_id: String,
    pub author_id: Option<String>,
    /// Always carries the leading `@`.
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub created_at_raw: Option<String>,
    pub like_count: u64,
    pub retweet_count: u64,
    pub reply_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "likes", default)]
    pub like_count: u64,
    #[serde(rename = "retweets", default)]
    pub retweet_count: u64,
}

impl From<&NormalizedPost> for PostSummary {
    fn from(post: &NormalizedPost) -> Self {
        Self {
            text: post.text.clone(),
            date: format_display_date(post.created_at.as_ref(), post.created_at_raw.as_deref()),
            like_count: post.like_count,
            retweet_count: post.retweet_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorAggregate {
    pub author_id: Option<String>,
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub post_count: u64,
    pub like_total: u64,
    pub retweet_total: u64,
    /// At most [`RECENT_POST_LIMIT`] entries, in feed order.
    pub recent_posts: Vec<PostSummary>,
    pub score: u64,
    pub rank: u32,
    /// First-seen position within the batch; the only tie-break key.
    pub seq: u64,
}

impl AuthorAggregate {
    pub fn new(handle: String, seq: u64) -> Self {
        Self {
            author_id: None,
            handle,
            display_name: None,
            avatar_url: None,
            post_count: 0,
            like_total: 0,
            retweet_total: 0,
            recent_posts: Vec::with_capacity(RECENT_POST_LIMIT),
            score: 0,
            rank: 0,
            seq,
        }
    }

    pub fn compute_score(&self) -> u64 {
        engagement_score(self.like_total, self.retweet_total, self.post_count)
    }

    pub fn display_name_or_handle(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.handle.trim_start_matches('@').to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardSnapshot {
    pub captured_at: DateTime<Utc>,
    pub entries: Vec<AuthorAggregate>,
}

impl LeaderboardSnapshot {
    pub fn new(captured_at: DateTime<Utc>, entries: Vec<AuthorAggregate>) -> Self {
        Self {
            captured_at,
            entries,
        }
    }

    pub fn to_response(&self) -> SnapshotResponse {
        let data: Vec<SnapshotEntry> = self.entries.iter().map(SnapshotEntry::from).collect();
        SnapshotResponse {
            success: true,
            total_users: data.len(),
            data,
            timestamp: self.captured_at,
        }
    }
}

/// One leaderboard row as it travels between the snapshot endpoint, the local
/// cache and the bundled static file. Unknown keys are carried in `extra` so
/// locally enriched fields survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SnapshotEntry {
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub handle: String,
    #[serde(rename = "avatarUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(rename = "avatarColor", default, skip_serializing_if = "Option::is_none")]
    pub avatar_color: Option<String>,
    #[serde(default)]
    pub tweets: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub rts: u64,
    #[serde(default)]
    pub score: u64,
    #[serde(rename = "recentTweets", default)]
    pub recent_tweets: Vec<PostSummary>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&AuthorAggregate> for SnapshotEntry {
    fn from(aggregate: &AuthorAggregate) -> Self {
        Self {
            rank: aggregate.rank,
            name: aggregate.display_name_or_handle(),
            handle: aggregate.handle.clone(),
            avatar_url: aggregate.avatar_url.clone(),
            avatar_color: Some(avatar_color(&aggregate.handle)),
            tweets: aggregate.post_count,
            likes: aggregate.like_total,
            rts: aggregate.retweet_total,
            score: aggregate.score,
            recent_tweets: aggregate.recent_posts.clone(),
            extra: Map::new(),
        }
    }
}

/// Body of the snapshot read endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<SnapshotEntry>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "totalUsers", default)]
    pub total_users: usize,
}
