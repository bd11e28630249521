pub mod merge;

#[cfg(test)]
mod tests;

pub use merge::merge_with_cache;

use chrono::{DateTime, Utc};
use engageboard_core::{
    AuthorAggregate, CoreError, DatabaseError, IndexMode, LeaderboardSnapshot,
    NormalizedPost, PostSummary, SnapshotResponse, RECENT_POST_LIMIT,
};
use futures::future::join_all;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one persisted indexing run, as recorded in `index_runs`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRun {
    pub run_id: Uuid,
    pub mode: IndexMode,
    pub captured_at: DateTime<Utc>,
    pub author_count: u64,
    pub post_count: u64,
    /// Posts actually written; duplicates of stored ids are not counted.
    pub posts_inserted: u64,
}

#[derive(Debug, sqlx::FromRow)]
struct AuthorRow {
    handle: String,
    author_id: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
    post_count: i64,
    like_total: i64,
    retweet_total: i64,
    score: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    text: String,
    like_count: i64,
    retweet_count: i64,
    posted_at: Option<DateTime<Utc>>,
    posted_at_raw: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct IndexRunRow {
    run_id: String,
    mode: String,
    captured_at: DateTime<Utc>,
    author_count: i64,
    post_count: i64,
    posts_inserted: i64,
}

/// The Snapshot Store. Two write operations, [`Database::upsert_batch`] and
/// [`Database::reindex_full`], and one read path, [`Database::load_latest`].
pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| CoreError::store_unavailable(format!("invalid database url: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| CoreError::store_unavailable(e.to_string()))?;

        info!("Connected to snapshot store at {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        let pool = self.pool()?;
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Snapshot store migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }

    /// A store that was never reached reports `StoreUnavailable`, never an
    /// empty result.
    fn pool(&self) -> Result<&SqlitePool, CoreError> {
        self.pool
            .as_ref()
            .ok_or_else(|| CoreError::store_unavailable("not connected"))
    }

    /// Idempotent keyed upsert. Author counters are overwritten with the
    /// batch's values; profile fields absent from the batch keep their stored
    /// value. A post id that is already stored is left untouched.
    pub async fn upsert_batch(
        &self,
        snapshot: &LeaderboardSnapshot,
        posts: &[NormalizedPost],
    ) -> Result<IndexRun, CoreError> {
        let pool = self.pool()?;
        let mut tx = pool.begin().await.map_err(unavailable)?;

        for author in &snapshot.entries {
            sqlx::query(
                r#"
                INSERT INTO authors (
                    handle, author_id, display_name, avatar_url,
                    post_count, like_total, retweet_total, score, last_rank, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(handle) DO UPDATE SET
                    author_id = COALESCE(authors.author_id, excluded.author_id),
                    display_name = COALESCE(excluded.display_name, authors.display_name),
                    avatar_url = COALESCE(excluded.avatar_url, authors.avatar_url),
                    post_count = excluded.post_count,
                    like_total = excluded.like_total,
                    retweet_total = excluded.retweet_total,
                    score = excluded.score,
                    last_rank = excluded.last_rank,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&author.handle)
            .bind(&author.author_id)
            .bind(&author.display_name)
            .bind(&author.avatar_url)
            .bind(to_sql_int(author.post_count))
            .bind(to_sql_int(author.like_total))
            .bind(to_sql_int(author.retweet_total))
            .bind(to_sql_int(author.compute_score()))
            .bind(i64::from(author.rank))
            .bind(snapshot.captured_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_failed("upsert author", e))?;
        }

        let posts_inserted = insert_posts(&mut tx, posts, snapshot.captured_at).await?;
        let run = record_run(&mut tx, IndexMode::Upsert, snapshot, posts, posts_inserted).await?;

        tx.commit().await.map_err(|e| {
            CoreError::Database(DatabaseError::TransactionFailed {
                reason: e.to_string(),
            })
        })?;

        info!(
            run_id = %run.run_id,
            authors = run.author_count,
            posts = run.post_count,
            posts_inserted,
            "Upserted batch into snapshot store"
        );
        Ok(run)
    }

    /// Destructive rebuild: both tables are cleared, then the batch is
    /// written. Only ever invoked explicitly.
    pub async fn reindex_full(
        &self,
        snapshot: &LeaderboardSnapshot,
        posts: &[NormalizedPost],
    ) -> Result<IndexRun, CoreError> {
        let pool = self.pool()?;
        let mut tx = pool.begin().await.map_err(unavailable)?;

        sqlx::query("DELETE FROM posts")
            .execute(&mut *tx)
            .await
            .map_err(|e| query_failed("clear posts", e))?;
        sqlx::query("DELETE FROM authors")
            .execute(&mut *tx)
            .await
            .map_err(|e| query_failed("clear authors", e))?;

        for author in &snapshot.entries {
            sqlx::query(
                r#"
                INSERT INTO authors (
                    handle, author_id, display_name, avatar_url,
                    post_count, like_total, retweet_total, score, last_rank, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&author.handle)
            .bind(&author.author_id)
            .bind(&author.display_name)
            .bind(&author.avatar_url)
            .bind(to_sql_int(author.post_count))
            .bind(to_sql_int(author.like_total))
            .bind(to_sql_int(author.retweet_total))
            .bind(to_sql_int(author.compute_score()))
            .bind(i64::from(author.rank))
            .bind(snapshot.captured_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_failed("insert author", e))?;
        }

        let posts_inserted = insert_posts(&mut tx, posts, snapshot.captured_at).await?;
        let run = record_run(&mut tx, IndexMode::Full, snapshot, posts, posts_inserted).await?;

        tx.commit().await.map_err(|e| {
            CoreError::Database(DatabaseError::TransactionFailed {
                reason: e.to_string(),
            })
        })?;

        warn!(
            run_id = %run.run_id,
            authors = run.author_count,
            posts = run.post_count,
            "Snapshot store rebuilt from scratch"
        );
        Ok(run)
    }

    pub async fn latest_run(&self) -> Result<Option<IndexRun>, CoreError> {
        let pool = self.pool()?;
        let row: Option<IndexRunRow> = sqlx::query_as(
            r#"
            SELECT run_id, mode, captured_at, author_count, post_count, posts_inserted
            FROM index_runs
            ORDER BY captured_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(pool)
        .await
        .map_err(unavailable)?;

        row.map(IndexRun::try_from).transpose()
    }

    /// The read path. `None` means nothing has ever been indexed. Ranks are
    /// reassigned densely from the stored scores; ties keep the rank order of
    /// the run that last touched each author.
    pub async fn load_latest(&self) -> Result<Option<LeaderboardSnapshot>, CoreError> {
        let pool = self.pool()?;
        let Some(run) = self.latest_run().await? else {
            return Ok(None);
        };

        let rows: Vec<AuthorRow> = sqlx::query_as(
            r#"
            SELECT handle, author_id, display_name, avatar_url,
                   post_count, like_total, retweet_total, score
            FROM authors
            ORDER BY score DESC, last_rank ASC, handle ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(unavailable)?;

        // one read per author, issued concurrently
        let recent = join_all(rows.iter().map(|row| recent_posts(pool, &row.handle))).await;

        let mut entries = Vec::with_capacity(rows.len());
        for (position, (row, recent_posts)) in rows.into_iter().zip(recent).enumerate() {
            let mut aggregate = AuthorAggregate::new(row.handle, position as u64);
            aggregate.author_id = row.author_id;
            aggregate.display_name = row.display_name;
            aggregate.avatar_url = row.avatar_url;
            aggregate.post_count = from_sql_int(row.post_count);
            aggregate.like_total = from_sql_int(row.like_total);
            aggregate.retweet_total = from_sql_int(row.retweet_total);
            aggregate.score = from_sql_int(row.score);
            aggregate.rank = position as u32 + 1;
            aggregate.recent_posts = recent_posts?;
            entries.push(aggregate);
        }

        debug!(authors = entries.len(), run_id = %run.run_id, "Loaded latest snapshot");
        Ok(Some(LeaderboardSnapshot::new(run.captured_at, entries)))
    }

    /// Body for the snapshot read endpoint. An empty store yields an empty,
    /// successful response stamped with the current time.
    pub async fn snapshot_response(&self) -> Result<SnapshotResponse, CoreError> {
        let snapshot = self
            .load_latest()
            .await?
            .unwrap_or_else(|| LeaderboardSnapshot::new(Utc::now(), Vec::new()));
        Ok(snapshot.to_response())
    }

    pub async fn count_posts(&self) -> Result<u64, CoreError> {
        let pool = self.pool()?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(pool)
            .await
            .map_err(unavailable)?;
        Ok(from_sql_int(count))
    }
}

async fn insert_posts(
    tx: &mut Transaction<'_, Sqlite>,
    posts: &[NormalizedPost],
    inserted_at: DateTime<Utc>,
) -> Result<u64, CoreError> {
    let mut inserted = 0;
    for post in posts {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO posts (
                post_id, author_handle, text, like_count, retweet_count, reply_count,
                posted_at, posted_at_raw, inserted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.post_id)
        .bind(&post.handle)
        .bind(&post.text)
        .bind(to_sql_int(post.like_count))
        .bind(to_sql_int(post.retweet_count))
        .bind(to_sql_int(post.reply_count))
        .bind(post.created_at)
        .bind(&post.created_at_raw)
        .bind(inserted_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| query_failed("insert post", e))?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

async fn record_run(
    tx: &mut Transaction<'_, Sqlite>,
    mode: IndexMode,
    snapshot: &LeaderboardSnapshot,
    posts: &[NormalizedPost],
    posts_inserted: u64,
) -> Result<IndexRun, CoreError> {
    let run = IndexRun {
        run_id: Uuid::new_v4(),
        mode,
        captured_at: snapshot.captured_at,
        author_count: snapshot.entries.len() as u64,
        post_count: posts.len() as u64,
        posts_inserted,
    };

    sqlx::query(
        r#"
        INSERT INTO index_runs (run_id, mode, captured_at, author_count, post_count, posts_inserted)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run.run_id.to_string())
    .bind(run.mode.as_str())
    .bind(run.captured_at)
    .bind(to_sql_int(run.author_count))
    .bind(to_sql_int(run.post_count))
    .bind(to_sql_int(run.posts_inserted))
    .execute(&mut **tx)
    .await
    .map_err(|e| query_failed("record index run", e))?;

    Ok(run)
}

async fn recent_posts(pool: &SqlitePool, handle: &str) -> Result<Vec<PostSummary>, CoreError> {
    let rows: Vec<PostRow> = sqlx::query_as(
        r#"
        SELECT text, like_count, retweet_count, posted_at, posted_at_raw
        FROM posts
        WHERE author_handle = ?
        ORDER BY posted_at DESC, rowid ASC
        LIMIT ?
        "#,
    )
    .bind(handle)
    .bind(RECENT_POST_LIMIT as i64)
    .fetch_all(pool)
    .await
    .map_err(unavailable)?;

    Ok(rows
        .into_iter()
        .map(|row| PostSummary {
            text: row.text,
            date: engageboard_core::format_display_date(
                row.posted_at.as_ref(),
                row.posted_at_raw.as_deref(),
            ),
            like_count: from_sql_int(row.like_count),
            retweet_count: from_sql_int(row.retweet_count),
        })
        .collect())
}

impl TryFrom<IndexRunRow> for IndexRun {
    type Error = CoreError;

    fn try_from(row: IndexRunRow) -> Result<Self, Self::Error> {
        let run_id = Uuid::parse_str(&row.run_id).map_err(|e| DatabaseError::QueryFailed {
            query: format!("index_runs.run_id {}: {}", row.run_id, e),
        })?;
        Ok(IndexRun {
            run_id,
            mode: row.mode.parse()?,
            captured_at: row.captured_at,
            author_count: from_sql_int(row.author_count),
            post_count: from_sql_int(row.post_count),
            posts_inserted: from_sql_int(row.posts_inserted),
        })
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn unavailable(error: sqlx::Error) -> CoreError {
    CoreError::store_unavailable(error.to_string())
}

fn query_failed(query: &str, error: sqlx::Error) -> CoreError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            unavailable(error)
        }
        other => {
            warn!("Query '{}' failed: {}", query, other);
            CoreError::Database(DatabaseError::QueryFailed {
                query: format!("{}: {}", query, other),
            })
        }
    }
}
