#[cfg(test)]
mod tests {
    use crate::{IndexingService, PostSource};
    use database::Database;
    use engageboard_core::{CoreError, DatabaseError, FeedApiError, IndexMode};
    use serde_json::{json, Value};
    use std::env;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Hands out one queued batch per call; an empty queue is an outage.
    struct QueuedFeed {
        batches: Mutex<Vec<Vec<Value>>>,
    }

    impl QueuedFeed {
        fn new(mut batches: Vec<Vec<Value>>) -> Self {
            batches.reverse();
            Self {
                batches: Mutex::new(batches),
            }
        }
    }

    impl PostSource for QueuedFeed {
        async fn fetch_posts(&self) -> Result<Vec<Value>, CoreError> {
            let next = self.batches.lock().unwrap().pop();
            next.ok_or_else(|| {
                CoreError::FeedApi(FeedApiError::UpstreamUnavailable {
                    endpoint: "/communities/test/posts".to_string(),
                    reason: "connection refused".to_string(),
                })
            })
        }
    }

    fn raw_post(id: &str, handle: &str, likes: u64, rts: u64) -> Value {
        json!({
            "id": id,
            "text": format!("{} says hi", handle),
            "createdAt": "2024-03-05T10:00:00Z",
            "likeCount": likes,
            "retweetCount": rts,
            "author": { "id": format!("id-{}", handle), "userName": handle, "name": handle }
        })
    }

    async fn setup_test_db() -> Database {
        let db_path = env::temp_dir().join(format!("test_indexing_{}.db", uuid::Uuid::new_v4()));
        let mut db = Database::new(format!("sqlite://{}", db_path.display()));
        db.connect()
            .await
            .expect("Failed to connect to test database");
        db.run_migrations().await.expect("Failed to run migrations");
        db
    }

    #[tokio::test]
    async fn test_run_once_persists_ranked_snapshot() {
        let feed = QueuedFeed::new(vec![vec![
            raw_post("1", "ana", 1, 0),
            raw_post("2", "ben", 20, 3),
            json!({ "id": "3", "text": "no author at all" }),
            raw_post("4", "ana", 2, 0),
        ]]);
        let service = IndexingService::new(feed, setup_test_db().await, 60);

        let run = service.run_once(IndexMode::Upsert).await.unwrap();
        assert_eq!(run.author_count, 2);
        assert_eq!(run.post_count, 3);

        let snapshot = service.database().load_latest().await.unwrap().unwrap();
        let board: Vec<(u32, &str, u64)> = snapshot
            .entries
            .iter()
            .map(|a| (a.rank, a.handle.as_str(), a.score))
            .collect();
        assert_eq!(board, vec![(1, "@ben", 20 + 6 + 5), (2, "@ana", 3 + 10)]);
    }

    #[tokio::test]
    async fn test_repeated_post_in_window_stored_and_counted_once() {
        let feed = QueuedFeed::new(vec![vec![
            raw_post("1", "ana", 10, 0),
            raw_post("1", "ana", 10, 0),
        ]]);
        let service = IndexingService::new(feed, setup_test_db().await, 60);

        let run = service.run_once(IndexMode::Upsert).await.unwrap();
        assert_eq!(run.post_count, 1);
        assert_eq!(run.posts_inserted, 1);

        let snapshot = service.database().load_latest().await.unwrap().unwrap();
        assert_eq!(snapshot.entries[0].post_count, 1);
        assert_eq!(snapshot.entries[0].like_total, 10);
        assert_eq!(service.database().count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_aborts_without_writing() {
        let service = IndexingService::new(QueuedFeed::new(vec![]), setup_test_db().await, 60);

        let result = service.run_once(IndexMode::Upsert).await;
        assert!(matches!(
            result,
            Err(CoreError::FeedApi(FeedApiError::UpstreamUnavailable { .. }))
        ));
        assert!(service.database().latest_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_run() {
        let feed = QueuedFeed::new(vec![vec![raw_post("1", "ana", 1, 0)]]);
        let service = IndexingService::new(
            feed,
            Database::new("sqlite://not-connected.db".to_string()),
            60,
        );

        let result = service.run_once(IndexMode::Upsert).await;
        assert!(matches!(
            result,
            Err(CoreError::Database(DatabaseError::StoreUnavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_full_mode_replaces_previous_board() {
        let feed = QueuedFeed::new(vec![
            vec![raw_post("1", "ana", 5, 0), raw_post("2", "old", 50, 0)],
            vec![raw_post("3", "ana", 1, 0)],
        ]);
        let service = IndexingService::new(feed, setup_test_db().await, 60);

        service.run_once(IndexMode::Upsert).await.unwrap();
        let run = service.run_once(IndexMode::Full).await.unwrap();
        assert_eq!(run.mode, IndexMode::Full);

        let snapshot = service.database().load_latest().await.unwrap().unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].handle, "@ana");
        assert_eq!(snapshot.entries[0].like_total, 1);
    }

    #[tokio::test]
    async fn test_watch_runs_immediately_and_stops_on_shutdown() {
        let feed = QueuedFeed::new(vec![vec![raw_post("1", "ana", 1, 0)]]);
        let service = IndexingService::new(feed, setup_test_db().await, 60);

        let summary = service
            .run_forever(
                IndexMode::Upsert,
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_watch_survives_failed_ticks() {
        let feed = QueuedFeed::new(vec![vec![raw_post("1", "ana", 1, 0)]]);
        let service = IndexingService::new(feed, setup_test_db().await, 60)
            .with_polling_interval(Duration::from_millis(30));

        let summary = service
            .run_forever(
                IndexMode::Upsert,
                tokio::time::sleep(Duration::from_millis(250)),
            )
            .await;
        assert_eq!(summary.succeeded, 1);
        assert!(summary.failed >= 1);
        assert!(service.database().latest_run().await.unwrap().is_some());
    }
}
