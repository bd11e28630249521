#[cfg(test)]
mod tests {
    use crate::Database;
    use chrono::{TimeZone, Utc};
    use engageboard_core::{
        AuthorAggregate, CoreError, DatabaseError, IndexMode, LeaderboardSnapshot, NormalizedPost,
        PostSummary,
    };
    use std::env;

    async fn setup_test_db() -> Database {
        let db_path = env::temp_dir().join(format!("test_engageboard_{}.db", uuid::Uuid::new_v4()));
        let db_url = format!("sqlite://{}", db_path.display());

        let mut db = Database::new(db_url);
        db.connect()
            .await
            .expect("Failed to connect to test database");
        db.run_migrations().await.expect("Failed to run migrations");

        db
    }

    fn post(id: &str, handle: &str, likes: u64, rts: u64, day: u32) -> NormalizedPost {
        NormalizedPost {
            post_id: id.to_string(),
            author_id: Some(format!("id-{}", handle)),
            handle: handle.to_string(),
            display_name: None,
            avatar_url: None,
            text: format!("post {}", id),
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
            created_at_raw: None,
            like_count: likes,
            retweet_count: rts,
            reply_count: 0,
        }
    }

    /// Builds a ranked snapshot the way the scoring engine would.
    fn snapshot_of(posts: &[NormalizedPost], captured_day: u32) -> LeaderboardSnapshot {
        let mut entries: Vec<AuthorAggregate> = Vec::new();
        for post in posts {
            let index = match entries.iter().position(|a| a.handle == post.handle) {
                Some(index) => index,
                None => {
                    entries.push(AuthorAggregate::new(post.handle.clone(), entries.len() as u64));
                    entries.len() - 1
                }
            };
            let author = &mut entries[index];
            author.author_id = post.author_id.clone();
            author.post_count += 1;
            author.like_total += post.like_count;
            author.retweet_total += post.retweet_count;
            author.recent_posts.push(PostSummary::from(post));
        }
        for author in &mut entries {
            author.score = author.compute_score();
        }
        entries.sort_by(|a, b| b.score.cmp(&a.score).then(a.seq.cmp(&b.seq)));
        for (position, author) in entries.iter_mut().enumerate() {
            author.rank = position as u32 + 1;
        }
        let captured_at = Utc.with_ymd_and_hms(2024, 3, captured_day, 0, 0, 0).unwrap();
        LeaderboardSnapshot::new(captured_at, entries)
    }

    #[tokio::test]
    async fn test_database_connection_and_migrations() {
        let db = setup_test_db().await;

        assert!(db.latest_run().await.unwrap().is_none());
        assert!(db.load_latest().await.unwrap().is_none());
        assert_eq!(db.count_posts().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unconnected_store_is_unavailable_not_empty() {
        let db = Database::new("sqlite://never-opened.db".to_string());

        let result = db.load_latest().await;
        assert!(matches!(
            result,
            Err(CoreError::Database(DatabaseError::StoreUnavailable { .. }))
        ));

        let snapshot = snapshot_of(&[post("1", "@a", 1, 0, 1)], 1);
        assert!(db.upsert_batch(&snapshot, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_then_load_latest() {
        let db = setup_test_db().await;
        let posts = vec![
            post("1", "@ana", 10, 1, 1),
            post("2", "@ben", 1, 0, 2),
            post("3", "@ana", 2, 2, 3),
        ];
        let snapshot = snapshot_of(&posts, 4);

        let run = db.upsert_batch(&snapshot, &posts).await.unwrap();
        assert_eq!(run.mode, IndexMode::Upsert);
        assert_eq!(run.author_count, 2);
        assert_eq!(run.posts_inserted, 3);

        let loaded = db.load_latest().await.unwrap().unwrap();
        assert_eq!(loaded.captured_at, snapshot.captured_at);
        assert_eq!(loaded.entries.len(), 2);

        let ana = &loaded.entries[0];
        assert_eq!(ana.handle, "@ana");
        assert_eq!(ana.rank, 1);
        assert_eq!(ana.post_count, 2);
        assert_eq!(ana.score, 12 + 2 * 3 + 5 * 2);
        // newest stored post first
        assert_eq!(ana.recent_posts[0].text, "post 3");
        assert_eq!(ana.recent_posts[0].date, "Mar 3, 2024");
        assert_eq!(loaded.entries[1].rank, 2);
    }

    #[tokio::test]
    async fn test_post_upsert_first_write_wins() {
        let db = setup_test_db().await;
        let original = vec![post("42", "@ana", 5, 0, 1)];
        db.upsert_batch(&snapshot_of(&original, 2), &original)
            .await
            .unwrap();

        let mut rewritten = post("42", "@ana", 99, 9, 1);
        rewritten.text = "edited".to_string();
        let second = vec![rewritten];
        let run = db
            .upsert_batch(&snapshot_of(&second, 3), &second)
            .await
            .unwrap();
        assert_eq!(run.posts_inserted, 0);
        assert_eq!(db.count_posts().await.unwrap(), 1);

        let loaded = db.load_latest().await.unwrap().unwrap();
        assert_eq!(loaded.entries[0].recent_posts[0].text, "post 42");
        assert_eq!(loaded.entries[0].recent_posts[0].like_count, 5);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_author_counters() {
        let db = setup_test_db().await;
        let popular = vec![post("1", "@ana", 50, 4, 1)];
        db.upsert_batch(&snapshot_of(&popular, 2), &popular)
            .await
            .unwrap();

        let quieter = vec![post("1", "@ana", 3, 0, 1)];
        db.upsert_batch(&snapshot_of(&quieter, 3), &quieter)
            .await
            .unwrap();

        let loaded = db.load_latest().await.unwrap().unwrap();
        let ana = &loaded.entries[0];
        assert_eq!(ana.like_total, 3);
        assert_eq!(ana.retweet_total, 0);
        assert_eq!(ana.post_count, 1);
        assert_eq!(ana.score, 3 + 5);
        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let db = setup_test_db().await;
        let posts = vec![post("1", "@ana", 3, 1, 1), post("2", "@ben", 7, 0, 1)];
        let snapshot = snapshot_of(&posts, 2);

        db.upsert_batch(&snapshot, &posts).await.unwrap();
        let first = db.load_latest().await.unwrap().unwrap();
        db.upsert_batch(&snapshot, &posts).await.unwrap();
        let second = db.load_latest().await.unwrap().unwrap();

        assert_eq!(first.entries, second.entries);
        assert_eq!(db.count_posts().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_keeps_profile_fields() {
        let db = setup_test_db().await;
        let mut with_profile = post("1", "@ana", 1, 0, 1);
        with_profile.display_name = Some("Ana".to_string());
        with_profile.avatar_url = Some("https://img.example/ana.png".to_string());
        let first = vec![with_profile];
        let mut snapshot = snapshot_of(&first, 1);
        snapshot.entries[0].display_name = Some("Ana".to_string());
        snapshot.entries[0].avatar_url = Some("https://img.example/ana.png".to_string());
        db.upsert_batch(&snapshot, &first).await.unwrap();

        let bare = vec![post("2", "@ana", 1, 0, 2)];
        db.upsert_batch(&snapshot_of(&bare, 2), &bare).await.unwrap();

        let loaded = db.load_latest().await.unwrap().unwrap();
        assert_eq!(loaded.entries[0].display_name.as_deref(), Some("Ana"));
        assert_eq!(
            loaded.entries[0].avatar_url.as_deref(),
            Some("https://img.example/ana.png")
        );
    }

    #[tokio::test]
    async fn test_reindex_full_clears_previous_rows() {
        let db = setup_test_db().await;
        let old = vec![post("1", "@old", 50, 0, 1), post("2", "@ana", 1, 0, 1)];
        db.upsert_batch(&snapshot_of(&old, 1), &old).await.unwrap();

        let fresh = vec![post("3", "@ana", 2, 0, 2)];
        let run = db
            .reindex_full(&snapshot_of(&fresh, 2), &fresh)
            .await
            .unwrap();
        assert_eq!(run.mode, IndexMode::Full);

        let loaded = db.load_latest().await.unwrap().unwrap();
        let handles: Vec<&str> = loaded.entries.iter().map(|a| a.handle.as_str()).collect();
        assert_eq!(handles, vec!["@ana"]);
        assert_eq!(loaded.entries[0].post_count, 1);
        assert_eq!(db.count_posts().await.unwrap(), 1);

        let latest = db.latest_run().await.unwrap().unwrap();
        assert_eq!(latest.run_id, run.run_id);
    }

    #[tokio::test]
    async fn test_snapshot_response_shape() {
        let db = setup_test_db().await;
        let empty = db.snapshot_response().await.unwrap();
        assert!(empty.success);
        assert_eq!(empty.total_users, 0);

        let posts = vec![post("1", "@ana", 4, 1, 5)];
        db.upsert_batch(&snapshot_of(&posts, 6), &posts).await.unwrap();

        let response = db.snapshot_response().await.unwrap();
        assert_eq!(response.total_users, 1);
        assert_eq!(response.data[0].rank, 1);
        assert_eq!(response.data[0].handle, "@ana");
        assert_eq!(response.data[0].name, "ana");
        assert_eq!(response.data[0].score, 4 + 2 + 5);
        assert_eq!(response.data[0].recent_tweets.len(), 1);
    }
}
