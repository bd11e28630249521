use engageboard_core::{AuthorAggregate, NormalizedPost, PostSummary, RECENT_POST_LIMIT};
use std::collections::HashMap;

/// How posts are bucketed into authors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    /// Index ingestion: external author id, with the handle as a secondary key
    /// so distinct ids sharing a handle land in one bucket.
    AuthorId,
    /// Merge-on-read: handle only.
    Handle,
}

/// Folds a batch into one aggregate per author, in first-seen order.
///
/// `recent_posts` keeps the first [`RECENT_POST_LIMIT`] posts of each author in
/// input order. The upstream feed is assumed newest-first; nothing is re-sorted
/// by date here.
pub fn aggregate(posts: &[NormalizedPost], key: GroupKey) -> Vec<AuthorAggregate> {
    group(posts, key).aggregates
}

/// Aggregates plus, for every input post, the index of the aggregate it was
/// folded into.
#[derive(Debug, Clone)]
pub struct Grouping {
    pub aggregates: Vec<AuthorAggregate>,
    pub owners: Vec<usize>,
}

pub fn group(posts: &[NormalizedPost], key: GroupKey) -> Grouping {
    let mut aggregates: Vec<AuthorAggregate> = Vec::new();
    let mut owners: Vec<usize> = Vec::with_capacity(posts.len());
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut by_handle: HashMap<String, usize> = HashMap::new();

    for post in posts {
        let existing = match key {
            GroupKey::AuthorId => post
                .author_id
                .as_ref()
                .and_then(|id| by_id.get(id))
                .or_else(|| by_handle.get(&post.handle))
                .copied(),
            GroupKey::Handle => by_handle.get(&post.handle).copied(),
        };

        let index = match existing {
            Some(index) => index,
            None => {
                let index = aggregates.len();
                aggregates.push(AuthorAggregate::new(post.handle.clone(), index as u64));
                by_handle.insert(post.handle.clone(), index);
                index
            }
        };

        if key == GroupKey::AuthorId {
            if let Some(id) = &post.author_id {
                by_id.entry(id.clone()).or_insert(index);
            }
        }

        fold_post(&mut aggregates[index], post);
        owners.push(index);
    }

    Grouping { aggregates, owners }
}

fn fold_post(aggregate: &mut AuthorAggregate, post: &NormalizedPost) {
    aggregate.post_count += 1;
    aggregate.like_total = aggregate.like_total.saturating_add(post.like_count);
    aggregate.retweet_total = aggregate.retweet_total.saturating_add(post.retweet_count);

    if aggregate.author_id.is_none() {
        aggregate.author_id = post.author_id.clone();
    }
    // last write wins on profile fields
    if post.display_name.is_some() {
        aggregate.display_name = post.display_name.clone();
    }
    if post.avatar_url.is_some() {
        aggregate.avatar_url = post.avatar_url.clone();
    }

    if aggregate.recent_posts.len() < RECENT_POST_LIMIT {
        aggregate.recent_posts.push(PostSummary::from(post));
    }
}
