use engageboard_core::AuthorAggregate;

/// Scores every aggregate and assigns dense 1-based ranks by descending score.
/// Equal scores keep first-seen order (`seq`), so the result is a total order.
pub fn rank(mut aggregates: Vec<AuthorAggregate>) -> Vec<AuthorAggregate> {
    for aggregate in &mut aggregates {
        aggregate.score = aggregate.compute_score();
    }

    aggregates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.seq.cmp(&b.seq)));

    for (position, aggregate) in aggregates.iter_mut().enumerate() {
        aggregate.rank = position as u32 + 1;
    }
    aggregates
}
