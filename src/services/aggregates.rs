//! Derived aggregates for places.
//!
//! `avgRating`/`ratingCount` are a pure function of the latest rating per
//! user at that place: a user re-rating a place replaces their earlier
//! contribution instead of adding another sample.

use std::collections::HashSet;

use serde_json::json;

use crate::error::AppResult;
use crate::infrastructure::store::{field_f64, field_str, ItemKey, ItemStore, QuerySpec, UpdateSpec};
use crate::keyspace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaceAggregate {
    pub avg_rating: f64,
    pub rating_count: i64,
}

/// Round to one decimal, half away from zero.
fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Reduce a newest-first rating list to one stars value per user and average
/// the kept values. Rows without a userId are ignored.
fn latest_per_user_average(items: &[crate::infrastructure::store::Item]) -> PlaceAggregate {
    let mut seen: HashSet<String> = HashSet::new();
    let mut sum = 0.0;
    for item in items {
        let Some(user_id) = field_str(item, "userId") else {
            continue;
        };
        if seen.insert(user_id.to_string()) {
            sum += field_f64(item, "stars").unwrap_or(0.0);
        }
    }

    let rating_count = seen.len() as i64;
    let avg_rating = if rating_count > 0 {
        round_one_decimal(sum / rating_count as f64)
    } else {
        0.0
    };
    PlaceAggregate {
        avg_rating,
        rating_count,
    }
}

/// Recompute a place's aggregate from its full rating-copy set and write it
/// to the place META item. Idempotent: rerunning over an unchanged rating set
/// produces the same stored values.
pub async fn recompute_place_meta(
    store: &dyn ItemStore,
    place_id: &str,
) -> AppResult<PlaceAggregate> {
    let page = store
        .query(
            QuerySpec::partition(keyspace::place_pk(place_id))
                .prefix(keyspace::RATING_PREFIX)
                .newest_first(),
        )
        .await?;

    let aggregate = latest_per_user_average(&page.items);

    store
        .update(
            &ItemKey::new(keyspace::place_pk(place_id), keyspace::META_SK),
            UpdateSpec::new()
                .set("avgRating", json!(aggregate.avg_rating))
                .set("ratingCount", json!(aggregate.rating_count)),
        )
        .await?;

    Ok(aggregate)
}
