//! Rating write path: copy fan-out, partial edits, aggregates, pagination.

mod common;

use brewlog::error::AppError;
use brewlog::infrastructure::ItemKey;
use brewlog::keyspace;
use brewlog::services::aggregates;
use brewlog::services::projector;
use brewlog::services::ratings::RatingPatch;
use common::{num_field, rating_request, str_field, test_app, tick};
use serde_json::json;

#[tokio::test]
async fn create_fans_out_to_all_copies() {
    let app = test_app().await;
    let ada = app.register("ada").await;

    let mut req = rating_request("p1", 4.5, "flat white");
    req.description = Some("balanced".to_string());
    let created = app.ratings.create(&ada, req).await.unwrap();
    let sk = keyspace::rating_sk(&created.created_at, &created.rating_id);

    let owner = app.get_item(&keyspace::user_pk(&ada), &sk).await.unwrap();
    assert_eq!(num_field(&owner, "stars"), 4.5);
    assert_eq!(str_field(&owner, "placeName"), "p1 cafe");
    assert_eq!(str_field(&owner, "description"), "balanced");

    // The place copy skips place-identity fields but carries the author.
    let place_copy = app.get_item(&keyspace::place_pk("p1"), &sk).await.unwrap();
    assert_eq!(str_field(&place_copy, "username"), "ada");
    assert!(!place_copy.contains_key("placeName"));
    assert!(!place_copy.contains_key("lat"));

    let meta = app.rating_meta(&created.rating_id).await;
    assert_eq!(num_field(&meta, "likeCount"), 0.0);
    assert_eq!(num_field(&meta, "commentCount"), 0.0);

    let user_place = app
        .get_item(&keyspace::user_pk(&ada), &keyspace::user_place_sk("p1"))
        .await
        .unwrap();
    assert_eq!(num_field(&user_place, "visitCount"), 1.0);
    assert_eq!(str_field(&user_place, "placeName"), "p1 cafe");

    let place_meta = app
        .get_item(&keyspace::place_pk("p1"), keyspace::META_SK)
        .await
        .unwrap();
    assert_eq!(num_field(&place_meta, "avgRating"), 4.5);
    assert_eq!(num_field(&place_meta, "ratingCount"), 1.0);

    // "flat white" resolves to 130 mg from the lookup table.
    let profile = app
        .get_item(&keyspace::user_pk(&ada), keyspace::PROFILE_SK)
        .await
        .unwrap();
    assert_eq!(num_field(&profile, "totalCaffeineMg"), 130.0);
}

#[tokio::test]
async fn revisits_accumulate_visit_count() {
    let app = test_app().await;
    let ada = app.register("ada").await;

    app.ratings.create(&ada, rating_request("p1", 3.0, "espresso")).await.unwrap();
    tick().await;
    app.ratings.create(&ada, rating_request("p1", 4.0, "espresso")).await.unwrap();

    let user_place = app
        .get_item(&keyspace::user_pk(&ada), &keyspace::user_place_sk("p1"))
        .await
        .unwrap();
    assert_eq!(num_field(&user_place, "visitCount"), 2.0);
}

#[tokio::test]
async fn place_average_counts_only_the_latest_rating_per_user() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;

    app.ratings.create(&ada, rating_request("p1", 5.0, "latte")).await.unwrap();
    tick().await;
    app.ratings.create(&bob, rating_request("p1", 3.0, "latte")).await.unwrap();
    tick().await;
    // Ada re-rates; her earlier 5.0 no longer contributes.
    app.ratings.create(&ada, rating_request("p1", 2.0, "latte")).await.unwrap();

    let place_meta = app
        .get_item(&keyspace::place_pk("p1"), keyspace::META_SK)
        .await
        .unwrap();
    assert_eq!(num_field(&place_meta, "ratingCount"), 2.0);
    assert_eq!(num_field(&place_meta, "avgRating"), 2.5);
}

#[tokio::test]
async fn recompute_is_idempotent() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;
    app.ratings.create(&ada, rating_request("p1", 4.0, "latte")).await.unwrap();
    tick().await;
    app.ratings.create(&bob, rating_request("p1", 3.5, "mocha")).await.unwrap();

    let first = aggregates::recompute_place_meta(app.store.as_ref(), "p1").await.unwrap();
    let second = aggregates::recompute_place_meta(app.store.as_ref(), "p1").await.unwrap();
    assert_eq!(first, second);

    let place_meta = app
        .get_item(&keyspace::place_pk("p1"), keyspace::META_SK)
        .await
        .unwrap();
    assert_eq!(num_field(&place_meta, "avgRating"), 3.8);
    assert_eq!(num_field(&place_meta, "ratingCount"), 2.0);
}

#[tokio::test]
async fn only_the_owner_may_edit() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;
    let created = app.ratings.create(&ada, rating_request("p1", 4.0, "latte")).await.unwrap();

    let patch: RatingPatch = serde_json::from_value(json!({ "stars": 1.0 })).unwrap();
    let err = app.ratings.update(&bob, &created.rating_id, patch).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Denied edits must leave every copy untouched.
    let sk = keyspace::rating_sk(&created.created_at, &created.rating_id);
    let owner = app.get_item(&keyspace::user_pk(&ada), &sk).await.unwrap();
    assert_eq!(num_field(&owner, "stars"), 4.0);
    assert!(!owner.contains_key("updatedAt"));
    let meta = app.rating_meta(&created.rating_id).await;
    assert_eq!(num_field(&meta, "stars"), 4.0);
}

#[tokio::test]
async fn editing_a_missing_rating_is_not_found() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let patch: RatingPatch = serde_json::from_value(json!({ "stars": 2.0 })).unwrap();
    let err = app.ratings.update(&ada, "no-such-id", patch).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn partial_edit_touches_only_named_fields() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let mut req = rating_request("p1", 4.0, "latte");
    req.description = Some("first impression".to_string());
    req.photo_key = Some("uploads/x.jpg".to_string());
    let created = app.ratings.create(&ada, req).await.unwrap();

    // Null removes, value sets, absent leaves alone.
    let patch: RatingPatch =
        serde_json::from_value(json!({ "description": null, "drinkName": "cortado" })).unwrap();
    app.ratings.update(&ada, &created.rating_id, patch).await.unwrap();

    let sk = keyspace::rating_sk(&created.created_at, &created.rating_id);
    for pk in [keyspace::user_pk(&ada), keyspace::place_pk("p1")] {
        let copy = app.get_item(&pk, &sk).await.unwrap();
        assert!(!copy.contains_key("description"), "null must remove");
        assert_eq!(str_field(&copy, "drinkName"), "cortado");
        assert_eq!(str_field(&copy, "photoKey"), "uploads/x.jpg");
        assert!(copy.contains_key("updatedAt"));
        assert_eq!(num_field(&copy, "stars"), 4.0);
    }
}

#[tokio::test]
async fn star_edit_moves_the_place_average() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let created = app.ratings.create(&ada, rating_request("p1", 5.0, "latte")).await.unwrap();

    let patch: RatingPatch = serde_json::from_value(json!({ "stars": 2.0 })).unwrap();
    app.ratings.update(&ada, &created.rating_id, patch).await.unwrap();

    let place_meta = app
        .get_item(&keyspace::place_pk("p1"), keyspace::META_SK)
        .await
        .unwrap();
    assert_eq!(num_field(&place_meta, "avgRating"), 2.0);
    assert_eq!(num_field(&place_meta, "ratingCount"), 1.0);
}

#[tokio::test]
async fn caffeine_edit_adjusts_the_lifetime_total_by_delta() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let mut req = rating_request("p1", 4.0, "latte");
    req.caffeine_mg = Some(100.0);
    let created = app.ratings.create(&ada, req).await.unwrap();

    let patch: RatingPatch = serde_json::from_value(json!({ "caffeineMg": 60.0 })).unwrap();
    app.ratings.update(&ada, &created.rating_id, patch).await.unwrap();

    let profile = app
        .get_item(&keyspace::user_pk(&ada), keyspace::PROFILE_SK)
        .await
        .unwrap();
    assert_eq!(num_field(&profile, "totalCaffeineMg"), 60.0);
}

#[tokio::test]
async fn place_info_edit_propagates_and_null_address_becomes_empty() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let mut req = rating_request("p1", 4.0, "latte");
    req.address = Some("Herengracht 1".to_string());
    let created = app.ratings.create(&ada, req).await.unwrap();

    let patch: RatingPatch =
        serde_json::from_value(json!({ "placeName": "Renamed Cafe", "address": null })).unwrap();
    app.ratings.update(&ada, &created.rating_id, patch).await.unwrap();

    // Rating copies drop the attribute entirely.
    let sk = keyspace::rating_sk(&created.created_at, &created.rating_id);
    let owner = app.get_item(&keyspace::user_pk(&ada), &sk).await.unwrap();
    assert!(!owner.contains_key("address"));
    assert_eq!(str_field(&owner, "placeName"), "Renamed Cafe");

    // Place items keep the attribute as an empty string.
    let place_meta = app
        .get_item(&keyspace::place_pk("p1"), keyspace::META_SK)
        .await
        .unwrap();
    assert_eq!(str_field(&place_meta, "name"), "Renamed Cafe");
    assert_eq!(str_field(&place_meta, "address"), "");

    let user_place = app
        .get_item(&keyspace::user_pk(&ada), &keyspace::user_place_sk("p1"))
        .await
        .unwrap();
    assert_eq!(str_field(&user_place, "placeName"), "Renamed Cafe");
    assert_eq!(str_field(&user_place, "address"), "");
}

#[tokio::test]
async fn invalid_stars_are_rejected_before_any_write() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let err = app
        .ratings
        .create(&ada, rating_request("p1", 4.3, "latte"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let place_meta = app.get_item(&keyspace::place_pk("p1"), keyspace::META_SK).await;
    assert!(place_meta.is_none());
}

#[tokio::test]
async fn rating_lists_paginate_with_opaque_cursors() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    for stars in [3.0, 4.0, 5.0] {
        app.ratings.create(&ada, rating_request("p1", stars, "latte")).await.unwrap();
        tick().await;
    }

    let first = projector::user_ratings(app.store.as_ref(), &app.photos, &ada, None, 2, None)
        .await
        .unwrap();
    assert_eq!(first.ratings.len(), 2);
    assert_eq!(num_field(&first.ratings[0], "stars"), 5.0);
    let cursor = first.next_cursor.expect("more pages remain");

    let second = projector::user_ratings(
        app.store.as_ref(),
        &app.photos,
        &ada,
        None,
        2,
        Some(&cursor),
    )
    .await
    .unwrap();
    assert_eq!(second.ratings.len(), 1);
    assert_eq!(num_field(&second.ratings[0], "stars"), 3.0);
    assert!(second.next_cursor.is_none());

    // A garbled cursor restarts from the top instead of failing.
    let restarted =
        projector::user_ratings(app.store.as_ref(), &app.photos, &ada, None, 2, Some("!!!"))
            .await
            .unwrap();
    assert_eq!(num_field(&restarted.ratings[0], "stars"), 5.0);
}

#[tokio::test]
async fn projected_ratings_never_leak_storage_fields() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let mut req = rating_request("p1", 4.0, "latte");
    req.photo_key = Some("uploads/u/a.jpg".to_string());
    app.ratings.create(&ada, req).await.unwrap();

    let page = projector::user_ratings(app.store.as_ref(), &app.photos, &ada, None, 10, None)
        .await
        .unwrap();
    let rating = &page.ratings[0];
    assert!(!rating.contains_key("PK"));
    assert!(!rating.contains_key("SK"));
    assert!(!rating.contains_key("entityType"));
    assert_eq!(str_field(rating, "photoUrl"), "/uploads/u/a.jpg");
}

#[tokio::test]
async fn caffeine_stats_split_today_from_lifetime() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let mut req = rating_request("p1", 4.0, "latte");
    req.caffeine_mg = Some(90.0);
    app.ratings.create(&ada, req).await.unwrap();

    // Seed an older rating copy directly, outside today's range.
    let old_sk = keyspace::rating_sk("2020-01-01T08:00:00.000Z", "old");
    let mut old = brewlog::infrastructure::Item::new();
    old.insert("ratingId".into(), json!("old"));
    old.insert("userId".into(), json!(ada.clone()));
    old.insert("caffeineMg".into(), json!(50.0));
    old.insert("createdAt".into(), json!("2020-01-01T08:00:00.000Z"));
    app.store
        .put(&ItemKey::new(keyspace::user_pk(&ada), old_sk), old)
        .await
        .unwrap();

    let stats = app.users.caffeine_stats(&ada).await.unwrap();
    assert_eq!(stats.today_mg, 90.0);
    assert_eq!(stats.total_mg, 90.0);
}
