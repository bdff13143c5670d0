//! Likes, comments, and friend edges.

mod common;

use brewlog::error::AppError;
use brewlog::keyspace;
use brewlog::services::projector;
use common::{num_field, rating_request, str_field, test_app};

#[tokio::test]
async fn like_toggle_is_an_involution() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;
    let created = app.ratings.create(&ada, rating_request("p1", 4.0, "latte")).await.unwrap();
    let sk = keyspace::rating_sk(&created.created_at, &created.rating_id);

    let liked = app.social.toggle_like(&bob, &created.rating_id).await.unwrap();
    assert!(liked.liked);
    assert_eq!(liked.like_count, 1);

    // The counter lands on the META and both rating copies.
    assert_eq!(num_field(&app.rating_meta(&created.rating_id).await, "likeCount"), 1.0);
    let owner = app.get_item(&keyspace::user_pk(&ada), &sk).await.unwrap();
    assert_eq!(num_field(&owner, "likeCount"), 1.0);
    let place_copy = app.get_item(&keyspace::place_pk("p1"), &sk).await.unwrap();
    assert_eq!(num_field(&place_copy, "likeCount"), 1.0);

    let unliked = app.social.toggle_like(&bob, &created.rating_id).await.unwrap();
    assert!(!unliked.liked);
    assert_eq!(unliked.like_count, 0);
    assert_eq!(num_field(&app.rating_meta(&created.rating_id).await, "likeCount"), 0.0);
    assert!(app
        .get_item(
            &keyspace::rating_pk(&created.rating_id),
            &keyspace::like_sk(&bob)
        )
        .await
        .is_none());
}

#[tokio::test]
async fn concurrent_likes_from_different_users_both_count() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;
    let eve = app.register("eve").await;
    let created = app.ratings.create(&ada, rating_request("p1", 4.0, "latte")).await.unwrap();

    let (a, b) = tokio::join!(
        app.social.toggle_like(&bob, &created.rating_id),
        app.social.toggle_like(&eve, &created.rating_id),
    );
    assert!(a.unwrap().liked);
    assert!(b.unwrap().liked);

    // Deltas compose regardless of interleaving.
    assert_eq!(num_field(&app.rating_meta(&created.rating_id).await, "likeCount"), 2.0);
}

#[tokio::test]
async fn liking_a_missing_rating_is_not_found() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let err = app.social.toggle_like(&ada, "no-such-id").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn comments_land_in_the_detail_view_with_counts() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;
    let created = app.ratings.create(&ada, rating_request("p1", 4.0, "latte")).await.unwrap();

    app.social
        .create_comment(&bob, &created.rating_id, "lovely crema")
        .await
        .unwrap();

    let detail = projector::rating_detail(
        app.store.as_ref(),
        &app.photos,
        &created.rating_id,
        Some(&bob),
    )
    .await
    .unwrap();
    assert_eq!(detail.comments.len(), 1);
    assert_eq!(detail.comments[0]["text"], "lovely crema");
    assert_eq!(detail.comments[0]["username"], "bob");
    assert!(!detail.is_liked_by_me);
    assert_eq!(num_field(&detail.rating, "commentCount"), 1.0);

    let sk = keyspace::rating_sk(&created.created_at, &created.rating_id);
    let owner = app.get_item(&keyspace::user_pk(&ada), &sk).await.unwrap();
    assert_eq!(num_field(&owner, "commentCount"), 1.0);
}

#[tokio::test]
async fn blank_comments_are_rejected() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let created = app.ratings.create(&ada, rating_request("p1", 4.0, "latte")).await.unwrap();

    let err = app
        .social
        .create_comment(&ada, &created.rating_id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let long = "x".repeat(501);
    let err = app
        .social
        .create_comment(&ada, &created.rating_id, &long)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn befriending_writes_both_edges() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;

    app.social.add_friend(&ada, "bob").await.unwrap();

    let friends = app.social.friends(&ada).await.unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(str_field(&friends[0], "friendUsername"), "bob");
    assert_eq!(str_field(&friends[0], "friendUserId"), bob);

    let followers = app.social.followers(&bob).await.unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(str_field(&followers[0], "followerUsername"), "ada");
    assert_eq!(str_field(&followers[0], "followerUserId"), ada);
}

#[tokio::test]
async fn self_friending_and_unknown_targets_are_rejected() {
    let app = test_app().await;
    let ada = app.register("ada").await;

    let err = app.social.add_friend(&ada, "ada").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = app.social.add_friend(&ada, "nobody").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert!(app.social.friends(&ada).await.unwrap().is_empty());
}

#[tokio::test]
async fn interrupted_befriending_leaves_a_one_way_edge() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;

    // Only the forward half ran; the follower edge never landed.
    app.social.add_friend_forward(&ada, "bob").await.unwrap();

    assert_eq!(app.social.friends(&ada).await.unwrap().len(), 1);
    assert!(app.social.followers(&bob).await.unwrap().is_empty());

    // Re-running the full operation repairs the reverse edge.
    app.social.add_friend(&ada, "bob").await.unwrap();
    assert_eq!(app.social.friends(&ada).await.unwrap().len(), 1);
    assert_eq!(app.social.followers(&bob).await.unwrap().len(), 1);
}

#[tokio::test]
async fn like_marks_appear_in_list_projections() {
    let app = test_app().await;
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;
    let created = app.ratings.create(&ada, rating_request("p1", 4.0, "latte")).await.unwrap();
    app.social.toggle_like(&bob, &created.rating_id).await.unwrap();

    let page = projector::place_ratings(
        app.store.as_ref(),
        &app.photos,
        "p1",
        Some(&bob),
        10,
        None,
    )
    .await
    .unwrap();
    assert_eq!(page.liked_rating_ids, vec![created.rating_id.clone()]);

    // Anonymous viewers get no like marks.
    let page = projector::place_ratings(app.store.as_ref(), &app.photos, "p1", None, 10, None)
        .await
        .unwrap();
    assert!(page.liked_rating_ids.is_empty());
}
