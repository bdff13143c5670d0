//! HTTP surface: request shapes, handlers, and the router.
//!
//! Caller identity is the `x-user-id` header. Handlers stay thin: pull the
//! identity, deserialize, call the service, shape the JSON body. Status and
//! error bodies come from `AppError`'s response mapping.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::app_state::AppState;
use crate::collaborators::{caffeine, photos};
use crate::error::{AppError, AppResult};
use crate::infrastructure::store::ItemKey;
use crate::keyspace;
use crate::pagination;
use crate::services::feed::feed_body;
use crate::services::projector;
use crate::services::ratings::{CreateRatingRequest, RatingPatch};
use crate::services::users::{CreateUserRequest, LoginRequest};

fn require_user_id(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("Missing x-user-id header".to_string()))
}

fn optional_user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFriendRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "image/jpeg".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveCaffeineRequest {
    pub drink_name: String,
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<impl IntoResponse> {
    let user = state.users.create(req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let user = state.users.login(req).await?;
    Ok(Json(json!({ "user": user })))
}

async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user = state.users.get_by_username(&username).await?;
    Ok(Json(json!({ "user": user })))
}

async fn create_rating(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRatingRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let created = state.ratings.create(&user_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ratingId": created.rating_id,
            "createdAt": created.created_at,
        })),
    ))
}

async fn update_rating(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(rating_id): Path<String>,
    Json(patch): Json<RatingPatch>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let updated = state.ratings.update(&user_id, &rating_id, patch).await?;
    Ok(Json(json!({
        "ratingId": updated.rating_id,
        "updatedAt": updated.updated_at,
    })))
}

async fn get_rating(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(rating_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let viewer = optional_user_id(&headers);
    let detail = projector::rating_detail(
        state.store.as_ref(),
        &state.config.photos,
        &rating_id,
        viewer.as_deref(),
    )
    .await?;
    Ok(Json(json!({
        "rating": detail.rating,
        "likes": detail.likes,
        "comments": detail.comments,
        "isLikedByMe": detail.is_liked_by_me,
    })))
}

async fn toggle_like(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(rating_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let outcome = state.social.toggle_like(&user_id, &rating_id).await?;
    Ok(Json(json!({
        "liked": outcome.liked,
        "likeCount": outcome.like_count,
    })))
}

async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(rating_id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let created = state
        .social
        .create_comment(&user_id, &rating_id, &req.text)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "commentId": created.comment_id,
            "createdAt": created.created_at,
        })),
    ))
}

async fn user_ratings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let viewer = optional_user_id(&headers);
    let page = projector::user_ratings(
        state.store.as_ref(),
        &state.config.photos,
        &user_id,
        viewer.as_deref(),
        pagination::parse_limit(query.limit.as_deref()),
        query.cursor.as_deref(),
    )
    .await?;
    Ok(Json(json!({
        "ratings": page.ratings,
        "likedRatingIds": page.liked_rating_ids,
        "nextCursor": page.next_cursor,
    })))
}

async fn place_ratings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(place_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let viewer = optional_user_id(&headers);
    let page = projector::place_ratings(
        state.store.as_ref(),
        &state.config.photos,
        &place_id,
        viewer.as_deref(),
        pagination::parse_limit(query.limit.as_deref()),
        query.cursor.as_deref(),
    )
    .await?;
    Ok(Json(json!({
        "ratings": page.ratings,
        "likedRatingIds": page.liked_rating_ids,
        "nextCursor": page.next_cursor,
    })))
}

async fn get_place(
    State(state): State<AppState>,
    Path(place_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let meta = state
        .store
        .get(&ItemKey::new(keyspace::place_pk(&place_id), keyspace::META_SK))
        .await?
        .ok_or_else(|| AppError::NotFound("Place not found".to_string()))?;
    Ok(Json(json!({ "place": projector::public_item(&meta) })))
}

async fn add_friend(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddFriendRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let edge = state.social.add_friend(&user_id, &req.username).await?;
    Ok((StatusCode::CREATED, Json(json!({ "friend": edge }))))
}

async fn list_friends(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let friends = state.social.friends(&user_id).await?;
    Ok(Json(json!({ "friends": friends })))
}

async fn list_followers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let followers = state.social.followers(&user_id).await?;
    Ok(Json(json!({ "followers": followers })))
}

async fn get_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let page = state
        .feed
        .feed(
            &user_id,
            &state.config.photos,
            pagination::parse_limit(query.limit.as_deref()),
            query.cursor.as_deref(),
        )
        .await?;
    Ok(Json(feed_body(&page)))
}

async fn caffeine_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let stats = state.users.caffeine_stats(&user_id).await?;
    Ok(Json(json!({
        "todayMg": stats.today_mg,
        "totalMg": stats.total_mg,
    })))
}

async fn create_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UploadRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let key = photos::upload_key(&user_id, &req.file_name);
    let upload_url = photos::upload_url(&state.config.photos, &key, &req.content_type);
    Ok(Json(json!({
        "uploadUrl": upload_url,
        "photoKey": key,
    })))
}

async fn resolve_caffeine(
    State(state): State<AppState>,
    Json(req): Json<ResolveCaffeineRequest>,
) -> AppResult<impl IntoResponse> {
    let body = match caffeine::ai_estimate_mg(&state.config.estimator, &req.drink_name).await {
        Some(mg) => json!({ "caffeineMg": mg, "source": "ai" }),
        None => json!({ "caffeineMg": 0, "source": "error" }),
    };
    Ok(Json(body))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/login", post(login))
        .route("/api/users/{id}", get(get_user))
        .route("/api/ratings", post(create_rating))
        .route("/api/ratings/{id}", get(get_rating).put(update_rating))
        .route("/api/ratings/{id}/like", post(toggle_like))
        .route("/api/ratings/{id}/comments", post(create_comment))
        .route("/api/users/{id}/ratings", get(user_ratings))
        .route("/api/places/{id}/ratings", get(place_ratings))
        .route("/api/places/{id}", get(get_place))
        .route("/api/friends", post(add_friend))
        .route("/api/users/{id}/friends", get(list_friends))
        .route("/api/users/{id}/followers", get(list_followers))
        .route("/api/feed", get(get_feed))
        .route("/api/users/{id}/caffeine", get(caffeine_stats))
        .route("/api/uploads", post(create_upload))
        .route("/api/caffeine/resolve", post(resolve_caffeine))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
