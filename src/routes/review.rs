use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use super::utils::{self, ApiJson, Pagination};
use crate::db::Review;
use crate::error::ApiError;
use crate::reputation::{NewReview, ReputationRecord, ReviewEdit};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review: Review,
    pub reputation: ReputationRecord,
}

#[derive(Debug, Serialize)]
pub struct ReviewPage {
    pub reviews: Vec<Review>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

async fn create_review(
    headers: HeaderMap,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewReview>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer_id = utils::validate_auth_token(&headers, &state.auth)?;
    let (review, reputation) = state.reputation.submit_review(reviewer_id, req).await?;
    Ok((StatusCode::CREATED, Json(ReviewResponse { review, reputation })))
}

async fn update_review(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    ApiJson(edit): ApiJson<ReviewEdit>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer_id = utils::validate_auth_token(&headers, &state.auth)?;
    let (review, reputation) = state.reputation.edit_review(reviewer_id, review_id, edit).await?;
    Ok((StatusCode::OK, Json(ReviewResponse { review, reputation })))
}

async fn delete_review(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer_id = utils::validate_auth_token(&headers, &state.auth)?;
    let reputation = state.reputation.delete_review(reviewer_id, review_id).await?;
    Ok((StatusCode::OK, Json(reputation)))
}

async fn user_reviews(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(paging): Query<Pagination>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit) = paging.resolve();
    let (reviews, total) = state.reputation.reviews_for_user(user_id, page, limit).await?;
    Ok(Json(ReviewPage { reviews, total, page, limit }))
}

async fn task_reviews(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.reputation.reviews_for_task(task_id).await?))
}

async fn user_reputation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.reputation.reputation(user_id).await?))
}

async fn user_review_stats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.reputation.rating_distribution(user_id).await?))
}

async fn badge_catalogue(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.reputation.badge_catalogue().to_vec())
}

/// Review writes. Require a bearer token.
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/reviews", post(create_review))
        .route("/reviews/:id", put(update_review).delete(delete_review))
}

/// Public reputation reads.
pub fn reputation_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:id/reviews", get(user_reviews))
        .route("/users/:id/reviews/stats", get(user_review_stats))
        .route("/users/:id/reputation", get(user_reputation))
        .route("/tasks/:id/reviews", get(task_reviews))
        .route("/reputation/badges", get(badge_catalogue))
}
