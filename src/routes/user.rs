use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::utils::validate_auth_token;
use crate::db::User;
use crate::error::ApiError;
use crate::ledger::WalletSummary;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub wallet: WalletSummary,
}

async fn get_user(headers: HeaderMap, State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let user_id = validate_auth_token(&headers, &state.auth)?;
    tracing::info!("Token validation succeeded for user: {}", user_id);

    let user = state.auth.users().find_user(user_id).await?.ok_or_else(|| {
        tracing::warn!("User not found: {}", user_id);
        ApiError::Unauthorized
    })?;
    let wallet = state.ledger.wallet_summary(user_id).await?;

    Ok((StatusCode::OK, Json(Profile { user, wallet })))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_user))
}
