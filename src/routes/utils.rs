use async_trait::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthService;
use crate::error::ApiError;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl Pagination {
    /// 1-based page and a limit within `1..=MAX_PAGE_SIZE`.
    pub fn resolve(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

/// `Json` whose rejections render as an [`ApiError`] body.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!("rejected request body: {rejection}");
                Err(ApiError::BadRequest(rejection.body_text()))
            }
        }
    }
}

#[inline]
pub fn validate_auth_token(headers: &HeaderMap, service: &AuthService) -> Result<Uuid, ApiError> {
    let jwt_header_token = match headers.get("Authorization").map(|token| token.to_str()) {
        Some(Ok(token)) => token,
        _ => {
            return Err(ApiError::Unauthorized);
        }
    };
    let token = jwt_header_token.strip_prefix("Bearer ").unwrap_or(jwt_header_token);
    service.verify_token(token).map_err(|_err| ApiError::Unauthorized)
}

#[inline]
pub fn check_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit");
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err("Password must contain at least one special character");
    }
    Ok(())
}
