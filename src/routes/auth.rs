use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_email::Email;
use thiserror::Error;
use uuid::Uuid;

use super::utils::ApiJson;
use crate::db::{StoreError, UserStore};
use crate::error::ApiError;
use crate::ledger::{LedgerError, LedgerService};
use crate::AppState;

const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid token")]
    InvalidToken,
    #[error("User already exists")]
    UserExists,
    #[error("{0}")]
    WeakPassword(&'static str),
    #[error("unable to hash password")]
    Hashing,
    #[error("unable to issue token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserExists => AuthError::UserExists,
            other => AuthError::Store(other),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    sub: Uuid, // user_id
    exp: i64,  // expiration timestamp
    iat: i64,  // issued at timestamp
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Email,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Email,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_uid: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    refresh_token: String,
}

/// Accounts, passwords and tokens. Registration also opens the user's wallet.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    ledger: Arc<LedgerService>,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, ledger: Arc<LedgerService>, jwt_secret: String) -> Self {
        Self { store, ledger, jwt_secret }
    }

    pub fn users(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        if self.store.find_user_by_email(req.email.as_str()).await?.is_some() {
            return Err(AuthError::UserExists);
        }

        super::utils::check_password(&req.password).map_err(AuthError::WeakPassword)?;

        let salt = SaltString::generate(&mut rand::thread_rng());
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|_err| AuthError::Hashing)?
            .to_string();

        let user = self
            .store
            .create_user(req.email.as_str(), &password_hash, req.full_name.as_deref())
            .await?;
        tracing::info!("user created with email: {}", user.email);

        self.ledger.open_account(user.id).await?;

        self.issue_tokens(user.id).await
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        tracing::info!("Attempting to log in user with email: {}", req.email);

        let user = self
            .store
            .find_user_by_email(req.email.as_str())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|_err| AuthError::Hashing)?;
        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            tracing::warn!("Invalid credentials for user: {}", user.email);
            return Err(AuthError::InvalidCredentials);
        }
        tracing::info!("Password verified for user: {}", user.email);

        self.issue_tokens(user.id).await
    }

    pub fn verify_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let mut validation = jsonwebtoken::Validation::default();

        validation.leeway = 10;
        validation.validate_exp = true;
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            tracing::warn!("Error decoding token: {:?}", err);
            AuthError::InvalidToken
        })?;

        Ok(token_data.claims.sub)
    }

    pub async fn refresh_token(&self, refresh_token: String) -> Result<AuthResponse, AuthError> {
        let user = self
            .store
            .verify_refresh_token(&refresh_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.issue_tokens(user.id).await
    }

    async fn issue_tokens(&self, user_id: Uuid) -> Result<AuthResponse, AuthError> {
        let (access_token, refresh_token) = self.generate_tokens(user_id)?;

        let expires_at = Utc::now() + REFRESH_TOKEN_TTL;
        self.store
            .store_refresh_token(user_id, &refresh_token, expires_at)
            .await?;
        tracing::info!("stored refresh token for user: {}", user_id);

        Ok(AuthResponse {
            access_token,
            refresh_token,
            user_uid: user_id,
        })
    }

    fn generate_tokens(&self, user_id: Uuid) -> Result<(String, String), AuthError> {
        let now = Utc::now();

        let access_claims = Claims {
            sub: user_id,
            exp: (now + ACCESS_TOKEN_TTL).timestamp(),
            iat: now.timestamp(),
        };

        let access_token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &access_claims,
            &jsonwebtoken::EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        // opaque, looked up in the store
        let refresh_token = Uuid::new_v4().to_string();

        Ok((access_token, refresh_token))
    }
}

pub async fn register_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.auth.login(req).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn refresh_token_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.auth.refresh_token(req.refresh_token).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_token_handler))
}
