use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::user::User;
use super::{PgStore, StoreError, UserStore};

const USER_COLUMNS: &str = "id, email, password_hash, full_name, status, created_at, updated_at";

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, password_hash, full_name)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(password_hash)
            .bind(full_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UserExists,
                other => other.into(),
            })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn verify_refresh_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.password_hash, u.full_name, u.status, u.created_at, u.updated_at
            FROM users u
            INNER JOIN refresh_tokens rt ON rt.user_id = u.id
            WHERE rt.token = $1 AND rt.expires_at > CURRENT_TIMESTAMP
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?)
    }
}
