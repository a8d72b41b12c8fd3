use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub otp_code: Option<String>,
    #[serde(skip_serializing)]
    pub otp_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Database repository
#[derive(Clone)]
pub struct AuthRepository {
    pool: PgPool,
}

impl AuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn create_user(&self, username: &str, email: &str) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, role, is_verified)
            VALUES ($1, $2, $3, FALSE)
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(ROLE_USER)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn store_otp(
        &self,
        user_id: i32,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET otp_code = $2, otp_expires = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_user_by_email_and_otp(
        &self,
        email: &str,
        code: &str,
    ) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email = $1 AND otp_code = $2",
        )
        .bind(email)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    // consume the code and mark the account verified in one statement
    pub async fn clear_otp_and_verify(&self, user_id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET otp_code = NULL, otp_expires = NULL, is_verified = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("User"))
    }

    pub async fn admin_exists(&self) -> AppResult<bool> {
        let found: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM users WHERE role = $1 LIMIT 1")
                .bind(ROLE_ADMIN)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    pub async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, role, is_verified)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(ROLE_ADMIN)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
}
