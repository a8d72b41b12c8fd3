use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: i32,
    pub name: String,
    pub contact: String,
    pub message: String,
    pub admin_reply: Option<String>,
    pub reply_date: Option<DateTime<Utc>>,
    pub parent_id: Option<i32>,
    pub likes: i32,
    pub loves: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub enum Reaction {
    Like,
    Love,
}

#[derive(Clone)]
pub struct FeedbackRepository {
    pool: PgPool,
}

impl FeedbackRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        contact: &str,
        message: &str,
        parent_id: Option<i32>,
    ) -> AppResult<Feedback> {
        let feedback = sqlx::query_as::<_, Feedback>(
            r#"
            INSERT INTO feedbacks (name, contact, message, parent_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(contact)
        .bind(message)
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(feedback)
    }

    pub async fn react(&self, id: i32, reaction: Reaction) -> AppResult<Feedback> {
        let column = match reaction {
            Reaction::Like => "likes",
            Reaction::Love => "loves",
        };
        sqlx::query_as::<_, Feedback>(&format!(
            "UPDATE feedbacks SET {column} = {column} + 1, updated_at = NOW() WHERE id = $1 RETURNING *"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Feedback"))
    }

    pub async fn update_message(&self, id: i32, message: &str) -> AppResult<Feedback> {
        sqlx::query_as::<_, Feedback>(
            "UPDATE feedbacks SET message = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(message)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Feedback"))
    }

    // oldest first so reply chains read top-down
    pub async fn list_all(&self) -> AppResult<Vec<Feedback>> {
        let feedbacks =
            sqlx::query_as::<_, Feedback>("SELECT * FROM feedbacks ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(feedbacks)
    }

    pub async fn admin_reply(&self, id: i32, reply: &str) -> AppResult<Feedback> {
        sqlx::query_as::<_, Feedback>(
            r#"
            UPDATE feedbacks SET admin_reply = $2, reply_date = NOW(), status = 'resolved', updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reply)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Feedback"))
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM feedbacks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Feedback"));
        }
        Ok(())
    }
}
