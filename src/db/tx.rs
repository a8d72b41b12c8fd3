use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};

use super::utils::is_unique_violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i32,
    pub bill_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub program_id: i32,
    pub user_id: Option<i32>,
    pub customer_name: Option<String>,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewTransaction {
    pub bill_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub program_id: i32,
    pub user_id: Option<i32>,
    pub customer_name: Option<String>,
    pub checksum: Option<String>,
}

// Ledger of payment attempts, keyed by bill number
#[derive(Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record_intent(&self, new: NewTransaction) -> AppResult<Transaction> {
        sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (bill_number, amount, currency, status, program_id, user_id, customer_name, checksum)
            VALUES ($1, $2, $3, 'PENDING', $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&new.bill_number)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(new.program_id)
        .bind(new.user_id)
        .bind(&new.customer_name)
        .bind(&new.checksum)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            // a colliding bill number is an integrity violation, never ignored
            if is_unique_violation(&err) {
                AppError::DuplicateBillNumber(new.bill_number.clone())
            } else {
                err.into()
            }
        })
    }

    // single-row update, last writer wins
    pub async fn update_status(
        &self,
        bill_number: &str,
        status: TransactionStatus,
    ) -> AppResult<Transaction> {
        sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions SET status = $2, updated_at = NOW()
            WHERE bill_number = $1
            RETURNING *
            "#,
        )
        .bind(bill_number)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Transaction"))
    }

    pub async fn find_by_bill(&self, bill_number: &str) -> AppResult<Transaction> {
        sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE bill_number = $1")
            .bind(bill_number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("Transaction"))
    }

    pub async fn list_all(&self, status: Option<TransactionStatus>) -> AppResult<Vec<Transaction>> {
        let records = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE $1::transaction_status IS NULL OR status = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
