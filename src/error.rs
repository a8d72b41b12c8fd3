use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Merchant configuration missing: {0}")]
    MerchantConfigMissing(&'static str),

    #[error("Bill number already recorded: {0}")]
    DuplicateBillNumber(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Settlement check failed: {0}")]
    VerificationTransientFailure(String),

    #[error("Payment intent expired")]
    VerificationExpired,

    #[error("Database operation failed: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidAmount(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateBillNumber(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::VerificationTransientFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::VerificationExpired => StatusCode::GONE,

            AppError::MerchantConfigMissing(_)
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = serde_json::json!({ "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record"),
            other => AppError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::InvalidAmount("0".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::DuplicateBillNumber("KH-1".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::NotFound("Transaction").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::VerificationExpired.status_code(),
            StatusCode::GONE
        );
        assert_eq!(
            AppError::VerificationTransientFailure("bank unreachable".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::MerchantConfigMissing("BAKONG_ACCOUNT_ID").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_carry_the_specific_reason() {
        let err = AppError::InvalidAmount("amount must be positive, got -5".into());
        assert!(err.to_string().contains("-5"));

        let err = AppError::NotFound("Transaction");
        assert_eq!(err.to_string(), "Transaction not found");
    }
}
