use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{sse::Event, IntoResponse, Sse},
    routing::{get, patch, post},
    Json, Router,
};
use futures::StreamExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::tx::{NewTransaction, TransactionStatus};
use crate::error::AppError;
use crate::payment::khqr::{generate_intent, validate_amount};
use crate::payment::verify::VerificationOutcome;
use crate::AppState;

use super::utils;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub program_id: i32,
    pub customer_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub bill_number: String,
    pub qr: String,
    pub md5: String,
    pub amount: Decimal,
    pub currency: String,
    pub expires_in_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitTransactionRequest {
    pub bill_number: String,
    pub amount: Decimal,
    pub program_id: i32,
    pub user_id: Option<i32>,
    pub customer_name: Option<String>,
    pub currency: Option<String>,
    #[serde(alias = "md5")]
    pub checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TransactionStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub outcome: VerificationOutcome,
    pub bill_number: String,
    pub status: TransactionStatus,
    pub download_url: Option<String>,
}

// Server-side intent creation: mint the bill reference, build the QR
// payload and fingerprint, persist the PENDING record in one step.
async fn checkout(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("checkout requested for program {}", req.program_id);

    let program = state.catalog.get_program(req.program_id).await?;
    if !program.is_paid || program.price <= Decimal::ZERO {
        return Err(AppError::InvalidAmount(format!(
            "program {} is not a purchasable item",
            program.id
        )));
    }

    let intent = generate_intent(&state.merchant, program.price)?;
    let user_id = utils::optional_user_id(&headers, &state.auth);

    let transaction = state
        .transactions
        .record_intent(NewTransaction {
            bill_number: intent.bill_number.clone(),
            amount: intent.amount,
            currency: intent.currency.clone(),
            program_id: program.id,
            user_id,
            customer_name: req.customer_name,
            checksum: Some(intent.checksum.clone()),
        })
        .await?;

    tracing::info!(
        "recorded payment intent {} for program {} (amount {})",
        transaction.bill_number,
        program.id,
        transaction.amount
    );

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            bill_number: intent.bill_number,
            qr: intent.qr_payload,
            md5: intent.checksum,
            amount: intent.amount,
            currency: intent.currency,
            expires_in_secs: state.intent_ttl.as_secs(),
        }),
    ))
}

// Compatibility shape: the caller brings the whole intent payload.
async fn init_transaction(
    State(state): State<AppState>,
    Json(req): Json<InitTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    // reject before anything is written
    validate_amount(req.amount)?;

    let transaction = state
        .transactions
        .record_intent(NewTransaction {
            bill_number: req.bill_number,
            amount: req.amount,
            currency: req.currency.unwrap_or_else(|| "USD".to_string()),
            program_id: req.program_id,
            user_id: req.user_id,
            customer_name: req.customer_name,
            checksum: req.checksum,
        })
        .await?;

    tracing::info!(
        "recorded transaction {} ({} {})",
        transaction.bill_number,
        transaction.amount,
        transaction.currency
    );

    Ok((StatusCode::CREATED, Json(transaction)))
}

// Status flip for a trusted settlement callback. Unauthenticated so the
// callback can reach it; main() logs a warning about that.
async fn update_status(
    State(state): State<AppState>,
    Path(bill_number): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .transactions
        .update_status(&bill_number, req.status)
        .await?;

    tracing::info!("transaction {} moved to {:?}", bill_number, req.status);
    Ok(Json(transaction))
}

async fn verify_transaction(
    State(state): State<AppState>,
    Path(bill_number): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (outcome, transaction) = state.verifier.verify(&bill_number).await?;

    // the download locator is only released on a confirmed settlement;
    // re-verifying a settled bill hands back the same locator, the
    // download counter is bumped by the download route alone
    let download_url = match outcome {
        VerificationOutcome::Confirmed => {
            let program = state.catalog.get_program(transaction.program_id).await?;
            program.download_locator().map(str::to_string)
        }
        _ => None,
    };

    Ok(Json(VerifyResponse {
        outcome,
        bill_number: transaction.bill_number.clone(),
        status: transaction.status,
        download_url,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub status: Option<TransactionStatus>,
}

// return every payment attempt, newest first, for administrative review
async fn list_transactions(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    utils::require_admin(&headers, &state.auth)?;

    let records = state.transactions.list_all(query.status).await?;

    let stream = futures::stream::iter(records)
        .map(|transaction| Event::default().json_data(transaction));

    let sse = Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(std::time::Duration::from_secs(2))
            .text("keep-alive-text"),
    );

    Ok(sse)
}

pub fn tx_routes(state: AppState) -> Router {
    Router::new()
        .route("/transactions/init", post(init_transaction))
        .route("/transactions/checkout", post(checkout))
        .route("/transactions/status/:bill_number", patch(update_status))
        .route("/transactions/verify/:bill_number", post(verify_transaction))
        .route("/transactions", get(list_transactions))
        .with_state(state)
}
