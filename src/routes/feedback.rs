use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::feedback::{Feedback, Reaction};
use crate::error::AppError;
use crate::AppState;

use super::utils;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedbackRequest {
    pub name: String,
    pub contact: Option<String>,
    pub message: String,
    pub parent_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ReactRequest {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub admin_reply: String,
}

// community view: same record minus the contact details
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicFeedback {
    pub id: i32,
    pub name: String,
    pub message: String,
    pub admin_reply: Option<String>,
    pub reply_date: Option<DateTime<Utc>>,
    pub parent_id: Option<i32>,
    pub likes: i32,
    pub loves: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Feedback> for PublicFeedback {
    fn from(feedback: Feedback) -> Self {
        Self {
            id: feedback.id,
            name: feedback.name,
            message: feedback.message,
            admin_reply: feedback.admin_reply,
            reply_date: feedback.reply_date,
            parent_id: feedback.parent_id,
            likes: feedback.likes,
            loves: feedback.loves,
            status: feedback.status,
            created_at: feedback.created_at,
        }
    }
}

async fn create_feedback(
    State(state): State<AppState>,
    Json(req): Json<NewFeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.name.trim().is_empty() || req.message.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Name and message are required".to_string(),
        ));
    }

    let contact = req.contact.unwrap_or_else(|| "N/A".to_string());
    let feedback = state
        .feedbacks
        .create(&req.name, &contact, &req.message, req.parent_id)
        .await?;

    tracing::info!("feedback {} posted by {}", feedback.id, feedback.name);
    Ok((StatusCode::CREATED, Json(feedback)))
}

async fn react_to_feedback(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<ReactRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reaction = match req.kind.as_str() {
        "like" => Reaction::Like,
        "love" => Reaction::Love,
        other => {
            return Err(AppError::BadRequest(format!(
                "Unknown reaction type: {other}"
            )));
        }
    };

    let feedback = state.feedbacks.react(id, reaction).await?;
    Ok(Json(feedback))
}

async fn edit_feedback(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<EditRequest>,
) -> Result<impl IntoResponse, AppError> {
    let feedback = state.feedbacks.update_message(id, &req.message).await?;
    Ok(Json(feedback))
}

async fn list_feedbacks(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let feedbacks = state.feedbacks.list_all().await?;

    // contact details stay between the poster and the admin
    let is_admin = utils::require_admin(&headers, &state.auth).is_ok();
    if is_admin {
        return Ok(Json(serde_json::to_value(feedbacks).unwrap_or_default()));
    }

    let public: Vec<PublicFeedback> = feedbacks.into_iter().map(PublicFeedback::from).collect();
    Ok(Json(serde_json::to_value(public).unwrap_or_default()))
}

async fn reply_to_feedback(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse, AppError> {
    utils::require_admin(&headers, &state.auth)?;

    let feedback = state.feedbacks.admin_reply(id, &req.admin_reply).await?;
    tracing::info!("official reply posted on feedback {}", id);
    Ok(Json(
        serde_json::json!({ "message": "Official reply submitted", "feedback": feedback }),
    ))
}

async fn delete_feedback(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    state.feedbacks.delete(id).await?;
    Ok(Json(serde_json::json!({ "message": "Feedback deleted" })))
}

pub fn feedback_routes(state: AppState) -> Router {
    Router::new()
        .route("/feedbacks", get(list_feedbacks).post(create_feedback))
        .route("/feedbacks/react/:id", post(react_to_feedback))
        .route("/feedbacks/reply/:id", put(reply_to_feedback))
        .route("/feedbacks/:id", put(edit_feedback).delete(delete_feedback))
        .with_state(state)
}
