//! HTTP surface: inbound webhooks plus authenticated operator endpoints.
//!
//! Webhook callers only see coarse status codes; failure detail stays in
//! the logs. Operator endpoints (approvals, sequences, knowledge) sit
//! behind a bearer token and return precise conflict/not-found codes.

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::approval::ApprovalWorkflow;
use crate::config::AppConfig;
use crate::drip::DripScheduler;
use crate::error::{ApprovalError, Error, SchedulerError, StoreError};
use crate::knowledge::{IndexOutcome, KnowledgeIndexer};
use crate::models::{Channel, KnowledgeDocument};
use crate::pipeline::{InboundMessage, InboundPipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InboundPipeline>,
    pub approvals: Arc<ApprovalWorkflow>,
    pub scheduler: Arc<DripScheduler>,
    pub indexer: Arc<KnowledgeIndexer>,
    pub config: Arc<AppConfig>,
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/webhooks/email", post(email_webhook))
        .route("/webhooks/sms", post(sms_webhook))
        .with_state(state.clone());

    let operator = Router::new()
        .route("/approvals", get(list_approvals))
        .route("/approvals/{id}/approve", post(approve))
        .route("/approvals/{id}/reject", post(reject))
        .route("/subscribers", post(create_subscriber))
        .route("/sequences/start", post(start_sequence))
        .route("/knowledge/reindex", post(reindex))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public)
        .merge(operator)
        .layer(TraceLayer::new_for_http())
}

/// Bearer-token gate for operator routes. Fails closed when no token is
/// configured.
async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized = match (&state.config.api_token, presented) {
        (Some(expected), Some(token)) => token == expected.expose_secret(),
        _ => false,
    };
    if !authorized {
        warn!(path = %request.uri().path(), "Rejected unauthenticated operator request");
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})))
            .into_response();
    }
    next.run(request).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

// ── Webhooks ────────────────────────────────────────────────────────

// Sender and body fields are `Option` so that a payload omitting them
// reaches the handlers' own validation (400), rather than being rejected
// by the extractor as unprocessable.
#[derive(Debug, Deserialize)]
struct EmailWebhook {
    from: Option<String>,
    #[allow(dead_code)]
    subject: Option<String>,
    text: Option<String>,
    html: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SmsWebhook {
    from: Option<String>,
    #[allow(dead_code)]
    to: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct WebhookAck {
    status: &'static str,
    conversation_id: Uuid,
}

/// Pull a bare address out of `"Display Name <addr@host>"` or return the
/// input unchanged.
pub fn extract_email_address(from: &str) -> &str {
    match (from.rfind('<'), from.rfind('>')) {
        (Some(open), Some(close)) if open < close => from[open + 1..close].trim(),
        _ => from.trim(),
    }
}

/// The display-name half of a `"Name <addr>"` sender, if present.
fn extract_display_name(from: &str) -> Option<String> {
    let open = from.find('<')?;
    let name = from[..open].trim().trim_matches('"').trim();
    (!name.is_empty()).then(|| name.to_string())
}

async fn email_webhook(
    State(state): State<AppState>,
    Json(payload): Json<EmailWebhook>,
) -> Response {
    let Some(from) = payload.from.as_deref().map(str::trim).filter(|f| !f.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "missing sender"})))
            .into_response();
    };
    let Some(body) = payload
        .text
        .as_deref()
        .or(payload.html.as_deref())
        .filter(|b| !b.trim().is_empty())
    else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "empty body"}))).into_response();
    };

    let inbound = InboundMessage {
        sender: extract_email_address(from).to_string(),
        sender_name: extract_display_name(from),
        channel: Channel::Email,
        content: body.to_string(),
    };
    run_pipeline(&state, inbound).await
}

async fn sms_webhook(State(state): State<AppState>, Json(payload): Json<SmsWebhook>) -> Response {
    let Some(from) = payload.from.as_deref().map(str::trim).filter(|f| !f.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "missing sender"})))
            .into_response();
    };
    let Some(text) = payload.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "empty body"}))).into_response();
    };

    let inbound = InboundMessage {
        sender: from.to_string(),
        sender_name: None,
        channel: Channel::Sms,
        content: text.to_string(),
    };
    run_pipeline(&state, inbound).await
}

async fn run_pipeline(state: &AppState, inbound: InboundMessage) -> Response {
    match state.pipeline.handle(inbound).await {
        Ok(report) => (
            StatusCode::OK,
            Json(WebhookAck {
                status: "ok",
                conversation_id: report.conversation_id,
            }),
        )
            .into_response(),
        Err(Error::Pipeline(e)) => {
            warn!(error = %e, "Webhook payload rejected");
            (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid payload"}))).into_response()
        }
        Err(e) => {
            error!(error = %e, "Pipeline failure handling webhook");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}

// ── Approvals ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
struct ApproveBody {
    final_text: Option<String>,
}

async fn list_approvals(State(state): State<AppState>) -> Response {
    match state.approvals.pending().await {
        Ok(items) => Json(items).into_response(),
        Err(e) => operator_error(e),
    }
}

async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: axum::body::Bytes,
) -> Response {
    // The edit body is optional; an empty body approves the draft as-is.
    let body: ApproveBody = if body.is_empty() {
        ApproveBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(_) => {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid body"})))
                    .into_response();
            }
        }
    };
    match state.approvals.approve(id, body.final_text.as_deref()).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => operator_error(e),
    }
}

async fn reject(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.approvals.reject(id).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => operator_error(e),
    }
}

// ── Drip campaigns ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateSubscriberBody {
    email: String,
    name: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StartSequenceBody {
    identifier: String,
    sequence: String,
}

async fn create_subscriber(
    State(state): State<AppState>,
    Json(body): Json<CreateSubscriberBody>,
) -> Response {
    if body.email.trim().is_empty() || !body.email.contains('@') {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid email"})))
            .into_response();
    }
    match state
        .scheduler
        .upsert_subscriber(&body.email, body.name.as_deref(), &body.tags)
        .await
    {
        Ok(subscriber) => Json(subscriber).into_response(),
        Err(e) => operator_error(e),
    }
}

async fn start_sequence(
    State(state): State<AppState>,
    Json(body): Json<StartSequenceBody>,
) -> Response {
    match state
        .scheduler
        .start_sequence(&body.identifier, &body.sequence, Utc::now())
        .await
    {
        Ok(subscriber) => Json(subscriber).into_response(),
        Err(e) => operator_error(e),
    }
}

// ── Knowledge ───────────────────────────────────────────────────────

async fn reindex(
    State(state): State<AppState>,
    Json(document): Json<KnowledgeDocument>,
) -> Response {
    match state.indexer.index(&document).await {
        Ok(IndexOutcome::Indexed { chunks }) => {
            Json(json!({"outcome": "indexed", "chunks": chunks})).into_response()
        }
        Ok(IndexOutcome::SkippedInactive) => {
            Json(json!({"outcome": "skipped_inactive"})).into_response()
        }
        Err(e) => operator_error(e),
    }
}

// ── Error mapping ───────────────────────────────────────────────────

fn operator_error(err: Error) -> Response {
    let (status, message) = match &err {
        Error::Store(StoreError::NotFound { entity, id }) => {
            (StatusCode::NOT_FOUND, format!("{entity} {id} not found"))
        }
        Error::Approval(ApprovalError::InvalidTransition { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        Error::Scheduler(SchedulerError::AlreadyEnrolled { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        Error::Scheduler(SchedulerError::UnknownSequence(_))
        | Error::Scheduler(SchedulerError::UnknownTemplate(_)) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        Error::Scheduler(SchedulerError::InvalidSequence(_)) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        _ => {
            error!(error = %err, "Operator request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    };
    (status, Json(json!({"error": message}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_address_from_display_form() {
        assert_eq!(
            extract_email_address("Jane Doe <jane@example.com>"),
            "jane@example.com"
        );
        assert_eq!(extract_email_address("jane@example.com"), "jane@example.com");
        assert_eq!(
            extract_email_address("\"Doe, Jane\" <jane@example.com>"),
            "jane@example.com"
        );
        // Unbalanced brackets fall back to the raw value.
        assert_eq!(extract_email_address("jane@example.com>"), "jane@example.com>");
    }

    #[test]
    fn extracts_display_name_when_present() {
        assert_eq!(
            extract_display_name("Jane Doe <jane@example.com>"),
            Some("Jane Doe".to_string())
        );
        assert_eq!(extract_display_name("jane@example.com"), None);
        assert_eq!(extract_display_name("<jane@example.com>"), None);
    }

    #[test]
    fn sms_payload_uses_provider_field_names() {
        let payload: SmsWebhook =
            serde_json::from_str(r#"{"From": "+15551234567", "To": "+15550000000", "Text": "hi"}"#)
                .unwrap();
        assert_eq!(payload.from.as_deref(), Some("+15551234567"));
        assert_eq!(payload.text.as_deref(), Some("hi"));
    }

    #[test]
    fn webhook_payloads_tolerate_omitted_fields() {
        // A missing sender key must still deserialize, so the handlers can
        // answer 400 instead of the extractor answering 422.
        let payload: EmailWebhook =
            serde_json::from_str(r#"{"subject": "hi", "text": "hello"}"#).unwrap();
        assert!(payload.from.is_none());

        let payload: SmsWebhook = serde_json::from_str(r#"{"Text": "hello"}"#).unwrap();
        assert!(payload.from.is_none());
    }

    #[test]
    fn email_payload_accepts_text_or_html() {
        let payload: EmailWebhook = serde_json::from_str(
            r#"{"from": "a@b.com", "subject": "hi", "html": "<p>hello</p>"}"#,
        )
        .unwrap();
        assert!(payload.text.is_none());
        assert_eq!(payload.html.as_deref(), Some("<p>hello</p>"));
    }
}
