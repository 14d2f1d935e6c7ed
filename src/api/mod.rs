// ============================================================================
// HTTP API - thin axum layer over LottoEngine
// ============================================================================
//
// Authentication happens upstream. The gateway forwards the resolved caller
// in x-actor-id / x-actor-role / x-shop-id / x-actor-name headers.

pub mod handlers;

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::engine::LottoEngine;
use crate::error::LottoError;
use crate::models::{Actor, Role};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LottoEngine>,
}

impl AppState {
    pub fn new(engine: LottoEngine) -> Self {
        Self { engine: Arc::new(engine) }
    }
}

// ============================================================================
// ERRORS → RESPONSES
// ============================================================================

pub fn status_for(err: &LottoError) -> StatusCode {
    match err {
        LottoError::LotteryNotFound(_)
        | LottoError::TicketNotFound(_)
        | LottoError::AccountNotFound(_)
        | LottoError::RiskNotFound(_)
        | LottoError::DuplicateLotteryNotFound(_) => StatusCode::NOT_FOUND,
        LottoError::Forbidden(_) => StatusCode::FORBIDDEN,
        LottoError::LotteryInactive
        | LottoError::LotteryClosed(_)
        | LottoError::NoRoundToday
        | LottoError::InvalidTicketState { .. }
        | LottoError::AccountExists(_) => StatusCode::CONFLICT,
        LottoError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        LottoError::UnconfiguredRate(_)
        | LottoError::BetLimitViolation { .. }
        | LottoError::InvalidBet(_)
        | LottoError::InvalidResult(_) => StatusCode::BAD_REQUEST,
        LottoError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for LottoError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if !self.is_rejection() {
            error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({
            "success": false,
            "code": self.code(),
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

// ============================================================================
// ACTOR EXTRACTOR
// ============================================================================

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = LottoError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(&parts.headers, "x-actor-id")
            .ok_or_else(|| LottoError::Forbidden("missing x-actor-id".to_string()))?;
        let role = match header(&parts.headers, "x-actor-role") {
            Some(raw) => Role::parse(&raw).ok_or_else(|| LottoError::Forbidden(format!("unknown role {}", raw)))?,
            None => Role::Member,
        };
        let shop_id = header(&parts.headers, "x-shop-id");
        let username = header(&parts.headers, "x-actor-name").unwrap_or_else(|| user_id.clone());

        Ok(Actor { user_id, username, role, shop_id })
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Public
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/lotteries", get(handlers::list_lotteries))
        .route("/results", get(handlers::result_history))
        // Member
        .route("/balance", get(handlers::balance))
        .route("/tickets", post(handlers::submit_ticket))
        .route("/tickets/history", get(handlers::ticket_history))
        .route("/tickets/{id}", get(handlers::get_ticket))
        .route("/tickets/{id}/cancel", patch(handlers::cancel_ticket))
        // Staff
        .route("/shops/{shop_id}/tickets", get(handlers::shop_tickets))
        .route("/results/issue", post(handlers::issue_result))
        .route("/risks", post(handlers::add_risk))
        .route("/risks/batch", post(handlers::add_risks_batch))
        .route("/risks/clear", delete(handlers::clear_risks))
        .route("/risks/daily/all", get(handlers::list_daily_risks))
        .route("/risks/{id}", get(handlers::list_risks).delete(handlers::remove_risk))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
