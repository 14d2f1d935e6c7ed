//! Route handlers. Each one resolves the actor, calls the engine and wraps
//! the outcome in JSON; errors render through `LottoError::into_response`.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::{AppState, VERSION};
use crate::engine::{BatchRisk, IssueResult, NewRisk, SubmitTicket, TicketFilter};
use crate::error::LottoError;
use crate::models::Actor;

type ApiResult = Result<Json<serde_json::Value>, LottoError>;

// ============================================================================
// HEALTH & STATUS
// ============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.engine.now();
    Json(json!({
        "status": "healthy",
        "version": VERSION,
        "time": now,
        "operating_day": state.engine.scheduler().default_local_day(now),
    }))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "caches": state.engine.cache_stats() }))
}

// ============================================================================
// LOTTERIES & RESULTS
// ============================================================================

/// GET /lotteries
pub async fn list_lotteries(State(state): State<AppState>, actor: Actor) -> ApiResult {
    let lotteries = state.engine.list_lotteries(&actor)?;
    Ok(Json(json!({ "count": lotteries.len(), "lotteries": lotteries.as_slice() })))
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    pub lottery_id: Option<String>,
    pub limit: Option<usize>,
}

/// GET /results
pub async fn result_history(State(state): State<AppState>, Query(q): Query<ResultQuery>) -> ApiResult {
    let results = state.engine.result_history(q.lottery_id.as_deref(), q.limit)?;
    Ok(Json(json!({ "count": results.len(), "results": results })))
}

/// POST /results/issue
pub async fn issue_result(State(state): State<AppState>, actor: Actor, Json(req): Json<IssueResult>) -> ApiResult {
    let summary = state.engine.issue_result(&actor, req)?;
    Ok(Json(json!({ "success": true, "settlement": summary })))
}

// ============================================================================
// TICKETS
// ============================================================================

/// GET /balance
pub async fn balance(State(state): State<AppState>, actor: Actor) -> ApiResult {
    let balance = state.engine.balance_of(&actor.user_id)?;
    Ok(Json(json!({ "user_id": actor.user_id, "credit_balance": balance })))
}

/// POST /tickets
pub async fn submit_ticket(State(state): State<AppState>, actor: Actor, Json(req): Json<SubmitTicket>) -> ApiResult {
    let ticket = state.engine.submit_ticket(&actor, req)?;
    let balance = state.engine.balance_of(&actor.user_id)?;
    Ok(Json(json!({ "success": true, "ticket": ticket, "credit_balance": balance })))
}

/// PATCH /tickets/{id}/cancel
pub async fn cancel_ticket(State(state): State<AppState>, actor: Actor, Path(id): Path<String>) -> ApiResult {
    let receipt = state.engine.cancel_ticket(&actor, &id)?;
    Ok(Json(json!({ "success": true, "cancellation": receipt })))
}

/// GET /tickets/{id}
pub async fn get_ticket(State(state): State<AppState>, actor: Actor, Path(id): Path<String>) -> ApiResult {
    let ticket = state.engine.ticket(&actor, &id)?;
    Ok(Json(json!({ "ticket": ticket })))
}

/// GET /tickets/history
pub async fn ticket_history(State(state): State<AppState>, actor: Actor, Query(filter): Query<TicketFilter>) -> ApiResult {
    let tickets = state.engine.ticket_history(&actor, &filter)?;
    Ok(Json(json!({ "count": tickets.len(), "tickets": tickets })))
}

/// GET /shops/{shop_id}/tickets
pub async fn shop_tickets(
    State(state): State<AppState>,
    actor: Actor,
    Path(shop_id): Path<String>,
    Query(filter): Query<TicketFilter>,
) -> ApiResult {
    let tickets = state.engine.shop_tickets(&actor, &shop_id, &filter)?;
    Ok(Json(json!({ "shop_id": shop_id, "count": tickets.len(), "tickets": tickets })))
}

// ============================================================================
// RISK
// ============================================================================

/// POST /risks
pub async fn add_risk(State(state): State<AppState>, actor: Actor, Json(req): Json<NewRisk>) -> ApiResult {
    let risk = state.engine.add_risk(&actor, req)?;
    Ok(Json(json!({ "success": true, "risk": risk })))
}

/// POST /risks/batch
pub async fn add_risks_batch(State(state): State<AppState>, actor: Actor, Json(req): Json<BatchRisk>) -> ApiResult {
    let risks = state.engine.add_risks_batch(&actor, req)?;
    Ok(Json(json!({ "success": true, "count": risks.len(), "risks": risks })))
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub lottery_id: String,
    pub date: Option<NaiveDate>,
}

/// GET /risks/{lottery_id}
pub async fn list_risks(
    State(state): State<AppState>,
    actor: Actor,
    Path(lottery_id): Path<String>,
    Query(q): Query<DayQuery>,
) -> ApiResult {
    let risks = state.engine.list_risks(&actor, &lottery_id, q.date)?;
    Ok(Json(json!({ "lottery_id": lottery_id, "count": risks.len(), "risks": risks })))
}

/// GET /risks/daily/all?date=..
pub async fn list_daily_risks(State(state): State<AppState>, actor: Actor, Query(q): Query<DayQuery>) -> ApiResult {
    let daily = state.engine.list_daily_risks(&actor, q.date)?;
    let count: usize = daily.values().map(Vec::len).sum();
    Ok(Json(json!({ "date": q.date, "count": count, "lotteries": daily })))
}

/// DELETE /risks/{id}
pub async fn remove_risk(State(state): State<AppState>, actor: Actor, Path(id): Path<String>) -> ApiResult {
    let risk = state.engine.remove_risk(&actor, &id)?;
    Ok(Json(json!({ "success": true, "removed": risk })))
}

/// DELETE /risks/clear?lottery_id=..&date=..
pub async fn clear_risks(State(state): State<AppState>, actor: Actor, Query(q): Query<ClearQuery>) -> ApiResult {
    let removed = state.engine.clear_risks(&actor, &q.lottery_id, q.date)?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}
