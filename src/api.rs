//! REST API types and router for the subscription escrow.
//!
//! The service is stateless: every request carries the escrow state it is
//! about, and the handlers only decode, plan or validate. Chain access and
//! signing stay with the caller.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ProtocolParams;
use crate::sdk::{
    Action, EscrowPhase, EscrowUtxo, InvalidTransition, KeyHash, MalformedDatum, OutRef,
    PlanningError, PlutusData, SpendError, SubscriptionDatum, TxContext, Value,
    planner::{Planner, TransactionPlan, Transfer},
    proration::{Cancellation, cancellation, is_expired, sum_installments},
    validator::Validator,
};

// ─── App State ───────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<Planner>,
    pub validator: Arc<Validator>,
}

impl AppState {
    /// Planner and validator built from the same parameters.
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            planner: Arc::new(Planner::new(params.clone())),
            validator: Arc::new(Validator::new(params)),
        }
    }

    fn params(&self) -> &ProtocolParams {
        self.planner.params()
    }
}

// ─── Request / Response DTOs ─────────────────────────────────

#[derive(Deserialize)]
struct DecodeReq {
    datum: serde_json::Value,
}

#[derive(Deserialize)]
struct StatusReq {
    datum: serde_json::Value,
    now: u64,
}

#[derive(Serialize)]
struct StatusResponse {
    phase: EscrowPhase,
    subscription_end: u64,
    expired: bool,
    installments: usize,
    pending: u64,
    available_actions: Vec<Action>,
    /// Settlement an `Unsubscribe` at `now` would produce.
    #[serde(skip_serializing_if = "Option::is_none")]
    cancellation: Option<Cancellation>,
}

#[derive(Deserialize)]
struct EscrowReq {
    out_ref: OutRef,
    value: Value,
    datum: serde_json::Value,
}

#[derive(Deserialize)]
struct PlanReq {
    escrow: EscrowReq,
    action: Action,
    signer: KeyHash,
    now: u64,
}

#[derive(Serialize)]
struct PlanResponse {
    plan: TransactionPlan,
    legs: Vec<Transfer>,
}

#[derive(Deserialize)]
struct ValidateReq {
    redeemer: serde_json::Value,
    tx: serde_json::Value,
}

#[derive(Serialize)]
struct ValidateResponse {
    accepted: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

// ─── Error helpers ───────────────────────────────────────────

fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: msg.into(),
            kind: None,
        }),
    )
}

fn unprocessable(msg: impl Into<String>, kind: &'static str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: msg.into(),
            kind: Some(kind),
        }),
    )
}

fn malformed(err: MalformedDatum) -> (StatusCode, Json<ErrorResponse>) {
    bad_request(format!("malformed datum: {err}"))
}

fn planning_failed(err: PlanningError) -> (StatusCode, Json<ErrorResponse>) {
    unprocessable(err.to_string(), err.kind())
}

fn rejected(err: InvalidTransition) -> (StatusCode, Json<ErrorResponse>) {
    unprocessable(err.to_string(), err.kind())
}

type ApiResult<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<ErrorResponse>)>;

// ─── Helpers ─────────────────────────────────────────────────

fn decode_datum(raw: &serde_json::Value) -> Result<SubscriptionDatum, (StatusCode, Json<ErrorResponse>)> {
    let data = PlutusData::from_json(raw).map_err(malformed)?;
    SubscriptionDatum::decode(&data).map_err(malformed)
}

// ─── GET /params ─────────────────────────────────────────────

async fn get_params(State(state): State<AppState>) -> ApiResult<ProtocolParams> {
    Ok((StatusCode::OK, Json(state.params().clone())))
}

// ─── POST /datum/decode ──────────────────────────────────────

async fn decode(Json(req): Json<DecodeReq>) -> ApiResult<SubscriptionDatum> {
    let datum = decode_datum(&req.datum)?;
    Ok((StatusCode::OK, Json(datum)))
}

// ─── POST /datum/encode ──────────────────────────────────────

async fn encode(Json(datum): Json<SubscriptionDatum>) -> ApiResult<PlutusData> {
    // Re-decode so that out-of-range values (percentage > 100, a share
    // without a partner) are refused here rather than on chain.
    let raw = datum.encode();
    SubscriptionDatum::decode(&raw).map_err(malformed)?;
    Ok((StatusCode::OK, Json(raw)))
}

// ─── POST /status ────────────────────────────────────────────

async fn status(State(state): State<AppState>, Json(req): Json<StatusReq>) -> ApiResult<StatusResponse> {
    let datum = decode_datum(&req.datum)?;
    let pending = sum_installments(&datum.installments)
        .map_err(|e| unprocessable(e.to_string(), "arithmetic_overflow"))?;
    let expired = is_expired(datum.subscription_end, req.now);
    let cancellation = if expired {
        None
    } else {
        Some(
            cancellation(&datum, req.now, state.params().period_ms)
                .map_err(|e| unprocessable(e.to_string(), "arithmetic_overflow"))?,
        )
    };
    let phase = EscrowPhase::of(&datum, req.now);

    Ok((
        StatusCode::OK,
        Json(StatusResponse {
            phase,
            subscription_end: datum.subscription_end,
            expired,
            installments: datum.installments.len(),
            pending,
            available_actions: phase.available_actions().to_vec(),
            cancellation,
        }),
    ))
}

// ─── POST /plan ──────────────────────────────────────────────

async fn plan(State(state): State<AppState>, Json(req): Json<PlanReq>) -> ApiResult<PlanResponse> {
    let escrow = EscrowUtxo {
        out_ref: req.escrow.out_ref,
        value: req.escrow.value,
        datum: decode_datum(&req.escrow.datum)?,
    };
    let plan = state
        .planner
        .plan(&escrow, req.action, req.signer, req.now)
        .map_err(|e| {
            debug!(action = %req.action, escrow = %escrow.out_ref, reason = %e, "plan refused");
            planning_failed(e)
        })?;
    let legs = plan.legs();
    Ok((StatusCode::OK, Json(PlanResponse { plan, legs })))
}

// ─── POST /validate ──────────────────────────────────────────

async fn validate(State(state): State<AppState>, Json(req): Json<ValidateReq>) -> ApiResult<ValidateResponse> {
    let redeemer = PlutusData::from_json(&req.redeemer)
        .map_err(|e| bad_request(format!("malformed redeemer: {e}")))?;
    let tx: TxContext = serde_json::from_value(req.tx)
        .map_err(|e| bad_request(format!("malformed transaction: {e}")))?;

    match state.validator.validate_spend(&redeemer, &tx) {
        Ok(()) => Ok((StatusCode::OK, Json(ValidateResponse { accepted: true }))),
        Err(SpendError::Malformed(e)) => Err(malformed(e)),
        Err(SpendError::Rejected(e)) => Err(rejected(e)),
    }
}

// ─── Router builder ──────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    info!(script = %state.params().script_hash, "building escrow router");
    Router::new()
        .route("/params", get(get_params))
        .route("/datum/decode", post(decode))
        .route("/datum/encode", post(encode))
        .route("/status", post(status))
        .route("/plan", post(plan))
        .route("/validate", post(validate))
        .with_state(state)
}
