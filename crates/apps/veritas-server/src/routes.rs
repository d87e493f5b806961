//! HTTP routes.
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | POST | `/api/tx-request` | Unsigned transfer to the fee collector |
//! | POST | `/api/allowance-request` | Unsigned delegate approval |
//! | POST | `/api/veritas` | Charge, then answer a query |
//! | POST | `/api/verify-payment` | Look for a user-signed transfer |
//! | GET | `/api/charges/reconcile` | Charges needing operator attention (admin) |
//! | POST | `/api/charges/:id/retry-burn` | Retry an outstanding burn (admin) |
//! | GET | `/health` | Liveness |
//! | GET | `/metrics` | Prometheus text format |
//!
//! Admin routes need `Authorization: Bearer <server.admin_token>` and are
//! served without CORS headers. With no token configured they answer 403.
//!
//! Every failure is a non-2xx response with a body of the form
//! `{"error": {"code", "message", "hint", "charge"?, "stage"?}}`.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use veritas_ops::{Mode, OpsError, QueryFailure, QueryOutcome, QueryRequest};
use veritas_pay::{AllowanceOutcome, ChargeReceipt, PayError, Verification};
use veritas_types::{parse_ui_amount, to_raw, Address, ChargeId, RawAmount};

use crate::context::SharedContext;

// =============================================================================
// Errors
// =============================================================================

/// A failed request, rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    hint: String,
    charge: Option<ChargeReceipt>,
    stage: Option<String>,
}

impl ApiError {
    fn new(status: u16, code: &'static str, message: String, hint: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code,
            message,
            hint: hint.to_string(),
            charge: None,
            stage: None,
        }
    }

    fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(
            400,
            "invalid_input",
            message.into(),
            "Check the request fields and try again",
        )
    }
}

impl From<PayError> for ApiError {
    fn from(e: PayError) -> Self {
        Self::new(e.http_status(), e.reason_code(), e.to_string(), e.suggestion())
    }
}

impl From<OpsError> for ApiError {
    fn from(e: OpsError) -> Self {
        let mut err = Self::new(e.http_status(), e.reason_code(), e.to_string(), e.suggestion());
        err.charge = e.charge().cloned();
        err
    }
}

impl From<QueryFailure> for ApiError {
    fn from(failure: QueryFailure) -> Self {
        let mut err = ApiError::from(failure.error);
        err.stage = Some(failure.stage.to_string());
        err
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_input(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(code = self.code, message = %self.message, "Request failed");
        } else {
            debug!(code = self.code, message = %self.message, "Request rejected");
        }
        let mut body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "hint": self.hint,
            }
        });
        if let Some(charge) = &self.charge {
            body["error"]["charge"] = json!(charge);
        }
        if let Some(stage) = &self.stage {
            body["error"]["stage"] = json!(stage);
        }
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// Request bodies
// =============================================================================

/// A token amount as sent by clients: a JSON number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenAmount {
    Number(f64),
    Text(String),
}

impl TokenAmount {
    fn to_raw(&self, decimals: u8) -> Result<RawAmount, ApiError> {
        let raw = match self {
            TokenAmount::Number(n) => to_raw(*n, decimals),
            TokenAmount::Text(s) => parse_ui_amount(s, decimals),
        };
        raw.map_err(|e| ApiError::invalid_input(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletAmountBody {
    wallet_address: String,
    amount: Option<TokenAmount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody {
    wallet_address: String,
    amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    input: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    search: bool,
    wallet_address: String,
    #[serde(default)]
    charge_id: Option<String>,
}

fn parse_wallet(s: &str) -> Result<Address, ApiError> {
    Address::parse(s.trim())
        .map_err(|e| ApiError::invalid_input(format!("invalid walletAddress: {}", e)))
}

/// Resolve an optional client amount against a default in whole tokens.
async fn requested_raw(
    ctx: &SharedContext,
    amount: Option<&TokenAmount>,
    default_tokens: f64,
) -> Result<RawAmount, ApiError> {
    let decimals = ctx.requester.decimals().await?;
    match amount {
        Some(amount) => amount.to_raw(decimals),
        None => TokenAmount::Number(default_tokens).to_raw(decimals),
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionResponse {
    transaction: String,
    amount_raw: RawAmount,
}

#[derive(Debug, Serialize)]
struct UsageResponse {
    model: String,
    prompt_tokens: u64,
    completion_tokens: u64,
    usd_charged: String,
    tokens_charged: u64,
    raw_amount: RawAmount,
    veritas_burned: RawAmount,
    decimals: u8,
    charge_id: ChargeId,
}

fn query_response(outcome: QueryOutcome) -> Value {
    let usage = UsageResponse {
        model: outcome.usage.model,
        prompt_tokens: outcome.usage.prompt_units,
        completion_tokens: outcome.usage.completion_units,
        usd_charged: outcome.usage.usd_charged,
        tokens_charged: outcome.usage.tokens_charged,
        raw_amount: outcome.usage.raw_amount,
        veritas_burned: outcome.usage.burned_raw,
        decimals: outcome.usage.decimals,
        charge_id: outcome.usage.charge_id,
    };
    json!({
        "result": outcome.result,
        "mode": outcome.mode,
        "sources": outcome.sources,
        "citations": outcome.citations,
        "usage": usage,
        "transferSignature": outcome.receipt.transfer_signature,
        "burnSignature": outcome.receipt.burn_signature,
    })
}

// =============================================================================
// Handlers
// =============================================================================

async fn tx_request(
    State(ctx): State<SharedContext>,
    body: Result<Json<WalletAmountBody>, JsonRejection>,
) -> ApiResult<TransactionResponse> {
    let Json(body) = body?;
    let user = parse_wallet(&body.wallet_address)?;
    let raw = requested_raw(&ctx, body.amount.as_ref(), ctx.payments.default_request_tokens).await?;

    let payload = ctx.requester.build_charge_transaction(&user, raw).await?;
    ctx.metrics
        .payment_requests_total
        .with_label_values(&["charge"])
        .inc();
    Ok(Json(TransactionResponse {
        transaction: payload.as_str().to_string(),
        amount_raw: raw,
    }))
}

async fn allowance_request(
    State(ctx): State<SharedContext>,
    body: Result<Json<WalletAmountBody>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    let user = parse_wallet(&body.wallet_address)?;
    let raw = requested_raw(
        &ctx,
        body.amount.as_ref(),
        ctx.payments.default_allowance_tokens,
    )
    .await?;

    let response = match ctx.requester.build_allowance_transaction(&user, raw).await? {
        AllowanceOutcome::AlreadyApproved { remaining } => json!({
            "alreadyApproved": true,
            "remaining": remaining,
        }),
        AllowanceOutcome::Transaction(payload) => {
            ctx.metrics
                .payment_requests_total
                .with_label_values(&["allowance"])
                .inc();
            json!({ "transaction": payload, "amountRaw": raw })
        }
    };
    Ok(Json(response))
}

async fn veritas(
    State(ctx): State<SharedContext>,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    let payer = parse_wallet(&body.wallet_address)?;
    let mut request = QueryRequest::new(body.input, payer)
        .with_mode(body.mode.as_deref().map(Mode::parse_lenient).unwrap_or_default())
        .with_search(body.search && ctx.search_enabled);
    if let Some(id) = body.charge_id.as_deref() {
        let id = ChargeId::parse(id)
            .map_err(|e| ApiError::invalid_input(format!("invalid chargeId: {}", e)))?;
        request = request.with_charge_id(id);
    }

    let started = Instant::now();
    let result = ctx.orchestrator.run(request).await;
    ctx.metrics.record_query(&result, started.elapsed());
    Ok(Json(query_response(result?)))
}

async fn verify_payment(
    State(ctx): State<SharedContext>,
    body: Result<Json<VerifyBody>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    let user = parse_wallet(&body.wallet_address)?;
    let decimals = ctx.requester.decimals().await?;
    let expected = body.amount.to_raw(decimals)?;

    let verification = match ctx.verifier.verify_payment(&user, expected).await {
        Ok(v) => v,
        Err(e) => {
            ctx.metrics
                .verifications_total
                .with_label_values(&["error"])
                .inc();
            return Err(e.into());
        }
    };
    let response = match verification {
        Verification::Verified { signature, amount } => {
            ctx.metrics
                .verifications_total
                .with_label_values(&["verified"])
                .inc();
            json!({ "verified": true, "signature": signature, "amountRaw": amount })
        }
        Verification::NotFound => {
            ctx.metrics
                .verifications_total
                .with_label_values(&["not_found"])
                .inc();
            json!({ "verified": false })
        }
    };
    Ok(Json(response))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Gate operator routes on the configured admin token.
async fn require_admin(
    State(ctx): State<SharedContext>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = ctx.admin_token.as_deref() else {
        return ApiError::new(
            403,
            "admin_disabled",
            "operator routes are disabled".to_string(),
            "Set server.admin_token to enable them",
        )
        .into_response();
    };
    if bearer_token(request.headers()) != Some(expected) {
        return ApiError::new(
            401,
            "unauthorized",
            "missing or invalid admin token".to_string(),
            "Send Authorization: Bearer <admin token>",
        )
        .into_response();
    }
    next.run(request).await
}

async fn reconcile(State(ctx): State<SharedContext>) -> ApiResult<Value> {
    let book = ctx.orchestrator.executor().book();
    let records = book.needs_reconciliation().await;
    let summary = book.summary().await;
    Ok(Json(json!({ "summary": summary, "records": records })))
}

async fn retry_burn(
    State(ctx): State<SharedContext>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let charge_id =
        ChargeId::parse(&id).map_err(|e| ApiError::invalid_input(format!("invalid charge id: {}", e)))?;
    let record = ctx.orchestrator.executor().retry_burn(&charge_id).await?;
    ctx.metrics.raw_burned_total.inc_by(record.split.burned);
    ctx.metrics.charges_total.with_label_values(&["completed"]).inc();
    Ok(Json(json!(record)))
}

async fn health(State(ctx): State<SharedContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": ctx.uptime_secs(),
        "mint": ctx.ledger.mint(),
        "feeCollector": ctx.ledger.fee_collector(),
    }))
}

async fn metrics(State(ctx): State<SharedContext>) -> impl IntoResponse {
    ctx.metrics.uptime_seconds.set(ctx.uptime_secs() as i64);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        ctx.metrics.encode(),
    )
}

// =============================================================================
// Router
// =============================================================================

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

/// Build the application router.
pub fn router(ctx: SharedContext, cors_origins: &[String]) -> Router {
    let admin = Router::new()
        .route("/api/charges/reconcile", get(reconcile))
        .route("/api/charges/:id/retry-burn", post(retry_burn))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), require_admin));

    Router::new()
        .route("/api/tx-request", post(tx_request))
        .route("/api/allowance-request", post(allowance_request))
        .route("/api/veritas", post(veritas))
        .route("/api/verify-payment", post(verify_payment))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(cors_layer(cors_origins))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
