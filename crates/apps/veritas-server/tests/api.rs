//! HTTP API tests over MockLedger with mock backends.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use veritas_econ::PriceEstimator;
use veritas_ops::{LanguageModel, Mode, UpstreamError, WebSearch};
use veritas_pay::{PaymentsConfig, UnsignedPayload};
use veritas_server::{router, AppContext, SharedContext};
use veritas_settle::{Ledger, LedgerError, MockLedger, MockOp};
use veritas_test_utils::{
    fast_policy, funded_user, input_for_prompt_units, MockLanguageModel, MockSearch,
};

const ADMIN_TOKEN: &str = "test-admin-token";

struct Api {
    ledger: MockLedger,
    llm: MockLanguageModel,
    search: MockSearch,
    ctx: SharedContext,
    app: Router,
}

impl Api {
    fn new(decimals: u8) -> Self {
        Self::with_backends(decimals, MockLanguageModel::new(), MockSearch::empty())
    }

    fn with_backends(decimals: u8, llm: MockLanguageModel, search: MockSearch) -> Self {
        let ledger = MockLedger::random(decimals);
        let shared: Arc<dyn Ledger> = Arc::new(ledger.clone());
        let model: Arc<dyn LanguageModel> = Arc::new(llm.clone());
        let web: Arc<dyn WebSearch> = Arc::new(search.clone());
        let ctx = Arc::new(
            AppContext::from_parts(
                shared,
                fast_policy(),
                PriceEstimator::default(),
                model,
                Some(web),
                PaymentsConfig::default(),
            )
            .with_admin_token(Some(ADMIN_TOKEN.to_string())),
        );
        let app = router(ctx.clone(), &[]);
        Self {
            ledger,
            llm,
            search,
            ctx,
            app,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        self.send(request).await
    }

    /// Call an operator route with `token` as the bearer token.
    async fn admin(&self, method: &str, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Sign and submit a transaction returned by the API, as a wallet would.
    fn submit(&self, transaction: &Value) {
        let payload: UnsignedPayload = serde_json::from_value(transaction.clone()).unwrap();
        let tx = MockLedger::decode_unsigned(&payload.decode().unwrap()).unwrap();
        self.ledger.submit_signed(&tx).unwrap();
    }
}

/// Input whose truth-mode prompt without search is exactly 500 prompt units.
fn input_for_500_units() -> String {
    input_for_prompt_units(Mode::Truth, "gpt-4", 500)
}

// =============================================================================
// /api/veritas
// =============================================================================

#[tokio::test]
async fn test_query_charges_and_answers() {
    let api = Api::new(0);
    let user = funded_user(&api.ledger, 10_000, 10_000);

    let (status, body) = api
        .post(
            "/api/veritas",
            json!({ "input": input_for_500_units(), "walletAddress": user.to_string() }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["result"], "Mock answer.");
    assert_eq!(body["mode"], "truth");
    let usage = &body["usage"];
    assert_eq!(usage["prompt_tokens"], 500);
    assert_eq!(usage["completion_tokens"], 300);
    assert_eq!(usage["usd_charged"], "0.066000");
    assert_eq!(usage["tokens_charged"], 6_600);
    assert_eq!(usage["veritas_burned"], 66);
    assert_eq!(usage["model"], "gpt-4");
    assert!(usage["charge_id"].is_string());
    assert!(body["transferSignature"].is_string());

    assert_eq!(api.ledger.balance_of(&user), 3_400);
    assert_eq!(api.ledger.balance_of(&api.ledger.fee_collector()), 6_534);
}

#[tokio::test]
async fn test_query_with_search_and_mode() {
    let api = Api::with_backends(
        0,
        MockLanguageModel::replying("Yes [2], and also [1]."),
        MockSearch::numbered(2),
    );
    let user = funded_user(&api.ledger, 100_000, 100_000);

    let (status, body) = api
        .post(
            "/api/veritas",
            json!({
                "input": "Is coffee good for you?",
                "mode": "Steelman",
                "search": true,
                "walletAddress": user.to_string(),
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["mode"], "steelman");
    assert_eq!(body["sources"].as_array().unwrap().len(), 2);
    assert_eq!(body["citations"][0]["marker"], 2);
    assert_eq!(body["citations"][1]["marker"], 1);
    assert_eq!(api.search.queries(), vec!["Is coffee good for you?".to_string()]);
}

#[tokio::test]
async fn test_unknown_mode_falls_back_to_truth() {
    let api = Api::new(0);
    let user = funded_user(&api.ledger, 100_000, 100_000);

    let (status, body) = api
        .post(
            "/api/veritas",
            json!({ "input": "hi", "mode": "oracle", "walletAddress": user.to_string() }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "truth");
    assert!(api.search.queries().is_empty());
}

#[tokio::test]
async fn test_query_without_allowance_is_402() {
    let api = Api::new(0);
    let user = funded_user(&api.ledger, 10_000, 0);

    let (status, body) = api
        .post(
            "/api/veritas",
            json!({ "input": "hello", "walletAddress": user.to_string() }),
        )
        .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "insufficient_allowance");
    assert_eq!(body["error"]["stage"], "charging");
    assert!(body["error"]["hint"].as_str().unwrap().contains("allowance"));
    assert_eq!(api.llm.call_count(), 0);
}

#[tokio::test]
async fn test_generation_failure_is_502_with_charge() {
    let api = Api::with_backends(
        0,
        MockLanguageModel::new().with_failure(UpstreamError::Status {
            status: 500,
            body: "boom".into(),
        }),
        MockSearch::empty(),
    );
    let user = funded_user(&api.ledger, 100_000, 100_000);

    let (status, body) = api
        .post(
            "/api/veritas",
            json!({ "input": "hello", "walletAddress": user.to_string() }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "upstream_generation_failure");
    assert!(body["error"]["charge"]["transferSignature"].is_string());

    let (_, reconcile) = api
        .admin("GET", "/api/charges/reconcile", Some(ADMIN_TOKEN))
        .await;
    assert_eq!(reconcile["records"][0]["status"], "generation_failed");
}

#[tokio::test]
async fn test_invalid_requests_are_400() {
    let api = Api::new(0);

    let (status, body) = api
        .post("/api/veritas", json!({ "input": "hi", "walletAddress": "nope" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_input");

    let (status, _) = api.post("/api/veritas", json!({ "input": "hi" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let user = funded_user(&api.ledger, 10_000, 10_000);
    let (status, body) = api
        .post(
            "/api/veritas",
            json!({ "input": "   ", "walletAddress": user.to_string() }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["stage"], "idle");
    assert_eq!(api.ledger.balance_of(&user), 10_000);
}

#[tokio::test]
async fn test_reused_charge_id_is_409() {
    let api = Api::new(0);
    let user = funded_user(&api.ledger, 100_000, 100_000);
    let request = json!({
        "input": "hello",
        "walletAddress": user.to_string(),
        "chargeId": veritas_types::ChargeId::generate().to_string(),
    });

    let (first, _) = api.post("/api/veritas", request.clone()).await;
    assert_eq!(first, StatusCode::OK);
    let (second, body) = api.post("/api/veritas", request).await;
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "duplicate_charge");
    assert_eq!(api.llm.call_count(), 1);
}

// =============================================================================
// Payment requests and verification
// =============================================================================

#[tokio::test]
async fn test_tx_request_sign_and_verify() {
    let api = Api::new(2);
    let user = funded_user(&api.ledger, 50_000, 0);

    let (status, body) = api
        .post("/api/tx-request", json!({ "walletAddress": user.to_string() }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["amountRaw"], 10_000);
    api.submit(&body["transaction"]);

    let (status, verified) = api
        .post(
            "/api/verify-payment",
            json!({ "walletAddress": user.to_string(), "amount": 100 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["verified"], true);
    assert!(verified["signature"].is_string());

    let (_, again) = api
        .post(
            "/api/verify-payment",
            json!({ "walletAddress": user.to_string(), "amount": "100" }),
        )
        .await;
    assert_eq!(again["verified"], false);
}

#[tokio::test]
async fn test_tx_request_insufficient_funds() {
    let api = Api::new(2);
    let user = funded_user(&api.ledger, 100, 0);

    let (status, body) = api
        .post(
            "/api/tx-request",
            json!({ "walletAddress": user.to_string(), "amount": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "insufficient_funds");
}

#[tokio::test]
async fn test_negative_amount_rejected() {
    let api = Api::new(2);
    let user = funded_user(&api.ledger, 100, 0);

    let (status, _) = api
        .post(
            "/api/tx-request",
            json!({ "walletAddress": user.to_string(), "amount": -1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_allowance_request_then_already_approved() {
    let api = Api::new(0);
    let user = funded_user(&api.ledger, 5_000, 0);

    let (status, body) = api
        .post(
            "/api/allowance-request",
            json!({ "walletAddress": user.to_string(), "amount": 2_000 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    api.submit(&body["transaction"]);
    assert_eq!(api.ledger.allowance_of(&user), 2_000);

    let (_, body) = api
        .post(
            "/api/allowance-request",
            json!({ "walletAddress": user.to_string(), "amount": 1_000 }),
        )
        .await;
    assert_eq!(body["alreadyApproved"], true);
    assert_eq!(body["remaining"], 2_000);
}

// =============================================================================
// Reconciliation and operations
// =============================================================================

#[tokio::test]
async fn test_burn_failure_then_retry() {
    let api = Api::new(0);
    let user = funded_user(&api.ledger, 100_000, 100_000);
    api.ledger
        .inject_failure(MockOp::Burn, LedgerError::transaction_failed("burn rejected"));

    let (status, body) = api
        .post(
            "/api/veritas",
            json!({ "input": input_for_500_units(), "walletAddress": user.to_string() }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "partial_charge_failure");
    assert_eq!(api.llm.call_count(), 0);

    let (_, reconcile) = api
        .admin("GET", "/api/charges/reconcile", Some(ADMIN_TOKEN))
        .await;
    assert_eq!(reconcile["records"][0]["status"], "burn_pending");
    let id = reconcile["records"][0]["chargeId"].as_str().unwrap().to_string();

    let supply = api.ledger.supply();
    let retry_path = format!("/api/charges/{}/retry-burn", id);
    let (status, record) = api.admin("POST", &retry_path, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::OK, "{}", record);
    assert_eq!(record["status"], "completed");
    assert_eq!(supply - api.ledger.supply(), 66);

    let (status, body) = api.admin("POST", &retry_path, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_charge_state");
    assert_eq!(api.ledger.burns(), vec![66]);

    let (_, reconcile) = api
        .admin("GET", "/api/charges/reconcile", Some(ADMIN_TOKEN))
        .await;
    assert!(reconcile["records"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_burn_unknown_charge_is_404() {
    let api = Api::new(0);
    let id = veritas_types::ChargeId::generate();
    let (status, body) = api
        .admin(
            "POST",
            &format!("/api/charges/{}/retry-burn", id),
            Some(ADMIN_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "charge_not_found");
}

#[tokio::test]
async fn test_operator_routes_need_admin_token() {
    let api = Api::new(0);
    let user = funded_user(&api.ledger, 100_000, 100_000);
    api.ledger
        .inject_failure(MockOp::Burn, LedgerError::transaction_failed("burn rejected"));
    api.post(
        "/api/veritas",
        json!({ "input": "Is water wet?", "walletAddress": user.to_string() }),
    )
    .await;
    let id = api.ctx.orchestrator.executor().book().records().await[0].charge_id;
    let retry_path = format!("/api/charges/{}/retry-burn", id);

    let (status, body) = api.admin("GET", "/api/charges/reconcile", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
    assert!(body["records"].is_null());

    let (status, _) = api
        .admin("GET", "/api/charges/reconcile", Some("guess"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let supply = api.ledger.supply();
    let (status, _) = api.admin("POST", &retry_path, Some("guess")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(api.ledger.supply(), supply);

    let (status, _) = api.admin("POST", &retry_path, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_operator_routes_disabled_without_token() {
    let ledger = MockLedger::random(0);
    let shared: Arc<dyn Ledger> = Arc::new(ledger);
    let ctx = Arc::new(AppContext::from_parts(
        shared,
        fast_policy(),
        PriceEstimator::default(),
        Arc::new(MockLanguageModel::new()),
        None,
        PaymentsConfig::default(),
    ));
    let app = router(ctx, &[]);

    let request = Request::builder()
        .uri("/api/charges/reconcile")
        .header("authorization", "Bearer anything")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_operator_routes_send_no_cors_headers() {
    let api = Api::new(0);
    let request = Request::builder()
        .uri("/api/charges/reconcile")
        .header("origin", "https://evil.example")
        .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
        .body(Body::empty())
        .unwrap();
    let response = api.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());

    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://app.example")
        .body(Body::empty())
        .unwrap();
    let response = api.app.clone().oneshot(request).await.unwrap();
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_some());
}

#[tokio::test]
async fn test_health() {
    let api = Api::new(0);
    let (status, body) = api.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mint"], api.ledger.mint().to_string());
}

#[tokio::test]
async fn test_metrics_after_query() {
    let api = Api::new(0);
    let user = funded_user(&api.ledger, 10_000, 10_000);
    api.post(
        "/api/veritas",
        json!({ "input": input_for_500_units(), "walletAddress": user.to_string() }),
    )
    .await;

    let response = api
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("veritas_queries_total{outcome=\"answered\"} 1"));
    assert!(text.contains("veritas_raw_burned_total 66"));
    assert_eq!(api.ctx.metrics.raw_charged_total.get(), 6_600);
}
