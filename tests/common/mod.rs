//! Shared utilities for integration testing: an in-process mock of the Spresso API.
//!
//! Every endpoint honours the `status=<code>` and `delay=<seconds>` debug query
//! parameters the SDK forwards from `additional_parameters`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use spresso_sdk::config::{ClientConfig, ResiliencyConfig};
use spresso_sdk::{MemoryCache, PriceOptimizationClient, TokenProvider};

/// Per-endpoint request counters plus switches tests flip at runtime.
#[derive(Debug, Default)]
pub struct MockState {
    pub token_hits: AtomicUsize,
    pub price_hits: AtomicUsize,
    pub batch_hits: AtomicUsize,
    pub org_config_hits: AtomicUsize,
    pub skus_hits: AtomicUsize,
    pub verify_hits: AtomicUsize,
    pub catalog_hits: AtomicUsize,

    /// Size of the last batch price request.
    pub last_batch_size: AtomicUsize,
    /// `x-real-ip` seen on the last pricing request.
    pub last_real_ip: Mutex<Option<String>>,

    /// Non-zero forces this status on both price endpoints.
    pub forced_price_status: AtomicU16,
    /// Make the org config endpoint answer 500.
    pub fail_org_config: AtomicBool,
    /// Percentage of prices left unoptimized.
    pub unoptimized_percent: AtomicUsize,
}

impl MockState {
    pub fn pricing_hits(&self) -> usize {
        self.price_hits.load(Ordering::SeqCst) + self.batch_hits.load(Ordering::SeqCst)
    }

    pub fn total_hits(&self) -> usize {
        [
            &self.token_hits,
            &self.price_hits,
            &self.batch_hits,
            &self.org_config_hits,
            &self.skus_hits,
            &self.verify_hits,
            &self.catalog_hits,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

pub struct MockApi {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockApi {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

#[derive(Debug, Default, Deserialize)]
struct DebugParams {
    status: Option<u16>,
    delay: Option<u64>,
    mismatch: Option<bool>,
}

impl DebugParams {
    async fn apply(&self) -> Option<Response> {
        if let Some(secs) = self.delay {
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        match self.status {
            Some(code) if code != 200 => {
                let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Some(status.into_response())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceQuery {
    device_id: String,
    item_id: String,
    default_price: f64,
    #[serde(default)]
    override_to_default_price: bool,
    user_id: Option<String>,
}

/// Start the mock on an ephemeral port. Prices are always optimized unless a
/// test raises `unoptimized_percent`.
pub async fn start_mock_api() -> MockApi {
    let state = Arc::new(MockState::default());

    let app = Router::new()
        .route("/identity/v1/public/token", post(token))
        .route("/pim/v1/prices", get(get_price).post(post_prices))
        .route("/pim/v1/prices/verify", post(verify_prices))
        .route("/pim/v1/priceOptimizationOrgConfig", get(org_config))
        .route("/pim/v1/variants", axum::routing::put(update_catalog))
        .route("/pim/v1/variants/optimizedSKUs", get(optimized_skus))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockApi { addr, state }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer mock-token-"))
        .unwrap_or(false)
}

fn record_real_ip(state: &MockState, headers: &HeaderMap) {
    let ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_real_ip.lock().unwrap() = ip;
}

fn price_for(state: &MockState, request: &Value) -> Value {
    let default_price = request["defaultPrice"].as_f64().unwrap_or(0.0);
    let overridden = request["overrideToDefaultPrice"].as_bool().unwrap_or(false);
    let unoptimized = fastrand::usize(0..100) < state.unoptimized_percent.load(Ordering::SeqCst);

    let (price, optimized) = if overridden || unoptimized {
        (default_price, false)
    } else {
        let factor = 0.9 + fastrand::f64() * 0.2;
        ((default_price * factor * 100.0).round() / 100.0, true)
    };

    json!({
        "itemId": request["itemId"],
        "deviceId": request["deviceId"],
        "userId": request.get("userId").cloned().unwrap_or(Value::Null),
        "price": price,
        "isPriceOptimized": optimized,
    })
}

fn forced_failure(state: &MockState) -> Option<Response> {
    match state.forced_price_status.load(Ordering::SeqCst) {
        0 => None,
        code => Some(
            StatusCode::from_u16(code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response(),
        ),
    }
}

async fn token(
    State(state): State<Arc<MockState>>,
    Query(debug): Query<DebugParams>,
    Json(body): Json<Value>,
) -> Response {
    let n = state.token_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(failure) = debug.apply().await {
        return failure;
    }
    if body["grant_type"] != "client_credentials" || body["client_id"].as_str().unwrap_or("").is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    if body["client_secret"] == "wrong" {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({
        "access_token": format!("mock-token-{}", n),
        "expires_in": 3600,
        "token_type": "Bearer",
        "scope": body.get("scope").cloned().unwrap_or(json!("")),
    }))
    .into_response()
}

async fn get_price(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(debug): Query<DebugParams>,
    Query(query): Query<PriceQuery>,
) -> Response {
    state.price_hits.fetch_add(1, Ordering::SeqCst);
    record_real_ip(&state, &headers);
    if let Some(failure) = debug.apply().await {
        return failure;
    }
    if let Some(failure) = forced_failure(&state) {
        return failure;
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let request = json!({
        "itemId": query.item_id,
        "deviceId": query.device_id,
        "userId": query.user_id,
        "defaultPrice": query.default_price,
        "overrideToDefaultPrice": query.override_to_default_price,
    });
    Json(price_for(&state, &request)).into_response()
}

async fn post_prices(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(debug): Query<DebugParams>,
    Json(body): Json<Value>,
) -> Response {
    state.batch_hits.fetch_add(1, Ordering::SeqCst);
    record_real_ip(&state, &headers);
    if let Some(failure) = debug.apply().await {
        return failure;
    }
    if let Some(failure) = forced_failure(&state) {
        return failure;
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let requests = body["requests"].as_array().cloned().unwrap_or_default();
    state.last_batch_size.store(requests.len(), Ordering::SeqCst);

    let mut results: Vec<Value> = requests.iter().map(|r| price_for(&state, r)).collect();
    if debug.mismatch.unwrap_or(false) {
        results.pop();
    }
    Json(results).into_response()
}

async fn org_config(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(debug): Query<DebugParams>,
) -> Response {
    state.org_config_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(failure) = debug.apply().await {
        return failure;
    }
    if state.fail_org_config.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({
        "data": {
            "userAgentBlacklist": [
                {"name": "Google", "regexp": "Googlebot", "status": 0},
                {"name": "Yahoo", "regexp": "Slurp", "status": 1}
            ]
        }
    }))
    .into_response()
}

async fn optimized_skus(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(debug): Query<DebugParams>,
) -> Response {
    state.skus_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(failure) = debug.apply().await {
        return failure;
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let expires_at = chrono::Utc::now().timestamp() + 3600;
    Json(json!({
        "expiresAt": expires_at,
        "skus": ["1111"],
        "skipInactive": true,
    }))
    .into_response()
}

async fn verify_prices(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(debug): Query<DebugParams>,
    Json(body): Json<Value>,
) -> Response {
    state.verify_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(failure) = debug.apply().await {
        return failure;
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let results: Vec<Value> = body["requests"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|r| {
            let price = r["price"].as_f64().unwrap_or(0.0);
            let (status, current) = if price > 0.0 { (1, Value::Null) } else { (0, json!(1.0)) };
            json!({
                "itemId": r["itemId"],
                "deviceId": r.get("deviceId").cloned().unwrap_or(json!("")),
                "price": price,
                "priceStatus": status,
                "currentValidPrice": current,
            })
        })
        .collect();
    Json(results).into_response()
}

async fn update_catalog(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(debug): Query<DebugParams>,
    Json(body): Json<Value>,
) -> Response {
    state.catalog_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(failure) = debug.apply().await {
        return failure;
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let valid = body["requests"]
        .as_array()
        .map(|items| items.iter().all(|i| i["sku"].is_string() && i["name"].is_string()))
        .unwrap_or(false);
    if !valid {
        return StatusCode::BAD_REQUEST.into_response();
    }
    StatusCode::OK.into_response()
}

/// Resiliency settings that keep tests fast: no backoff, short timeouts.
pub fn fast_resiliency() -> ResiliencyConfig {
    ResiliencyConfig {
        max_retries: 0,
        timeout_ms: 2_000,
        http_timeout_ms: 1_000,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..ResiliencyConfig::default()
    }
}

/// Configuration pointing both services at the mock.
pub fn client_config(mock: &MockApi) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.auth.base_url = mock.url();
    config.auth.client_id = "test-client".to_string();
    config.auth.client_secret = "test-secret".to_string();
    config.auth.resiliency = fast_resiliency();
    config.pricing.base_url = mock.url();
    config.pricing.resiliency = fast_resiliency();
    config
}

/// Client with a fresh in-memory cache.
pub fn build_client(config: &ClientConfig) -> (PriceOptimizationClient, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::new());
    let client = PriceOptimizationClient::from_config(config, cache.clone()).unwrap();
    (client, cache)
}

pub fn build_token_provider(config: &ClientConfig, cache: Arc<MemoryCache>) -> TokenProvider {
    TokenProvider::new(&config.auth, cache).unwrap()
}
