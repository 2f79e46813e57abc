//! Price optimization client.
//!
//! # Responsibilities
//! - Resolve single and batch price lookups against the pricing service
//! - Serve per-item cache hits and send only misses to the service, in order
//! - Short-circuit user-agent overrides and inactive SKUs to default prices
//! - Degrade every failure to default, unoptimized prices with a typed error
//!
//! # Design Decisions
//! - One executor (and circuit breaker) per remote operation kind
//! - Requests with `override_to_default_price` bypass the price cache in both directions
//! - A failed batch call defaults every item, including items already served from cache

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{AccessToken, TokenProvider};
use crate::cache::{Expiry, ResponseCache};
use crate::config::{ClientConfig, OverrideFetchPolicy, PricingConfig};
use crate::http::{ApiClient, ApiRequest, ClientBuildError, RequestMetadata};
use crate::observability::metrics;
use crate::pricing::overrides::{OverrideMemo, UserAgentOverrides, ORG_CONFIG_PATH, USER_AGENT_CACHE_KEY};
use crate::pricing::skus::{OptimizedSkus, OPTIMIZED_SKUS_CACHE_KEY, OPTIMIZED_SKUS_PATH};
use crate::pricing::types::{
    fallback_batch, PriceOptimizationResult, PriceOutcome, PriceRequest, SpressoError, MAX_REQUEST_SIZE,
};
use crate::resilience::{CircuitState, ResilientExecutor, Resolved};

/// Single and batch price endpoint.
pub const PRICES_PATH: &str = "/pim/v1/prices";

#[derive(serde::Serialize)]
pub(crate) struct BatchBody<'a, T> {
    pub requests: &'a [T],
}

/// Circuit breaker state per remote operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub token: CircuitState,
    pub price: CircuitState,
    pub batch_price: CircuitState,
    pub user_agent_overrides: CircuitState,
    pub optimized_skus: CircuitState,
    pub verify_prices: CircuitState,
    pub update_catalog: CircuitState,
}

pub(crate) struct Executors {
    pub price: ResilientExecutor<SpressoError>,
    pub batch_price: ResilientExecutor<SpressoError>,
    pub overrides: ResilientExecutor<SpressoError>,
    pub skus: ResilientExecutor<SpressoError>,
    pub verify: ResilientExecutor<SpressoError>,
    pub catalog: ResilientExecutor<SpressoError>,
}

impl Executors {
    fn from_config(config: &PricingConfig) -> Self {
        let resiliency = &config.resiliency;
        Self {
            price: ResilientExecutor::from_config("get_price", resiliency),
            batch_price: ResilientExecutor::from_config("get_prices", resiliency),
            overrides: ResilientExecutor::from_config("user_agent_overrides", resiliency),
            skus: ResilientExecutor::from_config("optimized_skus", resiliency),
            verify: ResilientExecutor::from_config("verify_prices", resiliency),
            catalog: ResilientExecutor::from_config("update_catalog", resiliency),
        }
    }
}

pub(crate) struct ClientInner {
    pub api: ApiClient,
    pub tokens: Arc<TokenProvider>,
    pub cache: Arc<dyn ResponseCache>,
    pub config: PricingConfig,
    pub executors: Executors,
    overrides: OverrideMemo,
    sku_refresh_in_flight: AtomicBool,
}

/// Resilient client for the pricing service. Cheap to clone; clones share caches,
/// tokens and circuit breakers.
#[derive(Clone)]
pub struct PriceOptimizationClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for PriceOptimizationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceOptimizationClient")
            .field("base_url", &self.inner.api.base_url())
            .field("circuits", &self.circuit_states())
            .finish()
    }
}

impl PriceOptimizationClient {
    pub fn new(
        config: PricingConfig,
        tokens: Arc<TokenProvider>,
        cache: Arc<dyn ResponseCache>,
    ) -> Result<Self, ClientBuildError> {
        let api = ApiClient::new(
            &config.base_url,
            &config.additional_parameters,
            config.resiliency.http_timeout(),
        )?;

        let inner = ClientInner {
            api,
            tokens,
            cache,
            executors: Executors::from_config(&config),
            config,
            overrides: OverrideMemo::default(),
            sku_refresh_in_flight: AtomicBool::new(false),
        };

        Ok(Self { inner: Arc::new(inner) })
    }

    /// Build the token provider and the client from one configuration, sharing `cache`.
    pub fn from_config(config: &ClientConfig, cache: Arc<dyn ResponseCache>) -> Result<Self, ClientBuildError> {
        let tokens = Arc::new(TokenProvider::new(&config.auth, Arc::clone(&cache))?);
        Self::new(config.pricing.clone(), tokens, cache)
    }

    pub fn token_provider(&self) -> &Arc<TokenProvider> {
        &self.inner.tokens
    }

    pub fn circuit_states(&self) -> CircuitSnapshot {
        let executors = &self.inner.executors;
        CircuitSnapshot {
            token: self.inner.tokens.circuit_state(),
            price: executors.price.circuit_state(),
            batch_price: executors.batch_price.circuit_state(),
            user_agent_overrides: executors.overrides.circuit_state(),
            optimized_skus: executors.skus.circuit_state(),
            verify_prices: executors.verify.circuit_state(),
            update_catalog: executors.catalog.circuit_state(),
        }
    }

    /// Price for one item.
    ///
    /// The request's `user_agent`, when set, is checked against the override list.
    pub async fn get_price(
        &self,
        request: &PriceRequest,
        metadata: Option<&RequestMetadata>,
        cancel: &CancellationToken,
    ) -> PriceOutcome<PriceOptimizationResult> {
        let executor = &self.inner.executors.price;
        let fallback = |_: &SpressoError| PriceOptimizationResult::fallback(request);

        if self.skip_inactive_skus(std::slice::from_ref(request)).await {
            return Ok(Resolved::ok(PriceOptimizationResult::fallback(request)));
        }

        if let Some(user_agent) = request.user_agent.as_deref() {
            if self.user_agent_overridden(user_agent, cancel).await {
                return Ok(Resolved::ok(PriceOptimizationResult::fallback(request)));
            }
        }

        let outcome = match self.cached_price(request).await {
            Ok(Some(hit)) => Ok(hit),
            Ok(None) => {
                let fetched = executor
                    .execute(cancel, || self.fetch_price(request, metadata, cancel))
                    .await;
                if let Ok(result) = &fetched {
                    self.store_price(request, result).await;
                }
                fetched
            }
            Err(e) => Err(e),
        };

        executor.recover(outcome, fallback)
    }

    /// Prices for a batch, in request order.
    ///
    /// Cache hits are served locally and only misses are sent to the service. If that
    /// call fails, every item falls back to its default price, including cache hits.
    pub async fn get_prices(
        &self,
        requests: &[PriceRequest],
        user_agent: Option<&str>,
        metadata: Option<&RequestMetadata>,
        cancel: &CancellationToken,
    ) -> PriceOutcome<Vec<PriceOptimizationResult>> {
        let executor = &self.inner.executors.batch_price;
        let fallback = |_: &SpressoError| fallback_batch(requests);

        if requests.len() > MAX_REQUEST_SIZE {
            tracing::error!(
                size = requests.len(),
                max = MAX_REQUEST_SIZE,
                "Batch exceeds maximum request size"
            );
            return executor.recover(Err(SpressoError::BadRequest), fallback);
        }
        if requests.is_empty() {
            return Ok(Resolved::ok(Vec::new()));
        }

        if self.skip_inactive_skus(requests).await {
            return Ok(Resolved::ok(fallback_batch(requests)));
        }

        if let Some(user_agent) = user_agent {
            if self.user_agent_overridden(user_agent, cancel).await {
                return Ok(Resolved::ok(fallback_batch(requests)));
            }
        }

        let outcome = match self.cached_prices(requests).await {
            Ok((slots, misses)) if misses.is_empty() => Ok(slots.into_iter().flatten().collect()),
            Ok((slots, misses)) => {
                let pending_requests: Vec<PriceRequest> = misses.iter().map(|&i| requests[i].clone()).collect();
                let pending = pending_requests.as_slice();
                let fetched = executor
                    .execute(cancel, || self.fetch_prices(pending, metadata, cancel))
                    .await;
                match fetched {
                    Ok(results) => Ok(self.merge(requests, slots, &misses, results).await),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        executor.recover(outcome, fallback)
    }

    /// Active user-agent overrides, cache-first.
    pub async fn get_user_agent_overrides(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<UserAgentOverrides>, SpressoError> {
        let inner = &self.inner;
        let cached = inner.cache.get(USER_AGENT_CACHE_KEY).await.map_err(|e| {
            tracing::error!(key = USER_AGENT_CACHE_KEY, error = %e, "User-agent cache read failed");
            SpressoError::Unknown
        })?;

        if let Some(payload) = cached {
            tracing::debug!(key = USER_AGENT_CACHE_KEY, "User-agent cache hit");
            metrics::record_cache_lookup("user_agent_overrides", true);
            return inner.overrides.compile(&payload);
        }
        metrics::record_cache_lookup("user_agent_overrides", false);

        let payload = inner
            .executors
            .overrides
            .execute(cancel, || async move {
                let token = self.token(cancel).await?;
                let request = ApiRequest::get("user_agent_overrides", ORG_CONFIG_PATH).bearer(token.value);
                Ok::<_, SpressoError>(inner.api.send_raw(request).await?)
            })
            .await?;

        let overrides = inner.overrides.compile(&payload)?;
        let ttl = std::time::Duration::from_secs(inner.config.user_agent_cache_ttl_secs);
        if let Err(e) = inner.cache.set(USER_AGENT_CACHE_KEY, payload, Expiry::Relative(ttl)).await {
            tracing::warn!(key = USER_AGENT_CACHE_KEY, error = %e, "User-agent cache write failed");
        }
        Ok(overrides)
    }

    async fn user_agent_overridden(&self, user_agent: &str, cancel: &CancellationToken) -> bool {
        let overridden = match self.get_user_agent_overrides(cancel).await {
            Ok(overrides) => match overrides.matching_rule(user_agent) {
                Some(rule) => {
                    tracing::debug!(user_agent, rule, "User-agent override matched");
                    true
                }
                None => false,
            },
            Err(e) => {
                let fail_closed = self.inner.config.override_fetch_policy == OverrideFetchPolicy::FailClosed;
                tracing::warn!(
                    error = %e,
                    fail_closed,
                    "Failed to get user-agent overrides"
                );
                fail_closed
            }
        };
        if overridden {
            metrics::record_user_agent_override();
        }
        overridden
    }

    async fn skip_inactive_skus(&self, requests: &[PriceRequest]) -> bool {
        if !self.inner.config.skip_inactive_skus {
            return false;
        }

        match self.cached_optimized_skus().await {
            Some(skus) => {
                let skip = skus.should_skip(requests);
                if skip {
                    tracing::debug!(items = requests.len(), "No optimized SKU in request, short-circuiting");
                }
                skip
            }
            None => {
                self.spawn_sku_refresh();
                false
            }
        }
    }

    async fn cached_optimized_skus(&self) -> Option<OptimizedSkus> {
        let cached = match self.inner.cache.get(OPTIMIZED_SKUS_CACHE_KEY).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(key = OPTIMIZED_SKUS_CACHE_KEY, error = %e, "Optimized SKU cache read failed");
                return None;
            }
        };
        metrics::record_cache_lookup("optimized_skus", cached.is_some());
        cached.and_then(|payload| serde_json::from_str(&payload).ok())
    }

    fn spawn_sku_refresh(&self) {
        if self.inner.sku_refresh_in_flight.swap(true, Ordering::AcqRel) {
            return;
        }
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.refresh_optimized_skus(&CancellationToken::new()).await {
                tracing::warn!(error = %e, "Optimized SKU refresh failed");
            }
            client.inner.sku_refresh_in_flight.store(false, Ordering::Release);
        });
    }

    /// Fetch the optimized SKU list and cache it until it expires.
    pub async fn refresh_optimized_skus(&self, cancel: &CancellationToken) -> Result<OptimizedSkus, SpressoError> {
        let inner = &self.inner;
        let payload = inner
            .executors
            .skus
            .execute(cancel, || async move {
                let token = self.token(cancel).await?;
                let request = ApiRequest::get("optimized_skus", OPTIMIZED_SKUS_PATH).bearer(token.value);
                Ok::<_, SpressoError>(inner.api.send_raw(request).await?)
            })
            .await?;

        let skus: OptimizedSkus = serde_json::from_str(&payload).map_err(|e| {
            tracing::error!(error = %e, "Unreadable optimized SKU payload");
            SpressoError::Unknown
        })?;

        match skus.expires_at() {
            Some(at) => {
                if let Err(e) = inner.cache.set(OPTIMIZED_SKUS_CACHE_KEY, payload, Expiry::Absolute(at)).await {
                    tracing::warn!(key = OPTIMIZED_SKUS_CACHE_KEY, error = %e, "Optimized SKU cache write failed");
                }
            }
            None => tracing::warn!(expires_at = skus.expires_at, "Optimized SKU list has no usable expiry"),
        }
        tracing::debug!(skus = skus.skus.len(), skip_inactive = skus.skip_inactive, "Refreshed optimized SKUs");
        Ok(skus)
    }

    pub(crate) async fn token(&self, cancel: &CancellationToken) -> Result<AccessToken, SpressoError> {
        self.inner.tokens.get_token(cancel).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to get token");
            SpressoError::from(e)
        })
    }

    fn cache_key(&self, request: &PriceRequest) -> String {
        format!(
            "{}.{}.{}",
            self.inner.config.cache_namespace, request.device_id, request.item_id
        )
    }

    fn caches(&self, request: &PriceRequest) -> bool {
        self.inner.config.cache_ttl().is_some() && !request.override_to_default_price
    }

    async fn cached_price(&self, request: &PriceRequest) -> Result<Option<PriceOptimizationResult>, SpressoError> {
        if !self.caches(request) {
            return Ok(None);
        }

        let key = self.cache_key(request);
        let cached = self.inner.cache.get(&key).await.map_err(|e| {
            tracing::error!(key = %key, error = %e, "Price cache read failed");
            SpressoError::Unknown
        })?;

        let hit = cached.and_then(|payload| match serde_json::from_str::<PriceOptimizationResult>(&payload) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding unreadable cached price");
                None
            }
        });

        tracing::debug!(key = %key, hit = hit.is_some(), "Price cache lookup");
        metrics::record_cache_lookup("price", hit.is_some());
        Ok(hit)
    }

    /// Cache hits placed at their request index, plus the indices still to fetch.
    async fn cached_prices(
        &self,
        requests: &[PriceRequest],
    ) -> Result<(Vec<Option<PriceOptimizationResult>>, Vec<usize>), SpressoError> {
        let mut slots = Vec::with_capacity(requests.len());
        let mut misses = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            let hit = self.cached_price(request).await?;
            if hit.is_none() {
                misses.push(index);
            }
            slots.push(hit);
        }
        Ok((slots, misses))
    }

    async fn store_price(&self, request: &PriceRequest, result: &PriceOptimizationResult) {
        let Some(ttl) = self.inner.config.cache_ttl() else {
            return;
        };
        if request.override_to_default_price {
            return;
        }

        let key = self.cache_key(request);
        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Price could not be serialized for caching");
                return;
            }
        };
        if let Err(e) = self.inner.cache.set(&key, payload, Expiry::Relative(ttl)).await {
            tracing::warn!(key = %key, error = %e, "Price cache write failed");
        }
    }

    async fn merge(
        &self,
        requests: &[PriceRequest],
        mut slots: Vec<Option<PriceOptimizationResult>>,
        misses: &[usize],
        fetched: Vec<PriceOptimizationResult>,
    ) -> Vec<PriceOptimizationResult> {
        for (&index, result) in misses.iter().zip(fetched) {
            self.store_price(&requests[index], &result).await;
            slots[index] = Some(result);
        }
        slots
            .into_iter()
            .zip(requests)
            .map(|(slot, request)| slot.unwrap_or_else(|| PriceOptimizationResult::fallback(request)))
            .collect()
    }

    async fn fetch_price(
        &self,
        request: &PriceRequest,
        metadata: Option<&RequestMetadata>,
        cancel: &CancellationToken,
    ) -> Result<PriceOptimizationResult, SpressoError> {
        let token = self.token(cancel).await?;

        let mut api_request = ApiRequest::get("get_price", PRICES_PATH)
            .query("deviceId", &request.device_id)
            .query("itemId", &request.item_id)
            .query("defaultPrice", request.default_price)
            .query("overrideToDefaultPrice", request.override_to_default_price);
        if let Some(user_id) = request.user_id.as_deref().filter(|u| !u.is_empty()) {
            api_request = api_request.query("userId", user_id);
        }
        let api_request = api_request.bearer(token.value).metadata(metadata);

        tracing::debug!(device_id = %request.device_id, item_id = %request.item_id, "Querying price");
        Ok(self.inner.api.send(api_request).await?)
    }

    async fn fetch_prices(
        &self,
        pending: &[PriceRequest],
        metadata: Option<&RequestMetadata>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PriceOptimizationResult>, SpressoError> {
        let token = self.token(cancel).await?;

        let api_request = ApiRequest::post("get_prices", PRICES_PATH, &BatchBody { requests: pending })?
            .bearer(token.value)
            .metadata(metadata);

        tracing::debug!(items = pending.len(), "Querying batch prices");
        let results: Vec<PriceOptimizationResult> = self.inner.api.send(api_request).await?;
        if results.len() != pending.len() {
            tracing::error!(
                expected = pending.len(),
                received = results.len(),
                "Batch price response does not match request size"
            );
            return Err(SpressoError::Unknown);
        }
        Ok(results)
    }
}
