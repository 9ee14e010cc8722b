use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use tracing::debug;

use crate::cache::PriceCache;
use crate::metrics::{MarketMetrics, MetricsSnapshot};
use crate::models::*;
use crate::service::Market;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<PriceCache>,
    pub metrics: Arc<MarketMetrics>,
}

impl AppState {
    pub fn new(market: &Market) -> Self {
        Self { cache: market.cache().clone(), metrics: market.metrics().clone() }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/market", get(get_market))
        .route("/market/sale", post(handle_sale))
        .route("/market/purchase", post(handle_purchase))
        .route("/market/{item_id}", get(get_multiplier))
        .route("/market/{item_id}/projection", get(get_projection))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

// --- 1. 查询接口 ---

pub async fn get_multiplier(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Json<MultiplierResponse> {
    let multiplier = state.cache.current_multiplier(&item_id);
    Json(MultiplierResponse { item_id, multiplier })
}

pub async fn get_projection(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Query(q): Query<ProjectionQuery>,
) -> Json<ProjectionResponse> {
    // 只读一次条目，current 与 projected 来自同一状态
    let current = state
        .cache
        .entry(&item_id)
        .map_or_else(|| state.cache.neutral_multiplier(), |e| e.mod_price);
    let projected = state.cache.params().project(current, q.side, q.units);
    Json(ProjectionResponse { item_id, side: q.side, units: q.units, current, projected })
}

pub async fn get_market(State(state): State<AppState>) -> Json<Vec<MarketItemView>> {
    Json(
        state
            .cache
            .snapshot()
            .into_iter()
            .map(|(item_id, entry)| MarketItemView { item_id, entry })
            .collect(),
    )
}

// --- 2. 成交上报接口 ---
// 同步完成内存变更，持久化交给后台任务；调用方只收到 202。

pub async fn handle_sale(
    State(state): State<AppState>,
    Json(req): Json<TradeBatchRequest>,
) -> StatusCode {
    debug!("收到卖出批次: {} 条", req.reports.len());
    state.cache.apply_sale(&req.reports);
    StatusCode::ACCEPTED
}

pub async fn handle_purchase(
    State(state): State<AppState>,
    Json(req): Json<TradeBatchRequest>,
) -> StatusCode {
    debug!("收到买入批次: {} 条", req.reports.len());
    state.cache.apply_purchase(&req.reports);
    StatusCode::ACCEPTED
}

// --- 3. 监控接口 ---

pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    let now = state.cache.clock().now().timestamp();
    Json(state.metrics.snapshot(now, state.cache.len(), state.cache.is_loaded()))
}
