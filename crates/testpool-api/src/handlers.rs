use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use testpool_domain::{Action, Pool, PoolName, Resource, ResourceId, Status};
use testpool_engine::reservation;

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.list_pools().await?;
    Ok(StatusCode::OK)
}

// ── Pools ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PoolSummary {
    pub name: String,
    pub resource_max: u32,
    pub ready: usize,
    pub reserved: usize,
    pub pending: usize,
    pub bad: usize,
}

async fn summarize(state: &AppState, pool: &Pool) -> Result<PoolSummary, ApiError> {
    let resources = state.store.list_pool_resources(&pool.name).await?;
    let mut summary =
        PoolSummary { name: pool.name.0.clone(), resource_max: pool.resource_max, ready: 0, reserved: 0, pending: 0, bad: 0 };
    for r in &resources {
        match r.status {
            Status::Ready => summary.ready += 1,
            Status::Reserved => summary.reserved += 1,
            Status::Pending => summary.pending += 1,
            Status::Bad => summary.bad += 1,
        }
    }
    Ok(summary)
}

pub async fn list_pools(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut summaries = Vec::new();
    for pool in state.store.list_pools().await? {
        summaries.push(summarize(&state, &pool).await?);
    }
    Ok(Json(json!(summaries)))
}

pub async fn get_pool(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let pool_name = PoolName::new(&name);
    let pool = state
        .store
        .get_pool(&pool_name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("pool '{}' not found", name)))?;
    let summary = summarize(&state, &pool).await?;
    Ok(Json(json!(summary)))
}

#[derive(Debug, Deserialize)]
pub struct CreatePoolQuery {
    pub resource_max: u32,
    pub template_name: String,
    pub connection: String,
    pub product: String,
}

pub async fn create_pool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<CreatePoolQuery>,
) -> Result<Json<Value>, ApiError> {
    let host = match state.store.find_host(&q.connection, &q.product).await? {
        Some(h) => h,
        None => state.store.create_host(q.connection.clone(), q.product.clone()).await?,
    };
    let pool = Pool {
        name: PoolName::new(&name),
        host: host.id,
        template_name: q.template_name,
        resource_max: q.resource_max,
    };
    let created = state.store.create_pool(pool).await?;
    Ok(Json(json!(created)))
}

#[derive(Debug, Deserialize)]
pub struct DeletePoolQuery {
    #[serde(default)]
    pub immediate: bool,
}

/// Sets `resource_max` to 0, which is all the adapter (§4.E) needs to drain
/// the pool to nothing over subsequent adapt cycles. `immediate=true`
/// additionally force-schedules every row — including RESERVED ones — for
/// destroy right away rather than waiting for reservations to expire
/// naturally. The pool row itself is dropped by setup/the scheduler once it's
/// empty and capacity-zero, not synchronously here.
pub async fn delete_pool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<DeletePoolQuery>,
) -> Result<StatusCode, ApiError> {
    let pool_name = PoolName::new(&name);
    state
        .store
        .get_pool(&pool_name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("pool '{}' not found", name)))?;

    state.store.update_pool_max(&pool_name, 0).await?;

    if q.immediate {
        for r in state.store.list_pool_resources(&pool_name).await? {
            if r.status != Status::Bad {
                state.store.transition_resource(r.id, Status::Pending, Action::Destroy, 0).await?;
            }
        }
    }

    Ok(StatusCode::OK)
}

// ── Reservation API (§4.H) ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AcquireQuery {
    pub expiration: i64,
}

#[derive(Debug, Serialize)]
pub struct ResourceView {
    pub id: ResourceId,
    pub name: String,
    pub ip_addr: Option<String>,
}

impl From<Resource> for ResourceView {
    fn from(r: Resource) -> Self {
        ResourceView { id: r.id, name: r.name, ip_addr: r.ip_addr }
    }
}

pub async fn acquire(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<AcquireQuery>,
) -> Result<Json<Value>, ApiError> {
    let pool_name = PoolName::new(&name);
    let resource = reservation::acquire(&state.store, &pool_name, q.expiration).await?;
    Ok(Json(json!(ResourceView::from(resource))))
}

pub async fn release(State(state): State<AppState>, Path(id): Path<uuid::Uuid>) -> Result<StatusCode, ApiError> {
    reservation::release(&state.store, ResourceId(id)).await?;
    Ok(StatusCode::OK)
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pools = state.store.list_pools().await?;
    let mut by_pool: HashMap<String, PoolSummary> = HashMap::new();
    for pool in &pools {
        by_pool.insert(pool.name.0.clone(), summarize(&state, pool).await?);
    }
    Ok(Json(json!({
        "pool_count": pools.len(),
        "pools": by_pool,
        "active_products": state.registry.active_products(),
    })))
}
