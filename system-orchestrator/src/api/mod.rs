//! HTTP API over the decision engine.

mod error;

pub use error::ApiError;

use crate::state::{AppState, TaskError};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use execution_engine::{DailyReport, ExecutionReport, SyncReport};
use log::info;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use trading::{
    CycleStatus, EngineError, RebalancePlan, Settings, TradeLog, TradeOrigin, TradeQuery,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/dashboard", get(dashboard))
        .route("/api/settings", get(get_settings).post(update_settings))
        .route("/api/sync", post(sync))
        .route("/api/daily/run", post(run_daily))
        .route("/api/trades", get(trades))
        .route("/api/rebalance/preview", get(preview_rebalance))
        .route("/api/rebalance/execute", post(execute_rebalance))
        .route("/api/rebalance/custom", post(execute_custom))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_api_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("API Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn dashboard(State(state): State<AppState>) -> Result<Json<Vec<CycleStatus>>, ApiError> {
    Ok(Json(state.read(|engine| engine.dashboard()).await?))
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.accumulation(|engine| engine.settings()).await?))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, ApiError> {
    let saved = state
        .accumulation(move |engine| engine.update_settings(settings))
        .await?;
    Ok(Json(saved))
}

async fn sync(State(state): State<AppState>) -> Result<Json<SyncReport>, ApiError> {
    Ok(Json(
        state
            .accumulation(|engine| engine.sync_cycle_state())
            .await?,
    ))
}

/// Missing or inactive settings are a no-op, not an error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DailyRunResponse {
    Ran(DailyReport),
    Skipped { skipped: bool, reason: String },
}

async fn run_daily(State(state): State<AppState>) -> Result<Json<DailyRunResponse>, ApiError> {
    match state.accumulation(|engine| engine.run_daily()).await {
        Ok(report) => Ok(Json(DailyRunResponse::Ran(report))),
        Err(TaskError::Engine(EngineError::ConfigurationMissing(reason))) => {
            info!("Daily run skipped: {}", reason);
            Ok(Json(DailyRunResponse::Skipped {
                skipped: true,
                reason,
            }))
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TradesParams {
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub origin: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl TradesParams {
    fn into_query(self) -> Result<TradeQuery, ApiError> {
        let mut query = TradeQuery::new();
        if let Some(symbol) = self.symbol.filter(|s| !s.trim().is_empty()) {
            query = query.symbol(symbol.trim().to_uppercase());
        }
        if let Some(side) = self.side.filter(|s| !s.trim().is_empty()) {
            query = query.side(side.parse().map_err(ApiError::BadRequest)?);
        }
        if let Some(origin) = self.origin.filter(|s| !s.trim().is_empty()) {
            let origin: TradeOrigin = origin.parse().map_err(ApiError::BadRequest)?;
            query = query.origin(origin);
        }
        query.from = self.from;
        query.to = self.to;
        Ok(query)
    }
}

async fn trades(
    State(state): State<AppState>,
    Query(params): Query<TradesParams>,
) -> Result<Json<Vec<TradeLog>>, ApiError> {
    let query = params.into_query()?;
    Ok(Json(state.read(move |engine| engine.trades(&query)).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DryRun {
    #[serde(default)]
    pub dry_run: bool,
}

async fn preview_rebalance(
    State(state): State<AppState>,
) -> Result<Json<RebalancePlan>, ApiError> {
    Ok(Json(state.rebalance(|engine| engine.compute_plan()).await?))
}

async fn execute_rebalance(
    State(state): State<AppState>,
    Query(params): Query<DryRun>,
) -> Result<Json<ExecutionReport>, ApiError> {
    let report = state
        .rebalance(move |engine| engine.rebalance(params.dry_run))
        .await?;
    Ok(Json(report))
}

async fn execute_custom(
    State(state): State<AppState>,
    Query(params): Query<DryRun>,
    Json(plan): Json<RebalancePlan>,
) -> Result<Json<ExecutionReport>, ApiError> {
    let report = state
        .rebalance(move |engine| engine.execute_custom_plan(&plan, params.dry_run))
        .await?;
    Ok(Json(report))
}
