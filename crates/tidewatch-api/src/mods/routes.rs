//! Mod metadata route handlers.
//!
//! - GET  /mods/info?ids=a,b   - Cached payloads for several ids
//! - GET  /mods/info/{id}      - Cached payload, `[]` when unknown
//! - POST /mods/info           - Refresh a batch (body: `["a", "b"]`)
//! - POST /mods/info/{id}      - Refresh one id

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::Value;
use tidewatch_extract::{ExtractionReport, empty_result};
use tracing::info;

use crate::error::InterfaceError;
use crate::state::AppContext;

#[derive(Debug, Deserialize)]
pub struct ModInfoQuery {
    /// Comma-separated mod ids.
    #[serde(default)]
    pub ids: Option<String>,
}

/// GET /mods/info?ids=a,b
pub async fn get_mod_infos(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ModInfoQuery>,
) -> Result<Json<HashMap<String, Value>>, InterfaceError> {
    let ids = split_ids(query.ids.as_deref().unwrap_or_default());
    let found = ctx.cache.get_many(&ids).await?;
    Ok(Json(found))
}

/// GET /mods/info/{id}
pub async fn get_mod_info(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, InterfaceError> {
    let info = ctx.cache.get(&id).await?;
    Ok(Json(info.unwrap_or_else(empty_result)))
}

/// POST /mods/info
pub async fn refresh_mod_infos(
    State(ctx): State<Arc<AppContext>>,
    Json(ids): Json<Vec<String>>,
) -> Result<Json<ExtractionReport>, InterfaceError> {
    refresh(&ctx, ids).await.map(Json)
}

/// POST /mods/info/{id}
pub async fn refresh_mod_info(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<ExtractionReport>, InterfaceError> {
    refresh(&ctx, vec![id]).await.map(Json)
}

/// Run the batch on its own task so a dropped request cannot cut the
/// sandbox teardown short.
async fn refresh(ctx: &AppContext, ids: Vec<String>) -> Result<ExtractionReport, InterfaceError> {
    info!(count = ids.len(), "Refreshing mod metadata");
    let pipeline = ctx.pipeline.clone();
    let report = tokio::spawn(async move { pipeline.refresh(&ids).await })
        .await
        .map_err(|e| InterfaceError::Custom(format!("refresh task failed: {}", e)))??;
    Ok(report)
}

fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
