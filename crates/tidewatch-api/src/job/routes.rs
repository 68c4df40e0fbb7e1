//! Job HTTP route handlers.
//!
//! - GET    /scheduler/jobs[?store=]       - List jobs
//! - POST   /scheduler/jobs                - Create or replace a job
//! - GET    /scheduler/jobs/{store}/{id}   - Get job
//! - DELETE /scheduler/jobs/{store}/{id}   - Delete job
//! - GET    /scheduler/jobs/{id}           - Get job in the default store
//! - DELETE /scheduler/jobs/{id}           - Delete job in the default store

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::definition::{Job, UpsertJobRequest};
use crate::error::{InterfaceError, JobError};
use crate::state::AppContext;

/// Response for listing jobs.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub count: usize,
    pub jobs: Vec<Job>,
}

/// Response for single job.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job: Job,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub store: Option<String>,
}

/// List jobs, optionally from one store.
///
/// GET /scheduler/jobs
pub async fn list_jobs(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ListJobsQuery>,
) -> Json<JobListResponse> {
    let jobs = ctx.scheduler.list(query.store.as_deref()).await;
    Json(JobListResponse {
        count: jobs.len(),
        jobs,
    })
}

/// Create or replace a job.
///
/// POST /scheduler/jobs
pub async fn create_job(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<UpsertJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), InterfaceError> {
    let store = request
        .store
        .unwrap_or_else(|| ctx.scheduler.default_store().to_string());
    info!(
        store = %store,
        job_id = %request.definition.id,
        target = %request.definition.target,
        "Upserting job"
    );

    let job = ctx.scheduler.upsert(&store, request.definition).await?;
    Ok((StatusCode::CREATED, Json(JobResponse { job })))
}

/// Get a job.
///
/// GET /scheduler/jobs/{store}/{id}
pub async fn get_job(
    State(ctx): State<Arc<AppContext>>,
    Path((store, id)): Path<(String, String)>,
) -> Result<Json<JobResponse>, InterfaceError> {
    find(&ctx, &store, &id).await
}

/// Delete a job.
///
/// DELETE /scheduler/jobs/{store}/{id}
pub async fn delete_job(
    State(ctx): State<Arc<AppContext>>,
    Path((store, id)): Path<(String, String)>,
) -> Json<serde_json::Value> {
    remove(&ctx, &store, &id).await
}

/// GET /scheduler/jobs/{id}
pub async fn get_default_job(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, InterfaceError> {
    let store = ctx.scheduler.default_store().to_string();
    find(&ctx, &store, &id).await
}

/// DELETE /scheduler/jobs/{id}
pub async fn delete_default_job(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let store = ctx.scheduler.default_store().to_string();
    remove(&ctx, &store, &id).await
}

async fn find(
    ctx: &AppContext,
    store: &str,
    id: &str,
) -> Result<Json<JobResponse>, InterfaceError> {
    let job = ctx
        .scheduler
        .get(store, id)
        .await
        .ok_or(JobError::NotFound)?;
    Ok(Json(JobResponse { job }))
}

async fn remove(ctx: &AppContext, store: &str, id: &str) -> Json<serde_json::Value> {
    let removed = ctx.scheduler.remove(store, id).await;
    Json(serde_json::json!({ "removed": removed }))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
