//! HTTP route definitions.

use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};
use tower_http::trace::TraceLayer;

use crate::http::monitoring;
use crate::job::routes as job_routes;
use crate::mods::routes as mod_routes;
use crate::state::AppContext;

/// Create the main router.
///
/// ## Route Structure
///
/// ```text
/// /scheduler
///   GET    /scheduler/jobs              - List jobs (?store=name)
///   POST   /scheduler/jobs              - Create or replace job
///   GET    /scheduler/jobs/{store}/{id} - Get job
///   DELETE /scheduler/jobs/{store}/{id} - Delete job
///   GET    /scheduler/jobs/{id}         - Get job (default store)
///   DELETE /scheduler/jobs/{id}         - Delete job (default store)
///
/// /mods
///   GET    /mods/info?ids=a,b           - Cached metadata
///   POST   /mods/info                   - Refresh a batch
///   GET    /mods/info/{id}              - Cached metadata, [] if unknown
///   POST   /mods/info/{id}              - Refresh one
///
/// /livez   - Liveness probe
/// ```
pub fn create_router(ctx: Arc<AppContext>) -> Router {
    // Job routes for job CRUD
    let job_router = Router::new()
        .route(
            "/jobs",
            get(job_routes::list_jobs).post(job_routes::create_job),
        )
        .route(
            "/jobs/{store}/{id}",
            get(job_routes::get_job).delete(job_routes::delete_job),
        )
        .route(
            "/jobs/{id}",
            get(job_routes::get_default_job).delete(job_routes::delete_default_job),
        );

    // Mod metadata routes
    let mod_router = Router::new()
        .route(
            "/info",
            get(mod_routes::get_mod_infos).post(mod_routes::refresh_mod_infos),
        )
        .route(
            "/info/{id}",
            get(mod_routes::get_mod_info).post(mod_routes::refresh_mod_info),
        );

    Router::new()
        .nest("/scheduler", job_router)
        .nest("/mods", mod_router)
        .route("/livez", get(monitoring::liveness_probe))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
