//! HTTP module.

pub mod monitoring;
pub mod routes;
