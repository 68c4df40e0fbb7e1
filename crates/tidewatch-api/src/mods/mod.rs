//! Mod metadata lookups and refreshes.

pub mod routes;
