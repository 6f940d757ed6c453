//! Treasury Server
//!
//! The HTTP boundary of the treasury engine. Every reconciliation job is exposed as a cron
//! endpoint guarded by a shared-secret bearer token; an external scheduler drives the system by
//! calling them on fixed intervals. Endpoints return a structured JSON run summary on 200, a
//! 401 on a bad or missing secret, and a 500 only when a whole run crashed.
pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod routes;
pub mod server;
