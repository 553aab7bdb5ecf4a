//! compass-server: HTTP API for Compass Caging
//!
//! Donors, batches, donations, CSV imports, client policies and bank
//! reconciliation over Postgres. Routes live under `/api`, sessions are
//! bearer tokens issued from the CLI.

pub mod db;
pub mod http;
pub mod models;

pub use http::{build_router, run_server, ApiError, AppState, ServerConfig, ServerError};
