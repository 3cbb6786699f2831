//! # storemetrics-server
//!
//! HTTP service exposing the storemetrics core over a JSON API consumed by
//! the dashboard.

pub mod api;
pub mod error;
pub mod rate_limit;
pub mod state;

pub use api::build_router;
pub use error::ApiError;
pub use state::AppState;
