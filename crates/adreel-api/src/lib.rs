//! Axum HTTP API server for AdReel.
//!
//! This crate provides:
//! - Video generation submission and job status tracking
//! - Product analysis, prompt refinement and creative strategy
//! - Agent handoffs with completeness validation
//! - Budget tracking, per-endpoint rate limiting and Prometheus metrics

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod messages;
pub mod metrics;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;

pub use config::{ApiConfig, StoreBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use services::ExpirySweeper;
pub use state::{AppState, Stores};
