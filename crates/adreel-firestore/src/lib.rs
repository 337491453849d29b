//! Firestore REST API client and persistence.
//!
//! This crate provides:
//! - A Firestore REST client with token caching, retry and metrics
//! - Store traits for sessions, video jobs, handoffs and the cost ledger
//! - Firestore repositories implementing them
//! - An in-memory backend with the same concurrency semantics

pub mod client;
pub mod cost_ledger_repo;
pub mod error;
pub mod handoff_repo;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod session_repo;
pub mod store;
pub mod token_cache;
pub mod types;
pub mod video_job_repo;

#[cfg(test)]
mod client_tests;

pub use client::{FirestoreClient, FirestoreConfig};
pub use cost_ledger_repo::CostLedgerRepository;
pub use error::{FirestoreError, FirestoreResult};
pub use handoff_repo::HandoffRepository;
pub use memory::MemoryStore;
pub use retry::RetryConfig;
pub use session_repo::SessionRepository;
pub use store::{
    CostLedger, HandoffStore, JobStore, Page, PageCursor, SessionStore, Versioned, BUDGET_RESETS,
    COST_LEDGER, HANDOFFS, SESSIONS, VIDEO_JOBS,
};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
pub use video_job_repo::VideoJobRepository;
