//! Shared data models for the AdReel backend.
//!
//! This crate provides Serde-serializable types for:
//! - Sessions, chat history and product analysis
//! - Video generation jobs and their state machine
//! - Agent handoff payloads and their validation rules
//! - Budget accounting, cost estimation and rate-limit results
//! - Job events streamed to clients

pub mod analysis;
pub mod budget;
pub mod cost;
pub mod event;
pub mod handoff;
pub mod job;
pub mod locale;
pub mod rate_limit;
pub mod session;

// Re-export common types
pub use analysis::{CreativeDirection, ProductAnalysis, Strategy};
pub use budget::{AlertLevel, BudgetAlert, BudgetStatus, BudgetThresholds, CostEntry, ServiceKind};
pub use cost::{estimate_video_cost, VideoCostEstimate, VEO_COST_PER_SECOND};
pub use event::JobEvent;
pub use handoff::{
    validate_handoff, AgentRole, HandoffContext, HandoffPayload, HandoffValidationResult,
    ValidationIssue, ValidationStatus, VideoDeliverable,
};
pub use job::{
    AspectRatio, JobId, JobStatus, RemoteJobState, TransitionError, VideoJob, CANCELLED_BY_USER,
};
pub use locale::Locale;
pub use rate_limit::{EndpointClass, RateLimitResult};
pub use session::{ChatMessage, ChatRole, Session, SessionError, SessionStatus};
