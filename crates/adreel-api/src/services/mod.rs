//! Business logic services.

pub mod budget;
pub mod events;
pub mod expiry_sweeper;
pub mod handoff;
pub mod job_tracker;
pub mod rate_limit;
pub mod session;

pub use budget::BudgetTracker;
pub use events::JobEventBus;
pub use expiry_sweeper::ExpirySweeper;
pub use handoff::HandoffCoordinator;
pub use job_tracker::JobTracker;
pub use rate_limit::RateLimitService;
pub use session::SessionService;
