//! Poll orchestration, scheduling and the UI message contract.

mod messages;
mod orchestrator;
mod poll;


pub use messages::{Request, Response, SettingsInput, handle_request};
pub use orchestrator::{
    Clock, GroupStatus, PassReport, PassSummary, Patrol, PollState, SKIPPED_RATE_LIMITED,
    SettingsError, StatusSnapshot, SystemClock, badge_text,
};
pub use poll::{PollConfig, run_scheduler};
