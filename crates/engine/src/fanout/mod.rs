//! Parallel provider dispatch.
//!
//! - `executor` - Planning and bounded-concurrency execution of provider calls
//! - `call_result` - Per-call outcomes
//! - `cancel` - Request-level cancellation handle

mod call_result;
mod cancel;
mod executor;

pub use call_result::ProviderCallResult;
pub use cancel::CancelHandle;
pub use executor::{FanoutExecutor, FanoutOutcome, PlannedCall};
