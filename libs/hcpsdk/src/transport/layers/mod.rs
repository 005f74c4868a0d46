//! Tower layers of the HCP transport stack
//!
//! - [`AuthLayer`] adds the target's `Authorization` header
//! - [`RetryLayer`] retries with exponential backoff and jitter
//! - [`UserAgentLayer`] sets `User-Agent`

mod auth;
mod retry;
mod user_agent;

pub use auth::{AuthLayer, AuthService};
pub use retry::{RETRY_ATTEMPT_HEADER, RetryLayer, RetryService, backoff_for};
pub use user_agent::{UserAgentLayer, UserAgentService};
