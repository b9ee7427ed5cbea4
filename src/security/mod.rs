pub mod audit;
pub mod rate_limit;

pub use audit::*;
pub use rate_limit::*;

use crate::config::TerminalConfig;
use crate::protocol::{LabError, LabResult, SessionKey};
use tracing::warn;

/// Admission check run before a command reaches the simulator: the
/// per-attempt command cap, then the per-user rate limit.
#[derive(Debug)]
pub struct CommandGuard {
    rate_limiter: RateLimiter,
    max_commands_per_session: u64,
}

impl CommandGuard {
    pub fn new(config: &TerminalConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::per_minute(config.commands_per_minute as usize),
            max_commands_per_session: config.max_commands_per_session,
        }
    }

    pub fn with_limits(rate_limiter: RateLimiter, max_commands_per_session: u64) -> Self {
        Self {
            rate_limiter,
            max_commands_per_session,
        }
    }

    pub async fn admit(&self, key: &SessionKey, commands_executed: u64) -> LabResult<()> {
        if commands_executed >= self.max_commands_per_session {
            warn!(session = %key, limit = self.max_commands_per_session, "Session command limit reached");
            return Err(LabError::SessionLimit(self.max_commands_per_session));
        }

        if !self.rate_limiter.allow(&key.user_id).await {
            warn!(user = %key.user_id, "Command rate limit exceeded");
            return Err(LabError::RateLimited(format!(
                "at most {} commands per minute",
                self.rate_limiter.max_requests()
            )));
        }

        Ok(())
    }

    pub async fn cleanup_expired(&self) {
        self.rate_limiter.cleanup_expired().await;
    }
}
