//! Refresh Token Retention
//!
//! Background worker deleting refresh rows that were revoked or expired
//! longer than the retention period ago.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use platform::supervisor::{Worker, WorkerError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::session::SessionService;
use crate::domain::repository::RefreshTokenRepository;

pub struct RefreshTokenSweeper<R>
where
    R: RefreshTokenRepository + Send + Sync + 'static,
{
    sessions: Arc<SessionService<R>>,
    interval: Duration,
}

impl<R> RefreshTokenSweeper<R>
where
    R: RefreshTokenRepository + Send + Sync + 'static,
{
    pub fn new(sessions: Arc<SessionService<R>>, interval: Duration) -> Self {
        Self { sessions, interval }
    }

    /// One sweep; errors are logged and retried on the next tick
    pub async fn sweep(&self) -> u64 {
        match self.sessions.cleanup().await {
            Ok(0) => 0,
            Ok(purged) => {
                tracing::info!(purged, "Purged stale refresh tokens");
                purged
            }
            Err(e) => {
                tracing::error!(error = %e, "Refresh token cleanup failed");
                0
            }
        }
    }
}

#[async_trait]
impl<R> Worker for RefreshTokenSweeper<R>
where
    R: RefreshTokenRepository + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "refresh-token-sweeper"
    }

    async fn start(&self) -> Result<(), WorkerError> {
        if self.interval.is_zero() {
            return Err(WorkerError::start_failed(self.name(), "interval must be positive"));
        }
        Ok(())
    }

    async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
        tracing::debug!("Refresh token sweeper stopped");
    }
}
