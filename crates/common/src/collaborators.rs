use async_trait::async_trait;

use crate::{BatchSummary, Result, ScreeningResult};

/// Persistence for finished runs. Called after orchestration completes.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_run(&self, summary: &BatchSummary) -> Result<()>;

    async fn save_result(&self, result: &ScreeningResult, run_id: &str) -> Result<()>;
}

/// Outbound alerting for matched symbols.
///
/// Failures are reported as `Error::Notification`; callers log them and
/// carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, result: &ScreeningResult) -> Result<()>;
}
