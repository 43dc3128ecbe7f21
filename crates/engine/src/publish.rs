use async_trait::async_trait;
use tracing::{info, warn};

use common::{Notifier, Result, ResultStore, ScreeningResult};

use crate::screener::BatchReport;

/// What `publish` did with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishSummary {
    pub results_saved: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
}

/// Hand a finished batch to the store and the notifier.
///
/// Saves the run summary and every completed result, then alerts once per
/// matched result. Store errors propagate; alert failures are logged and
/// counted but never fail the call.
pub async fn publish(
    report: &BatchReport,
    store: Option<&dyn ResultStore>,
    notifier: &dyn Notifier,
) -> Result<PublishSummary> {
    let mut summary = PublishSummary::default();
    let run_id = &report.summary.run_id;

    if let Some(store) = store {
        store.save_run(&report.summary).await?;
        for result in report.results() {
            store.save_result(result, run_id).await?;
            summary.results_saved += 1;
        }
    }

    for result in report.matched() {
        match notifier.send_alert(result).await {
            Ok(()) => summary.alerts_sent += 1,
            Err(e) => {
                warn!(run_id = %run_id, symbol = %result.symbol, error = %e, "Failed to deliver alert");
                summary.alerts_failed += 1;
            }
        }
    }

    info!(
        run_id = %run_id,
        saved = summary.results_saved,
        alerts = summary.alerts_sent,
        alert_failures = summary.alerts_failed,
        "Published batch"
    );
    Ok(summary)
}

/// Notifier that only writes matches to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(&self, result: &ScreeningResult) -> Result<()> {
        match &result.recommendation {
            Some(rec) => info!(
                symbol = %result.symbol,
                strategy = %result.strategy,
                signal_strength = result.signal_strength,
                contract = %rec.contract.contract_symbol,
                annualized_yield = rec.annualized_yield,
                "Match: {}",
                rec.reason
            ),
            None => info!(
                symbol = %result.symbol,
                strategy = %result.strategy,
                signal_strength = result.signal_strength,
                "Match with no qualifying option"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use common::{BatchSummary, Error};

    use crate::screener::Screener;
    use crate::testing::{fixed_clock, trend_strategy, MockProvider};

    #[derive(Default)]
    struct RecordingStore {
        runs: Mutex<Vec<String>>,
        results: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ResultStore for RecordingStore {
        async fn save_run(&self, summary: &BatchSummary) -> Result<()> {
            if self.fail {
                return Err(Error::Other("disk full".into()));
            }
            self.runs.lock().unwrap().push(summary.run_id.clone());
            Ok(())
        }

        async fn save_result(&self, result: &ScreeningResult, run_id: &str) -> Result<()> {
            self.results
                .lock()
                .unwrap()
                .push((run_id.to_string(), result.symbol.clone()));
            Ok(())
        }
    }

    /// Fails for one symbol, records the rest.
    struct FlakyNotifier {
        broken: &'static str,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send_alert(&self, result: &ScreeningResult) -> Result<()> {
            if result.symbol == self.broken {
                return Err(Error::Notification("chat not found".into()));
            }
            self.sent.lock().unwrap().push(result.symbol.clone());
            Ok(())
        }
    }

    async fn report() -> BatchReport {
        let provider = Arc::new(
            MockProvider::new()
                .with_symbol("AAA", true)
                .with_symbol("BBB", true)
                .with_symbol("CCC", false)
                .failing_quote("DDD"),
        );
        let names: Vec<String> = ["AAA", "BBB", "CCC", "DDD"].iter().map(|s| s.to_string()).collect();
        Screener::new(provider, trend_strategy())
            .unwrap()
            .with_clock(fixed_clock())
            .screen_batch(&names, 2, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn saves_completed_results_and_alerts_matches() {
        let report = report().await;
        let store = RecordingStore::default();
        let notifier = FlakyNotifier {
            broken: "BBB",
            sent: Mutex::new(Vec::new()),
        };

        let summary = publish(&report, Some(&store), &notifier).await.unwrap();

        assert_eq!(summary.results_saved, 3);
        assert_eq!(summary.alerts_sent, 1);
        assert_eq!(summary.alerts_failed, 1);
        assert_eq!(*store.runs.lock().unwrap(), vec![report.summary.run_id.clone()]);
        assert!(store
            .results
            .lock()
            .unwrap()
            .iter()
            .all(|(run, _)| run == &report.summary.run_id));
        assert_eq!(*notifier.sent.lock().unwrap(), vec!["AAA".to_string()]);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let report = report().await;
        let store = RecordingStore {
            fail: true,
            ..RecordingStore::default()
        };
        assert!(publish(&report, Some(&store), &LogNotifier).await.is_err());
    }

    #[tokio::test]
    async fn publishing_without_store_still_alerts() {
        let report = report().await;
        let summary = publish(&report, None, &LogNotifier).await.unwrap();
        assert_eq!(summary.results_saved, 0);
        assert_eq!(summary.alerts_sent, 2);
    }
}
