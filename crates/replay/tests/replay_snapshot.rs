use std::sync::Arc;

use common::{PipelineStage, SymbolOutcome};
use engine::Screener;
use replay::ReplayProvider;

const SNAPSHOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../data/snapshot.json");
const STRATEGY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/ofi.toml");

async fn screen(symbols: &[&str]) -> engine::BatchReport {
    let provider = ReplayProvider::load(SNAPSHOT).unwrap();
    let as_of = provider.as_of().await.unwrap();
    let strategy = Arc::new(strategy::load(STRATEGY).unwrap());
    let symbols: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();

    Screener::new(Arc::new(provider), strategy)
        .unwrap()
        .with_clock(Arc::new(move || as_of))
        .screen_batch(&symbols, 2, None)
        .await
        .unwrap()
}

#[tokio::test]
async fn oversold_uptrend_with_bounce_is_recommended_a_put() {
    let report = screen(&["KO", "MSFT", "INTC"]).await;
    assert_eq!(report.summary.succeeded, 3);

    let matched: Vec<_> = report.matched().collect();
    assert_eq!(matched.len(), 1);
    let ko = matched[0];
    assert_eq!(ko.symbol, "KO");
    assert_eq!(ko.conditions_met, vec!["trend", "oversold", "bounce", "volume"]);

    let rec = ko.recommendation.as_ref().unwrap();
    assert!((7..=60).contains(&rec.days_to_expiration));
    assert!((rec.contract.strike - ko.quote.price).abs() <= 0.05 * ko.quote.price);
}

#[tokio::test]
async fn symbol_missing_from_snapshot_fails_at_fetch() {
    let report = screen(&["KO", "ZZZZ"]).await;
    assert_eq!(report.summary.failed, 1);
    let failed = report
        .outcomes
        .iter()
        .find(|o| o.is_failed())
        .unwrap();
    match failed {
        SymbolOutcome::Failed { symbol, stage, .. } => {
            assert_eq!(symbol, "ZZZZ");
            assert_eq!(*stage, PipelineStage::Fetching);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}
