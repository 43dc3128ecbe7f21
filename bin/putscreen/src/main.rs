use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{config::split_symbols, Config, Notifier, ResultStore, SymbolOutcome};
use engine::{publish, CachedProvider, DataCache, LogNotifier, Screener};
use replay::ReplayProvider;
use store::SqliteStore;
use telegram_alerts::TelegramNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    let strategy = Arc::new(
        strategy::load(&cfg.strategy_path)
            .with_context(|| format!("loading strategy from {}", cfg.strategy_path))?,
    );
    info!(strategy = %strategy.name, version = %strategy.version, "putscreen starting");

    // ── Market data ───────────────────────────────────────────────────────────
    let replay = ReplayProvider::load(&cfg.market_data_path)
        .with_context(|| format!("loading market data from {}", cfg.market_data_path))?;

    // Command-line symbols win over SYMBOLS; fall back to everything in the snapshot.
    let args: Vec<String> = std::env::args().skip(1).collect();
    let symbols = if !args.is_empty() {
        split_symbols(&args.join(","))
    } else if !cfg.symbols.is_empty() {
        cfg.symbols.clone()
    } else {
        replay.symbols().await
    };
    if symbols.is_empty() {
        bail!("no symbols to screen; pass them as arguments or set SYMBOLS");
    }

    let as_of = replay.as_of().await;
    let cache = Arc::new(DataCache::new(cfg.cache.clone()));
    let provider = Arc::new(CachedProvider::new(Arc::new(replay), cache.clone()));

    // ── Screening ─────────────────────────────────────────────────────────────
    let mut screener = Screener::new(provider, strategy)?.with_history_days(cfg.history_days);
    // Days to expiration are counted from the snapshot date, not the wall clock.
    if let Some(as_of) = as_of {
        info!(as_of = %as_of, "Replaying market snapshot");
        screener = screener.with_clock(Arc::new(move || as_of));
    }
    let report = screener
        .screen_batch(&symbols, cfg.max_concurrent, cfg.batch_deadline)
        .await?;

    for outcome in &report.outcomes {
        match outcome {
            SymbolOutcome::Failed { symbol, stage, reason } => {
                warn!(symbol = %symbol, stage = %stage, reason = %reason, "Symbol failed")
            }
            SymbolOutcome::Incomplete { symbol, started } => {
                warn!(symbol = %symbol, started, "Symbol not screened before deadline")
            }
            SymbolOutcome::Completed(_) => {}
        }
    }

    // ── Publishing ────────────────────────────────────────────────────────────
    let store = match &cfg.database_url {
        Some(url) => Some(SqliteStore::connect(url).await.context("opening result store")?),
        None => {
            info!("DATABASE_URL not set; results will not be stored");
            None
        }
    };

    let notifier: Box<dyn Notifier> = match &cfg.telegram_token {
        Some(token) => Box::new(TelegramNotifier::new(token.clone(), &cfg.telegram_chat_ids)),
        None => Box::new(LogNotifier),
    };

    publish(
        &report,
        store.as_ref().map(|s| s as &dyn ResultStore),
        notifier.as_ref(),
    )
    .await?;

    let stats = cache.stats();
    let summary = &report.summary;
    info!(
        run_id = %summary.run_id,
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        failed = summary.failed,
        matched = summary.matched,
        incomplete = summary.incomplete,
        duration_ms = summary.duration.as_millis() as u64,
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        "Screening run finished"
    );
    Ok(())
}
