use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Time-to-live per cached data kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub quote_ttl: Duration,
    pub history_ttl: Duration,
    pub option_chain_ttl: Duration,
    pub expirations_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quote_ttl: Duration::from_secs(60),
            history_ttl: Duration::from_secs(3600),
            option_chain_ttl: Duration::from_secs(300),
            expirations_ttl: Duration::from_secs(3600),
        }
    }
}

/// Runtime configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Strategy definition file path
    pub strategy_path: String,

    // Universe; command-line symbols take precedence
    pub symbols: Vec<String>,

    // Screening
    pub max_concurrent: usize,
    pub history_days: u32,
    /// `None` disables the batch deadline.
    pub batch_deadline: Option<Duration>,

    // Market data snapshot for the replay provider
    pub market_data_path: String,

    // Persistence; results are not stored when unset
    pub database_url: Option<String>,

    // Telegram alerts; matches are only logged when unset
    pub telegram_token: Option<String>,
    pub telegram_chat_ids: Vec<i64>,

    pub cache: CacheConfig,
}

impl Config {
    pub const DEFAULT_MAX_CONCURRENT: usize = 5;
    pub const DEFAULT_HISTORY_DAYS: u32 = 252;
    /// Fifteen-minute execution ceiling less a minute of headroom for publishing.
    pub const DEFAULT_DEADLINE_SECS: u64 = 840;

    /// Load configuration from the process environment.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Source(lookup);

        let max_concurrent: usize =
            env.parsed("MAX_CONCURRENT")?.unwrap_or(Self::DEFAULT_MAX_CONCURRENT);
        if max_concurrent == 0 {
            return Err(Error::Config("MAX_CONCURRENT must be at least 1".into()));
        }

        let deadline_secs: u64 = env
            .parsed("BATCH_DEADLINE_SECS")?
            .unwrap_or(Self::DEFAULT_DEADLINE_SECS);

        let telegram_chat_ids = match env.get("TELEGRAM_CHAT_IDS") {
            Some(raw) => parse_list(&raw, "TELEGRAM_CHAT_IDS")?,
            None => Vec::new(),
        };

        let defaults = CacheConfig::default();
        let cache = CacheConfig {
            enabled: env.parsed("CACHE_ENABLED")?.unwrap_or(defaults.enabled),
            quote_ttl: env.seconds("CACHE_QUOTE_TTL_SECS")?.unwrap_or(defaults.quote_ttl),
            history_ttl: env
                .seconds("CACHE_HISTORY_TTL_SECS")?
                .unwrap_or(defaults.history_ttl),
            option_chain_ttl: env
                .seconds("CACHE_CHAIN_TTL_SECS")?
                .unwrap_or(defaults.option_chain_ttl),
            expirations_ttl: env
                .seconds("CACHE_EXPIRATIONS_TTL_SECS")?
                .unwrap_or(defaults.expirations_ttl),
        };

        Ok(Config {
            strategy_path: env
                .get("STRATEGY_PATH")
                .unwrap_or_else(|| "config/ofi.toml".to_string()),
            symbols: env
                .get("SYMBOLS")
                .map(|raw| split_symbols(&raw))
                .unwrap_or_default(),
            max_concurrent,
            history_days: env
                .parsed("HISTORY_DAYS")?
                .unwrap_or(Self::DEFAULT_HISTORY_DAYS),
            batch_deadline: (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)),
            market_data_path: env
                .get("MARKET_DATA_PATH")
                .unwrap_or_else(|| "data/snapshot.json".to_string()),
            database_url: env.get("DATABASE_URL"),
            telegram_token: env.get("TELEGRAM_TOKEN"),
            telegram_chat_ids,
            cache,
        })
    }
}

/// Upper-case, trim and drop empties from a comma-separated symbol list.
pub fn split_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_list<T: FromStr>(raw: &str, key: &str) -> Result<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| Error::Config(format!("{key} contains invalid entry: '{s}'")))
        })
        .collect()
}

struct Source<F>(F);

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| Error::Config(format!("{key} has invalid value: '{raw}'"))),
            None => Ok(None),
        }
    }

    fn seconds(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.parsed::<u64>(key)?.map(Duration::from_secs))
    }
}
