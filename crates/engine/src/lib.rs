pub mod cache;
pub mod pipeline;
pub mod provider;
pub mod publish;
pub mod screener;

#[cfg(test)]
mod testing;

pub use cache::{CacheKey, CacheStats, DataCache, DataKind};
pub use provider::CachedProvider;
pub use publish::{publish, LogNotifier, PublishSummary};
pub use screener::{BatchReport, Clock, Screener};
