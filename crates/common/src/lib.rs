pub mod collaborators;
pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use collaborators::{Notifier, ResultStore};
pub use config::{CacheConfig, Config};
pub use error::{Error, FetchFailure, Result, ValidationIssues};
pub use provider::MarketDataProvider;
pub use types::*;
