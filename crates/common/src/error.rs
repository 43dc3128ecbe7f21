use std::fmt;

use thiserror::Error;

/// Why a provider fetch did not produce data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// The provider has no data for the symbol (delisted, unknown ticker).
    NotFound,
    /// Network or upstream failure; a later attempt may succeed.
    Transient,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::NotFound => write!(f, "not found"),
            FetchFailure::Transient => write!(f, "transient failure"),
        }
    }
}

/// Every problem found while validating a strategy definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationIssues(pub Vec<String>);

impl ValidationIssues {
    pub fn push(&mut self, issue: impl Into<String>) {
        self.0.push(issue.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|issue| issue.contains(needle))
    }
}

impl fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Strategy validation failed: {0}")]
    Validation(ValidationIssues),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data integrity error for {symbol}: {reason}")]
    DataIntegrity { symbol: String, reason: String },

    #[error("Data unavailable for {symbol} ({kind}): {message}")]
    DataUnavailable {
        symbol: String,
        kind: FetchFailure,
        message: String,
    },

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DataUnavailable {
            symbol: symbol.into(),
            kind: FetchFailure::NotFound,
            message: message.into(),
        }
    }

    pub fn transient(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DataUnavailable {
            symbol: symbol.into(),
            kind: FetchFailure::Transient,
            message: message.into(),
        }
    }

    /// A copy of this error for another caller that awaited the same operation.
    ///
    /// Domain variants are reproduced exactly; wrapped library errors keep
    /// only their message.
    pub fn replicate(&self) -> Self {
        match self {
            Error::Validation(issues) => Error::Validation(issues.clone()),
            Error::Configuration(msg) => Error::Configuration(msg.clone()),
            Error::DataIntegrity { symbol, reason } => Error::DataIntegrity {
                symbol: symbol.clone(),
                reason: reason.clone(),
            },
            Error::DataUnavailable {
                symbol,
                kind,
                message,
            } => Error::DataUnavailable {
                symbol: symbol.clone(),
                kind: *kind,
                message: message.clone(),
            },
            Error::Notification(msg) => Error::Notification(msg.clone()),
            Error::Config(msg) => Error::Config(msg.clone()),
            Error::Other(msg) => Error::Other(msg.clone()),
            Error::Database(_) | Error::Json(_) | Error::Io(_) => Error::Other(self.to_string()),
        }
    }

    /// Fatal errors abort the whole run; everything else is isolated to one symbol.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::Configuration(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_validation_and_configuration_are_fatal() {
        assert!(Error::Validation(ValidationIssues::default()).is_fatal());
        assert!(Error::Configuration("x".into()).is_fatal());
        assert!(!Error::transient("AAPL", "timeout").is_fatal());
        assert!(!Error::DataIntegrity {
            symbol: "AAPL".into(),
            reason: "duplicate date".into()
        }
        .is_fatal());
        assert!(!Error::Notification("smtp down".into()).is_fatal());
    }

    #[test]
    fn replicated_errors_keep_their_kind() {
        match Error::transient("AAPL", "timeout").replicate() {
            Error::DataUnavailable { symbol, kind, .. } => {
                assert_eq!(symbol, "AAPL");
                assert_eq!(kind, FetchFailure::Transient);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Error::Configuration("x".into()).replicate().is_fatal());

        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        assert!(io.replicate().to_string().contains("disk gone"));
    }

    #[test]
    fn validation_display_lists_every_issue() {
        let mut issues = ValidationIssues::default();
        issues.push("missing field 'name'");
        issues.push("missing field 'entry_conditions'");
        let msg = Error::Validation(issues).to_string();
        assert!(msg.contains("'name'"));
        assert!(msg.contains("'entry_conditions'"));
    }
}
