use thiserror::Error;

/// Errors raised by the bot
///
/// Symbol-level failures (`DataUnavailable`, `Computation`) only skip the
/// affected symbol for the current cycle. `TransientIo` is logged by the
/// drivers and never blocks a position transition. `Config` aborts startup.
#[derive(Debug, Error)]
pub enum Error {
    #[error("data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("signal computation failed for {symbol}: {reason}")]
    Computation { symbol: String, reason: String },

    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn data_unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        Error::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub fn computation(symbol: &str, reason: impl Into<String>) -> Self {
        Error::Computation {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is isolated to one symbol for this cycle
    pub fn is_symbol_local(&self) -> bool {
        matches!(
            self,
            Error::DataUnavailable { .. } | Error::Computation { .. } | Error::Http(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_local_classification() {
        assert!(Error::data_unavailable("BTCUSDT", "no bars").is_symbol_local());
        assert!(Error::computation("BTCUSDT", "NaN").is_symbol_local());
        assert!(!Error::Config("bad".to_string()).is_symbol_local());
        assert!(!Error::TransientIo("disk full".to_string()).is_symbol_local());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::data_unavailable("ETHUSDT", "exchange unreachable");
        assert_eq!(
            err.to_string(),
            "data unavailable for ETHUSDT: exchange unreachable"
        );
    }
}
