//! Domain error types.

/// Top-level error type for alphaflex.
#[derive(Debug, thiserror::Error)]
pub enum AlphaflexError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid period '{0}' (expected one of 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 3y, 5y, ytd)")]
    InvalidPeriod(String),

    #[error("invalid investment amount {0}: must be a positive, finite number")]
    InvalidInvestment(f64),

    #[error("data unavailable for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    #[error("provider error: {reason}")]
    Provider { reason: String },

    #[error("malformed provider response: {reason}")]
    MalformedResponse { reason: String },

    #[error("cache error: {reason}")]
    Cache { reason: String },

    #[error("no usable price data for any of {requested} tickers")]
    NoUsableData { requested: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AlphaflexError {
    /// Re-attribute a provider failure to the entity it was fetching.
    pub fn for_ticker(self, ticker: &str) -> Self {
        match self {
            AlphaflexError::DataUnavailable { .. } => self,
            other => AlphaflexError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<&AlphaflexError> for std::process::ExitCode {
    fn from(err: &AlphaflexError) -> Self {
        let code: u8 = match err {
            AlphaflexError::Io(_) => 1,
            AlphaflexError::ConfigParse { .. }
            | AlphaflexError::ConfigMissing { .. }
            | AlphaflexError::ConfigInvalid { .. } => 2,
            AlphaflexError::Provider { .. }
            | AlphaflexError::MalformedResponse { .. }
            | AlphaflexError::Cache { .. }
            | AlphaflexError::DataUnavailable { .. } => 3,
            AlphaflexError::InvalidPeriod(_) | AlphaflexError::InvalidInvestment(_) => 4,
            AlphaflexError::NoUsableData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
