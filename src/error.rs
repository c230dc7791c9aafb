use thiserror::Error;

/// Top-level error type for the relayer
#[derive(Error, Debug)]
pub enum AppError {
    /// Remote read failure (unreachable API, malformed page)
    #[error("Fetch error on {chain}: {message}")]
    Fetch { chain: String, message: String },

    /// Native address has no mapping into the destination address space yet
    #[error("Could not resolve {address} from {chain} into a {destination} address")]
    AddressResolution {
        chain: String,
        destination: String,
        address: String,
    },

    #[error("Send failed on {chain}: {message}")]
    Send {
        chain: String,
        message: String,
        permanent: bool,
    },

    #[error("Settlement failed on {chain}: {message}")]
    Settlement {
        chain: String,
        message: String,
        permanent: bool,
    },

    /// Ledger or checkpoint logic bug. Never recovered from.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decimal conversion error: {0}")]
    Decimal(#[from] rust_decimal::Error),
}

/// How the orchestrator reacts to an error raised while driving a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Leave the swap where it is and retry on the next tick
    Transient,
    /// Move the swap to `Failed` and alert an operator
    Permanent,
    /// Stop the process
    Fatal,
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Fetch { .. } | AppError::AddressResolution { .. } | AppError::Http(_) => {
                ErrorClass::Transient
            }
            AppError::Send { permanent, .. } | AppError::Settlement { permanent, .. } => {
                if *permanent {
                    ErrorClass::Permanent
                } else {
                    ErrorClass::Transient
                }
            }
            AppError::Configuration(_) | AppError::Decimal(_) => ErrorClass::Permanent,
            AppError::InvariantViolation(_) | AppError::Io(_) | AppError::Serialization(_) => {
                ErrorClass::Fatal
            }
        }
    }

    pub fn fetch(chain: &str, message: impl Into<String>) -> Self {
        AppError::Fetch {
            chain: chain.to_string(),
            message: message.into(),
        }
    }

    pub fn send(chain: &str, message: impl Into<String>) -> Self {
        AppError::Send {
            chain: chain.to_string(),
            message: message.into(),
            permanent: false,
        }
    }

    /// Re-tag a broadcast failure raised while executing a settlement leg
    pub fn into_settlement(self) -> Self {
        match self {
            AppError::Send {
                chain,
                message,
                permanent,
            } => AppError::Settlement {
                chain,
                message,
                permanent,
            },
            other => other,
        }
    }

    /// Settlement failure that retrying cannot fix (unknown token, unsupported leg)
    pub fn settlement_permanent(chain: &str, message: impl Into<String>) -> Self {
        AppError::Settlement {
            chain: chain.to_string(),
            message: message.into(),
            permanent: true,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Configuration(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
