#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Exchange already registered: {0}")]
    DuplicateExchange(String),

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("No exchanges registered")]
    NoExchangesRegistered,

    #[error("Configuration error: {0}")]
    Configuration(String),
}
