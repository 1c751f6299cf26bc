use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecisionError {
    /// Hard failure only for the mandatory base candle fetch; optional
    /// enrichments fail open instead of surfacing this.
    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Advisory error: {0}")]
    Advisory(String),

    #[error("Calculation error: {0}")]
    Calculation(String),
}
