pub mod cache;
pub mod config;
pub mod error;
pub mod ports;
pub mod types;

pub use cache::TtlCache;
pub use config::{EngineSettings, ModeConfig, MtfConsensusConfig};
pub use error::DecisionError;
pub use ports::{AdvisoryPort, ConfigProvider, MarketDataPort, MlPredictorPort, SentimentPort};
pub use types::{
    AdvisoryAssessment, Candle, DecisionReport, Direction, GateResult, MlPrediction,
    Recommendation, RejectionTracker, ScanStatus, SentimentScore, Signal, SignalSet,
    SignalSource, TakeProfitLevel, Ticker24h, TradePlan, TradingMode, TrendDirection,
    TrendHealth,
};
