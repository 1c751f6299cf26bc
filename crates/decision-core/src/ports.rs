use async_trait::async_trait;

use crate::config::{EngineSettings, ModeConfig};
use crate::error::DecisionError;
use crate::types::{
    AdvisoryAssessment, Candle, MlPrediction, SentimentScore, Ticker24h, TradingMode,
};

/// Exchange market-data client. Candles are returned ordered ascending by time.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, DecisionError>;

    async fn get_24h_snapshot(&self, symbol: &str) -> Result<Ticker24h, DecisionError>;

    async fn get_all_snapshots(&self) -> Result<Vec<Ticker24h>, DecisionError>;
}

/// External advisory (LLM) client. Callers must check `is_enabled` and skip
/// gracefully when the service is not configured.
#[async_trait]
pub trait AdvisoryPort: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, DecisionError>;

    async fn analyze_market(
        &self,
        symbol: &str,
        timeframe: &str,
        candles: &[Candle],
    ) -> Result<AdvisoryAssessment, DecisionError>;

    fn is_configured(&self) -> bool;

    fn is_enabled(&self) -> bool;
}

/// Per-mode configuration source. The engine never persists configuration
/// itself; it reads a validated snapshot per evaluation.
pub trait ConfigProvider: Send + Sync {
    fn mode_config(&self, mode: TradingMode) -> ModeConfig;

    fn settings(&self) -> EngineSettings;
}

/// Optional ML price predictor. Absence contributes no signal.
#[async_trait]
pub trait MlPredictorPort: Send + Sync {
    async fn predict(
        &self,
        symbol: &str,
        candles: &[Candle],
        current_price: f64,
    ) -> Result<MlPrediction, DecisionError>;
}

/// Optional market sentiment source. Absence contributes no signal.
#[async_trait]
pub trait SentimentPort: Send + Sync {
    async fn get_sentiment(&self, symbol: &str) -> Result<SentimentScore, DecisionError>;

    fn is_enabled(&self) -> bool;
}
