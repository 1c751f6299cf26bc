use decision_core::types::{SignalSource, TradingMode};

/// Per-source fusion weights for one trading style. Weights sum to at most 1.
#[derive(Debug, Clone, Copy)]
pub struct StyleWeights {
    pub ml_predictor: f64,
    pub advisory: f64,
    pub sentiment: f64,
    pub pattern_scanner: f64,
    pub technical: f64,
}

impl StyleWeights {
    pub fn for_mode(mode: TradingMode) -> Self {
        match mode {
            // Sub-minute horizon: ML and momentum dominate, advisory is too slow
            TradingMode::UltraFast => Self {
                ml_predictor: 0.35,
                advisory: 0.05,
                sentiment: 0.05,
                pattern_scanner: 0.25,
                technical: 0.30,
            },
            TradingMode::Scalp => Self {
                ml_predictor: 0.30,
                advisory: 0.15,
                sentiment: 0.05,
                pattern_scanner: 0.25,
                technical: 0.25,
            },
            TradingMode::Swing => Self {
                ml_predictor: 0.25,
                advisory: 0.25,
                sentiment: 0.10,
                pattern_scanner: 0.20,
                technical: 0.20,
            },
            // Sentiment matters for the long horizon
            TradingMode::Position => Self {
                ml_predictor: 0.15,
                advisory: 0.25,
                sentiment: 0.20,
                pattern_scanner: 0.15,
                technical: 0.25,
            },
        }
    }

    pub fn weight_of(&self, source: SignalSource) -> f64 {
        match source {
            SignalSource::MlPredictor => self.ml_predictor,
            SignalSource::Advisory => self.advisory,
            SignalSource::Sentiment => self.sentiment,
            SignalSource::PatternScanner => self.pattern_scanner,
            SignalSource::Technical => self.technical,
        }
    }

    pub fn sum(&self) -> f64 {
        self.ml_predictor + self.advisory + self.sentiment + self.pattern_scanner + self.technical
    }
}
