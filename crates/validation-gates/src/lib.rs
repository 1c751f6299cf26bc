pub mod confluence;
pub mod counter_trend;
pub mod divergence;
pub mod pipeline;

pub use confluence::{check_entry_confluence, ConfluenceResult};
pub use counter_trend::validate_counter_trend;
pub use divergence::{detect_divergence, DivergenceSeverity, TrendDivergence};
pub use pipeline::{GateContext, GateOutcome, GatePipeline};
