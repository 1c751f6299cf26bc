pub mod aggregator;
pub mod weights;

pub use aggregator::{fuse, FusedSignals, SignalAggregator};
pub use weights::StyleWeights;
