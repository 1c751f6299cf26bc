pub mod fusion;
pub mod sizer;

pub use fusion::{fuse_confidence, FusedConfidence};
pub use sizer::AdaptiveRiskSizer;
