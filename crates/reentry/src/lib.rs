pub mod config;
pub mod machine;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::{ReentryConfig, TpLevelConfig};
pub use machine::ScalpReentryMachine;
pub use machine::breakeven;
pub use types::{ReentryAction, ReentryCycle, ReentryState, ScalpReentryStatus};
