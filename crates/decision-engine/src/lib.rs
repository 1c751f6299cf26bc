pub mod engine;
pub mod refresh;

pub use engine::DecisionEngine;
pub use refresh::RefreshTask;
