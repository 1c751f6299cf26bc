use chrono::{DateTime, Utc};
use decision_core::types::Direction;
use serde::{Deserialize, Serialize};

/// Lifecycle of a single take-profit re-entry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentryState {
    /// No cycle scheduled
    None,
    /// Partial position sold, waiting for price to return to breakeven
    Waiting,
    /// Price reached the re-buy band and an order was requested
    Executing,
    /// Re-buy filled, cycle closed
    Completed,
    /// Timed out or errored before a fill
    Failed,
    /// Deliberately abandoned (attempt budget spent, cycle cap reached)
    Skipped,
}

impl ReentryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReentryState::None => "none",
            ReentryState::Waiting => "waiting",
            ReentryState::Executing => "executing",
            ReentryState::Completed => "completed",
            ReentryState::Failed => "failed",
            ReentryState::Skipped => "skipped",
        }
    }

    /// A cycle in this state still blocks the next TP level.
    pub fn is_pending(&self) -> bool {
        matches!(self, ReentryState::Waiting | ReentryState::Executing)
    }
}

/// One sell-at-TP / re-buy-at-breakeven round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReentryCycle {
    pub cycle_number: u32,
    /// 1-based TP level that triggered the sell
    pub tp_level: u8,
    pub state: ReentryState,
    pub sold_quantity: f64,
    pub sold_price: f64,
    pub sold_at: DateTime<Utc>,
    /// Quantity to re-acquire (a fraction of what was sold)
    pub reentry_quantity: f64,
    /// Breakeven price the re-buy waits for
    pub reentry_target_price: f64,
    pub reentry_fill_price: Option<f64>,
    pub reentry_attempts: u32,
    pub realized_profit: f64,
}

/// Mutable position state the machine drives. Callers own persistence; the
/// machine only transitions it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalpReentryStatus {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub original_quantity: f64,
    pub remaining_quantity: f64,
    /// Average cost of the remaining inventory
    pub current_breakeven: f64,
    /// Realized profit across all sells and exits
    pub accumulated_profit: f64,
    pub cycles: Vec<ReentryCycle>,
    pub tp_hit: [bool; 3],
    /// A pending cycle blocks the next TP level until it resolves
    pub next_tp_blocked: bool,
    pub runner_active: bool,
    pub runner_peak_price: f64,
    pub runner_stop_price: Option<f64>,
    pub exited: bool,
}

impl ScalpReentryStatus {
    /// Index of the cycle currently blocking, if any.
    pub fn pending_cycle(&self) -> Option<usize> {
        self.cycles.iter().position(|c| c.state.is_pending())
    }

    pub fn completed_cycles(&self) -> usize {
        self.cycles
            .iter()
            .filter(|c| c.state == ReentryState::Completed)
            .count()
    }
}

/// What the caller should do in response to a price tick. The machine never
/// touches an exchange; it only emits these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReentryAction {
    /// Sell part of the remaining position at a TP level
    SellPartial {
        tp_level: u8,
        quantity: f64,
        price: f64,
    },
    /// Price returned to breakeven, place the re-buy order
    PlaceRebuy {
        cycle_number: u32,
        quantity: f64,
        target_price: f64,
    },
    /// A waiting re-buy ran out its clock
    RebuyTimedOut { cycle_number: u32 },
    /// Final TP filled, the residual runner is now managed by trailing logic
    ActivateRunner { hold_quantity: f64 },
    /// Trailing or dynamic stop hit, close the runner
    TrailingExit {
        quantity: f64,
        price: f64,
        reason: String,
    },
    /// Move the protective stop for the position
    DynamicSlUpdate { stop_price: f64 },
}
