use chrono::{DateTime, Duration, Utc};
use decision_core::error::DecisionError;
use decision_core::types::Direction;
use tracing::{debug, info, warn};

use crate::config::ReentryConfig;
use crate::types::{ReentryAction, ReentryCycle, ReentryState, ScalpReentryStatus};

/// Net quantities below this are treated as a flat position.
const DUST_QUANTITY: f64 = 1e-9;

/// Pure state machine for scalp-mode partial exits and breakeven re-entries.
///
/// The machine holds no position state of its own. Callers feed it a
/// [`ScalpReentryStatus`] plus a price tick and act on the returned
/// [`ReentryAction`]s; order placement, fills, and persistence stay outside.
pub struct ScalpReentryMachine {
    config: ReentryConfig,
}

impl ScalpReentryMachine {
    pub fn new(config: ReentryConfig) -> Result<Self, DecisionError> {
        config.validate()?;
        Ok(ScalpReentryMachine { config })
    }

    pub fn config(&self) -> &ReentryConfig {
        &self.config
    }

    /// Fresh status for a just-opened position.
    pub fn init(
        &self,
        symbol: &str,
        direction: Direction,
        entry_price: f64,
        quantity: f64,
    ) -> Result<ScalpReentryStatus, DecisionError> {
        if entry_price <= 0.0 || quantity <= 0.0 {
            return Err(DecisionError::Calculation(format!(
                "cannot track {} with entry {} and quantity {}",
                symbol, entry_price, quantity
            )));
        }
        if !direction.is_directional() {
            return Err(DecisionError::Calculation(
                "re-entry tracking needs a directional position".to_string(),
            ));
        }
        Ok(ScalpReentryStatus {
            symbol: symbol.to_string(),
            direction,
            entry_price,
            original_quantity: quantity,
            remaining_quantity: quantity,
            current_breakeven: entry_price,
            accumulated_profit: 0.0,
            cycles: Vec::new(),
            tp_hit: [false; 3],
            next_tp_blocked: false,
            runner_active: false,
            runner_peak_price: 0.0,
            runner_stop_price: None,
            exited: false,
        })
    }

    /// Advance the machine one price tick. All transitions happen here or in
    /// the explicit fill/failure callbacks; the same tick replayed against the
    /// resulting state produces no further actions.
    pub fn on_price(
        &self,
        status: &mut ScalpReentryStatus,
        price: f64,
        now: DateTime<Utc>,
    ) -> Vec<ReentryAction> {
        if status.exited || price <= 0.0 {
            return Vec::new();
        }
        if status.runner_active {
            return self.monitor_runner(status, price);
        }

        let mut actions = Vec::new();

        if let Some(idx) = status.pending_cycle() {
            self.advance_pending_cycle(status, idx, price, now, &mut actions);
            // A cycle transition consumes the tick; TPs resume next tick
            if !actions.is_empty() {
                return actions;
            }
        }

        if !status.next_tp_blocked {
            self.check_take_profits(status, price, now, &mut actions);
        }

        actions
    }

    /// The re-buy order for `cycle_number` filled.
    pub fn record_rebuy_fill(
        &self,
        status: &mut ScalpReentryStatus,
        cycle_number: u32,
        quantity: f64,
        fill_price: f64,
    ) -> Option<ReentryAction> {
        let cycle = status
            .cycles
            .iter_mut()
            .find(|c| c.cycle_number == cycle_number && c.state == ReentryState::Executing)?;

        cycle.state = ReentryState::Completed;
        cycle.reentry_fill_price = Some(fill_price);
        cycle.reentry_quantity = quantity;
        status.remaining_quantity += quantity;
        status.next_tp_blocked = false;
        status.current_breakeven = breakeven(status);

        info!(
            symbol = %status.symbol,
            cycle = cycle_number,
            quantity = format!("{:.4}", quantity),
            breakeven = format!("{:.4}", status.current_breakeven),
            "re-buy filled, cycle complete"
        );

        // Protective stop snaps to the new breakeven
        let sign = direction_sign(status.direction);
        let stop_price =
            status.current_breakeven * (1.0 - sign * self.config.stop_loss_percent / 100.0);
        Some(ReentryAction::DynamicSlUpdate { stop_price })
    }

    /// The re-buy order for `cycle_number` was rejected or cancelled. Returns
    /// the cycle's new state.
    pub fn record_rebuy_failure(
        &self,
        status: &mut ScalpReentryStatus,
        cycle_number: u32,
    ) -> Option<ReentryState> {
        let max_attempts = self.config.max_attempts;
        let cycle = status
            .cycles
            .iter_mut()
            .find(|c| c.cycle_number == cycle_number && c.state == ReentryState::Executing)?;

        if cycle.reentry_attempts >= max_attempts {
            warn!(
                symbol = %status.symbol,
                cycle = cycle_number,
                attempts = cycle.reentry_attempts,
                "re-buy attempt budget spent, abandoning cycle"
            );
            cycle.state = ReentryState::Skipped;
            status.next_tp_blocked = false;
        } else {
            debug!(
                symbol = %status.symbol,
                cycle = cycle_number,
                attempts = cycle.reentry_attempts,
                "re-buy failed, back to waiting"
            );
            cycle.state = ReentryState::Waiting;
        }
        Some(cycle.state)
    }

    /// Abandon the pending cycle without waiting for its clock.
    pub fn skip_reentry(&self, status: &mut ScalpReentryStatus, cycle_number: u32) -> bool {
        match status
            .cycles
            .iter_mut()
            .find(|c| c.cycle_number == cycle_number && c.state.is_pending())
        {
            Some(cycle) => {
                cycle.state = ReentryState::Skipped;
                status.next_tp_blocked = false;
                true
            }
            None => false,
        }
    }

    fn advance_pending_cycle(
        &self,
        status: &mut ScalpReentryStatus,
        idx: usize,
        price: f64,
        now: DateTime<Utc>,
        actions: &mut Vec<ReentryAction>,
    ) {
        let timeout = Duration::seconds(self.config.timeout_secs as i64);
        let cycle = &mut status.cycles[idx];

        if now - cycle.sold_at > timeout {
            warn!(
                symbol = %status.symbol,
                cycle = cycle.cycle_number,
                waited_secs = (now - cycle.sold_at).num_seconds(),
                "re-buy window expired"
            );
            cycle.state = ReentryState::Failed;
            status.next_tp_blocked = false;
            actions.push(ReentryAction::RebuyTimedOut {
                cycle_number: cycle.cycle_number,
            });
            return;
        }

        if cycle.state != ReentryState::Waiting {
            return;
        }

        let distance = (price - cycle.reentry_target_price).abs()
            / cycle.reentry_target_price
            * 100.0;
        if distance <= self.config.price_buffer_percent {
            cycle.state = ReentryState::Executing;
            cycle.reentry_attempts += 1;
            info!(
                symbol = %status.symbol,
                cycle = cycle.cycle_number,
                price = format!("{:.4}", price),
                target = format!("{:.4}", cycle.reentry_target_price),
                attempt = cycle.reentry_attempts,
                "price back at breakeven, requesting re-buy"
            );
            actions.push(ReentryAction::PlaceRebuy {
                cycle_number: cycle.cycle_number,
                quantity: cycle.reentry_quantity,
                target_price: cycle.reentry_target_price,
            });
        }
    }

    fn check_take_profits(
        &self,
        status: &mut ScalpReentryStatus,
        price: f64,
        now: DateTime<Utc>,
        actions: &mut Vec<ReentryAction>,
    ) {
        let level = match status.tp_hit.iter().position(|hit| !hit) {
            Some(level) => level,
            None => return,
        };
        if status.remaining_quantity <= DUST_QUANTITY {
            return;
        }

        let sign = direction_sign(status.direction);
        let tp_config = self.config.tp_levels[level];
        let tp_price = status.entry_price * (1.0 + sign * tp_config.profit_percent / 100.0);
        let reached = match status.direction {
            Direction::Long => price >= tp_price,
            _ => price <= tp_price,
        };
        if !reached {
            return;
        }

        // The final rung sells everything the runner does not keep
        let quantity = if level == status.tp_hit.len() - 1 {
            status.remaining_quantity * (100.0 - self.config.runner_hold_percent) / 100.0
        } else {
            status.remaining_quantity * tp_config.sell_percent / 100.0
        };
        let profit = sign * (price - status.entry_price) * quantity;
        status.tp_hit[level] = true;
        status.remaining_quantity -= quantity;
        status.accumulated_profit += profit;

        info!(
            symbol = %status.symbol,
            tp_level = level + 1,
            price = format!("{:.4}", price),
            quantity = format!("{:.4}", quantity),
            profit = format!("{:.4}", profit),
            "take profit reached, selling partial"
        );
        actions.push(ReentryAction::SellPartial {
            tp_level: (level + 1) as u8,
            quantity,
            price,
        });

        if level == status.tp_hit.len() - 1 {
            self.activate_runner(status, price, actions);
            return;
        }

        let cycle_number = status.cycles.len() as u32 + 1;
        if status.cycles.len() as u32 >= self.config.max_cycles {
            debug!(
                symbol = %status.symbol,
                cycles = status.cycles.len(),
                "cycle cap reached, selling without re-entry"
            );
            status.cycles.push(ReentryCycle {
                cycle_number,
                tp_level: (level + 1) as u8,
                state: ReentryState::Skipped,
                sold_quantity: quantity,
                sold_price: price,
                sold_at: now,
                reentry_quantity: 0.0,
                reentry_target_price: 0.0,
                reentry_fill_price: None,
                reentry_attempts: 0,
                realized_profit: profit,
            });
            status.current_breakeven = breakeven(status);
            return;
        }

        status.cycles.push(ReentryCycle {
            cycle_number,
            tp_level: (level + 1) as u8,
            state: ReentryState::Waiting,
            sold_quantity: quantity,
            sold_price: price,
            sold_at: now,
            reentry_quantity: quantity * self.config.reentry_percent / 100.0,
            reentry_target_price: 0.0,
            reentry_fill_price: None,
            reentry_attempts: 0,
            realized_profit: profit,
        });
        status.current_breakeven = breakeven(status);
        if let Some(cycle) = status.cycles.last_mut() {
            cycle.reentry_target_price = status.current_breakeven;
        }
        status.next_tp_blocked = true;
    }

    fn activate_runner(
        &self,
        status: &mut ScalpReentryStatus,
        price: f64,
        actions: &mut Vec<ReentryAction>,
    ) {
        status.runner_active = true;
        status.runner_peak_price = price;
        status.next_tp_blocked = false;
        info!(
            symbol = %status.symbol,
            hold = format!("{:.4}", status.remaining_quantity),
            "final take profit filled, runner active"
        );
        actions.push(ReentryAction::ActivateRunner {
            hold_quantity: status.remaining_quantity,
        });
        if let Some(stop) = self.dynamic_stop(status, price) {
            status.runner_stop_price = Some(stop);
            actions.push(ReentryAction::DynamicSlUpdate { stop_price: stop });
        }
    }

    fn monitor_runner(&self, status: &mut ScalpReentryStatus, price: f64) -> Vec<ReentryAction> {
        let mut actions = Vec::new();
        let sign = direction_sign(status.direction);

        let improved = match status.direction {
            Direction::Long => price > status.runner_peak_price,
            _ => price < status.runner_peak_price,
        };
        if improved {
            status.runner_peak_price = price;
        }

        // The dynamic stop only tightens
        if let Some(candidate) = self.dynamic_stop(status, price) {
            let tighter = match status.runner_stop_price {
                Some(current) => sign * (candidate - current) > 0.0,
                None => true,
            };
            if tighter {
                status.runner_stop_price = Some(candidate);
                actions.push(ReentryAction::DynamicSlUpdate {
                    stop_price: candidate,
                });
            }
        }

        let trail_stop = status.runner_peak_price
            * (1.0 - sign * self.config.final_trailing_percent / 100.0);
        let trail_hit = sign * (price - trail_stop) <= 0.0;
        let sl_hit = status
            .runner_stop_price
            .map(|stop| sign * (price - stop) <= 0.0)
            .unwrap_or(false);

        if trail_hit || sl_hit {
            let reason = if sl_hit { "dynamic_sl" } else { "trailing_stop" };
            let quantity = status.remaining_quantity;
            let profit = sign * (price - status.entry_price) * quantity;
            status.accumulated_profit += profit;
            status.remaining_quantity = 0.0;
            status.exited = true;
            info!(
                symbol = %status.symbol,
                reason,
                price = format!("{:.4}", price),
                total_profit = format!("{:.4}", status.accumulated_profit),
                "runner closed"
            );
            actions.push(ReentryAction::TrailingExit {
                quantity,
                price,
                reason: reason.to_string(),
            });
        }

        actions
    }

    /// Stop that locks in the protected share of total profit, letting the
    /// runner give back at most the configured loss share. Positions not yet
    /// in profit get no dynamic stop. The stop never crosses entry back into
    /// loss once realized profit exists.
    fn dynamic_stop(&self, status: &ScalpReentryStatus, price: f64) -> Option<f64> {
        if status.remaining_quantity <= DUST_QUANTITY {
            return None;
        }
        let sign = direction_sign(status.direction);
        let unrealized = sign * (price - status.entry_price) * status.remaining_quantity;
        let total = status.accumulated_profit + unrealized;
        if total <= 0.0 {
            return None;
        }
        let max_loss = total * self.config.dynamic_sl_max_loss_percent / 100.0;
        let mut stop = price - sign * max_loss / status.remaining_quantity;
        if status.accumulated_profit > 0.0 && sign * (stop - status.entry_price) < 0.0 {
            stop = status.entry_price;
        }
        Some(stop)
    }
}

/// Average cost of the remaining inventory: entry cost minus everything sold
/// plus everything re-bought, over the net quantity. A flat or inverted net
/// quantity freezes the value instead of dividing.
pub fn breakeven(status: &ScalpReentryStatus) -> f64 {
    let mut net_cost = status.entry_price * status.original_quantity;
    let mut net_quantity = status.original_quantity;

    for cycle in &status.cycles {
        net_cost -= cycle.sold_quantity * cycle.sold_price;
        net_quantity -= cycle.sold_quantity;
        if cycle.state == ReentryState::Completed {
            if let Some(fill) = cycle.reentry_fill_price {
                net_cost += cycle.reentry_quantity * fill;
                net_quantity += cycle.reentry_quantity;
            }
        }
    }

    if net_quantity <= DUST_QUANTITY {
        return status.current_breakeven;
    }
    net_cost / net_quantity
}

fn direction_sign(direction: Direction) -> f64 {
    match direction {
        Direction::Long => 1.0,
        _ => -1.0,
    }
}
