use chrono::{DateTime, Duration, TimeZone, Utc};
use decision_core::types::Direction;

use crate::config::{ReentryConfig, TpLevelConfig};
use crate::machine::{breakeven, ScalpReentryMachine};
use crate::types::{ReentryAction, ReentryState, ScalpReentryStatus};

fn machine() -> ScalpReentryMachine {
    ScalpReentryMachine::new(ReentryConfig::default()).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn long_position(machine: &ScalpReentryMachine) -> ScalpReentryStatus {
    machine.init("BTCUSDT", Direction::Long, 100.0, 10.0).unwrap()
}

/// Drives a position through all three TPs with abandoned re-entries, leaving
/// an active runner: 10 -> sell 3 at TP1 -> sell 3.5 at TP2 -> sell 2.8 at
/// TP3 -> 0.7 held.
fn runner_position(machine: &ScalpReentryMachine) -> ScalpReentryStatus {
    let mut status = long_position(machine);
    machine.on_price(&mut status, 100.30, t0());
    machine.skip_reentry(&mut status, 1);
    machine.on_price(&mut status, 100.60, t0());
    machine.skip_reentry(&mut status, 2);
    machine.on_price(&mut status, 101.0, t0());
    assert!(status.runner_active);
    status
}

#[test]
fn test_tp1_sells_and_schedules_reentry() {
    let machine = machine();
    let mut status = long_position(&machine);

    let actions = machine.on_price(&mut status, 100.30, t0());

    assert_eq!(
        actions[0],
        ReentryAction::SellPartial {
            tp_level: 1,
            quantity: 3.0,
            price: 100.30,
        }
    );
    assert!((status.remaining_quantity - 7.0).abs() < 1e-9);
    assert!((status.accumulated_profit - 0.9).abs() < 1e-9);
    assert!(status.next_tp_blocked);

    let cycle = &status.cycles[0];
    assert_eq!(cycle.state, ReentryState::Waiting);
    assert!((cycle.reentry_quantity - 2.4).abs() < 1e-9);
    // (100 * 10 - 3 * 100.30) / 7 = 99.8714...
    assert!((cycle.reentry_target_price - 699.10 / 7.0).abs() < 1e-9);
}

#[test]
fn test_breakeven_improves_after_sell_and_rebuy() {
    let machine = machine();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    assert!((status.current_breakeven - 99.8714).abs() < 1e-4);

    // Price returns to the target band, re-buy requested then filled above it
    let target = status.cycles[0].reentry_target_price;
    let actions = machine.on_price(&mut status, target, t0() + Duration::seconds(60));
    assert!(matches!(actions[0], ReentryAction::PlaceRebuy { .. }));

    machine.record_rebuy_fill(&mut status, 1, 2.4, 100.0);
    // (699.10 + 2.4 * 100) / 9.4 = 99.9042...
    assert!((status.current_breakeven - 939.10 / 9.4).abs() < 1e-9);
    assert!((status.remaining_quantity - 9.4).abs() < 1e-9);
}

#[test]
fn test_pending_cycle_blocks_next_tp() {
    let machine = machine();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    // TP2 trigger price, but cycle 1 is still waiting
    let actions = machine.on_price(&mut status, 100.60, t0() + Duration::seconds(30));

    assert!(actions.is_empty());
    assert!(!status.tp_hit[1]);
}

#[test]
fn test_rebuy_fill_unblocks_and_moves_stop() {
    let machine = machine();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    let target = status.cycles[0].reentry_target_price;
    machine.on_price(&mut status, target, t0() + Duration::seconds(60));

    let action = machine.record_rebuy_fill(&mut status, 1, 2.4, 100.0).unwrap();
    let expected_stop = status.current_breakeven * (1.0 - 1.5 / 100.0);
    assert_eq!(
        action,
        ReentryAction::DynamicSlUpdate {
            stop_price: expected_stop,
        }
    );
    assert!(!status.next_tp_blocked);
    assert_eq!(status.cycles[0].state, ReentryState::Completed);
}

#[test]
fn test_timeout_fails_cycle_and_unblocks() {
    let machine = machine();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    let actions = machine.on_price(&mut status, 103.0, t0() + Duration::seconds(301));

    assert_eq!(actions, vec![ReentryAction::RebuyTimedOut { cycle_number: 1 }]);
    assert_eq!(status.cycles[0].state, ReentryState::Failed);
    assert!(!status.next_tp_blocked);

    // Next tick the ladder resumes at TP2
    let actions = machine.on_price(&mut status, 100.60, t0() + Duration::seconds(302));
    assert!(matches!(
        actions[0],
        ReentryAction::SellPartial { tp_level: 2, .. }
    ));
}

#[test]
fn test_attempt_budget_exhausts_to_skipped() {
    let machine = machine();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    let target = status.cycles[0].reentry_target_price;

    for attempt in 1..=3u32 {
        let at = t0() + Duration::seconds(attempt as i64 * 10);
        let actions = machine.on_price(&mut status, target, at);
        assert!(matches!(actions[0], ReentryAction::PlaceRebuy { .. }));
        assert_eq!(status.cycles[0].reentry_attempts, attempt);
        machine.record_rebuy_failure(&mut status, 1);
    }

    assert_eq!(status.cycles[0].state, ReentryState::Skipped);
    assert!(!status.next_tp_blocked);
}

#[test]
fn test_rebuy_failure_below_budget_returns_to_waiting() {
    let machine = machine();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    let target = status.cycles[0].reentry_target_price;
    machine.on_price(&mut status, target, t0() + Duration::seconds(10));

    let state = machine.record_rebuy_failure(&mut status, 1).unwrap();
    assert_eq!(state, ReentryState::Waiting);
    assert!(status.next_tp_blocked);
}

#[test]
fn test_tp3_activates_runner() {
    let machine = machine();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    machine.skip_reentry(&mut status, 1);
    machine.on_price(&mut status, 100.60, t0());
    machine.skip_reentry(&mut status, 2);

    let actions = machine.on_price(&mut status, 101.0, t0());

    // 10 - 3 - 3.5 = 3.5 remaining before TP3, sell 80% leaves 0.7
    assert!(matches!(
        actions[0],
        ReentryAction::SellPartial { tp_level: 3, .. }
    ));
    assert!(actions.iter().any(|a| matches!(
        a,
        ReentryAction::ActivateRunner { hold_quantity } if (hold_quantity - 0.7).abs() < 1e-9
    )));
    assert!(status.runner_active);
    assert!(status.runner_stop_price.is_some());
    // TP1: 3 * 0.30 + TP2: 3.5 * 0.60 + TP3: 2.8 * 1.00 = 5.8
    assert!((status.accumulated_profit - 5.8).abs() < 1e-9);
}

#[test]
fn test_runner_dynamic_stop_only_tightens() {
    let machine = machine();
    let mut status = runner_position(&machine);

    // Accumulated 5.8, unrealized 0.7 * 10 = 7.0, total 12.8; give back at
    // most 40% = 5.12, so stop = 110 - 5.12 / 0.7
    let actions = machine.on_price(&mut status, 110.0, t0());
    let expected = 110.0 - 5.12 / 0.7;
    assert!(actions.iter().any(|a| matches!(
        a,
        ReentryAction::DynamicSlUpdate { stop_price } if (stop_price - expected).abs() < 1e-6
    )));

    // A lower candidate never loosens the stop
    let before = status.runner_stop_price.unwrap();
    let actions = machine.on_price(&mut status, 105.0, t0());
    assert!(actions.is_empty());
    assert_eq!(status.runner_stop_price.unwrap(), before);
}

#[test]
fn test_runner_trailing_exit_from_peak() {
    let machine = machine();
    let mut status = runner_position(&machine);

    machine.on_price(&mut status, 110.0, t0());
    // 5% below the 110 peak is 104.5
    let actions = machine.on_price(&mut status, 104.0, t0());

    let exit = actions
        .iter()
        .find_map(|a| match a {
            ReentryAction::TrailingExit {
                quantity,
                price,
                reason,
            } => Some((*quantity, *price, reason.clone())),
            _ => None,
        })
        .unwrap();
    assert!((exit.0 - 0.7).abs() < 1e-9);
    assert_eq!(exit.1, 104.0);
    assert_eq!(exit.2, "trailing_stop");
    assert!(status.exited);
    assert_eq!(status.remaining_quantity, 0.0);
    // 5.8 realized on the ladder + 0.7 * 4.0 on the runner
    assert!((status.accumulated_profit - 8.6).abs() < 1e-9);
}

#[test]
fn test_runner_dynamic_sl_exit() {
    let machine = machine();
    let mut status = runner_position(&machine);

    machine.on_price(&mut status, 110.0, t0());
    let stop = status.runner_stop_price.unwrap();
    // Below the dynamic stop but also below the trail; the stop reports first
    let actions = machine.on_price(&mut status, stop - 0.5, t0());
    assert!(actions.iter().any(|a| matches!(
        a,
        ReentryAction::TrailingExit { reason, .. } if reason == "dynamic_sl"
    )));
}

#[test]
fn test_exited_position_emits_nothing() {
    let machine = machine();
    let mut status = runner_position(&machine);
    machine.on_price(&mut status, 110.0, t0());
    machine.on_price(&mut status, 104.0, t0());
    assert!(status.exited);

    assert!(machine.on_price(&mut status, 120.0, t0()).is_empty());
}

#[test]
fn test_replayed_tick_is_idempotent() {
    let machine = machine();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    let snapshot_remaining = status.remaining_quantity;

    let actions = machine.on_price(&mut status, 100.30, t0());
    assert!(actions.is_empty());
    assert_eq!(status.remaining_quantity, snapshot_remaining);
    assert_eq!(status.cycles.len(), 1);
}

#[test]
fn test_short_position_mirrors_tp_and_breakeven() {
    let machine = machine();
    let mut status = machine
        .init("ETHUSDT", Direction::Short, 100.0, 10.0)
        .unwrap();

    let actions = machine.on_price(&mut status, 99.70, t0());
    assert_eq!(
        actions[0],
        ReentryAction::SellPartial {
            tp_level: 1,
            quantity: 3.0,
            price: 99.70,
        }
    );
    assert!((status.accumulated_profit - 0.9).abs() < 1e-9);
    // Short inventory breaks even above entry: (1000 - 3 * 99.70) / 7
    assert!((status.cycles[0].reentry_target_price - 700.90 / 7.0).abs() < 1e-9);
}

#[test]
fn test_flat_net_quantity_freezes_breakeven() {
    let machine = machine();
    let mut status = long_position(&machine);
    machine.on_price(&mut status, 100.30, t0());
    let frozen = status.current_breakeven;

    // Simulate the whole remainder sold out from under the tracker
    if let Some(cycle) = status.cycles.first_mut() {
        cycle.sold_quantity = 10.0;
    }
    assert_eq!(breakeven(&status), frozen);
}

#[test]
fn test_breakeven_properties() {
    let machine = machine();
    let mut status = long_position(&machine);

    // No cycles: breakeven is the entry price
    assert_eq!(breakeven(&status), 100.0);

    // Selling above entry strictly lowers a long's breakeven
    machine.on_price(&mut status, 100.30, t0());
    let after_sell = breakeven(&status);
    assert!(after_sell < 100.0);

    // Recomputing without new cycles is idempotent
    assert_eq!(breakeven(&status), after_sell);
}

#[test]
fn test_cycle_cap_sells_without_reentry() {
    let mut config = ReentryConfig::default();
    config.max_cycles = 1;
    let machine = ScalpReentryMachine::new(config).unwrap();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    machine.skip_reentry(&mut status, 1);

    let actions = machine.on_price(&mut status, 100.60, t0());
    assert!(matches!(
        actions[0],
        ReentryAction::SellPartial { tp_level: 2, .. }
    ));
    assert_eq!(status.cycles[1].state, ReentryState::Skipped);
    assert!(!status.next_tp_blocked);
    // The capped sell still reprices the inventory:
    // (1000 - 3 * 100.30 - 3.5 * 100.60) / 3.5
    assert!((status.current_breakeven - 347.0 / 3.5).abs() < 1e-9);
}

#[test]
fn test_runner_hold_share_drives_final_sell() {
    let mut config = ReentryConfig::default();
    config.runner_hold_percent = 40.0;
    config.tp_levels[2].sell_percent = 60.0;
    let machine = ScalpReentryMachine::new(config).unwrap();
    let mut status = long_position(&machine);

    machine.on_price(&mut status, 100.30, t0());
    machine.skip_reentry(&mut status, 1);
    machine.on_price(&mut status, 100.60, t0());
    machine.skip_reentry(&mut status, 2);
    let actions = machine.on_price(&mut status, 101.0, t0());

    // 3.5 remaining before TP3; a 40% hold keeps 1.4 for the runner
    assert!(actions.iter().any(|a| matches!(
        a,
        ReentryAction::SellPartial { tp_level: 3, quantity, .. } if (quantity - 2.1).abs() < 1e-9
    )));
    assert!(actions.iter().any(|a| matches!(
        a,
        ReentryAction::ActivateRunner { hold_quantity } if (hold_quantity - 1.4).abs() < 1e-9
    )));
    assert!((status.remaining_quantity - 1.4).abs() < 1e-9);
}

#[test]
fn test_config_rejects_bad_values() {
    let mut config = ReentryConfig::default();
    config.tp_levels[1] = TpLevelConfig {
        profit_percent: 0.2,
        sell_percent: 50.0,
    };
    assert!(config.validate().is_err());

    let mut config = ReentryConfig::default();
    config.tp_levels[0].sell_percent = 0.0;
    assert!(config.validate().is_err());

    let mut config = ReentryConfig::default();
    config.dynamic_sl_protect_percent = 70.0;
    assert!(config.validate().is_err());

    let mut config = ReentryConfig::default();
    config.reentry_percent = 120.0;
    assert!(config.validate().is_err());

    // Final TP sell and runner hold must cover the whole remainder
    let mut config = ReentryConfig::default();
    config.runner_hold_percent = 40.0;
    assert!(config.validate().is_err());

    let mut config = ReentryConfig::default();
    config.timeout_secs = 0;
    assert!(ScalpReentryMachine::new(config).is_err());
}

#[test]
fn test_init_rejects_non_directional_positions() {
    let machine = machine();
    assert!(machine
        .init("BTCUSDT", Direction::Neutral, 100.0, 1.0)
        .is_err());
    assert!(machine.init("BTCUSDT", Direction::Long, 0.0, 1.0).is_err());
    assert!(machine.init("BTCUSDT", Direction::Long, 100.0, 0.0).is_err());
}
