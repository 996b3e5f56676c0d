//! Objective assembly: economic cost plus operator-preference terms.
//!
//! Every tie-breaker constant lives in [`crate::ems::weights`] and is sized
//! so it can never reverse a strictly economic decision.

use crate::config::{AppConfig, PriceStatistic, TerminalSocPenalty};
use crate::ems::builder::{terminal_soc_return_ratio, EvVars, GridVars, InverterVars, MilpModel};
use crate::ems::horizon::Horizon;
use crate::ems::weights;
use crate::solver::LinExpr;

/// Add the full minimization objective to the model's program.
pub fn apply(model: &mut MilpModel, config: &AppConfig, horizon: &Horizon) {
    let bias = config.plant.grid.price_bias();
    let mut objective = LinExpr::new();

    grid_terms(&mut objective, &model.grid, horizon, bias);
    for inverter in &model.inverters {
        battery_terms(&mut objective, inverter, horizon);
    }
    terminal_penalty_terms(&mut objective, model, config, horizon);
    for ev in &model.evs {
        ev_terms(&mut objective, ev, bias);
    }

    model.lp.minimize(&objective);
}

fn grid_terms(objective: &mut LinExpr, grid: &GridVars, horizon: &Horizon, bias: f64) {
    for t in horizon.t_range() {
        let dt = horizon.dt_hours(t);

        // Energy cost: biased import price minus effective export revenue.
        // A tariff of exactly zero still earns a tiny bonus so surplus is
        // exported rather than curtailed.
        let import_price = grid.price_import[t] * (1.0 + bias);
        let export_price = if grid.price_export[t].abs() <= weights::PRICE_EPSILON {
            weights::EXPORT_ZERO_PRICE_BONUS
        } else {
            grid.price_export[t] * (1.0 - bias)
        };
        objective.add_term(grid.p_import[t], import_price * dt);
        objective.add_term(grid.p_export[t], -export_price * dt);

        // Forbidden-import slack.
        objective.add_term(
            grid.import_violation[t],
            weights::IMPORT_VIOLATION_WEIGHT * dt,
        );

        // Early-flow tie-breaker for ordering stability.
        let early = weights::EARLY_FLOW_TIE_BREAKER / (t as f64 + 1.0);
        objective.add_term(grid.p_import[t], -early);
        objective.add_term(grid.p_export[t], -early);
    }
}

fn battery_terms(objective: &mut LinExpr, inverter: &InverterVars, horizon: &Horizon) {
    let Some(battery) = &inverter.battery else {
        return;
    };
    let n = horizon.num_slots();

    for t in horizon.t_range() {
        let dt = horizon.dt_hours(t);
        // Wear costs per kWh of throughput. Efficiency losses already live
        // in the SoC dynamics.
        if battery.charge_cost_per_kwh > 0.0 {
            objective.add_term(battery.p_charge[t], battery.charge_cost_per_kwh * dt);
        }
        if battery.discharge_cost_per_kwh > 0.0 {
            objective.add_term(battery.p_discharge[t], battery.discharge_cost_per_kwh * dt);
        }
        // Time-weighted throughput tie-breaker stabilizing dispatch order.
        let timing = weights::BATTERY_TIMING_TIE_BREAKER * (t as f64 + 1.0) * dt;
        objective.add_term(battery.p_charge[t], timing);
        objective.add_term(battery.p_discharge[t], timing);
    }

    // Reward stored energy at horizon end.
    if let Some(value) = battery.soc_value_per_kwh {
        if value > 0.0 {
            objective.add_term(battery.e_soc[n], -value);
        }
    }
}

fn terminal_penalty_terms(
    objective: &mut LinExpr,
    model: &MilpModel,
    config: &AppConfig,
    horizon: &Horizon,
) {
    let penalty_per_kwh = match config.ems.terminal_soc.penalty_per_kwh {
        TerminalSocPenalty::Fixed(value) => value,
        TerminalSocPenalty::Statistic(PriceStatistic::Median) => median(&model.grid.price_import),
        TerminalSocPenalty::Statistic(PriceStatistic::Mean) => mean(&model.grid.price_import),
    };
    let penalty = penalty_per_kwh.max(0.0) * terminal_soc_return_ratio(horizon);
    if penalty <= 0.0 {
        return;
    }
    for inverter in &model.inverters {
        if let Some(shortfall) = inverter.battery.as_ref().and_then(|b| b.terminal_shortfall) {
            objective.add_term(shortfall, penalty);
        }
    }
}

fn ev_terms(objective: &mut LinExpr, ev: &EvVars, bias: f64) {
    // Terminal-SoC incentives compete with export revenue, so they carry the
    // same bias: an 8c incentive ties with an 8c export tariff.
    for (segment, reward) in &ev.incentive_segments {
        if reward.abs() <= 1e-12 {
            continue;
        }
        objective.add_term(*segment, -reward * (1.0 - bias));
    }

    for (t, ramp) in ev.ramp.iter().enumerate() {
        if t > 0 {
            objective.add_term(*ramp, weights::EV_RAMP_PENALTY);
        }
    }

    if let Some(anchor) = ev.anchor {
        objective.add_term(anchor, weights::EV_ANCHOR_PENALTY);
    }

    if let Some((switches, penalty)) = &ev.switching {
        for switch in switches {
            objective.add_term(*switch, *penalty);
        }
    }

    if let Some(slack) = ev.deadline_slack {
        objective.add_term(slack, weights::IMPORT_VIOLATION_WEIGHT);
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}
