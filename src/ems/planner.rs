//! Planner orchestration: resolve inputs, build the horizon and the MILP,
//! solve, and flatten the solution into the plan document.
//!
//! A planning invocation is a pure transformation of `(config, resolved
//! inputs, now)`; nothing survives between invocations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::AppConfig;
use crate::ems::builder::{resolve_inputs, MilpBuilder, MilpModel};
use crate::ems::horizon::{build_horizon, Horizon};
use crate::ems::objective;
use crate::ems::plan::{round3, Plan, PlanCapacities, PlanSlot};
use crate::error::PlannerError;
use crate::solver::cbc::CbcSolver;
use crate::solver::{LpSolution, MilpSolver, SolverFailure};
use crate::sources::SourceResolver;

/// Cooperative cancellation handle. Checked before the solver is invoked;
/// the solver call itself is atomic from the planner's viewpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Produce a plan for `now` against the injected resolver and solver.
pub fn plan(
    config: &AppConfig,
    now: DateTime<Utc>,
    resolver: &dyn SourceResolver,
    solver: &dyn MilpSolver,
    cancel: &CancelToken,
) -> Result<Plan, PlannerError> {
    config.validate_semantics()?;

    let inputs = resolve_inputs(config, resolver, now)?;
    let horizon = build_horizon(now, &config.ems, inputs.coverage_minutes).map_err(|err| {
        match err {
            PlannerError::ForecastCoverageTooShort {
                coverage_minutes,
                min_horizon_minutes,
                ..
            } => PlannerError::ForecastCoverageTooShort {
                coverage_minutes,
                min_horizon_minutes,
                limiting: inputs.limiting_series.clone(),
            },
            other => other,
        }
    })?;

    let build_start = Instant::now();
    let mut model = MilpBuilder::new(config, &horizon, &inputs).build()?;
    objective::apply(&mut model, config, &horizon);
    let build_seconds = build_start.elapsed().as_secs_f64();

    if cancel.is_cancelled() {
        return Err(PlannerError::Cancelled);
    }

    let solve_start = Instant::now();
    let solution = solver.solve(&model.lp).map_err(|err| match err {
        SolverFailure::Infeasible => PlannerError::SolverInfeasible,
        SolverFailure::Unbounded => PlannerError::SolverError("problem is unbounded".into()),
        SolverFailure::Backend(message) => PlannerError::SolverError(message),
    })?;
    let solve_seconds = solve_start.elapsed().as_secs_f64();

    info!(
        build_seconds,
        solve_seconds,
        slots = horizon.num_slots(),
        "plan solved"
    );

    Ok(extract_plan(&model, &horizon, &solution, now))
}

/// Single-shot solve with the CBC backend and no cancellation.
pub fn solve_once(
    config: &AppConfig,
    resolver: &dyn SourceResolver,
    now: DateTime<Utc>,
) -> Result<Plan, PlannerError> {
    plan(config, now, resolver, &CbcSolver::new(), &CancelToken::new())
}

fn extract_plan(
    model: &MilpModel,
    horizon: &Horizon,
    solution: &LpSolution,
    generated_at: DateTime<Utc>,
) -> Plan {
    let mut capacities = PlanCapacities::default();
    for inverter in &model.inverters {
        if let Some(battery) = &inverter.battery {
            capacities
                .batteries
                .insert(inverter.id.clone(), round3(battery.capacity_kwh));
        }
    }
    for ev in &model.evs {
        capacities.evs.insert(ev.id.clone(), round3(ev.capacity_kwh));
    }

    let mut cumulative_cost = 0.0;
    let mut slots = Vec::with_capacity(horizon.num_slots());
    for (t, slot) in horizon.slots.iter().enumerate() {
        let dt = slot.duration_h();
        let import_kw = solution.value(model.grid.p_import[t]);
        let export_kw = solution.value(model.grid.p_export[t]);
        let violation_kw = solution.value(model.grid.import_violation[t]);
        let price_import = model.grid.price_import[t];
        let price_export = model.grid.price_export[t];
        let segment_cost = (import_kw * price_import - export_kw * price_export) * dt;
        cumulative_cost += segment_cost;

        let mut pv_inverters = BTreeMap::new();
        let mut curtail_inverters = BTreeMap::new();
        let mut pv_total = 0.0;
        let mut ac_net_total = 0.0;
        let mut battery_charge = 0.0;
        let mut battery_discharge = 0.0;
        let mut battery_soc = 0.0;
        for inverter in &model.inverters {
            let pv = solution.value(inverter.p_pv[t]);
            pv_total += pv;
            pv_inverters.insert(inverter.id.clone(), round3(pv));
            ac_net_total += solution.value(inverter.p_ac_net[t]);
            if let Some(curtail) = &inverter.curtail {
                let flag = solution.value(curtail[t]) > 0.5;
                curtail_inverters.insert(inverter.id.clone(), u8::from(flag));
            }
            if let Some(battery) = &inverter.battery {
                battery_charge += solution.value(battery.p_charge[t]);
                battery_discharge += solution.value(battery.p_discharge[t]);
                battery_soc += solution.value(battery.e_soc[t]);
            }
        }

        let mut ev_charge = 0.0;
        let mut ev_soc = 0.0;
        for ev in &model.evs {
            ev_charge += solution.value(ev.p_charge[t]);
            ev_soc += solution.value(ev.e_soc[t]);
        }

        let load_kw = model.base_load_kw[t];
        let curtail_any = curtail_inverters.values().any(|flag| *flag == 1);

        slots.push(PlanSlot {
            index: t,
            start: slot.start,
            end: slot.end,
            duration_s: (slot.end - slot.start).num_seconds() as f64,
            grid_import_kw: round3(import_kw),
            grid_export_kw: round3(export_kw),
            grid_import_violation_kw: round3(violation_kw),
            grid_kw: round3(import_kw - export_kw),
            load_kw: round3(load_kw),
            load_total_kw: round3(load_kw + ev_charge),
            price_import: round3(price_import),
            price_export: round3(price_export),
            segment_cost: round3(segment_cost),
            cumulative_cost: round3(cumulative_cost),
            pv_kw: round3(pv_total),
            pv_inverters,
            battery_charge_kw: round3(battery_charge),
            battery_discharge_kw: round3(battery_discharge),
            battery_soc_kwh: round3(battery_soc),
            ev_charge_kw: round3(ev_charge),
            ev_soc_kwh: round3(ev_soc),
            inverter_ac_net_kw: round3(ac_net_total),
            curtail_inverters,
            curtail_any,
            import_allowed: model.grid.import_allowed[t],
        });
    }

    Plan {
        generated_at,
        status: solution.status,
        objective: round3(solution.objective),
        capacities,
        slots,
    }
}
