//! MILP construction: decision variables and constraints for grid, PV,
//! batteries, and controllable EV loads, assembled over a horizon.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::config::{AppConfig, TerminalSocMode};
use crate::domain::{
    ControlledEvLoad, CurtailmentMode, InverterConfig, LoadConfig, TimeWindowMatcher,
};
use crate::ems::alignment::{align_series, coverage_minutes};
use crate::ems::horizon::{floor_to_boundary, Horizon};
use crate::ems::weights;
use crate::error::PlannerError;
use crate::solver::{Cmp, LinExpr, LinearProgram, VarId};
use crate::sources::{PowerInterval, PriceInterval, SourceResolver};

/// Realtime EV state read at solve time.
#[derive(Debug, Clone, Copy)]
pub struct EvInputs {
    pub connected: bool,
    pub realtime_power_kw: f64,
    pub soc_pct: f64,
    pub can_connect: bool,
}

/// All resolver outputs of one invocation, fetched before the horizon is
/// built so the shortest forecast can bound it.
#[derive(Debug, Clone)]
pub struct ResolvedInputs {
    pub load_forecast: Vec<PowerInterval>,
    pub price_import_forecast: Vec<PriceInterval>,
    pub price_export_forecast: Vec<PriceInterval>,
    /// PV forecast per inverter id.
    pub pv_forecasts: BTreeMap<String, Vec<PowerInterval>>,
    pub realtime_load_kw: f64,
    pub realtime_price_import: f64,
    pub realtime_price_export: f64,
    /// Realtime PV per inverter id, where a sensor is configured.
    pub realtime_pv_kw: BTreeMap<String, f64>,
    /// Battery SoC percent per inverter id.
    pub battery_soc_pct: BTreeMap<String, f64>,
    pub evs: BTreeMap<String, EvInputs>,
    /// Shortest forecast coverage, minutes from the floored horizon start.
    pub coverage_minutes: i64,
    pub limiting_series: String,
}

/// Fetch and validate every input the plan depends on.
pub fn resolve_inputs(
    config: &AppConfig,
    resolver: &dyn SourceResolver,
    now: DateTime<Utc>,
) -> Result<ResolvedInputs, PlannerError> {
    let plant = &config.plant;
    let initial_step = config
        .ems
        .high_res()
        .map(|(step, _)| step)
        .unwrap_or(config.ems.timestep_minutes);
    let start = floor_to_boundary(now, config.ems.tz(), initial_step);

    let load_forecast = resolver.resolve_power_source(&plant.load.forecast)?;
    crate::sources::intervals::validate_series("load", &load_forecast)?;
    let price_import_forecast = resolver.resolve_price_forecast(&plant.grid.price_import_forecast)?;
    crate::sources::intervals::validate_series("price_import", &price_import_forecast)?;
    let price_export_forecast = resolver.resolve_price_forecast(&plant.grid.price_export_forecast)?;
    crate::sources::intervals::validate_series("price_export", &price_export_forecast)?;

    let mut coverage_by_series: BTreeMap<String, i64> = BTreeMap::new();
    coverage_by_series.insert("load".into(), coverage_minutes(start, &load_forecast));
    coverage_by_series.insert(
        "price_import".into(),
        coverage_minutes(start, &price_import_forecast),
    );
    coverage_by_series.insert(
        "price_export".into(),
        coverage_minutes(start, &price_export_forecast),
    );

    let mut pv_forecasts = BTreeMap::new();
    let mut realtime_pv_kw = BTreeMap::new();
    let mut battery_soc_pct = BTreeMap::new();
    for inverter in &plant.inverters {
        let series_name = format!("pv:{}", inverter.id);
        let pv = resolver.resolve_power_forecast(&inverter.pv.forecast)?;
        crate::sources::intervals::validate_series(&series_name, &pv)?;
        coverage_by_series.insert(series_name, coverage_minutes(start, &pv));
        pv_forecasts.insert(inverter.id.clone(), pv);

        if let Some(sensor) = &inverter.pv.realtime_power {
            realtime_pv_kw.insert(inverter.id.clone(), resolver.resolve_scalar(sensor)?);
        }
        if let Some(battery) = &inverter.battery {
            battery_soc_pct.insert(
                inverter.id.clone(),
                resolver.resolve_scalar(&battery.state_of_charge_pct)?,
            );
        }
    }

    let mut evs = BTreeMap::new();
    for load in &config.loads {
        let LoadConfig::ControlledEv(ev) = load;
        let can_connect = match &ev.can_connect {
            Some(sensor) => resolver.resolve_bool(sensor)?,
            None => true,
        };
        evs.insert(
            ev.id.clone(),
            EvInputs {
                connected: resolver.resolve_bool(&ev.connected)?,
                realtime_power_kw: resolver.resolve_scalar(&ev.realtime_power)?,
                soc_pct: resolver.resolve_scalar(&ev.state_of_charge_pct)?,
                can_connect,
            },
        );
    }

    let (limiting, min_coverage) = coverage_by_series
        .iter()
        .min_by_key(|(_, v)| **v)
        .map(|(k, v)| (k.clone(), *v))
        .unwrap_or_default();
    let summary = coverage_by_series
        .iter()
        .map(|(name, minutes)| format!("{name}={minutes}m"))
        .collect::<Vec<_>>()
        .join(", ");
    info!(limiting = %limiting, "forecast coverage: {summary}");

    Ok(ResolvedInputs {
        load_forecast,
        price_import_forecast,
        price_export_forecast,
        pv_forecasts,
        realtime_load_kw: resolver.resolve_scalar(&plant.load.realtime_load_power)?,
        realtime_price_import: resolver.resolve_scalar(&plant.grid.realtime_price_import)?,
        realtime_price_export: resolver.resolve_scalar(&plant.grid.realtime_price_export)?,
        realtime_pv_kw,
        battery_soc_pct,
        evs,
        coverage_minutes: min_coverage,
        limiting_series: limiting,
    })
}

/// Grid-side variables and aligned series.
#[derive(Debug)]
pub struct GridVars {
    pub p_import: Vec<VarId>,
    pub p_export: Vec<VarId>,
    pub import_violation: Vec<VarId>,
    pub price_import: Vec<f64>,
    pub price_export: Vec<f64>,
    pub import_allowed: Vec<bool>,
}

/// Battery variables behind one inverter.
#[derive(Debug)]
pub struct BatteryVars {
    pub capacity_kwh: f64,
    pub initial_soc_kwh: f64,
    pub charge_cost_per_kwh: f64,
    pub discharge_cost_per_kwh: f64,
    pub soc_value_per_kwh: Option<f64>,
    pub p_charge: Vec<VarId>,
    pub p_discharge: Vec<VarId>,
    /// Slot-boundary energies, length N+1.
    pub e_soc: Vec<VarId>,
    pub terminal_shortfall: Option<VarId>,
}

/// Per-inverter variables.
#[derive(Debug)]
pub struct InverterVars {
    pub id: String,
    pub name: String,
    pub p_pv: Vec<VarId>,
    pub p_ac_net: Vec<VarId>,
    pub curtail: Option<Vec<VarId>>,
    pub battery: Option<BatteryVars>,
}

/// Per-EV variables.
#[derive(Debug)]
pub struct EvVars {
    pub id: String,
    pub name: String,
    pub capacity_kwh: f64,
    pub connected: bool,
    pub p_charge: Vec<VarId>,
    /// Slot-boundary energies, length N+1.
    pub e_soc: Vec<VarId>,
    pub ramp: Vec<VarId>,
    pub anchor: Option<VarId>,
    /// `(segment var, reward per kWh)` in band order.
    pub incentive_segments: Vec<(VarId, f64)>,
    /// `(transition vars, penalty per switch)` when both the on/off binary
    /// and a switch penalty exist.
    pub switching: Option<(Vec<VarId>, f64)>,
    pub deadline_slack: Option<VarId>,
}

/// The assembled program plus everything extraction needs.
#[derive(Debug)]
pub struct MilpModel {
    pub lp: LinearProgram,
    pub grid: GridVars,
    pub inverters: Vec<InverterVars>,
    pub evs: Vec<EvVars>,
    pub base_load_kw: Vec<f64>,
}

pub struct MilpBuilder<'a> {
    config: &'a AppConfig,
    horizon: &'a Horizon,
    inputs: &'a ResolvedInputs,
}

impl<'a> MilpBuilder<'a> {
    pub fn new(config: &'a AppConfig, horizon: &'a Horizon, inputs: &'a ResolvedInputs) -> Self {
        Self {
            config,
            horizon,
            inputs,
        }
    }

    pub fn build(self) -> Result<MilpModel, PlannerError> {
        let mut lp = LinearProgram::new();

        let base_load_kw = align_series(
            self.horizon,
            &self.inputs.load_forecast,
            Some(self.inputs.realtime_load_kw),
            "load",
        )?;

        let grid = self.build_grid(&mut lp)?;
        let evs = self.build_loads(&mut lp)?;
        let inverters = self.build_inverters(&mut lp, &grid)?;
        self.build_ac_balance(&mut lp, &grid, &inverters, &evs, &base_load_kw);

        info!(
            variables = lp.num_variables(),
            binaries = lp.num_binaries(),
            constraints = lp.constraints.len(),
            slots = self.horizon.num_slots(),
            "MILP assembled"
        );

        Ok(MilpModel {
            lp,
            grid,
            inverters,
            evs,
            base_load_kw,
        })
    }

    fn build_grid(&self, lp: &mut LinearProgram) -> Result<GridVars, PlannerError> {
        let grid_cfg = &self.config.plant.grid;
        let n = self.horizon.num_slots();

        let price_import = align_series(
            self.horizon,
            &self.inputs.price_import_forecast,
            Some(self.inputs.realtime_price_import),
            "price_import",
        )?;
        let price_export = align_series(
            self.horizon,
            &self.inputs.price_export_forecast,
            Some(self.inputs.realtime_price_export),
            "price_export",
        )?;

        let matcher = TimeWindowMatcher;
        let import_allowed: Vec<bool> = (0..n)
            .map(|t| {
                !matcher.matches(
                    &grid_cfg.import_forbidden_periods,
                    &self.horizon.local_start(t),
                )
            })
            .collect();

        let mut p_import = Vec::with_capacity(n);
        let mut p_export = Vec::with_capacity(n);
        let mut import_violation = Vec::with_capacity(n);
        for t in 0..n {
            p_import.push(lp.add_continuous(
                format!("P_grid_import_t{t}"),
                0.0,
                grid_cfg.max_import_kw,
            ));
            p_export.push(lp.add_continuous(
                format!("P_grid_export_t{t}"),
                0.0,
                grid_cfg.max_export_kw,
            ));
            import_violation.push(lp.add_nonneg(format!("P_grid_import_violation_t{t}")));
        }

        for t in 0..n {
            let import_on = lp.add_binary(format!("Grid_import_on_t{t}"));

            // Exclusive import/export mode per slot.
            let mut excl_import = LinExpr::var(p_import[t]);
            excl_import.add_term(import_on, -grid_cfg.max_import_kw);
            lp.constrain(format!("grid_import_exclusive_t{t}"), excl_import, Cmp::Le, 0.0);

            let mut excl_export = LinExpr::var(p_export[t]);
            excl_export.add_term(import_on, grid_cfg.max_export_kw);
            lp.constrain(
                format!("grid_export_exclusive_t{t}"),
                excl_export,
                Cmp::Le,
                grid_cfg.max_export_kw,
            );

            // Forbidden windows zero the cap; only the penalized violation
            // variable can then satisfy the row, keeping the model feasible.
            let allowed_cap = if import_allowed[t] {
                grid_cfg.max_import_kw
            } else {
                0.0
            };
            let mut forbidden = LinExpr::var(p_import[t]);
            forbidden.add_term(import_violation[t], -1.0);
            lp.constrain(
                format!("grid_import_forbidden_t{t}"),
                forbidden,
                Cmp::Le,
                allowed_cap,
            );
        }

        Ok(GridVars {
            p_import,
            p_export,
            import_violation,
            price_import,
            price_export,
            import_allowed,
        })
    }

    fn build_inverters(
        &self,
        lp: &mut LinearProgram,
        grid: &GridVars,
    ) -> Result<Vec<InverterVars>, PlannerError> {
        let mut result = Vec::with_capacity(self.config.plant.inverters.len());
        for inverter in &self.config.plant.inverters {
            result.push(self.build_inverter(lp, grid, inverter)?);
        }
        Ok(result)
    }

    fn build_inverter(
        &self,
        lp: &mut LinearProgram,
        grid: &GridVars,
        inverter: &InverterConfig,
    ) -> Result<InverterVars, PlannerError> {
        let n = self.horizon.num_slots();
        let inv_id = &inverter.id;
        let pv_intervals = self
            .inputs
            .pv_forecasts
            .get(inv_id)
            .ok_or_else(|| PlannerError::ConfigInvalid(format!("missing PV forecast for '{inv_id}'")))?;

        let pv_available = align_series(
            self.horizon,
            pv_intervals,
            self.inputs.realtime_pv_kw.get(inv_id).copied(),
            &format!("pv:{inv_id}"),
        )?;
        // Clamp to the inverter envelope to keep PV generation feasible.
        let pv_available: Vec<f64> = pv_available
            .iter()
            .map(|v| v.clamp(0.0, inverter.peak_power_kw))
            .collect();

        let mut p_pv = Vec::with_capacity(n);
        let mut p_ac_net = Vec::with_capacity(n);
        for t in 0..n {
            p_pv.push(lp.add_continuous(
                format!("P_pv_{inv_id}_t{t}"),
                0.0,
                inverter.peak_power_kw,
            ));
            p_ac_net.push(lp.add_continuous(
                format!("P_inv_{inv_id}_ac_net_t{t}"),
                -inverter.peak_power_kw,
                inverter.peak_power_kw,
            ));
        }

        let curtail = match inverter.curtailment {
            CurtailmentMode::None => {
                for t in 0..n {
                    lp.constrain(
                        format!("inverter_pv_total_{inv_id}_t{t}"),
                        LinExpr::var(p_pv[t]),
                        Cmp::Eq,
                        pv_available[t],
                    );
                }
                None
            }
            CurtailmentMode::Binary => {
                let mut curtail = Vec::with_capacity(n);
                for t in 0..n {
                    let c = lp.add_binary(format!("Curtail_{inv_id}_t{t}"));
                    // Full PV or fully off.
                    let mut row = LinExpr::var(p_pv[t]);
                    row.add_term(c, pv_available[t]);
                    lp.constrain(
                        format!("inverter_pv_binary_{inv_id}_t{t}"),
                        row,
                        Cmp::Eq,
                        pv_available[t],
                    );
                    curtail.push(c);
                }
                Some(curtail)
            }
            CurtailmentMode::LoadAware => {
                let mut curtail = Vec::with_capacity(n);
                for t in 0..n {
                    let c = lp.add_binary(format!("Curtail_{inv_id}_t{t}"));
                    lp.constrain(
                        format!("inverter_pv_max_{inv_id}_t{t}"),
                        LinExpr::var(p_pv[t]),
                        Cmp::Le,
                        pv_available[t],
                    );
                    // Uncurtailed PV must run at the forecast; curtailed PV
                    // may follow the load but then export is blocked.
                    let mut floor = LinExpr::var(p_pv[t]);
                    floor.add_term(c, pv_available[t]);
                    lp.constrain(
                        format!("inverter_pv_floor_{inv_id}_t{t}"),
                        floor,
                        Cmp::Ge,
                        pv_available[t],
                    );
                    let grid_cfg = &self.config.plant.grid;
                    let mut export_block = LinExpr::var(grid.p_export[t]);
                    export_block.add_term(c, grid_cfg.max_export_kw);
                    lp.constrain(
                        format!("curtail_export_block_{inv_id}_t{t}"),
                        export_block,
                        Cmp::Le,
                        grid_cfg.max_export_kw,
                    );
                    curtail.push(c);
                }
                Some(curtail)
            }
        };

        let battery = match &inverter.battery {
            None => {
                for t in 0..n {
                    // Net AC flow equals PV output when no battery.
                    let mut row = LinExpr::var(p_ac_net[t]);
                    row.add_term(p_pv[t], -1.0);
                    lp.constrain(format!("inverter_ac_net_{inv_id}_t{t}"), row, Cmp::Eq, 0.0);
                }
                None
            }
            Some(battery_cfg) => Some(self.build_battery(
                lp,
                grid,
                inverter,
                battery_cfg,
                &p_pv,
                &p_ac_net,
            )?),
        };

        Ok(InverterVars {
            id: inverter.id.clone(),
            name: inverter.name.clone(),
            p_pv,
            p_ac_net,
            curtail,
            battery,
        })
    }

    fn build_battery(
        &self,
        lp: &mut LinearProgram,
        grid: &GridVars,
        inverter: &InverterConfig,
        battery: &crate::domain::BatteryConfig,
        p_pv: &[VarId],
        p_ac_net: &[VarId],
    ) -> Result<BatteryVars, PlannerError> {
        let n = self.horizon.num_slots();
        let inv_id = &inverter.id;
        let grid_cfg = &self.config.plant.grid;

        let charge_limit = battery.max_charge_kw.unwrap_or(inverter.peak_power_kw);
        let discharge_limit = battery
            .max_discharge_kw
            .unwrap_or(inverter.peak_power_kw)
            .min(inverter.peak_power_kw);

        let soc_min = battery.min_soc_kwh();
        let soc_max = battery.max_soc_kwh();
        let reserve = battery.reserve_kwh();
        let efficiency = battery.storage_efficiency();

        let soc_pct = self
            .inputs
            .battery_soc_pct
            .get(inv_id)
            .copied()
            .ok_or_else(|| {
                PlannerError::ConfigInvalid(format!("missing battery SoC for '{inv_id}'"))
            })?;
        let raw_initial = battery.capacity_kwh * soc_pct / 100.0;
        let initial_soc_kwh = raw_initial.clamp(soc_min, soc_max);
        if (initial_soc_kwh - raw_initial).abs() > 1e-9 {
            warn!(
                inverter = %inv_id,
                reported = raw_initial,
                clamped = initial_soc_kwh,
                "battery SoC outside configured bounds, clamping"
            );
        }

        let mut p_charge = Vec::with_capacity(n);
        let mut p_discharge = Vec::with_capacity(n);
        for t in 0..n {
            p_charge.push(lp.add_continuous(
                format!("P_batt_{inv_id}_charge_t{t}"),
                0.0,
                charge_limit,
            ));
            p_discharge.push(lp.add_continuous(
                format!("P_batt_{inv_id}_discharge_t{t}"),
                0.0,
                discharge_limit,
            ));
        }
        // SoC lives on slot boundaries: N+1 points for N slots.
        let e_soc: Vec<VarId> = (0..=n)
            .map(|i| lp.add_continuous(format!("E_batt_{inv_id}_{i}"), soc_min, soc_max))
            .collect();

        lp.constrain(
            format!("batt_soc_initial_{inv_id}"),
            LinExpr::var(e_soc[0]),
            Cmp::Eq,
            initial_soc_kwh,
        );

        let terminal_shortfall = match self.config.ems.terminal_soc.mode {
            TerminalSocMode::Adaptive => {
                let target =
                    terminal_soc_target_kwh(self.horizon, initial_soc_kwh, reserve);
                let shortfall = lp.add_nonneg(format!("E_batt_{inv_id}_terminal_shortfall"));
                let mut row = LinExpr::var(e_soc[n]);
                row.add_term(shortfall, 1.0);
                lp.constrain(format!("batt_soc_terminal_{inv_id}"), row, Cmp::Ge, target);
                Some(shortfall)
            }
            TerminalSocMode::Hard => {
                lp.constrain(
                    format!("batt_soc_terminal_{inv_id}"),
                    LinExpr::var(e_soc[n]),
                    Cmp::Ge,
                    initial_soc_kwh,
                );
                None
            }
        };

        // Export gate only bites when the reserve sits above the SoC floor.
        let export_gated = reserve > soc_min;
        let export_soc_m = soc_max - soc_min;

        for t in 0..n {
            let charge_mode = lp.add_binary(format!("Batt_{inv_id}_charge_mode_t{t}"));

            // Charge or discharge per slot; idle allowed in either mode.
            let mut charge_cap = LinExpr::var(p_charge[t]);
            charge_cap.add_term(charge_mode, -charge_limit);
            lp.constrain(format!("batt_charge_limit_{inv_id}_t{t}"), charge_cap, Cmp::Le, 0.0);

            let mut discharge_cap = LinExpr::var(p_discharge[t]);
            discharge_cap.add_term(charge_mode, discharge_limit);
            lp.constrain(
                format!("batt_discharge_limit_{inv_id}_t{t}"),
                discharge_cap,
                Cmp::Le,
                discharge_limit,
            );

            // Net AC flow combines PV and battery charge/discharge.
            let mut ac_net = LinExpr::var(p_ac_net[t]);
            ac_net
                .add_term(p_pv[t], -1.0)
                .add_term(p_discharge[t], -1.0)
                .add_term(p_charge[t], 1.0);
            lp.constrain(format!("inverter_ac_net_{inv_id}_t{t}"), ac_net, Cmp::Eq, 0.0);

            // SoC step with charge-side efficiency: losses land on the way
            // in, so stored energy discharges at face value.
            let dt = self.horizon.dt_hours(t);
            let mut step = LinExpr::var(e_soc[t + 1]);
            step.add_term(e_soc[t], -1.0)
                .add_term(p_charge[t], -efficiency * dt)
                .add_term(p_discharge[t], dt);
            lp.constrain(format!("batt_soc_step_{inv_id}_t{t}"), step, Cmp::Eq, 0.0);

            if export_gated {
                let export_ok = lp.add_binary(format!("Export_ok_{inv_id}_t{t}"));
                // Grid export requires the battery above reserve across the
                // whole slot, not just at its start.
                for (tag, boundary) in [("start", e_soc[t]), ("end", e_soc[t + 1])] {
                    let mut row = LinExpr::var(boundary);
                    row.add_term(export_ok, -export_soc_m);
                    lp.constrain(
                        format!("batt_export_reserve_{tag}_{inv_id}_t{t}"),
                        row,
                        Cmp::Ge,
                        reserve - export_soc_m,
                    );
                }
                let mut gate = LinExpr::var(grid.p_export[t]);
                gate.add_term(export_ok, -grid_cfg.max_export_kw);
                lp.constrain(format!("grid_export_reserve_{inv_id}_t{t}"), gate, Cmp::Le, 0.0);
            }
        }

        Ok(BatteryVars {
            capacity_kwh: battery.capacity_kwh,
            initial_soc_kwh,
            charge_cost_per_kwh: battery.charge_cost_per_kwh,
            discharge_cost_per_kwh: battery.discharge_cost_per_kwh,
            soc_value_per_kwh: battery.soc_value_per_kwh,
            p_charge,
            p_discharge,
            e_soc,
            terminal_shortfall,
        })
    }

    fn build_loads(&self, lp: &mut LinearProgram) -> Result<Vec<EvVars>, PlannerError> {
        let mut evs = Vec::new();
        for load in &self.config.loads {
            let LoadConfig::ControlledEv(ev) = load;
            evs.push(self.build_controlled_ev(lp, ev)?);
        }
        Ok(evs)
    }

    fn build_controlled_ev(
        &self,
        lp: &mut LinearProgram,
        ev: &ControlledEvLoad,
    ) -> Result<EvVars, PlannerError> {
        let n = self.horizon.num_slots();
        let ev_id = &ev.id;
        let state = self
            .inputs
            .evs
            .get(ev_id)
            .copied()
            .ok_or_else(|| PlannerError::ConfigInvalid(format!("missing EV state for '{ev_id}'")))?;

        let capacity = ev.capacity_kwh;
        let initial_soc_kwh = (capacity * state.soc_pct / 100.0).clamp(0.0, capacity);

        let allowed = self.ev_connection_allowance(ev, state.connected, state.can_connect);

        let mut p_charge = Vec::with_capacity(n);
        for t in 0..n {
            let upper = if allowed[t] { ev.max_power_kw } else { 0.0 };
            p_charge.push(lp.add_continuous(format!("P_ev_{ev_id}_charge_t{t}"), 0.0, upper));
        }
        let e_soc: Vec<VarId> = (0..=n)
            .map(|i| lp.add_continuous(format!("E_ev_{ev_id}_{i}"), 0.0, capacity))
            .collect();

        lp.constrain(
            format!("ev_soc_initial_{ev_id}"),
            LinExpr::var(e_soc[0]),
            Cmp::Eq,
            initial_soc_kwh,
        );

        // Charging is {0} ∪ [min, max] when a minimum power is configured.
        let mut on_vars: Option<Vec<VarId>> = None;
        if ev.min_power_kw > 0.0 {
            let mut ons = Vec::with_capacity(n);
            for t in 0..n {
                let on = lp.add_binary(format!("Ev_{ev_id}_charge_on_t{t}"));
                if !allowed[t] {
                    lp.constrain(
                        format!("ev_charge_on_connected_{ev_id}_t{t}"),
                        LinExpr::var(on),
                        Cmp::Le,
                        0.0,
                    );
                }
                let mut min_row = LinExpr::var(p_charge[t]);
                min_row.add_term(on, -ev.min_power_kw);
                lp.constrain(format!("ev_charge_min_{ev_id}_t{t}"), min_row, Cmp::Ge, 0.0);
                let mut max_row = LinExpr::var(p_charge[t]);
                max_row.add_term(on, -ev.max_power_kw);
                lp.constrain(format!("ev_charge_max_{ev_id}_t{t}"), max_row, Cmp::Le, 0.0);
                ons.push(on);
            }
            on_vars = Some(ons);
        }

        let mut ramp = Vec::with_capacity(n);
        for t in 0..n {
            ramp.push(lp.add_nonneg(format!("Ev_{ev_id}_ramp_t{t}")));
        }
        lp.constrain(
            format!("ev_charge_ramp_init_{ev_id}"),
            LinExpr::var(ramp[0]),
            Cmp::Eq,
            0.0,
        );

        for t in 0..n {
            if t > 0 {
                let mut up = LinExpr::var(ramp[t]);
                up.add_term(p_charge[t], -1.0).add_term(p_charge[t - 1], 1.0);
                lp.constrain(format!("ev_charge_ramp_up_{ev_id}_t{t}"), up, Cmp::Ge, 0.0);
                let mut down = LinExpr::var(ramp[t]);
                down.add_term(p_charge[t], 1.0).add_term(p_charge[t - 1], -1.0);
                lp.constrain(format!("ev_charge_ramp_down_{ev_id}_t{t}"), down, Cmp::Ge, 0.0);
            }

            // Charge-only SoC dynamics.
            let dt = self.horizon.dt_hours(t);
            let mut step = LinExpr::var(e_soc[t + 1]);
            step.add_term(e_soc[t], -1.0).add_term(p_charge[t], -dt);
            lp.constrain(format!("ev_soc_step_{ev_id}_t{t}"), step, Cmp::Eq, 0.0);
        }

        // Soft anchor to the realtime charge power for slot 0; dropped when
        // the charger is effectively idle.
        let anchor = if state.realtime_power_kw.abs() >= weights::EV_ANCHOR_ACTIVE_THRESHOLD_KW {
            let a = lp.add_nonneg(format!("Ev_{ev_id}_anchor"));
            let mut up = LinExpr::var(a);
            up.add_term(p_charge[0], -1.0);
            lp.constrain(
                format!("ev_anchor_up_{ev_id}"),
                up,
                Cmp::Ge,
                -state.realtime_power_kw,
            );
            let mut down = LinExpr::var(a);
            down.add_term(p_charge[0], 1.0);
            lp.constrain(
                format!("ev_anchor_down_{ev_id}"),
                down,
                Cmp::Ge,
                state.realtime_power_kw,
            );
            Some(a)
        } else {
            None
        };

        let switching = match (on_vars.as_ref(), ev.switch_penalty) {
            (Some(ons), Some(penalty)) if penalty > 0.0 => {
                let mut switches = Vec::with_capacity(n.saturating_sub(1));
                for t in 1..n {
                    let s = lp.add_nonneg(format!("Ev_{ev_id}_switch_t{t}"));
                    let mut up = LinExpr::var(s);
                    up.add_term(ons[t], -1.0).add_term(ons[t - 1], 1.0);
                    lp.constrain(format!("ev_switch_up_{ev_id}_t{t}"), up, Cmp::Ge, 0.0);
                    let mut down = LinExpr::var(s);
                    down.add_term(ons[t], 1.0).add_term(ons[t - 1], -1.0);
                    lp.constrain(format!("ev_switch_down_{ev_id}_t{t}"), down, Cmp::Ge, 0.0);
                    switches.push(s);
                }
                Some((switches, penalty))
            }
            _ => None,
        };

        let deadline_slack = match &ev.deadline_target {
            Some(deadline) => self.build_ev_deadline(lp, ev, deadline, &e_soc)?,
            None => None,
        };

        let incentive_segments = self.build_ev_incentives(lp, ev, e_soc[n]);

        Ok(EvVars {
            id: ev.id.clone(),
            name: ev.name.clone(),
            capacity_kwh: capacity,
            connected: state.connected,
            p_charge,
            e_soc,
            ramp,
            anchor,
            incentive_segments,
            switching,
            deadline_slack,
        })
    }

    /// Per-slot charge permission: connected EVs may always charge; a
    /// disconnected EV may be assumed to connect after the grace period,
    /// inside its allowed connect windows.
    fn ev_connection_allowance(
        &self,
        ev: &ControlledEvLoad,
        connected: bool,
        can_connect: bool,
    ) -> Vec<bool> {
        let n = self.horizon.num_slots();
        if connected {
            return vec![true; n];
        }
        if !can_connect {
            return vec![false; n];
        }
        let grace_end =
            self.horizon.now + Duration::minutes(i64::from(ev.connect_grace_minutes));
        let matcher = TimeWindowMatcher;
        (0..n)
            .map(|t| {
                let slot_start = self.horizon.slots[t].start;
                slot_start >= grace_end
                    && matcher.allows(&ev.allowed_connect_times, &self.horizon.local_start(t))
            })
            .collect()
    }

    /// Piecewise terminal-SoC reward bands. A trailing zero-reward segment
    /// absorbs capacity above the final band so the segment sum can always
    /// match the terminal SoC.
    fn build_ev_incentives(
        &self,
        lp: &mut LinearProgram,
        ev: &ControlledEvLoad,
        terminal_soc: VarId,
    ) -> Vec<(VarId, f64)> {
        if ev.soc_incentives.is_empty() {
            return Vec::new();
        }
        let ev_id = &ev.id;
        let capacity = ev.capacity_kwh;
        let mut segments = Vec::new();
        let mut prev_target_kwh = 0.0;

        for (idx, incentive) in ev.soc_incentives.iter().enumerate() {
            let target_kwh = capacity * incentive.target_soc_pct / 100.0;
            let band = target_kwh - prev_target_kwh;
            let seg = lp.add_continuous(format!("E_ev_{ev_id}_incentive_{idx}"), 0.0, band);
            segments.push((seg, incentive.incentive));
            prev_target_kwh = target_kwh;
        }
        let final_band = (capacity - prev_target_kwh).max(0.0);
        if final_band > 0.0 {
            let seg =
                lp.add_continuous(format!("E_ev_{ev_id}_incentive_final"), 0.0, final_band);
            segments.push((seg, 0.0));
        }

        let mut total = LinExpr::new();
        for (seg, _) in &segments {
            total.add_term(*seg, 1.0);
        }
        total.add_term(terminal_soc, -1.0);
        lp.constrain(format!("ev_incentive_total_{ev_id}"), total, Cmp::Eq, 0.0);
        segments
    }

    /// Soft deadline: energy must reach the target at the first slot
    /// boundary at or after the local deadline time. Skipped when the
    /// deadline falls beyond the horizon.
    fn build_ev_deadline(
        &self,
        lp: &mut LinearProgram,
        ev: &ControlledEvLoad,
        deadline: &crate::domain::EvDeadlineTarget,
        e_soc: &[VarId],
    ) -> Result<Option<VarId>, PlannerError> {
        let (hour, minute) = deadline
            .by
            .split_once(':')
            .and_then(|(h, m)| Some((h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)))
            .ok_or_else(|| {
                PlannerError::ConfigInvalid(format!(
                    "EV '{}': deadline '{}' is not HH:MM",
                    ev.id, deadline.by
                ))
            })?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            PlannerError::ConfigInvalid(format!(
                "EV '{}': deadline '{}' out of range",
                ev.id, deadline.by
            ))
        })?;

        let tz = self.horizon.tz;
        let local_now = self.horizon.now.with_timezone(&tz);
        let mut candidate = local_now.date_naive().and_time(time);
        if candidate <= local_now.naive_local() {
            candidate += Duration::days(1);
        }
        let Some(deadline_utc) = tz
            .from_local_datetime(&candidate)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
        else {
            return Ok(None);
        };

        if deadline_utc > self.horizon.end() {
            return Ok(None);
        }
        // First boundary at or after the deadline; boundary i is the start
        // of slot i, boundary N the horizon end.
        let boundary = self
            .horizon
            .slots
            .iter()
            .position(|slot| slot.start >= deadline_utc)
            .unwrap_or(self.horizon.num_slots());

        let target_kwh = ev.capacity_kwh * deadline.target_soc_pct / 100.0;
        let slack = lp.add_nonneg(format!("E_ev_{}_deadline_shortfall", ev.id));
        let mut row = LinExpr::var(e_soc[boundary]);
        row.add_term(slack, 1.0);
        lp.constrain(
            format!("ev_deadline_{}", ev.id),
            row,
            Cmp::Ge,
            target_kwh,
        );
        Ok(Some(slack))
    }

    fn build_ac_balance(
        &self,
        lp: &mut LinearProgram,
        grid: &GridVars,
        inverters: &[InverterVars],
        evs: &[EvVars],
        base_load_kw: &[f64],
    ) {
        for t in 0..self.horizon.num_slots() {
            let mut balance = LinExpr::var(grid.p_import[t]);
            for inverter in inverters {
                balance.add_term(inverter.p_ac_net[t], 1.0);
            }
            balance.add_term(grid.p_export[t], -1.0);
            for ev in evs {
                balance.add_term(ev.p_charge[t], -1.0);
            }
            lp.constrain(format!("ac_balance_t{t}"), balance, Cmp::Eq, base_load_kw[t]);
        }
    }
}

/// Adaptive terminal-SoC strength: full at the 24 h reference horizon,
/// relaxing for both shorter and longer horizons.
pub(crate) fn terminal_soc_return_ratio(horizon: &Horizon) -> f64 {
    let horizon_minutes = horizon.duration_minutes() as f64;
    if horizon_minutes <= 0.0 {
        return 1.0;
    }
    let reference = weights::TERMINAL_SOC_REFERENCE_MINUTES;
    horizon_minutes.min(reference) / horizon_minutes.max(reference)
}

pub(crate) fn terminal_soc_target_kwh(
    horizon: &Horizon,
    initial_soc_kwh: f64,
    reserve_kwh: f64,
) -> f64 {
    let ratio = terminal_soc_return_ratio(horizon);
    let floor_kwh = initial_soc_kwh.min(reserve_kwh);
    floor_kwh + ratio * (initial_soc_kwh - floor_kwh)
}
