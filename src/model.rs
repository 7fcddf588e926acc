//! Snapshot records consumed by the planner and the plans it produces.
//!
//! Every amount is an integer count of minor currency units. Snapshots are read-only:
//! the planner never mutates them, and the plans it returns are owned by the caller.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::traits::DemandOracle;

/// Cash amount in minor currency units.
pub type Amount = i64;

/// A central vault holding cash and a vehicle fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub id: String,
    pub capacity: Amount,
    pub balance: Amount,
    /// Coordinates (lat, lng).
    pub location: (f64, f64),
    #[serde(default)]
    pub vehicle_ids: Vec<String>,
}

impl Vault {
    pub fn new(id: impl Into<String>, capacity: Amount, balance: Amount, location: (f64, f64)) -> Self {
        Self {
            id: id.into(),
            capacity,
            balance,
            location,
            vehicle_ids: Vec::new(),
        }
    }

    pub fn with_vehicle(mut self, vehicle_id: impl Into<String>) -> Self {
        self.vehicle_ids.push(vehicle_id.into());
        self
    }
}

/// An ATM to be kept stocked above its safety threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atm {
    pub id: String,
    pub capacity: Amount,
    pub balance: Amount,
    /// Cash that must remain after the forecast withdrawals.
    #[serde(default)]
    pub min_threshold: Amount,
    /// Coordinates (lat, lng).
    pub location: (f64, f64),
}

impl Atm {
    pub fn new(id: impl Into<String>, capacity: Amount, balance: Amount, location: (f64, f64)) -> Self {
        Self {
            id: id.into(),
            capacity,
            balance,
            min_threshold: 0,
            location,
        }
    }

    pub fn with_threshold(mut self, min_threshold: Amount) -> Self {
        self.min_threshold = min_threshold;
        self
    }

    /// Room left before the ATM is full.
    pub fn headroom(&self) -> Amount {
        (self.capacity - self.balance).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    #[default]
    Available,
    Assigned,
    InTransit,
}

/// An armoured vehicle based at a single vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub vault_id: String,
    pub capacity: Amount,
    #[serde(default = "default_cost_per_km")]
    pub cost_per_km: f64,
    #[serde(default)]
    pub status: VehicleStatus,
}

fn default_cost_per_km() -> f64 {
    2.0
}

impl Vehicle {
    pub fn new(id: impl Into<String>, vault_id: impl Into<String>, capacity: Amount) -> Self {
        Self {
            id: id.into(),
            vault_id: vault_id.into(),
            capacity,
            cost_per_km: default_cost_per_km(),
            status: VehicleStatus::Available,
        }
    }

    pub fn with_cost_per_km(mut self, cost_per_km: f64) -> Self {
        self.cost_per_km = cost_per_km;
        self
    }

    pub fn with_status(mut self, status: VehicleStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == VehicleStatus::Available
    }
}

/// Read-only view of vaults, ATMs and fleets at plan time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub vaults: Vec<Vault>,
    pub atms: Vec<Atm>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
}

impl Snapshot {
    pub fn new(vaults: Vec<Vault>, atms: Vec<Atm>, vehicles: Vec<Vehicle>) -> Self {
        Self { vaults, atms, vehicles }
    }

    pub fn total_vault_balance(&self) -> Amount {
        self.vaults.iter().map(|vault| vault.balance.max(0)).sum()
    }

    pub fn vault(&self, id: &str) -> Option<&Vault> {
        self.vaults.iter().find(|vault| vault.id == id)
    }

    pub fn atm(&self, id: &str) -> Option<&Atm> {
        self.atms.iter().find(|atm| atm.id == id)
    }

    pub fn vehicle(&self, id: &str) -> Option<&Vehicle> {
        self.vehicles.iter().find(|vehicle| vehicle.id == id)
    }

    /// Vehicles based at a vault, whatever their status.
    pub fn fleet_of<'a>(&'a self, vault_id: &'a str) -> impl Iterator<Item = &'a Vehicle> + 'a {
        self.vehicles.iter().filter(move |vehicle| vehicle.vault_id == vault_id)
    }
}

/// Forecast withdrawals per ATM per day, in minor currency units.
///
/// ATMs missing from the forecast are assumed to see no withdrawals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    daily: BTreeMap<String, Vec<f64>>,
}

impl DemandForecast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-day forecast for an ATM.
    pub fn with_demand(self, atm_id: impl Into<String>, demand: f64) -> Self {
        self.with_daily(atm_id, vec![demand])
    }

    pub fn with_daily(mut self, atm_id: impl Into<String>, daily: Vec<f64>) -> Self {
        self.daily.insert(atm_id.into(), daily);
        self
    }

    /// Pull a forecast for the given ATMs from an external oracle.
    pub fn from_oracle<'a, O>(oracle: &O, atm_ids: impl IntoIterator<Item = &'a String>, days: usize) -> Self
    where
        O: DemandOracle<AtmId = String>,
    {
        let daily = atm_ids
            .into_iter()
            .filter_map(|id| oracle.daily_demand(id, days).map(|values| (id.clone(), values)))
            .collect();
        Self { daily }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.daily.iter().map(|(id, values)| (id.as_str(), values.as_slice()))
    }

    /// Number of days covered by the longest series.
    pub fn horizon_len(&self) -> usize {
        self.daily.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Demand on a single day (0-based); zero past the end of the series.
    pub fn day(&self, atm_id: &str, day: usize) -> f64 {
        self.daily
            .get(atm_id)
            .and_then(|values| values.get(day))
            .copied()
            .unwrap_or(0.0)
    }

    /// Total demand over the first `days` days.
    pub fn demand_over(&self, atm_id: &str, days: usize) -> f64 {
        self.daily
            .get(atm_id)
            .map(|values| values.iter().take(days).sum())
            .unwrap_or(0.0)
    }
}

/// Allocation strategy, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Greedy,
    LinearCost,
    RollingHorizon,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Greedy => "greedy",
            Strategy::LinearCost => "linear_cost",
            Strategy::RollingHorizon => "rolling_horizon",
        };
        f.write_str(name)
    }
}

/// A single vault → ATM transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEdge {
    pub vault_id: String,
    pub atm_id: String,
    pub amount: Amount,
    /// Shortfall of the ATM before this plan.
    pub shortfall_before: Amount,
    pub distance_km: f64,
}

/// Informational conditions attached to plans. None of these are errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanNotice {
    /// Every vault is empty.
    NoSupply,
    /// No ATM has a shortfall.
    NothingToAllocate,
    /// Supply or capacity left part of the shortfall uncovered.
    UnderCovered { uncovered: Amount },
    /// The requested strategy failed and another one produced the plan.
    Degraded {
        requested: Strategy,
        used: Strategy,
        reason: String,
    },
    /// The time budget ran out; the plan is the best one found so far.
    TimeBudgetExhausted { strategy: Strategy },
    /// The distance provider returned an unusable matrix; great-circle distances were used.
    DistanceFallback { provider: String },
    /// The vault fleet could not carry everything; the rest is deferred.
    CapacityExceeded {
        vault_id: String,
        deferred: Amount,
        extra_trips: Option<usize>,
    },
}

/// Forward-looking allocation for a later day of a rolling horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryDay {
    /// Day offset from the plan day (1 = tomorrow).
    pub day: usize,
    pub edges: Vec<AllocationEdge>,
    pub uncovered: Amount,
}

/// Transfer plan produced by one allocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Strategy that actually produced the edges.
    pub strategy: Strategy,
    pub edges: Vec<AllocationEdge>,
    pub notices: Vec<PlanNotice>,
    pub total_shortfall: Amount,
    pub total_allocated: Amount,
    pub uncovered_shortfall: Amount,
    pub total_cost: f64,
    #[serde(default)]
    pub advisory: Vec<AdvisoryDay>,
}

impl AllocationPlan {
    pub fn empty(strategy: Strategy, notice: PlanNotice, total_shortfall: Amount) -> Self {
        Self {
            strategy,
            edges: Vec::new(),
            notices: vec![notice],
            total_shortfall,
            total_allocated: 0,
            uncovered_shortfall: total_shortfall,
            total_cost: 0.0,
            advisory: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn has_no_supply(&self) -> bool {
        self.notices.contains(&PlanNotice::NoSupply)
    }

    pub fn is_degraded(&self) -> bool {
        self.notices
            .iter()
            .any(|notice| matches!(notice, PlanNotice::Degraded { .. }))
    }

    pub fn outgoing_by_vault(&self) -> BTreeMap<&str, Amount> {
        let mut totals = BTreeMap::new();
        for edge in &self.edges {
            *totals.entry(edge.vault_id.as_str()).or_insert(0) += edge.amount;
        }
        totals
    }

    pub fn incoming_by_atm(&self) -> BTreeMap<&str, Amount> {
        let mut totals = BTreeMap::new();
        for edge in &self.edges {
            *totals.entry(edge.atm_id.as_str()).or_insert(0) += edge.amount;
        }
        totals
    }

    pub fn edges_from<'a>(&'a self, vault_id: &'a str) -> impl Iterator<Item = &'a AllocationEdge> + 'a {
        self.edges.iter().filter(move |edge| edge.vault_id == vault_id)
    }
}

/// Lifecycle of a route. The planner only ever emits `Planned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    #[default]
    Planned,
    Dispatched,
    InProgress,
    Completed,
    Failed,
}

impl RouteStatus {
    pub fn can_transition_to(self, next: RouteStatus) -> bool {
        matches!(
            (self, next),
            (RouteStatus::Planned, RouteStatus::Dispatched)
                | (RouteStatus::Dispatched, RouteStatus::InProgress)
                | (RouteStatus::InProgress, RouteStatus::Completed)
                | (RouteStatus::InProgress, RouteStatus::Failed)
        )
    }

    pub fn transition(self, next: RouteStatus) -> Result<RouteStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self, to: next })
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RouteStatus::Completed | RouteStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    /// 1-based position in the tour.
    pub sequence: usize,
    pub atm_id: String,
    pub amount: Amount,
    pub location: (f64, f64),
    pub distance_from_previous_km: f64,
}

/// Closed tour of one vehicle from its vault and back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub vehicle_id: String,
    pub vault_id: String,
    pub status: RouteStatus,
    pub stops: Vec<RouteStop>,
    pub load: Amount,
    pub capacity: Amount,
    pub utilization_pct: f64,
    pub total_distance_km: f64,
    pub total_cost: f64,
    pub estimated_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredDelivery {
    pub atm_id: String,
    pub amount: Amount,
}

/// Routes and deferred remainder for one vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultRoutes {
    pub vault_id: String,
    /// Total the allocation sends out of this vault.
    pub outgoing: Amount,
    pub delivered: Amount,
    pub deferred_total: Amount,
    pub routes: Vec<Route>,
    pub deferred: Vec<DeferredDelivery>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub vaults: Vec<VaultRoutes>,
    pub notices: Vec<PlanNotice>,
    pub total_distance_km: f64,
    pub total_cost: f64,
}

impl RoutePlan {
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.vaults.iter().flat_map(|vault| vault.routes.iter())
    }

    pub fn vault(&self, vault_id: &str) -> Option<&VaultRoutes> {
        self.vaults.iter().find(|vault| vault.vault_id == vault_id)
    }

    pub fn delivered_total(&self) -> Amount {
        self.vaults.iter().map(|vault| vault.delivered).sum()
    }

    pub fn deferred_total(&self) -> Amount {
        self.vaults.iter().map(|vault| vault.deferred_total).sum()
    }
}
