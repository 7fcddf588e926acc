//! Allocation planner: decides how much cash each vault sends to each ATM.
//!
//! Three interchangeable strategies implement [`Allocator`]. They all consume the same
//! [`AllocationProblem`] and return raw [`Flow`]s, which are assembled here into an
//! [`AllocationPlan`] in one canonical format, so routing never needs to know which
//! strategy ran.

mod greedy;
mod horizon;
mod linear;
mod rounding;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::budget::TimeBudget;
use crate::config::AllocationOptions;
use crate::distance::DistanceTable;
use crate::error::{InputError, PlanError};
use crate::model::{AdvisoryDay, AllocationEdge, AllocationPlan, Amount, DemandForecast, PlanNotice, Snapshot, Strategy};
use crate::validate;

pub use greedy::GreedyAllocator;
pub use horizon::RollingHorizonAllocator;
pub use linear::LinearCostAllocator;

/// Transfer between snapshot positions (vault index, ATM index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flow {
    pub vault: usize,
    pub atm: usize,
    pub amount: Amount,
}

/// Per-ATM requirement for one planning period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtmNeed {
    pub shortfall: Amount,
    pub headroom: Amount,
    /// What the planner aims to deliver: shortfall scaled by the service level, capped by headroom.
    pub need: Amount,
}

/// Shortfall = max(0, demand + threshold − balance), with demand rounded up to a minor unit.
pub fn shortfall(demand: f64, min_threshold: Amount, balance: Amount) -> Amount {
    (demand.ceil() as Amount)
        .saturating_add(min_threshold)
        .saturating_sub(balance)
        .max(0)
}

pub fn need_for(shortfall: Amount, headroom: Amount, service_level: f64) -> Amount {
    let scaled = (shortfall as f64 * service_level).ceil() as Amount;
    scaled.min(shortfall).min(headroom).max(0)
}

/// Validated, index-based view of one allocation run.
#[derive(Debug)]
pub struct AllocationProblem<'a> {
    pub snapshot: &'a Snapshot,
    pub forecast: &'a DemandForecast,
    pub distances: &'a DistanceTable,
    pub options: &'a AllocationOptions,
    pub supply: Vec<Amount>,
    pub atms: Vec<AtmNeed>,
    /// Per ATM, vault indices nearest first (ties by vault id).
    vault_orders: Vec<Vec<usize>>,
}

impl<'a> AllocationProblem<'a> {
    pub fn new(
        snapshot: &'a Snapshot,
        forecast: &'a DemandForecast,
        distances: &'a DistanceTable,
        options: &'a AllocationOptions,
        demand_days: usize,
    ) -> Self {
        let supply = snapshot.vaults.iter().map(|vault| vault.balance).collect();
        let atms = snapshot
            .atms
            .iter()
            .map(|atm| {
                let demand = forecast.demand_over(&atm.id, demand_days);
                let shortfall = shortfall(demand, atm.min_threshold, atm.balance);
                AtmNeed {
                    shortfall,
                    headroom: atm.headroom(),
                    need: need_for(shortfall, atm.headroom(), options.service_level),
                }
            })
            .collect();

        let vault_orders = (0..snapshot.atms.len())
            .map(|atm| {
                let mut order: Vec<usize> = (0..snapshot.vaults.len()).collect();
                order.sort_by(|&a, &b| {
                    distances
                        .vault_to_atm(a, atm)
                        .total_cmp(&distances.vault_to_atm(b, atm))
                        .then_with(|| snapshot.vaults[a].id.cmp(&snapshot.vaults[b].id))
                });
                order
            })
            .collect();

        Self {
            snapshot,
            forecast,
            distances,
            options,
            supply,
            atms,
            vault_orders,
        }
    }

    pub fn total_supply(&self) -> Amount {
        self.supply.iter().sum()
    }

    pub fn total_need(&self) -> Amount {
        self.atms.iter().map(|atm| atm.need).sum()
    }

    pub fn total_shortfall(&self) -> Amount {
        self.atms.iter().map(|atm| atm.shortfall).sum()
    }

    /// Transport cost of moving one minor unit from a vault to an ATM.
    #[inline]
    pub fn unit_cost(&self, vault: usize, atm: usize) -> f64 {
        self.distances.vault_to_atm(vault, atm) * self.options.unit_cost_per_km
    }

    pub fn vault_order(&self, atm: usize) -> &[usize] {
        &self.vault_orders[atm]
    }

    /// ATM indices by descending priority key, ties by ascending ATM id.
    pub fn priority_order(&self, keys: &[Amount]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by(|&a, &b| match keys[b].cmp(&keys[a]) {
            Ordering::Equal => self.snapshot.atms[a].id.cmp(&self.snapshot.atms[b].id),
            other => other,
        });
        order
    }

    pub fn flows_cost(&self, flows: &[Flow]) -> f64 {
        flows
            .iter()
            .map(|flow| flow.amount as f64 * self.unit_cost(flow.vault, flow.atm))
            .sum()
    }
}

/// Planned flows for a later day of the rolling horizon.
#[derive(Debug, Clone, Default)]
pub struct AdvisoryFlows {
    pub day: usize,
    pub flows: Vec<Flow>,
    pub shortfalls: Vec<Amount>,
    pub uncovered: Amount,
}

/// Raw output of a strategy.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub produced_by: Strategy,
    pub flows: Vec<Flow>,
    pub advisory: Vec<AdvisoryFlows>,
    /// The budget ran out and `flows` is the best incumbent rather than the full answer.
    pub budget_exhausted: bool,
}

impl Allocation {
    pub fn new(produced_by: Strategy, flows: Vec<Flow>) -> Self {
        Self {
            produced_by,
            flows,
            advisory: Vec::new(),
            budget_exhausted: false,
        }
    }
}

/// Why a strategy could not produce a plan. Recovered by falling back to greedy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyFailure {
    #[error("solver reported the problem infeasible")]
    Infeasible,
    #[error("solver failed: {0}")]
    Solver(String),
}

/// Uniform contract shared by every allocation strategy.
pub trait Allocator: Sync {
    fn strategy(&self) -> Strategy;

    fn allocate(&self, problem: &AllocationProblem<'_>, budget: &TimeBudget) -> Result<Allocation, StrategyFailure>;
}

pub fn allocator_for(strategy: Strategy) -> &'static dyn Allocator {
    match strategy {
        Strategy::Greedy => &GreedyAllocator,
        Strategy::LinearCost => &LinearCostAllocator,
        Strategy::RollingHorizon => &RollingHorizonAllocator,
    }
}

/// Compute an allocation plan for a snapshot and forecast.
///
/// Malformed input rejects the call. An empty supply yields an empty plan carrying
/// [`PlanNotice::NoSupply`]; a failing strategy degrades to greedy.
pub fn plan_allocation(
    snapshot: &Snapshot,
    forecast: &DemandForecast,
    strategy: Strategy,
    options: &AllocationOptions,
    distances: &DistanceTable,
    budget: &TimeBudget,
) -> Result<AllocationPlan, PlanError> {
    plan_with(allocator_for(strategy), snapshot, forecast, options, distances, budget)
}

/// [`plan_allocation`] with an explicit allocator.
pub(crate) fn plan_with(
    allocator: &dyn Allocator,
    snapshot: &Snapshot,
    forecast: &DemandForecast,
    options: &AllocationOptions,
    distances: &DistanceTable,
    budget: &TimeBudget,
) -> Result<AllocationPlan, PlanError> {
    let strategy = allocator.strategy();
    options.validate()?;
    let index = validate::snapshot(snapshot)?;
    validate::forecast(forecast, &index)?;
    if distances.vault_count() != snapshot.vaults.len() || distances.atm_count() != snapshot.atms.len() {
        return Err(InputError::InvalidOption {
            name: "distances",
            reason: "distance table was built for a different snapshot".to_string(),
        }
        .into());
    }

    let demand_days = match strategy {
        Strategy::RollingHorizon => 1,
        _ => options.planning_days,
    };
    let problem = AllocationProblem::new(snapshot, forecast, distances, options, demand_days);
    let total_shortfall = problem.total_shortfall();

    if problem.total_supply() == 0 {
        info!(%strategy, total_shortfall, "no vault holds cash, returning empty plan");
        return Ok(AllocationPlan::empty(strategy, PlanNotice::NoSupply, total_shortfall));
    }
    if strategy != Strategy::RollingHorizon && problem.total_need() == 0 {
        info!(%strategy, "no ATM needs cash, returning empty plan");
        return Ok(AllocationPlan::empty(strategy, PlanNotice::NothingToAllocate, total_shortfall));
    }

    let mut notices = Vec::new();
    let allocation = match allocator.allocate(&problem, budget) {
        Ok(allocation) => allocation,
        Err(failure) => {
            warn!(%strategy, %failure, "strategy failed, falling back to greedy");
            notices.push(PlanNotice::Degraded {
                requested: strategy,
                used: Strategy::Greedy,
                reason: failure.to_string(),
            });
            GreedyAllocator::solve(&problem)
        }
    };
    if allocation.budget_exhausted {
        warn!(%strategy, elapsed_ms = budget.elapsed().as_millis() as u64, "time budget exhausted");
        notices.push(PlanNotice::TimeBudgetExhausted { strategy });
    }

    let plan = assemble(&problem, allocation, notices);
    plan.verify(snapshot)?;

    info!(
        strategy = %plan.strategy,
        edges = plan.edges.len(),
        allocated = plan.total_allocated,
        uncovered = plan.uncovered_shortfall,
        cost = plan.total_cost,
        "allocation planned"
    );
    Ok(plan)
}

fn assemble(problem: &AllocationProblem<'_>, allocation: Allocation, mut notices: Vec<PlanNotice>) -> AllocationPlan {
    let edges = to_edges(problem, &allocation.flows, |atm| problem.atms[atm].shortfall);

    let mut incoming = vec![0; problem.atms.len()];
    for edge_flow in merge(&allocation.flows) {
        incoming[edge_flow.atm] += edge_flow.amount;
    }
    let total_shortfall = problem.total_shortfall();
    let total_allocated: Amount = incoming.iter().sum();
    let uncovered_shortfall: Amount = problem
        .atms
        .iter()
        .zip(&incoming)
        .map(|(atm, received)| (atm.shortfall - received).max(0))
        .sum();

    if edges.is_empty() {
        notices.push(PlanNotice::NothingToAllocate);
    }
    if uncovered_shortfall > 0 {
        debug!(uncovered_shortfall, "part of the shortfall stays uncovered");
        notices.push(PlanNotice::UnderCovered {
            uncovered: uncovered_shortfall,
        });
    }

    let advisory = allocation
        .advisory
        .iter()
        .map(|day| AdvisoryDay {
            day: day.day,
            edges: to_edges(problem, &day.flows, |atm| day.shortfalls[atm]),
            uncovered: day.uncovered,
        })
        .collect();

    AllocationPlan {
        strategy: allocation.produced_by,
        total_cost: edges
            .iter()
            .map(|edge| edge.amount as f64 * edge.distance_km * problem.options.unit_cost_per_km)
            .sum(),
        edges,
        notices,
        total_shortfall,
        total_allocated,
        uncovered_shortfall,
        advisory,
    }
}

/// Sum flows over identical (vault, ATM) pairs and drop empty ones.
fn merge(flows: &[Flow]) -> Vec<Flow> {
    let mut merged: BTreeMap<(usize, usize), Amount> = BTreeMap::new();
    for flow in flows {
        *merged.entry((flow.vault, flow.atm)).or_insert(0) += flow.amount;
    }
    merged
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .map(|((vault, atm), amount)| Flow { vault, atm, amount })
        .collect()
}

/// Canonical edge order: vault id, then ATM id.
fn to_edges(
    problem: &AllocationProblem<'_>,
    flows: &[Flow],
    shortfall_of: impl Fn(usize) -> Amount,
) -> Vec<AllocationEdge> {
    let snapshot = problem.snapshot;
    let mut edges: Vec<AllocationEdge> = merge(flows)
        .into_iter()
        .map(|flow| AllocationEdge {
            vault_id: snapshot.vaults[flow.vault].id.clone(),
            atm_id: snapshot.atms[flow.atm].id.clone(),
            amount: flow.amount,
            shortfall_before: shortfall_of(flow.atm),
            distance_km: problem.distances.vault_to_atm(flow.vault, flow.atm),
        })
        .collect();
    edges.sort_by(|a, b| a.vault_id.cmp(&b.vault_id).then_with(|| a.atm_id.cmp(&b.atm_id)));
    edges
}
