//! Minimum transport cost allocation as a linear program.
//!
//! Variables are vault → ATM amounts. Per-vault outflow is capped by the balance, per-ATM
//! inflow lies between a service target and the ATM need. When the supply cannot meet every
//! need the targets are relaxed (pro rata, or "ship everything" under max coverage), so the
//! program stays feasible for any valid snapshot.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use good_lp::solvers::microlp::microlp;
use good_lp::{Constraint, Expression, ResolutionError, Solution, SolverModel, Variable, variable, variables};
use tracing::{debug, warn};

use super::rounding::{RawFlow, round_flows};
use super::{Allocation, AllocationProblem, Allocator, GreedyAllocator, StrategyFailure};
use crate::budget::{StopToken, TimeBudget};
use crate::config::ShortageRelaxation;
use crate::model::{Amount, Strategy};

/// How often the caller thread checks the budget while the solver runs.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Relative slack on the optimal cost allowed during the balancing pass.
const COST_SLACK: f64 = 1e-7;

/// Transportation LP solved with `microlp` on a worker thread.
///
/// The solver cannot be interrupted mid-pivot. When the budget runs out the caller keeps
/// the greedy incumbent and signals the worker, which then skips the balancing pass and
/// exits after the pass it is in. An abandoned worker therefore outlives the call by at
/// most one LP solve.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearCostAllocator;

impl Allocator for LinearCostAllocator {
    fn strategy(&self) -> Strategy {
        Strategy::LinearCost
    }

    fn allocate(&self, problem: &AllocationProblem<'_>, budget: &TimeBudget) -> Result<Allocation, StrategyFailure> {
        let model = LpModel::from_problem(problem);
        if model.arcs.is_empty() {
            return Ok(Allocation::new(Strategy::LinearCost, Vec::new()));
        }
        if budget.is_exhausted() {
            return Ok(incumbent(problem));
        }

        debug!(
            arcs = model.arcs.len(),
            balance = model.balance,
            "solving allocation LP"
        );
        let abandon = StopToken::new();
        let worker_stop = abandon.clone();
        match solve_within(budget, move || model.solve(&worker_stop)) {
            Waited::Done(Ok(raw)) => {
                let needs: Vec<Amount> = problem.atms.iter().map(|atm| atm.need).collect();
                let flows = round_flows(&raw, &problem.supply, &needs);
                Ok(Allocation::new(Strategy::LinearCost, flows))
            }
            Waited::Done(Err(failure)) => Err(failure),
            Waited::TimedOut => {
                abandon.request_stop();
                warn!("LP solve abandoned at the deadline, keeping the greedy incumbent");
                Ok(incumbent(problem))
            }
            Waited::Lost => Err(StrategyFailure::Solver("solver thread terminated".to_string())),
        }
    }
}

/// Greedy plan returned when the budget runs out before the LP answers.
fn incumbent(problem: &AllocationProblem<'_>) -> Allocation {
    let mut allocation = GreedyAllocator::solve(problem);
    allocation.budget_exhausted = true;
    allocation
}

impl From<ResolutionError> for StrategyFailure {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::Infeasible => StrategyFailure::Infeasible,
            other => StrategyFailure::Solver(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LpArc {
    vault: usize,
    atm: usize,
    cost: f64,
    upper: f64,
}

/// Owned LP data so the solve can run on a worker thread.
#[derive(Debug, Clone)]
struct LpModel {
    arcs: Vec<LpArc>,
    supply: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    /// Exact total to ship under max coverage.
    ship_total: Option<f64>,
    balance: bool,
}

impl LpModel {
    fn from_problem(problem: &AllocationProblem<'_>) -> Self {
        let needs: Vec<Amount> = problem.atms.iter().map(|atm| atm.need).collect();
        let total_need: Amount = needs.iter().sum();
        let total_supply = problem.total_supply();

        let (lower, ship_total): (Vec<Amount>, Option<f64>) = if total_supply >= total_need {
            (needs.clone(), None)
        } else {
            match problem.options.relaxation {
                ShortageRelaxation::ProRata => (pro_rata(&needs, total_supply), None),
                ShortageRelaxation::MaxCoverage => (vec![0; needs.len()], Some(total_supply as f64)),
            }
        };

        let mut arcs = Vec::new();
        for (vault, &supply) in problem.supply.iter().enumerate() {
            if supply == 0 {
                continue;
            }
            for (atm, &need) in needs.iter().enumerate() {
                if need == 0 {
                    continue;
                }
                arcs.push(LpArc {
                    vault,
                    atm,
                    cost: problem.unit_cost(vault, atm),
                    upper: need.min(supply) as f64,
                });
            }
        }

        let funded_vaults = problem.supply.iter().filter(|&&supply| supply > 0).count();
        Self {
            arcs,
            supply: problem.supply.iter().map(|&s| s as f64).collect(),
            lower: lower.into_iter().map(|l| l as f64).collect(),
            upper: needs.into_iter().map(|n| n as f64).collect(),
            ship_total,
            balance: problem.options.balance_equal_cost_vaults && funded_vaults > 1,
        }
    }

    /// Min-cost pass, then the balancing pass unless `stop` was raised in between.
    fn solve(&self, stop: &StopToken) -> Result<Vec<RawFlow>, StrategyFailure> {
        let (values, cost) = self.min_cost()?;
        if !self.balance || stop.is_set() {
            return Ok(self.raw_flows(&values));
        }
        match self.balanced(cost) {
            Ok(balanced) => Ok(self.raw_flows(&balanced)),
            Err(err) => {
                debug!(%err, "balancing pass failed, keeping min-cost solution");
                Ok(self.raw_flows(&values))
            }
        }
    }

    fn raw_flows(&self, values: &[f64]) -> Vec<RawFlow> {
        self.arcs
            .iter()
            .zip(values)
            .map(|(arc, &amount)| RawFlow {
                vault: arc.vault,
                atm: arc.atm,
                amount,
            })
            .collect()
    }

    fn cost_expression(&self, x: &[Variable]) -> Expression {
        self.arcs
            .iter()
            .zip(x)
            .fold(Expression::from(0.0), |acc, (arc, var)| acc + arc.cost * *var)
    }

    fn flow_constraints(&self, x: &[Variable]) -> Vec<Constraint> {
        let mut constraints = Vec::new();

        for (vault, &supply) in self.supply.iter().enumerate() {
            let out = self.sum_where(x, |arc| arc.vault == vault);
            if let Some(out) = out {
                constraints.push(out.leq(supply));
            }
        }
        for atm in 0..self.upper.len() {
            let Some(inflow) = self.sum_where(x, |arc| arc.atm == atm) else {
                continue;
            };
            if self.lower[atm] > 0.0 {
                constraints.push(inflow.clone().geq(self.lower[atm]));
            }
            constraints.push(inflow.leq(self.upper[atm]));
        }
        if let Some(total) = self.ship_total {
            let all = x.iter().fold(Expression::from(0.0), |acc, var| acc + *var);
            constraints.push(all.eq(total));
        }
        constraints
    }

    fn sum_where(&self, x: &[Variable], keep: impl Fn(&LpArc) -> bool) -> Option<Expression> {
        let mut terms = self.arcs.iter().zip(x).filter(|(arc, _)| keep(arc)).peekable();
        terms.peek()?;
        Some(terms.fold(Expression::from(0.0), |acc, (_, var)| acc + *var))
    }

    fn min_cost(&self) -> Result<(Vec<f64>, f64), StrategyFailure> {
        let mut vars = variables!();
        let x: Vec<Variable> = self
            .arcs
            .iter()
            .map(|arc| vars.add(variable().min(0.0).max(arc.upper)))
            .collect();

        let mut lp = vars.minimise(self.cost_expression(&x)).using(microlp);
        for constraint in self.flow_constraints(&x) {
            lp = lp.with(constraint);
        }
        let solution = lp.solve()?;

        let values: Vec<f64> = x.iter().map(|var| solution.value(*var)).collect();
        let cost = self.arcs.iter().zip(&values).map(|(arc, v)| arc.cost * v).sum();
        Ok((values, cost))
    }

    /// Keep the optimal cost and minimise the highest vault utilisation, so that
    /// equal-cost alternatives are shared evenly between vaults.
    fn balanced(&self, optimal_cost: f64) -> Result<Vec<f64>, StrategyFailure> {
        let mut vars = variables!();
        let x: Vec<Variable> = self
            .arcs
            .iter()
            .map(|arc| vars.add(variable().min(0.0).max(arc.upper)))
            .collect();
        let utilisation = vars.add(variable().min(0.0).max(1.0));

        let mut lp = vars.minimise(utilisation).using(microlp);
        for constraint in self.flow_constraints(&x) {
            lp = lp.with(constraint);
        }
        for (vault, &supply) in self.supply.iter().enumerate() {
            if supply <= 0.0 {
                continue;
            }
            if let Some(out) = self.sum_where(&x, |arc| arc.vault == vault) {
                lp = lp.with((out - supply * utilisation).leq(0.0));
            }
        }
        let slack = COST_SLACK * optimal_cost.abs().max(1.0);
        lp = lp.with(self.cost_expression(&x).leq(optimal_cost + slack));

        let solution = lp.solve()?;
        Ok(x.iter().map(|var| solution.value(*var)).collect())
    }
}

/// Split `supply` across `needs` in proportion, largest remainders first, so the shares
/// add up to exactly `supply`. Assumes `supply` is below the total need.
fn pro_rata(needs: &[Amount], supply: Amount) -> Vec<Amount> {
    let total: i128 = needs.iter().map(|&n| n as i128).sum();
    if total == 0 {
        return vec![0; needs.len()];
    }
    let exact: Vec<i128> = needs.iter().map(|&need| need as i128 * supply as i128).collect();
    let mut shares: Vec<Amount> = exact.iter().map(|&e| (e / total) as Amount).collect();

    let mut order: Vec<usize> = (0..needs.len()).collect();
    order.sort_by(|&a, &b| (exact[b] % total).cmp(&(exact[a] % total)).then(a.cmp(&b)));
    let mut left = supply - shares.iter().sum::<Amount>();
    for atm in order {
        if left == 0 {
            break;
        }
        if shares[atm] < needs[atm] {
            shares[atm] += 1;
            left -= 1;
        }
    }
    shares
}

enum Waited<T> {
    Done(T),
    TimedOut,
    Lost,
}

/// Run `job` on a worker thread, giving up once the budget is exhausted.
///
/// An abandoned worker finishes in the background and its result is discarded.
fn solve_within<T, F>(budget: &TimeBudget, job: F) -> Waited<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new().name("allocation-lp".to_string()).spawn(move || {
        let _ = tx.send(job());
    });
    if let Err(err) = spawned {
        warn!(%err, "could not spawn LP worker");
        return Waited::Lost;
    }

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(value) => return Waited::Done(value),
            Err(RecvTimeoutError::Timeout) => {
                if budget.is_exhausted() {
                    return Waited::TimedOut;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return Waited::Lost,
        }
    }
}
