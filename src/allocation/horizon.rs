//! Rolling-horizon allocation by dynamic programming.
//!
//! State is the day index plus the vault balances, discretised on a grid for memoisation.
//! A decision releases a fraction of each vault's cash for the day; released cash is
//! distributed nearest-first to that day's needs. Stage cost is transport cost plus a
//! stockout penalty on need left uncovered. A day may hold cash back only when doing so
//! leaves no more of its own need uncovered than the most generous release would, so
//! today's ATMs are never starved to serve tomorrow's. Only the first day is committed;
//! later days are returned as advisory plans and re-planned on the next run.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::greedy::distribute;
use super::{AdvisoryFlows, Allocation, AllocationProblem, Allocator, Flow, StrategyFailure, need_for, shortfall};
use crate::budget::TimeBudget;
use crate::model::{Amount, Strategy};

#[derive(Debug, Clone, Copy, Default)]
pub struct RollingHorizonAllocator;

impl Allocator for RollingHorizonAllocator {
    fn strategy(&self) -> Strategy {
        Strategy::RollingHorizon
    }

    fn allocate(&self, problem: &AllocationProblem<'_>, budget: &TimeBudget) -> Result<Allocation, StrategyFailure> {
        let model = HorizonModel::new(problem);
        let initial = model.initial_state();

        let mut memo = Memo::new();
        let (decisions, exhausted) = match model.cost_to_go(0, &initial, &mut memo, budget) {
            Ok(cost) => {
                debug!(cost, states = memo.len(), "rolling horizon solved");
                (Some(memo), false)
            }
            Err(Exhausted) => {
                warn!(states = memo.len(), "rolling horizon ran out of budget, releasing all cash daily");
                (None, true)
            }
        };

        let mut days = model.replay(&initial, decisions.as_ref()).into_iter();
        let first = days.next().unwrap_or_default();
        let mut allocation = Allocation::new(Strategy::RollingHorizon, first.flows);
        allocation.advisory = days.collect();
        allocation.budget_exhausted = exhausted;
        Ok(allocation)
    }
}

#[derive(Debug, Clone, Copy)]
struct Exhausted;

#[derive(Debug, Clone)]
struct MemoEntry {
    cost: f64,
    decision: Vec<usize>,
}

type Memo = HashMap<(usize, Vec<usize>), MemoEntry>;

#[derive(Debug, Clone)]
struct DayState {
    supply: Vec<Amount>,
    atm_balance: Vec<Amount>,
}

#[derive(Debug)]
struct DayOutcome {
    flows: Vec<Flow>,
    shortfalls: Vec<Amount>,
    cost: f64,
    uncovered: Amount,
    next: DayState,
}

struct HorizonModel<'p, 'a> {
    problem: &'p AllocationProblem<'a>,
    days: usize,
    /// Withdrawals per ATM per day, rounded up.
    demand: Vec<Vec<Amount>>,
    levels: usize,
    decisions: Vec<Vec<usize>>,
    grid: usize,
    penalty: f64,
}

impl<'p, 'a> HorizonModel<'p, 'a> {
    fn new(problem: &'p AllocationProblem<'a>) -> Self {
        let horizon = &problem.options.horizon;
        let snapshot = problem.snapshot;
        let days = horizon.days;
        let demand = snapshot
            .atms
            .iter()
            .map(|atm| {
                (0..days)
                    .map(|day| problem.forecast.day(&atm.id, day).ceil() as Amount)
                    .collect()
            })
            .collect();

        let funded: Vec<usize> = (0..problem.supply.len())
            .filter(|&vault| problem.supply[vault] > 0)
            .collect();
        let (levels, decisions) = release_decisions(
            problem.supply.len(),
            &funded,
            horizon.release_levels,
            horizon.max_decisions_per_day,
        );
        debug!(
            days,
            levels,
            decisions = decisions.len(),
            funded = funded.len(),
            "rolling horizon model built"
        );

        Self {
            problem,
            days,
            demand,
            levels,
            decisions,
            grid: horizon.balance_grid,
            penalty: horizon.stockout_penalty,
        }
    }

    fn initial_state(&self) -> DayState {
        DayState {
            supply: self.problem.supply.clone(),
            atm_balance: self.problem.snapshot.atms.iter().map(|atm| atm.balance).collect(),
        }
    }

    /// Grid cell of each vault balance, relative to its starting balance.
    fn key(&self, day: usize, state: &DayState) -> (usize, Vec<usize>) {
        let cells = state
            .supply
            .iter()
            .zip(&self.problem.supply)
            .map(|(&now, &start)| {
                if start == 0 {
                    0
                } else {
                    ((now as i128 * self.grid as i128 + start as i128 / 2) / start as i128) as usize
                }
            })
            .collect();
        (day, cells)
    }

    fn cost_to_go(&self, day: usize, state: &DayState, memo: &mut Memo, budget: &TimeBudget) -> Result<f64, Exhausted> {
        if day == self.days {
            return Ok(0.0);
        }
        let key = self.key(day, state);
        if let Some(entry) = memo.get(&key) {
            return Ok(entry.cost);
        }
        if budget.is_exhausted() {
            return Err(Exhausted);
        }

        let outcomes: Vec<(&Vec<usize>, DayOutcome)> = self
            .decisions
            .iter()
            .map(|decision| (decision, self.simulate(day, state, decision)))
            .collect();
        let floor = outcomes.iter().map(|(_, outcome)| outcome.uncovered).min().unwrap_or(0);

        let mut best: Option<MemoEntry> = None;
        for (decision, outcome) in outcomes {
            if outcome.uncovered > floor {
                continue;
            }
            let total = outcome.cost + self.cost_to_go(day + 1, &outcome.next, memo, budget)?;
            if best.as_ref().is_none_or(|entry| total < entry.cost - 1e-9) {
                best = Some(MemoEntry {
                    cost: total,
                    decision: decision.clone(),
                });
            }
        }

        let entry = best.unwrap_or(MemoEntry {
            cost: 0.0,
            decision: vec![self.levels; state.supply.len()],
        });
        let cost = entry.cost;
        memo.insert(key, entry);
        Ok(cost)
    }

    /// Apply one day's release decision.
    fn simulate(&self, day: usize, state: &DayState, decision: &[usize]) -> DayOutcome {
        let problem = self.problem;
        let atms = &problem.snapshot.atms;

        let mut release: Vec<Amount> = state
            .supply
            .iter()
            .zip(decision)
            .map(|(&supply, &level)| (supply as i128 * level as i128 / self.levels as i128) as Amount)
            .collect();

        let shortfalls: Vec<Amount> = atms
            .iter()
            .zip(&state.atm_balance)
            .enumerate()
            .map(|(i, (atm, &balance))| shortfall(self.demand[i][day] as f64, atm.min_threshold, balance))
            .collect();
        let mut remaining: Vec<Amount> = atms
            .iter()
            .zip(&state.atm_balance)
            .zip(&shortfalls)
            .map(|((atm, &balance), &short)| {
                need_for(short, (atm.capacity - balance).max(0), problem.options.service_level)
            })
            .collect();

        let flows = distribute(problem, &shortfalls, &mut release, &mut remaining);

        let mut supply = state.supply.clone();
        let mut atm_balance = state.atm_balance.clone();
        for flow in &flows {
            supply[flow.vault] -= flow.amount;
            atm_balance[flow.atm] += flow.amount;
        }
        for (i, balance) in atm_balance.iter_mut().enumerate() {
            *balance = (*balance - self.demand[i][day]).max(0);
        }

        let uncovered: Amount = remaining.iter().sum();
        let cost = problem.flows_cost(&flows) + self.penalty * uncovered as f64;
        DayOutcome {
            flows,
            shortfalls,
            cost,
            uncovered,
            next: DayState { supply, atm_balance },
        }
    }

    /// Walk the horizon following memoised decisions; release everything where none is known.
    fn replay(&self, initial: &DayState, memo: Option<&Memo>) -> Vec<AdvisoryFlows> {
        let mut state = initial.clone();
        let mut days = Vec::with_capacity(self.days);
        for day in 0..self.days {
            let full = vec![self.levels; state.supply.len()];
            let decision = memo
                .and_then(|memo| memo.get(&self.key(day, &state)))
                .map(|entry| entry.decision.as_slice())
                .unwrap_or(full.as_slice());
            let outcome = self.simulate(day, &state, decision);
            days.push(AdvisoryFlows {
                day,
                flows: outcome.flows,
                shortfalls: outcome.shortfalls,
                uncovered: outcome.uncovered,
            });
            state = outcome.next;
        }
        days
    }
}

/// Enumerate joint release decisions, most generous first.
///
/// Only funded vaults vary. When the full product would exceed `max_decisions`, the number
/// of levels is reduced; if even two levels per vault are too many, all vaults share one
/// level.
fn release_decisions(
    vaults: usize,
    funded: &[usize],
    release_levels: usize,
    max_decisions: usize,
) -> (usize, Vec<Vec<usize>>) {
    let fits = |levels: usize| {
        (levels + 1)
            .checked_pow(funded.len() as u32)
            .is_some_and(|count| count <= max_decisions)
    };

    let mut levels = release_levels;
    while levels > 1 && !fits(levels) {
        levels -= 1;
    }

    if !fits(levels) {
        let uniform_levels = release_levels.min(max_decisions - 1).max(1);
        let decisions = (0..=uniform_levels)
            .rev()
            .map(|level| vec![level; vaults])
            .collect();
        return (uniform_levels, decisions);
    }

    let mut decisions = vec![vec![levels; vaults]];
    for &vault in funded {
        let mut expanded = Vec::with_capacity(decisions.len() * (levels + 1));
        for decision in &decisions {
            for level in (0..=levels).rev() {
                let mut next = decision.clone();
                next[vault] = level;
                expanded.push(next);
            }
        }
        decisions = expanded;
    }
    (levels, decisions)
}
