//! Nearest-vault-first greedy allocation.

use tracing::debug;

use super::{Allocation, AllocationProblem, Allocator, Flow, StrategyFailure};
use crate::budget::TimeBudget;
use crate::model::{Amount, Strategy};

/// Serves ATMs by descending shortfall, each from its nearest vaults first.
///
/// Runs in O(A log A + A·V) once vault orders are known and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAllocator;

impl GreedyAllocator {
    pub(crate) fn solve(problem: &AllocationProblem<'_>) -> Allocation {
        let mut supply = problem.supply.clone();
        let mut remaining: Vec<Amount> = problem.atms.iter().map(|atm| atm.need).collect();
        let shortfalls: Vec<Amount> = problem.atms.iter().map(|atm| atm.shortfall).collect();

        let flows = distribute(problem, &shortfalls, &mut supply, &mut remaining);
        debug!(flows = flows.len(), "greedy allocation done");
        Allocation::new(Strategy::Greedy, flows)
    }
}

impl Allocator for GreedyAllocator {
    fn strategy(&self) -> Strategy {
        Strategy::Greedy
    }

    fn allocate(&self, problem: &AllocationProblem<'_>, _budget: &TimeBudget) -> Result<Allocation, StrategyFailure> {
        Ok(Self::solve(problem))
    }
}

/// Fill `remaining` needs from `supply`, ATMs ordered by `priority` (descending), each
/// drawing from its nearest vault with cash left.
///
/// Both slices are decremented in place; the returned flows are in allocation order.
pub(crate) fn distribute(
    problem: &AllocationProblem<'_>,
    priority: &[Amount],
    supply: &mut [Amount],
    remaining: &mut [Amount],
) -> Vec<Flow> {
    let mut flows = Vec::new();
    let mut supply_left: Amount = supply.iter().sum();

    for atm in problem.priority_order(priority) {
        if supply_left == 0 {
            break;
        }
        if remaining[atm] == 0 {
            continue;
        }
        for &vault in problem.vault_order(atm) {
            if supply[vault] == 0 {
                continue;
            }
            let amount = remaining[atm].min(supply[vault]);
            flows.push(Flow { vault, atm, amount });
            supply[vault] -= amount;
            supply_left -= amount;
            remaining[atm] -= amount;
            if remaining[atm] == 0 {
                break;
            }
        }
    }
    flows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocationOptions;
    use crate::distance::{DistanceTable, EuclideanMatrix};
    use crate::model::{Atm, DemandForecast, Snapshot, Vault};

    #[test]
    fn test_largest_shortfall_served_first() {
        let snapshot = Snapshot::new(
            vec![Vault::new("v1", 200_000, 100_000, (0.0, 0.0))],
            vec![
                Atm::new("a1", 100_000, 0, (1.0, 0.0)),
                Atm::new("a2", 100_000, 0, (2.0, 0.0)),
            ],
            Vec::new(),
        );
        let forecast = DemandForecast::new()
            .with_demand("a1", 50_000.0)
            .with_demand("a2", 60_000.0);
        let options = AllocationOptions::default();
        let (table, _) = DistanceTable::build(&snapshot, &EuclideanMatrix);
        let problem = AllocationProblem::new(&snapshot, &forecast, &table, &options, 1);

        let allocation = GreedyAllocator::solve(&problem);
        assert_eq!(
            allocation.flows,
            vec![
                Flow { vault: 0, atm: 1, amount: 60_000 },
                Flow { vault: 0, atm: 0, amount: 40_000 },
            ]
        );
    }

    #[test]
    fn test_equal_shortfalls_tie_break_by_atm_id() {
        let snapshot = Snapshot::new(
            vec![Vault::new("v1", 100, 10, (0.0, 0.0))],
            vec![Atm::new("b", 100, 0, (1.0, 0.0)), Atm::new("a", 100, 0, (2.0, 0.0))],
            Vec::new(),
        );
        let forecast = DemandForecast::new().with_demand("a", 10.0).with_demand("b", 10.0);
        let options = AllocationOptions::default();
        let (table, _) = DistanceTable::build(&snapshot, &EuclideanMatrix);
        let problem = AllocationProblem::new(&snapshot, &forecast, &table, &options, 1);

        let allocation = GreedyAllocator::solve(&problem);
        assert_eq!(allocation.flows, vec![Flow { vault: 0, atm: 1, amount: 10 }]);
    }
}
