//! Stop sequencing for a single vehicle: closed tour from the vault and back.

use tracing::debug;

use crate::budget::TimeBudget;
use crate::distance::DistanceTable;

/// Moves must shorten the tour by more than this to be accepted.
const IMPROVEMENT_EPS: f64 = 1e-9;

/// Order `nodes` (distance table indices) into a short closed tour starting at `depot`.
///
/// Returns positions into `nodes`. Nearest-neighbour construction, then up to `passes`
/// rounds of pairwise swap and segment reversal while the budget allows.
pub(crate) fn sequence(
    distances: &DistanceTable,
    depot: usize,
    nodes: &[usize],
    passes: usize,
    budget: &TimeBudget,
) -> Vec<usize> {
    let mut tour = nearest_neighbour(distances, depot, nodes);
    let mut done = 0;
    while done < passes && !budget.is_exhausted() {
        let swapped = swap_improve(distances, depot, nodes, &mut tour);
        let reversed = two_opt_improve(distances, depot, nodes, &mut tour);
        done += 1;
        if !swapped && !reversed {
            break;
        }
    }
    debug!(stops = nodes.len(), passes = done, "tour sequenced");
    tour
}

/// Length of the closed tour `depot → nodes[tour[0]] → … → depot`.
pub(crate) fn tour_km(distances: &DistanceTable, depot: usize, nodes: &[usize], tour: &[usize]) -> f64 {
    let Some((&first, _)) = tour.split_first() else {
        return 0.0;
    };
    let mut total = distances.km(depot, nodes[first]);
    for pair in tour.windows(2) {
        total += distances.km(nodes[pair[0]], nodes[pair[1]]);
    }
    if let Some(&last) = tour.last() {
        total += distances.km(nodes[last], depot);
    }
    total
}

/// Always move to the closest unvisited stop; the earliest stop wins ties.
fn nearest_neighbour(distances: &DistanceTable, depot: usize, nodes: &[usize]) -> Vec<usize> {
    let mut visited = vec![false; nodes.len()];
    let mut tour = Vec::with_capacity(nodes.len());
    let mut at = depot;

    for _ in 0..nodes.len() {
        let mut next: Option<(usize, f64)> = None;
        for (position, &node) in nodes.iter().enumerate() {
            if visited[position] {
                continue;
            }
            let km = distances.km(at, node);
            if next.is_none_or(|(_, best)| km < best) {
                next = Some((position, km));
            }
        }
        let Some((position, _)) = next else {
            break;
        };
        visited[position] = true;
        tour.push(position);
        at = nodes[position];
    }
    tour
}

/// Swap two stops. Returns true if an improvement was made.
fn swap_improve(distances: &DistanceTable, depot: usize, nodes: &[usize], tour: &mut [usize]) -> bool {
    if tour.len() < 2 {
        return false;
    }
    let current = tour_km(distances, depot, nodes, tour);
    for i in 0..tour.len() - 1 {
        for j in i + 1..tour.len() {
            tour.swap(i, j);
            if tour_km(distances, depot, nodes, tour) < current - IMPROVEMENT_EPS {
                return true;
            }
            tour.swap(i, j);
        }
    }
    false
}

/// 2-opt: reverse a segment of the tour. Returns true if an improvement was made.
fn two_opt_improve(distances: &DistanceTable, depot: usize, nodes: &[usize], tour: &mut [usize]) -> bool {
    if tour.len() < 3 {
        return false;
    }
    let current = tour_km(distances, depot, nodes, tour);
    for i in 0..tour.len() - 1 {
        for j in i + 1..tour.len() {
            tour[i..=j].reverse();
            if tour_km(distances, depot, nodes, tour) < current - IMPROVEMENT_EPS {
                return true;
            }
            tour[i..=j].reverse();
        }
    }
    false
}
