//! Seams between the planner core and its external collaborators.
//!
//! The core stays agnostic of where distances and demand figures come from. Callers
//! implement these for their own road network or forecasting service.

use std::hash::Hash;

/// Unique identifier for planner entities.
pub trait Id: Clone + Eq + Hash {}

impl<T> Id for T where T: Clone + Eq + Hash {}

/// Provides a distance matrix (kilometres) for a set of locations.
///
/// The matrix is indexed by the provided location order. A provider that cannot answer
/// should return an empty matrix; the planner then falls back to great-circle distances.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Vec<Vec<f64>>;

    /// Short name used in logs and fallback notices.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Upstream demand forecasting service.
///
/// Returns the predicted withdrawals (minor currency units) for each of the next `days`
/// days, or `None` when the ATM is unknown to the oracle.
pub trait DemandOracle {
    type AtmId: Id;

    fn daily_demand(&self, atm_id: &Self::AtmId, days: usize) -> Option<Vec<f64>>;
}
