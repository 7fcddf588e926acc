//! Distance table over every vault and ATM of a snapshot.

use tracing::warn;

use crate::haversine::HaversineMatrix;
use crate::model::{PlanNotice, Snapshot};
use crate::traits::DistanceMatrixProvider;

/// Planar distance provider: straight-line distance between raw coordinates.
///
/// Useful for synthetic grids and tests where coordinates are already kilometres.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatrix;

impl DistanceMatrixProvider for EuclideanMatrix {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Vec<Vec<f64>> {
        locations
            .iter()
            .map(|from| {
                locations
                    .iter()
                    .map(|to| ((from.0 - to.0).powi(2) + (from.1 - to.1).powi(2)).sqrt())
                    .collect()
            })
            .collect()
    }

    fn name(&self) -> &str {
        "euclidean"
    }
}

/// Dense distance matrix in kilometres, vault nodes first then ATM nodes, in snapshot order.
#[derive(Debug, Clone)]
pub struct DistanceTable {
    vault_count: usize,
    atm_count: usize,
    km: Vec<Vec<f64>>,
}

impl DistanceTable {
    /// Query the provider for every snapshot location.
    ///
    /// A matrix of the wrong shape, or with negative or non-finite entries, is replaced by
    /// great-circle distances and reported through the returned notice.
    pub fn build<M>(snapshot: &Snapshot, provider: &M) -> (Self, Option<PlanNotice>)
    where
        M: DistanceMatrixProvider + ?Sized,
    {
        let locations: Vec<(f64, f64)> = snapshot
            .vaults
            .iter()
            .map(|vault| vault.location)
            .chain(snapshot.atms.iter().map(|atm| atm.location))
            .collect();

        let matrix = provider.matrix_for(&locations);
        let (km, notice) = if is_well_formed(&matrix, locations.len()) {
            (matrix, None)
        } else {
            warn!(
                provider = provider.name(),
                locations = locations.len(),
                "distance provider returned an unusable matrix, using haversine"
            );
            let notice = PlanNotice::DistanceFallback {
                provider: provider.name().to_string(),
            };
            (HaversineMatrix.matrix_for(&locations), Some(notice))
        };

        let table = Self {
            vault_count: snapshot.vaults.len(),
            atm_count: snapshot.atms.len(),
            km,
        };
        (table, notice)
    }

    pub fn vault_count(&self) -> usize {
        self.vault_count
    }

    pub fn atm_count(&self) -> usize {
        self.atm_count
    }

    #[inline]
    pub fn vault_node(&self, vault: usize) -> usize {
        vault
    }

    #[inline]
    pub fn atm_node(&self, atm: usize) -> usize {
        self.vault_count + atm
    }

    #[inline]
    pub fn km(&self, from: usize, to: usize) -> f64 {
        self.km[from][to]
    }

    #[inline]
    pub fn vault_to_atm(&self, vault: usize, atm: usize) -> f64 {
        self.km[self.vault_node(vault)][self.atm_node(atm)]
    }
}

fn is_well_formed(matrix: &[Vec<f64>], n: usize) -> bool {
    matrix.len() == n
        && matrix
            .iter()
            .all(|row| row.len() == n && row.iter().all(|value| value.is_finite() && *value >= 0.0))
}
