//! Test fixtures for cash-planner.
//!
//! Provides:
//! - A small Henderson, NV cash network (vaults and ATMs with real coordinates)
//! - Builders for snapshots and forecasts with sensible defaults

#![allow(dead_code)]

pub mod network;

use cash_planner::{Amount, Atm, DemandForecast, Snapshot, Vault, Vehicle};

pub use network::*;

/// Builder for snapshots; every added record gets sensible defaults.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vault holding `balance`, with at least a million of capacity.
    pub fn vault(mut self, id: &str, balance: Amount, location: (f64, f64)) -> Self {
        self.snapshot
            .vaults
            .push(Vault::new(id, balance.max(1_000_000), balance, location));
        self
    }

    /// Empty ATM with room for `capacity`.
    pub fn atm(self, id: &str, capacity: Amount, location: (f64, f64)) -> Self {
        self.atm_with_balance(id, capacity, 0, location)
    }

    pub fn atm_with_balance(mut self, id: &str, capacity: Amount, balance: Amount, location: (f64, f64)) -> Self {
        self.snapshot.atms.push(Atm::new(id, capacity, balance, location));
        self
    }

    /// Available vehicle based at `vault_id`, also listed in that vault's fleet.
    pub fn vehicle(mut self, id: &str, vault_id: &str, capacity: Amount) -> Self {
        self.push_vehicle(Vehicle::new(id, vault_id, capacity));
        self
    }

    pub fn push_vehicle(&mut self, vehicle: Vehicle) {
        if let Some(vault) = self.snapshot.vaults.iter_mut().find(|v| v.id == vehicle.vault_id) {
            vault.vehicle_ids.push(vehicle.id.clone());
        }
        self.snapshot.vehicles.push(vehicle);
    }

    pub fn build(self) -> Snapshot {
        self.snapshot
    }
}

/// One-day forecast where each ATM's demand equals the given amount.
pub fn forecast(demands: &[(&str, f64)]) -> DemandForecast {
    demands
        .iter()
        .fold(DemandForecast::new(), |forecast, (id, demand)| forecast.with_demand(*id, *demand))
}

/// The Henderson network: two vaults with two vehicles each, ten empty ATMs.
pub fn henderson_snapshot(vault_balance: Amount, vehicle_capacity: Amount) -> Snapshot {
    let mut builder = SnapshotBuilder::new();
    for site in VAULTS {
        builder = builder.vault(site.name, vault_balance, site.coords());
    }
    for site in ATMS {
        builder = builder.atm(site.name, 200_000, site.coords());
    }
    for site in VAULTS {
        builder = builder
            .vehicle(&format!("{}-truck-1", site.name), site.name, vehicle_capacity)
            .vehicle(&format!("{}-truck-2", site.name), site.name, vehicle_capacity);
    }
    builder.build()
}

/// Every Henderson ATM forecast to withdraw `demand` tomorrow.
pub fn henderson_forecast(demand: f64) -> DemandForecast {
    ATMS.iter()
        .fold(DemandForecast::new(), |forecast, site| forecast.with_demand(site.name, demand))
}
