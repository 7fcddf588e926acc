//! Input validation and plan invariant checks.
//!
//! Inputs are checked before any strategy runs; a rejected call never yields a partial plan.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{EntityKind, InputError, InvariantViolation};
use crate::model::{AllocationPlan, Amount, DemandForecast, RoutePlan, Snapshot};

/// Id → position lookups for a validated snapshot.
#[derive(Debug)]
pub struct SnapshotIndex<'a> {
    pub vaults: HashMap<&'a str, usize>,
    pub atms: HashMap<&'a str, usize>,
    pub vehicles: HashMap<&'a str, usize>,
}

pub fn snapshot(snapshot: &Snapshot) -> Result<SnapshotIndex<'_>, InputError> {
    let mut vaults = HashMap::with_capacity(snapshot.vaults.len());
    for (i, vault) in snapshot.vaults.iter().enumerate() {
        let kind = EntityKind::Vault;
        if vaults.insert(vault.id.as_str(), i).is_some() {
            return Err(InputError::DuplicateId { kind, id: vault.id.clone() });
        }
        non_negative(kind, &vault.id, "capacity", vault.capacity)?;
        non_negative(kind, &vault.id, "balance", vault.balance)?;
        within_capacity(kind, &vault.id, vault.balance, vault.capacity)?;
        finite_location(kind, &vault.id, vault.location)?;
    }

    let mut atms = HashMap::with_capacity(snapshot.atms.len());
    for (i, atm) in snapshot.atms.iter().enumerate() {
        let kind = EntityKind::Atm;
        if atms.insert(atm.id.as_str(), i).is_some() {
            return Err(InputError::DuplicateId { kind, id: atm.id.clone() });
        }
        non_negative(kind, &atm.id, "capacity", atm.capacity)?;
        non_negative(kind, &atm.id, "balance", atm.balance)?;
        non_negative(kind, &atm.id, "minimum threshold", atm.min_threshold)?;
        within_capacity(kind, &atm.id, atm.balance, atm.capacity)?;
        finite_location(kind, &atm.id, atm.location)?;
    }

    let mut vehicles = HashMap::with_capacity(snapshot.vehicles.len());
    for (i, vehicle) in snapshot.vehicles.iter().enumerate() {
        let kind = EntityKind::Vehicle;
        if vehicles.insert(vehicle.id.as_str(), i).is_some() {
            return Err(InputError::DuplicateId { kind, id: vehicle.id.clone() });
        }
        non_negative(kind, &vehicle.id, "capacity", vehicle.capacity)?;
        finite_non_negative(kind, &vehicle.id, "cost per km", vehicle.cost_per_km)?;
        if !vaults.contains_key(vehicle.vault_id.as_str()) {
            return Err(InputError::UnknownId {
                kind: EntityKind::Vault,
                id: vehicle.vault_id.clone(),
                context: "vehicle ownership",
            });
        }
    }

    for vault in &snapshot.vaults {
        for vehicle_id in &vault.vehicle_ids {
            let Some(&position) = vehicles.get(vehicle_id.as_str()) else {
                return Err(InputError::UnknownId {
                    kind: EntityKind::Vehicle,
                    id: vehicle_id.clone(),
                    context: "vault fleet",
                });
            };
            let owner = &snapshot.vehicles[position].vault_id;
            if owner != &vault.id {
                return Err(InputError::VehicleOwnership {
                    vehicle: vehicle_id.clone(),
                    vault: vault.id.clone(),
                    owner: owner.clone(),
                });
            }
        }
    }

    Ok(SnapshotIndex { vaults, atms, vehicles })
}

pub fn forecast(forecast: &DemandForecast, index: &SnapshotIndex<'_>) -> Result<(), InputError> {
    for (atm_id, values) in forecast.entries() {
        if !index.atms.contains_key(atm_id) {
            return Err(InputError::UnknownId {
                kind: EntityKind::Atm,
                id: atm_id.to_string(),
                context: "demand forecast",
            });
        }
        for value in values {
            finite_non_negative(EntityKind::Forecast, atm_id, "demand", *value)?;
        }
    }
    Ok(())
}

/// Check that every edge references known endpoints and carries a positive amount.
pub fn edges(plan: &AllocationPlan, index: &SnapshotIndex<'_>) -> Result<(), InputError> {
    for edge in &plan.edges {
        if !index.vaults.contains_key(edge.vault_id.as_str()) {
            return Err(InputError::UnknownId {
                kind: EntityKind::Vault,
                id: edge.vault_id.clone(),
                context: "allocation edge",
            });
        }
        if !index.atms.contains_key(edge.atm_id.as_str()) {
            return Err(InputError::UnknownId {
                kind: EntityKind::Atm,
                id: edge.atm_id.clone(),
                context: "allocation edge",
            });
        }
        if edge.amount <= 0 {
            return Err(InputError::NonPositiveEdge {
                vault: edge.vault_id.clone(),
                atm: edge.atm_id.clone(),
                amount: edge.amount,
            });
        }
    }
    Ok(())
}

impl AllocationPlan {
    /// Check conservation and capacity invariants against the snapshot the plan was built on.
    pub fn verify(&self, snapshot: &Snapshot) -> Result<(), InvariantViolation> {
        for edge in &self.edges {
            if edge.amount <= 0 {
                return Err(InvariantViolation::NonPositiveAmount {
                    vault: edge.vault_id.clone(),
                    atm: edge.atm_id.clone(),
                    amount: edge.amount,
                });
            }
            if snapshot.vault(&edge.vault_id).is_none() || snapshot.atm(&edge.atm_id).is_none() {
                return Err(InvariantViolation::UnknownEndpoint {
                    vault: edge.vault_id.clone(),
                    atm: edge.atm_id.clone(),
                });
            }
        }

        for (vault_id, outgoing) in self.outgoing_by_vault() {
            if let Some(vault) = snapshot.vault(vault_id) {
                if outgoing > vault.balance {
                    return Err(InvariantViolation::VaultOverdrawn {
                        vault: vault_id.to_string(),
                        outgoing,
                        balance: vault.balance,
                    });
                }
            }
        }

        for (atm_id, incoming) in self.incoming_by_atm() {
            if let Some(atm) = snapshot.atm(atm_id) {
                let resulting = atm.balance + incoming;
                if resulting > atm.capacity {
                    return Err(InvariantViolation::AtmOverfilled {
                        atm: atm_id.to_string(),
                        resulting,
                        capacity: atm.capacity,
                    });
                }
            }
        }
        Ok(())
    }
}

impl RoutePlan {
    /// Check vehicle capacities and that every allocated amount is either routed or deferred.
    pub fn verify(&self, plan: &AllocationPlan, snapshot: &Snapshot) -> Result<(), InvariantViolation> {
        let mut used = HashSet::new();
        for route in self.routes() {
            let vehicle = snapshot
                .vehicle(&route.vehicle_id)
                .filter(|vehicle| vehicle.vault_id == route.vault_id)
                .ok_or_else(|| InvariantViolation::ForeignVehicle {
                    vehicle: route.vehicle_id.clone(),
                    vault: route.vault_id.clone(),
                })?;
            if !used.insert(route.vehicle_id.as_str()) {
                return Err(InvariantViolation::VehicleReused {
                    vehicle: route.vehicle_id.clone(),
                });
            }
            let load: Amount = route.stops.iter().map(|stop| stop.amount).sum();
            if load > vehicle.capacity {
                return Err(InvariantViolation::RouteOverloaded {
                    vehicle: route.vehicle_id.clone(),
                    load,
                    capacity: vehicle.capacity,
                });
            }
        }

        let outgoing = plan.outgoing_by_vault();
        for (vault_id, expected) in &outgoing {
            let (delivered, deferred) = self
                .vault(vault_id)
                .map(|vault| (vault.delivered, vault.deferred_total))
                .unwrap_or((0, 0));
            if delivered + deferred != *expected {
                return Err(InvariantViolation::DeferredMismatch {
                    vault: vault_id.to_string(),
                    outgoing: *expected,
                    delivered,
                    deferred,
                });
            }
        }

        // Per ATM, routed stops plus deferred chunks must add back up to the edge amount.
        let mut allocated: BTreeMap<(&str, &str), Amount> = BTreeMap::new();
        for edge in &plan.edges {
            *allocated.entry((edge.vault_id.as_str(), edge.atm_id.as_str())).or_insert(0) += edge.amount;
        }
        let mut served: BTreeMap<(&str, &str), Amount> = BTreeMap::new();
        for vault in &self.vaults {
            let stops = vault.routes.iter().flat_map(|route| route.stops.iter());
            for stop in stops {
                *served.entry((vault.vault_id.as_str(), stop.atm_id.as_str())).or_insert(0) += stop.amount;
            }
            for deferred in &vault.deferred {
                *served.entry((vault.vault_id.as_str(), deferred.atm_id.as_str())).or_insert(0) +=
                    deferred.amount;
            }
        }
        for (key, amount) in allocated.iter() {
            let got = served.get(key).copied().unwrap_or(0);
            if got != *amount {
                return Err(InvariantViolation::DeliveryMismatch {
                    vault: key.0.to_string(),
                    atm: key.1.to_string(),
                    served: got,
                    allocated: *amount,
                });
            }
        }
        if let Some((key, amount)) = served.iter().find(|(key, _)| !allocated.contains_key(*key)) {
            return Err(InvariantViolation::DeliveryMismatch {
                vault: key.0.to_string(),
                atm: key.1.to_string(),
                served: *amount,
                allocated: 0,
            });
        }
        Ok(())
    }
}

fn non_negative(kind: EntityKind, id: &str, field: &'static str, value: Amount) -> Result<(), InputError> {
    if value < 0 {
        return Err(InputError::NegativeAmount {
            kind,
            id: id.to_string(),
            field,
            value,
        });
    }
    Ok(())
}

fn finite_non_negative(kind: EntityKind, id: &str, field: &'static str, value: f64) -> Result<(), InputError> {
    if !value.is_finite() {
        return Err(InputError::NonFinite {
            kind,
            id: id.to_string(),
            field,
        });
    }
    if value < 0.0 {
        return Err(InputError::NegativeValue {
            kind,
            id: id.to_string(),
            field,
            value,
        });
    }
    Ok(())
}

fn within_capacity(kind: EntityKind, id: &str, balance: Amount, capacity: Amount) -> Result<(), InputError> {
    if balance > capacity {
        return Err(InputError::BalanceAboveCapacity {
            kind,
            id: id.to_string(),
            balance,
            capacity,
        });
    }
    Ok(())
}

fn finite_location(kind: EntityKind, id: &str, location: (f64, f64)) -> Result<(), InputError> {
    if !location.0.is_finite() || !location.1.is_finite() {
        return Err(InputError::NonFinite {
            kind,
            id: id.to_string(),
            field: "location",
        });
    }
    Ok(())
}
