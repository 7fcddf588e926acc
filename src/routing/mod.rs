//! Route generator: turns an allocation plan into per-vehicle delivery tours.
//!
//! Vaults are independent, so each one is packed and sequenced on the rayon pool. Cash the
//! fleet cannot carry is deferred and reported, never dropped.

mod packing;
mod sequence;

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::budget::TimeBudget;
use crate::config::RoutingOptions;
use crate::distance::DistanceTable;
use crate::error::{InputError, PlanError};
use crate::model::{
    AllocationPlan, Amount, DeferredDelivery, PlanNotice, Route, RoutePlan, RouteStatus, RouteStop, Snapshot,
    VaultRoutes,
};
use crate::validate;

use packing::{Delivery, pack};
use sequence::{sequence, tour_km};

/// Everything one vault's routing run needs.
struct VaultJob {
    vault: usize,
    deliveries: Vec<Delivery>,
}

/// Build routes for every vault that sends cash in `plan`.
///
/// Only `available` vehicles are used. Each returned route is `planned`.
pub fn plan_routes(
    plan: &AllocationPlan,
    snapshot: &Snapshot,
    options: &RoutingOptions,
    distances: &DistanceTable,
    budget: &TimeBudget,
) -> Result<RoutePlan, PlanError> {
    options.validate()?;
    let index = validate::snapshot(snapshot)?;
    validate::edges(plan, &index)?;
    if distances.vault_count() != snapshot.vaults.len() || distances.atm_count() != snapshot.atms.len() {
        return Err(InputError::InvalidOption {
            name: "distances",
            reason: "distance table was built for a different snapshot".to_string(),
        }
        .into());
    }

    // Vault id order, one merged delivery per ATM.
    let mut grouped: BTreeMap<&str, BTreeMap<usize, Amount>> = BTreeMap::new();
    for edge in &plan.edges {
        let atm = index.atms[edge.atm_id.as_str()];
        *grouped
            .entry(edge.vault_id.as_str())
            .or_default()
            .entry(atm)
            .or_insert(0) += edge.amount;
    }
    let jobs: Vec<VaultJob> = grouped
        .into_iter()
        .map(|(vault_id, by_atm)| VaultJob {
            vault: index.vaults[vault_id],
            deliveries: by_atm
                .into_iter()
                .map(|(atm, amount)| Delivery { atm, amount })
                .collect(),
        })
        .collect();

    let results: Vec<(VaultRoutes, Option<PlanNotice>)> = jobs
        .par_iter()
        .map(|job| route_vault(job, snapshot, options, distances, budget))
        .collect();

    let mut route_plan = RoutePlan::default();
    for (vault_routes, notice) in results {
        route_plan.total_distance_km += vault_routes.routes.iter().map(|r| r.total_distance_km).sum::<f64>();
        route_plan.total_cost += vault_routes.routes.iter().map(|r| r.total_cost).sum::<f64>();
        route_plan.vaults.push(vault_routes);
        route_plan.notices.extend(notice);
    }

    route_plan.verify(plan, snapshot)?;

    info!(
        vaults = route_plan.vaults.len(),
        routes = route_plan.routes().count(),
        delivered = route_plan.delivered_total(),
        deferred = route_plan.deferred_total(),
        distance_km = route_plan.total_distance_km,
        "routes planned"
    );
    Ok(route_plan)
}

fn route_vault(
    job: &VaultJob,
    snapshot: &Snapshot,
    options: &RoutingOptions,
    distances: &DistanceTable,
    budget: &TimeBudget,
) -> (VaultRoutes, Option<PlanNotice>) {
    let vault = &snapshot.vaults[job.vault];

    let mut fleet: Vec<usize> = snapshot
        .vehicles
        .iter()
        .enumerate()
        .filter(|(_, vehicle)| vehicle.vault_id == vault.id && vehicle.is_available())
        .map(|(i, _)| i)
        .collect();
    fleet.sort_by(|&a, &b| snapshot.vehicles[a].id.cmp(&snapshot.vehicles[b].id));

    let packing = pack(snapshot, &fleet, &job.deliveries);
    let depot = distances.vault_node(job.vault);

    let routes: Vec<Route> = fleet
        .iter()
        .zip(&packing.loads)
        .filter(|(_, load)| !load.is_empty())
        .map(|(&vehicle, load)| build_route(vehicle, job.vault, load, snapshot, options, distances, depot, budget))
        .collect();

    let outgoing: Amount = job.deliveries.iter().map(|d| d.amount).sum();
    let delivered: Amount = routes.iter().map(|route| route.load).sum();
    let deferred: Vec<DeferredDelivery> = packing
        .deferred
        .iter()
        .map(|d| DeferredDelivery {
            atm_id: snapshot.atms[d.atm].id.clone(),
            amount: d.amount,
        })
        .collect();
    let deferred_total: Amount = deferred.iter().map(|d| d.amount).sum();

    let notice = (deferred_total > 0).then(|| {
        let largest = fleet
            .iter()
            .map(|&vehicle| snapshot.vehicles[vehicle].capacity)
            .max()
            .unwrap_or(0);
        let extra_trips = (largest > 0).then(|| ((deferred_total + largest - 1) / largest) as usize);
        warn!(
            vault = %vault.id,
            deferred = deferred_total,
            vehicles = fleet.len(),
            ?extra_trips,
            "fleet capacity exceeded, deferring deliveries"
        );
        PlanNotice::CapacityExceeded {
            vault_id: vault.id.clone(),
            deferred: deferred_total,
            extra_trips,
        }
    });

    debug!(vault = %vault.id, routes = routes.len(), outgoing, delivered, deferred_total, "vault routed");
    let vault_routes = VaultRoutes {
        vault_id: vault.id.clone(),
        outgoing,
        delivered,
        deferred_total,
        routes,
        deferred,
    };
    (vault_routes, notice)
}

#[allow(clippy::too_many_arguments)]
fn build_route(
    vehicle: usize,
    vault: usize,
    load: &[Delivery],
    snapshot: &Snapshot,
    options: &RoutingOptions,
    distances: &DistanceTable,
    depot: usize,
    budget: &TimeBudget,
) -> Route {
    let vehicle = &snapshot.vehicles[vehicle];
    let nodes: Vec<usize> = load.iter().map(|d| distances.atm_node(d.atm)).collect();
    let tour = sequence(distances, depot, &nodes, options.improvement_passes, budget);

    let mut previous = depot;
    let stops: Vec<RouteStop> = tour
        .iter()
        .enumerate()
        .map(|(position, &stop)| {
            let delivery = load[stop];
            let atm = &snapshot.atms[delivery.atm];
            let leg = distances.km(previous, nodes[stop]);
            previous = nodes[stop];
            RouteStop {
                sequence: position + 1,
                atm_id: atm.id.clone(),
                amount: delivery.amount,
                location: atm.location,
                distance_from_previous_km: leg,
            }
        })
        .collect();

    let total_distance_km = tour_km(distances, depot, &nodes, &tour);
    let load_total: Amount = stops.iter().map(|stop| stop.amount).sum();
    let utilization_pct = if vehicle.capacity > 0 {
        load_total as f64 / vehicle.capacity as f64 * 100.0
    } else {
        0.0
    };

    Route {
        vehicle_id: vehicle.id.clone(),
        vault_id: snapshot.vaults[vault].id.clone(),
        status: RouteStatus::Planned,
        stops,
        load: load_total,
        capacity: vehicle.capacity,
        utilization_pct,
        total_distance_km,
        total_cost: total_distance_km * vehicle.cost_per_km,
        estimated_hours: total_distance_km / options.average_speed_kmh,
    }
}
