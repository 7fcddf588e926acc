//! Route generator tests
//!
//! Packing, deferral, sequencing metrics and an end-to-end run on the Henderson network.

mod fixtures;

use cash_planner::distance::{DistanceTable, EuclideanMatrix};
use cash_planner::model::{AllocationEdge, VehicleStatus};
use cash_planner::{
    AllocationOptions, AllocationPlan, Amount, PlanNotice, Planner, PlannerConfig, RoutePlan, RouteStatus,
    RoutingOptions, Snapshot, Strategy, TimeBudget, Vehicle, plan_allocation, plan_routes,
};

use fixtures::{SnapshotBuilder, forecast, henderson_forecast, henderson_snapshot};

// ============================================================================
// Helpers
// ============================================================================

fn allocate_and_route(snapshot: &Snapshot, demands: &[(&str, f64)]) -> (AllocationPlan, RoutePlan) {
    let (table, _) = DistanceTable::build(snapshot, &EuclideanMatrix);
    let budget = TimeBudget::unbounded();
    let plan = plan_allocation(
        snapshot,
        &forecast(demands),
        Strategy::Greedy,
        &AllocationOptions::default(),
        &table,
        &budget,
    )
    .unwrap();
    let routes = plan_routes(&plan, snapshot, &RoutingOptions::default(), &table, &budget).unwrap();
    (plan, routes)
}

fn stops_for(routes: &RoutePlan, atm: &str) -> Amount {
    routes
        .routes()
        .flat_map(|route| &route.stops)
        .filter(|stop| stop.atm_id == atm)
        .map(|stop| stop.amount)
        .sum()
}

// ============================================================================
// Packing and deferral
// ============================================================================

#[test]
fn single_vehicle_defers_third_delivery() {
    let snapshot = SnapshotBuilder::new()
        .vault("v1", 100_000, (0.0, 0.0))
        .atm("a1", 50_000, (1.0, 0.0))
        .atm("a2", 50_000, (0.0, 1.0))
        .atm("a3", 50_000, (-1.0, 0.0))
        .vehicle("t1", "v1", 40_000)
        .build();
    let (plan, routes) = allocate_and_route(&snapshot, &[("a1", 20_000.0), ("a2", 20_000.0), ("a3", 20_000.0)]);

    assert_eq!(plan.total_allocated, 60_000);
    let vault = routes.vault("v1").unwrap();
    assert_eq!(vault.routes.len(), 1);
    assert_eq!(vault.routes[0].stops.len(), 2);
    assert_eq!(vault.delivered, 40_000);
    assert_eq!(vault.deferred_total, 20_000);
    assert_eq!(vault.deferred.len(), 1);
    assert_eq!(vault.deferred[0].atm_id, "a3");
    assert_eq!(
        routes.notices,
        vec![PlanNotice::CapacityExceeded {
            vault_id: "v1".to_string(),
            deferred: 20_000,
            extra_trips: Some(1),
        }]
    );
}

#[test]
fn oversized_edge_is_split_across_vehicles() {
    let snapshot = SnapshotBuilder::new()
        .vault("v1", 200_000, (0.0, 0.0))
        .atm("a1", 200_000, (3.0, 4.0))
        .vehicle("t1", "v1", 50_000)
        .vehicle("t2", "v1", 50_000)
        .build();
    let (_, routes) = allocate_and_route(&snapshot, &[("a1", 90_000.0)]);

    let loads: Vec<Amount> = routes.routes().map(|route| route.load).collect();
    assert_eq!(loads, vec![50_000, 40_000]);
    assert_eq!(stops_for(&routes, "a1"), 90_000);
    assert_eq!(routes.deferred_total(), 0);
    assert!(routes.notices.is_empty());
    // Each vehicle drives out and back.
    assert!(routes.routes().all(|route| route.total_distance_km == 10.0));
    assert_eq!(routes.total_distance_km, 20.0);
}

#[test]
fn oversized_edge_fills_a_mixed_fleet_before_deferring() {
    let snapshot = SnapshotBuilder::new()
        .vault("v1", 300_000, (0.0, 0.0))
        .atm("a1", 300_000, (3.0, 4.0))
        .vehicle("t1", "v1", 100_000)
        .vehicle("t2", "v1", 60_000)
        .vehicle("t3", "v1", 60_000)
        .build();
    let (plan, routes) = allocate_and_route(&snapshot, &[("a1", 220_000.0)]);

    assert_eq!(plan.total_allocated, 220_000);
    let loads: Vec<Amount> = routes.routes().map(|route| route.load).collect();
    assert_eq!(loads, vec![100_000, 60_000, 60_000]);
    assert_eq!(stops_for(&routes, "a1"), 220_000);
    assert_eq!(routes.deferred_total(), 0);
    assert!(routes.notices.is_empty());
}

#[test]
fn busy_vehicles_are_not_dispatched() {
    let mut builder = SnapshotBuilder::new()
        .vault("v1", 100_000, (0.0, 0.0))
        .atm("a1", 50_000, (1.0, 0.0));
    builder.push_vehicle(Vehicle::new("t1", "v1", 100_000).with_status(VehicleStatus::Assigned));
    builder.push_vehicle(Vehicle::new("t2", "v1", 5_000));
    let snapshot = builder.build();

    let (_, routes) = allocate_and_route(&snapshot, &[("a1", 12_000.0)]);
    let vault = routes.vault("v1").unwrap();
    assert_eq!(vault.routes.len(), 1);
    assert_eq!(vault.routes[0].vehicle_id, "t2");
    assert_eq!(vault.delivered, 5_000);
    assert_eq!(vault.deferred_total, 7_000);
    assert!(matches!(
        routes.notices.as_slice(),
        [PlanNotice::CapacityExceeded {
            extra_trips: Some(2),
            ..
        }]
    ));
}

#[test]
fn vaults_are_routed_with_their_own_fleet() {
    let snapshot = SnapshotBuilder::new()
        .vault("v1", 100_000, (0.0, 0.0))
        .vault("v2", 100_000, (100.0, 0.0))
        .atm("a1", 50_000, (1.0, 0.0))
        .atm("a2", 50_000, (99.0, 0.0))
        .vehicle("t1", "v1", 50_000)
        .vehicle("t2", "v2", 50_000)
        .build();
    let (plan, routes) = allocate_and_route(&snapshot, &[("a1", 10_000.0), ("a2", 20_000.0)]);

    routes.verify(&plan, &snapshot).unwrap();
    let v1 = routes.vault("v1").unwrap();
    let v2 = routes.vault("v2").unwrap();
    assert_eq!(v1.routes[0].vehicle_id, "t1");
    assert_eq!(v1.routes[0].stops[0].atm_id, "a1");
    assert_eq!(v2.routes[0].vehicle_id, "t2");
    assert_eq!(v2.routes[0].stops[0].atm_id, "a2");
}

// ============================================================================
// Sequencing and metrics
// ============================================================================

#[test]
fn tour_visits_stops_in_a_short_loop() {
    let snapshot = SnapshotBuilder::new()
        .vault("v1", 100_000, (0.0, 0.0))
        .atm("a1", 50_000, (0.0, 2.0))
        .atm("a2", 50_000, (2.0, 2.0))
        .atm("a3", 50_000, (2.0, 0.0))
        .atm("a4", 50_000, (1.0, 3.0))
        .vehicle("t1", "v1", 100_000)
        .build();
    let demands = [("a1", 1_000.0), ("a2", 1_000.0), ("a3", 1_000.0), ("a4", 1_000.0)];
    let (_, routes) = allocate_and_route(&snapshot, &demands);

    let route = routes.routes().next().unwrap();
    let order: Vec<&str> = route.stops.iter().map(|stop| stop.atm_id.as_str()).collect();
    let sequences: Vec<usize> = route.stops.iter().map(|stop| stop.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
    // Square with a bump on the top edge: 2 + sqrt(2) + sqrt(2) + 2 + 2.
    let optimal = 6.0 + 2.0 * 2f64.sqrt();
    assert!((route.total_distance_km - optimal).abs() < 1e-9, "{order:?}");
    let legs: f64 = route.stops.iter().map(|stop| stop.distance_from_previous_km).sum();
    let back = match order.last() {
        Some(&"a1") | Some(&"a3") => 2.0,
        _ => panic!("tour should end next to the vault, got {order:?}"),
    };
    assert!((legs + back - route.total_distance_km).abs() < 1e-9);
}

#[test]
fn route_metrics_follow_vehicle_and_speed() {
    let mut builder = SnapshotBuilder::new()
        .vault("v1", 100_000, (0.0, 0.0))
        .atm("a1", 50_000, (30.0, 40.0));
    builder.push_vehicle(Vehicle::new("t1", "v1", 40_000).with_cost_per_km(1.5));
    let snapshot = builder.build();

    let (_, routes) = allocate_and_route(&snapshot, &[("a1", 10_000.0)]);
    let route = routes.routes().next().unwrap();
    assert_eq!(route.status, RouteStatus::Planned);
    assert_eq!(route.capacity, 40_000);
    assert_eq!(route.utilization_pct, 25.0);
    assert_eq!(route.total_distance_km, 100.0);
    assert_eq!(route.total_cost, 150.0);
    assert_eq!(route.estimated_hours, 2.5);
    assert_eq!(route.stops[0].location, (30.0, 40.0));
    assert_eq!(routes.total_cost, 150.0);
}

#[test]
fn route_status_follows_dispatch_lifecycle() {
    let dispatched = RouteStatus::Planned.transition(RouteStatus::Dispatched).unwrap();
    let running = dispatched.transition(RouteStatus::InProgress).unwrap();
    assert!(running.transition(RouteStatus::Failed).unwrap().is_terminal());
    assert!(RouteStatus::Planned.transition(RouteStatus::Completed).is_err());
    assert!(RouteStatus::Completed.transition(RouteStatus::InProgress).is_err());
}

// ============================================================================
// Input handling
// ============================================================================

#[test]
fn empty_plan_routes_nothing() {
    let snapshot = SnapshotBuilder::new()
        .vault("v1", 0, (0.0, 0.0))
        .atm("a1", 50_000, (1.0, 0.0))
        .vehicle("t1", "v1", 10_000)
        .build();
    let (plan, routes) = allocate_and_route(&snapshot, &[("a1", 5_000.0)]);
    assert!(plan.has_no_supply());
    assert!(routes.vaults.is_empty());
    assert!(routes.notices.is_empty());
}

#[test]
fn edge_with_non_positive_amount_is_rejected() {
    let snapshot = SnapshotBuilder::new()
        .vault("v1", 10_000, (0.0, 0.0))
        .atm("a1", 50_000, (1.0, 0.0))
        .vehicle("t1", "v1", 10_000)
        .build();
    let (table, _) = DistanceTable::build(&snapshot, &EuclideanMatrix);
    let mut plan = plan_allocation(
        &snapshot,
        &forecast(&[("a1", 5_000.0)]),
        Strategy::Greedy,
        &AllocationOptions::default(),
        &table,
        &TimeBudget::unbounded(),
    )
    .unwrap();
    plan.edges.push(AllocationEdge {
        vault_id: "v1".to_string(),
        atm_id: "a1".to_string(),
        amount: 0,
        shortfall_before: 0,
        distance_km: 1.0,
    });

    let result = plan_routes(&plan, &snapshot, &RoutingOptions::default(), &table, &TimeBudget::unbounded());
    assert!(result.is_err());
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn henderson_network_end_to_end() {
    let snapshot = henderson_snapshot(150_000, 60_000);
    let forecast = henderson_forecast(25_000.0);

    for strategy in [Strategy::Greedy, Strategy::LinearCost, Strategy::RollingHorizon] {
        let config = PlannerConfig {
            strategy,
            ..PlannerConfig::default()
        };
        let planner = Planner::new(config);
        let (plan, routes) = planner.plan(&snapshot, &forecast).unwrap();

        assert_eq!(plan.total_allocated, 250_000, "{strategy}");
        plan.verify(&snapshot).unwrap();
        routes.verify(&plan, &snapshot).unwrap();
        assert_eq!(routes.delivered_total() + routes.deferred_total(), plan.total_allocated);
        assert!(routes.routes().all(|route| route.load <= route.capacity));
        assert!(routes.routes().all(|route| route.estimated_hours > 0.0));
    }
}
