//! cash-planner core
//!
//! Allocation and routing for ATM cash replenishment: decide how much cash each vault
//! sends to each ATM, then pack and sequence the deliveries across the vault fleets.

pub mod allocation;
pub mod budget;
pub mod config;
pub mod distance;
pub mod error;
pub mod haversine;
pub mod model;
pub mod osrm;
pub mod planner;
pub mod routing;
pub mod traits;
pub mod validate;

pub use allocation::plan_allocation;
pub use budget::{StopToken, TimeBudget};
pub use config::{AllocationOptions, HorizonOptions, PlannerConfig, RoutingOptions, ShortageRelaxation};
pub use error::{InputError, InvariantViolation, PlanError};
pub use model::{
    AllocationEdge, AllocationPlan, Amount, Atm, DemandForecast, PlanNotice, Route, RoutePlan, RouteStatus,
    Snapshot, Strategy, Vault, Vehicle, VehicleStatus,
};
pub use planner::Planner;
pub use routing::plan_routes;
