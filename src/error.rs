//! Error types for planning calls.
//!
//! Expected operating states (no supply, degraded strategy, partial delivery) are not
//! errors; they travel as [`PlanNotice`](crate::model::PlanNotice) values inside the plans.
//! Only malformed input rejects a call.

use std::fmt;

use thiserror::Error;

use crate::model::{Amount, RouteStatus};

/// Which kind of record an input error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Vault,
    Atm,
    Vehicle,
    Forecast,
    Edge,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Vault => "vault",
            EntityKind::Atm => "ATM",
            EntityKind::Vehicle => "vehicle",
            EntityKind::Forecast => "forecast",
            EntityKind::Edge => "allocation edge",
        };
        f.write_str(name)
    }
}

/// Reasons a snapshot, forecast or plan is rejected before any planning happens.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("{kind} `{id}` has negative {field}: {value}")]
    NegativeAmount {
        kind: EntityKind,
        id: String,
        field: &'static str,
        value: Amount,
    },
    #[error("{kind} `{id}` has negative {field}: {value}")]
    NegativeValue {
        kind: EntityKind,
        id: String,
        field: &'static str,
        value: f64,
    },
    #[error("{kind} `{id}` has a non-finite {field}")]
    NonFinite {
        kind: EntityKind,
        id: String,
        field: &'static str,
    },
    #[error("{kind} `{id}` balance {balance} exceeds capacity {capacity}")]
    BalanceAboveCapacity {
        kind: EntityKind,
        id: String,
        balance: Amount,
        capacity: Amount,
    },
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: EntityKind, id: String },
    #[error("unknown {kind} id `{id}` referenced by {context}")]
    UnknownId {
        kind: EntityKind,
        id: String,
        context: &'static str,
    },
    #[error("vehicle `{vehicle}` is listed by vault `{vault}` but owned by `{owner}`")]
    VehicleOwnership {
        vehicle: String,
        vault: String,
        owner: String,
    },
    #[error("allocation edge `{vault}` -> `{atm}` has non-positive amount {amount}")]
    NonPositiveEdge {
        vault: String,
        atm: String,
        amount: Amount,
    },
    #[error("option `{name}` is invalid: {reason}")]
    InvalidOption { name: &'static str, reason: String },
}

/// A produced plan breaks one of the conservation or capacity invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("vault `{vault}` sends {outgoing} but holds only {balance}")]
    VaultOverdrawn {
        vault: String,
        outgoing: Amount,
        balance: Amount,
    },
    #[error("ATM `{atm}` would hold {resulting} above its capacity {capacity}")]
    AtmOverfilled {
        atm: String,
        resulting: Amount,
        capacity: Amount,
    },
    #[error("edge `{vault}` -> `{atm}` carries non-positive amount {amount}")]
    NonPositiveAmount {
        vault: String,
        atm: String,
        amount: Amount,
    },
    #[error("edge `{vault}` -> `{atm}` references an unknown endpoint")]
    UnknownEndpoint { vault: String, atm: String },
    #[error("route of vehicle `{vehicle}` carries {load} above capacity {capacity}")]
    RouteOverloaded {
        vehicle: String,
        load: Amount,
        capacity: Amount,
    },
    #[error("vehicle `{vehicle}` cannot serve vault `{vault}`")]
    ForeignVehicle { vehicle: String, vault: String },
    #[error("vehicle `{vehicle}` is used by more than one route")]
    VehicleReused { vehicle: String },
    #[error(
        "vault `{vault}` routes deliver {delivered} and defer {deferred} but the allocation sends {outgoing}"
    )]
    DeferredMismatch {
        vault: String,
        outgoing: Amount,
        delivered: Amount,
        deferred: Amount,
    },
    #[error("ATM `{atm}` of vault `{vault}` is served {served} against an allocation of {allocated}")]
    DeliveryMismatch {
        vault: String,
        atm: String,
        served: Amount,
        allocated: Amount,
    },
}

/// Errors returned by the planning entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),
    #[error("plan invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Illegal route status change requested by the dispatch side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("route cannot move from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: RouteStatus,
    pub to: RouteStatus,
}

/// Errors raised while loading a [`PlannerConfig`](crate::config::PlannerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse planner config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] InputError),
}
