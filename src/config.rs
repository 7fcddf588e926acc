//! Planner configuration.
//!
//! Every section has sensible defaults, so an empty TOML document is a valid config.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, InputError};
use crate::model::Strategy;

/// How the linear strategy lowers per-ATM targets when supply cannot cover every need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortageRelaxation {
    /// Each ATM gets the same fraction of its need.
    #[default]
    ProRata,
    /// Ship the whole supply wherever it is cheapest.
    MaxCoverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonOptions {
    /// Days in the rolling window, including the plan day.
    pub days: usize,
    /// Release levels per vault and day (0 = hold everything, `release_levels` = release all).
    pub release_levels: usize,
    /// Grid resolution used to discretise vault balances in the memo.
    pub balance_grid: usize,
    /// Penalty per minor unit of uncovered shortfall.
    pub stockout_penalty: f64,
    /// Cap on joint release decisions explored per state.
    pub max_decisions_per_day: usize,
}

impl Default for HorizonOptions {
    fn default() -> Self {
        Self {
            days: 3,
            release_levels: 4,
            balance_grid: 20,
            stockout_penalty: 100.0,
            max_decisions_per_day: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationOptions {
    /// Days of forecast demand that single-period strategies plan for.
    pub planning_days: usize,
    /// Fraction of each shortfall to aim for, in (0, 1].
    pub service_level: f64,
    /// Transport cost per minor unit moved per kilometre.
    pub unit_cost_per_km: f64,
    pub relaxation: ShortageRelaxation,
    /// Split equal-cost alternatives evenly across vaults (second LP pass).
    pub balance_equal_cost_vaults: bool,
    pub horizon: HorizonOptions,
}

impl Default for AllocationOptions {
    fn default() -> Self {
        Self {
            planning_days: 1,
            service_level: 1.0,
            unit_cost_per_km: 1.0,
            relaxation: ShortageRelaxation::ProRata,
            balance_equal_cost_vaults: true,
            horizon: HorizonOptions::default(),
        }
    }
}

impl AllocationOptions {
    pub fn validate(&self) -> Result<(), InputError> {
        if self.planning_days == 0 {
            return Err(invalid("planning_days", "must be at least 1"));
        }
        if !(self.service_level > 0.0 && self.service_level <= 1.0) {
            return Err(invalid("service_level", "must lie in (0, 1]"));
        }
        if !self.unit_cost_per_km.is_finite() || self.unit_cost_per_km < 0.0 {
            return Err(invalid("unit_cost_per_km", "must be finite and non-negative"));
        }
        let horizon = &self.horizon;
        if horizon.days == 0 || horizon.days > 14 {
            return Err(invalid("horizon.days", "must lie in 1..=14"));
        }
        if horizon.release_levels == 0 {
            return Err(invalid("horizon.release_levels", "must be at least 1"));
        }
        if horizon.balance_grid == 0 {
            return Err(invalid("horizon.balance_grid", "must be at least 1"));
        }
        if !horizon.stockout_penalty.is_finite() || horizon.stockout_penalty < 0.0 {
            return Err(invalid("horizon.stockout_penalty", "must be finite and non-negative"));
        }
        if horizon.max_decisions_per_day < 2 {
            return Err(invalid("horizon.max_decisions_per_day", "must be at least 2"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingOptions {
    /// Maximum local improvement passes per tour.
    pub improvement_passes: usize,
    /// Average driving speed used for time estimates.
    pub average_speed_kmh: f64,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            improvement_passes: 100,
            average_speed_kmh: 40.0,
        }
    }
}

impl RoutingOptions {
    pub fn validate(&self) -> Result<(), InputError> {
        if !self.average_speed_kmh.is_finite() || self.average_speed_kmh <= 0.0 {
            return Err(invalid("average_speed_kmh", "must be finite and positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub strategy: Strategy,
    /// Wall-clock budget per planning call; unbounded when absent.
    pub time_budget_ms: Option<u64>,
    pub allocation: AllocationOptions,
    pub routing: RoutingOptions,
}

impl PlannerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: PlannerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        self.allocation.validate()?;
        self.routing.validate()
    }
}

fn invalid(name: &'static str, reason: &str) -> InputError {
    InputError::InvalidOption {
        name,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = PlannerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlannerConfig::default());
        assert_eq!(config.strategy, Strategy::Greedy);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = PlannerConfig::from_toml_str(
            r#"
            strategy = "rolling_horizon"
            time_budget_ms = 250

            [allocation]
            relaxation = "max_coverage"

            [allocation.horizon]
            days = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.strategy, Strategy::RollingHorizon);
        assert_eq!(config.time_budget_ms, Some(250));
        assert_eq!(config.allocation.relaxation, ShortageRelaxation::MaxCoverage);
        assert_eq!(config.allocation.horizon.days, 5);
        assert_eq!(config.allocation.horizon.release_levels, 4);
    }

    #[test]
    fn test_invalid_service_level_rejected() {
        let err = PlannerConfig::from_toml_str("[allocation]\nservice_level = 1.5\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(InputError::InvalidOption { name: "service_level", .. })
        ));
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        let err = PlannerConfig::from_toml_str("strategy = \"simulated_annealing\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
