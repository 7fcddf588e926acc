//! Planner facade: configuration plus a distance provider.

use tracing::info;

use crate::allocation;
use crate::budget::TimeBudget;
use crate::config::PlannerConfig;
use crate::distance::DistanceTable;
use crate::error::PlanError;
use crate::haversine::HaversineMatrix;
use crate::model::{AllocationPlan, DemandForecast, RoutePlan, Snapshot, Strategy};
use crate::routing;
use crate::traits::DistanceMatrixProvider;
use crate::validate;

/// Runs allocation and routing against one distance provider.
///
/// Each call queries the provider afresh; nothing is kept between runs.
#[derive(Debug, Clone)]
pub struct Planner<M = HaversineMatrix> {
    config: PlannerConfig,
    provider: M,
}

impl Planner<HaversineMatrix> {
    pub fn new(config: PlannerConfig) -> Self {
        Self::with_provider(config, HaversineMatrix)
    }
}

impl<M> Planner<M>
where
    M: DistanceMatrixProvider,
{
    pub fn with_provider(config: PlannerConfig, provider: M) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn plan_allocation(
        &self,
        snapshot: &Snapshot,
        forecast: &DemandForecast,
        strategy: Strategy,
        budget: &TimeBudget,
    ) -> Result<AllocationPlan, PlanError> {
        self.config.validate()?;
        validate::snapshot(snapshot)?;
        let (distances, fallback) = DistanceTable::build(snapshot, &self.provider);
        let mut plan = allocation::plan_allocation(
            snapshot,
            forecast,
            strategy,
            &self.config.allocation,
            &distances,
            budget,
        )?;
        plan.notices.extend(fallback);
        Ok(plan)
    }

    pub fn plan_routes(
        &self,
        plan: &AllocationPlan,
        snapshot: &Snapshot,
        budget: &TimeBudget,
    ) -> Result<RoutePlan, PlanError> {
        self.config.validate()?;
        validate::snapshot(snapshot)?;
        let (distances, fallback) = DistanceTable::build(snapshot, &self.provider);
        let mut routes = routing::plan_routes(plan, snapshot, &self.config.routing, &distances, budget)?;
        routes.notices.extend(fallback);
        Ok(routes)
    }

    /// Allocate with the configured strategy, then route, sharing one time budget.
    pub fn plan(&self, snapshot: &Snapshot, forecast: &DemandForecast) -> Result<(AllocationPlan, RoutePlan), PlanError> {
        let budget = TimeBudget::from_millis(self.config.time_budget_ms);
        let plan = self.plan_allocation(snapshot, forecast, self.config.strategy, &budget)?;
        let routes = self.plan_routes(&plan, snapshot, &budget)?;
        info!(
            strategy = %plan.strategy,
            allocated = plan.total_allocated,
            delivered = routes.delivered_total(),
            deferred = routes.deferred_total(),
            "planning run complete"
        );
        Ok((plan, routes))
    }
}
