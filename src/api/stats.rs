use axum::{extract::State, Json};
use serde::Serialize;

use crate::controller::{AppState, Drained, Phase, StatsSnapshot, TaskStatus};
use crate::domain::DerivedRates;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub phase: Phase,
    pub backend: &'static str,
    pub rates: DerivedRates,
    pub in_flight: u64,
    pub totals: Drained,
    pub last_report: Option<StatsSnapshot>,
    pub tasks: Vec<TaskStatus>,
}

/// GET /api/v1/stats
///
/// Read-only view; never drains the reporting counters.
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let controller = &state.controller;
    Json(StatsResponse {
        phase: controller.phase(),
        backend: controller.backend_name(),
        rates: controller.rates(),
        in_flight: controller.context().in_flight(),
        totals: controller.context().stats.totals(),
        last_report: controller.last_report(),
        tasks: controller.task_statuses(),
    })
}
