use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::controller::{AppState, Phase};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    controller: ComponentHealth,
}

/// Health status of a component
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: String,
    phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn from_phase(phase: Phase) -> Self {
        match phase {
            Phase::Running => Self {
                status: "healthy".to_string(),
                phase,
                error: None,
            },
            Phase::Initialized => Self {
                status: "degraded".to_string(),
                phase,
                error: Some("load test not started yet".to_string()),
            },
            Phase::Stopped => Self {
                status: "unhealthy".to_string(),
                phase,
                error: Some("load test stopped".to_string()),
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.phase == Phase::Running
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let controller = ComponentHealth::from_phase(state.controller.phase());
    let healthy = controller.is_healthy();

    let response = HealthResponse {
        status: controller.status.clone(),
        timestamp: chrono::Utc::now(),
        checks: HealthChecks { controller },
    };
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// GET /health/ready - 200 once the load test is running
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.phase() {
        Phase::Running => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /health/live - 200 while the process is up
pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}
