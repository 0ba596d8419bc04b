use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::policy::Policy;
use crate::resilience::{BreakerSnapshot, CircuitState, LimiterLevel};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub policies: usize,
    pub open_circuits: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let open_circuits = state
        .gateway
        .breaker_snapshots()
        .iter()
        .filter(|b| b.state == CircuitState::Open)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        policies: state.gateway.policy_count(),
        open_circuits,
    })
}

pub async fn get_policies(State(state): State<AdminState>) -> Json<Vec<Policy>> {
    let policies = state
        .gateway
        .policies()
        .iter()
        .map(|p| Policy::clone(p))
        .collect();
    Json(policies)
}

pub async fn get_breakers(State(state): State<AdminState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.gateway.breaker_snapshots())
}

pub async fn get_limits(State(state): State<AdminState>) -> Json<Vec<LimiterLevel>> {
    Json(state.gateway.limiter_levels())
}
