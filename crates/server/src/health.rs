use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chokepoint_core::config::LlmConfig;
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    llm: LlmConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub llm: HealthCheck,
    pub checked_at: String,
}

pub fn router(llm: LlmConfig) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { llm })
}

/// Readiness of the process itself. The model backend is reported, not probed:
/// a health check must never spend tokens.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "chokepoint-server runtime initialized".to_string(),
        },
        llm: llm_check(&state.llm),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

fn llm_check(llm: &LlmConfig) -> HealthCheck {
    let endpoint = llm.base_url.as_deref().unwrap_or("provider default");
    HealthCheck {
        status: "configured",
        detail: format!("{} model `{}` via {endpoint}", llm.provider.as_str(), llm.model),
    }
}
