//! # GET /health
//!
//! 稼働状況を返す。鍵素材やCosignerへの疎通は確認しない。

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use callback_types::HealthStatus;
use chrono::SecondsFormat;

use super::SECURITY_HEADERS;
use crate::config::AppState;

/// GET /health, GET / — ヘルスチェック。
pub async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = HealthStatus {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment.clone(),
        endpoints: vec!["GET /health".to_string(), "POST /callback".to_string()],
    };
    (SECURITY_HEADERS, Json(status))
}

#[cfg(test)]
mod tests {
    use crate::config::{ApprovalMode, VerifierSettings};
    use crate::test_helpers::{
        credential_store_without_keys, start_server, test_orchestrator, test_state,
    };
    use callback_types::HealthStatus;

    /// 鍵が無くてもヘルスチェックは成功する
    #[tokio::test]
    async fn test_health() {
        let base = start_server(test_state(test_orchestrator(
            credential_store_without_keys(),
            VerifierSettings::default(),
            ApprovalMode::Approve,
        )))
        .await;

        for path in ["/health", "/"] {
            let response = reqwest::get(format!("{base}{path}")).await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            assert_eq!(response.headers()["x-frame-options"], "DENY");

            let health: HealthStatus = response.json().await.unwrap();
            assert_eq!(health.status, "healthy");
            assert_eq!(health.environment, "test");
            assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
            assert_eq!(health.endpoints, vec!["GET /health", "POST /callback"]);
            assert!(chrono::DateTime::parse_from_rfc3339(&health.timestamp).is_ok());
        }
    }
}
