//! # Cosigner Callback Handler
//!
//! Cosignerから送られる署名済み承認リクエスト（RS256 JWT）を検証し、
//! 承認判定を署名済みJWTで返すWebhookサーバー。
//!
//! ## 役割
//! - 鍵素材の解決（SSMパラメータストア → 環境変数 → ローカルファイル）
//! - 受信JWTの署名検証（ゼロ署名バイパスはオプション）
//! - 承認判定（スタブポリシー）
//! - 応答JWTの署名
//!
//! ## API エンドポイント
//! - `POST /callback`（任意のパス） — 検証 → 判定 → 署名
//! - `GET /health`, `GET /` — ヘルスチェック

mod config;
mod credentials;
mod decision;
mod endpoints;
mod error;
mod logging;
mod orchestrator;
mod token;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;

use config::{AppState, CallbackConfig};
use credentials::{CredentialStore, SecretStore};
use orchestrator::Orchestrator;
use token::{TokenIssuer, TokenVerifier};

/// ルーターを構築する。
///
/// `/` と `/health` のGETはヘルスチェック、それ以外は全てコールバック
/// ハンドラに渡し、ハンドラ側でメソッドを判定する。
pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route(
            "/",
            get(endpoints::handle_health).fallback(endpoints::handle_callback),
        )
        .route(
            "/health",
            get(endpoints::handle_health).fallback(endpoints::handle_callback),
        )
        .fallback(endpoints::handle_callback)
        .with_state(state)
}

#[cfg(feature = "vendor-aws")]
async fn secret_store(config: &CallbackConfig) -> Option<Arc<dyn SecretStore>> {
    if !config.credentials.use_secret_store {
        return None;
    }
    let store: Arc<dyn SecretStore> =
        Arc::new(credentials::SsmSecretStore::from_region(&config.aws_region).await);
    Some(store)
}

#[cfg(not(feature = "vendor-aws"))]
async fn secret_store(config: &CallbackConfig) -> Option<Arc<dyn SecretStore>> {
    if config.credentials.use_secret_store {
        tracing::warn!(
            "USE_SSM_PARAMETERS=true ですが vendor-aws フィーチャーが無効です。環境変数とファイルのみ使用します"
        );
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CallbackConfig::from_env()?;
    logging::init_tracing(&config)?;

    tracing::info!(
        environment = %config.environment,
        use_ssm = config.credentials.use_secret_store,
        certs_dir = %config.credentials.certs_dir.display(),
        approval_mode = ?config.decision.mode,
        "設定を読み込みました"
    );
    if config.verifier.allow_zero_signature {
        tracing::warn!("ALLOW_ZERO_SIGNATURE が有効です。全ゼロ署名のJWTは署名検証なしで受理されます");
    }
    if config.verifier.full_jwt_logging {
        tracing::warn!("FULL_JWT_LOGGING が有効です。受信JWTがログに全文出力されます");
    }

    let credentials = Arc::new(CredentialStore::new(
        config.credentials.clone(),
        secret_store(&config).await,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        TokenVerifier::new(credentials.clone(), config.verifier),
        decision::policy_from_config(&config.decision),
        TokenIssuer::new(credentials),
    ));

    let state = Arc::new(AppState {
        orchestrator,
        full_jwt_logging: config.verifier.full_jwt_logging,
        environment: config.environment.clone(),
        started_at: Instant::now(),
    });

    let app = router(state);

    tracing::info!("Callbackサーバーを {} で起動します", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
