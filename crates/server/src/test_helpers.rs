//! # テスト用共通ヘルパー
//!
//! 固定のRSA鍵、偽のパラメータストア、Cosigner署名付きリクエストの生成、
//! テストサーバーの起動を提供する。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use callback_types::ClaimSet;

use crate::config::{AppState, ApprovalMode, DecisionConfig, VerifierSettings};
use crate::credentials::{CredentialError, CredentialSettings, CredentialStore, KeySource, SecretStore};
use crate::decision::policy_from_config;
use crate::orchestrator::Orchestrator;
use crate::token::{TokenIssuer, TokenVerifier};

pub const COSIGNER_PRIVATE_PEM: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/cosigner_private.pem"));
pub const COSIGNER_PUBLIC_PEM: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/cosigner_public.pem"));
pub const CALLBACK_PRIVATE_PEM: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/callback_private.pem"));
pub const CALLBACK_PUBLIC_PEM: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/callback_public.pem"));

/// テスト用の偽パラメータストア。呼び出し回数を数える。
pub struct FakeSecretStore {
    values: HashMap<String, Vec<u8>>,
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeSecretStore {
    /// 指定のパラメータ1件を保持するストア
    pub fn with_value(name: &str, value: &str) -> Self {
        Self {
            values: HashMap::from([(name.to_string(), value.as_bytes().to_vec())]),
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// 常に失敗するストア
    pub fn failing() -> Self {
        Self {
            values: HashMap::new(),
            fail: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// 応答前に待機する
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SecretStore for FakeSecretStore {
    async fn fetch_secret(&self, name: &str) -> Result<Vec<u8>, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(CredentialError::SecretStore("connection refused".to_string()));
        }
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| CredentialError::SecretStore(format!("ParameterNotFound: {name}")))
    }
}

/// パラメータストア・環境変数ともに未設定の鍵設定
pub fn credential_settings(certs_dir: impl Into<PathBuf>) -> CredentialSettings {
    CredentialSettings {
        use_secret_store: false,
        verification: KeySource::default(),
        signing: KeySource::default(),
        certs_dir: certs_dir.into(),
        log_fingerprints: false,
    }
}

/// 両方の鍵を環境変数相当の値で与えた鍵ストア
pub fn credential_store_with_keys() -> Arc<CredentialStore> {
    let mut settings = credential_settings("/nonexistent");
    settings.verification.env_value = Some(COSIGNER_PUBLIC_PEM.to_string());
    settings.signing.env_value = Some(CALLBACK_PRIVATE_PEM.to_string());
    settings.log_fingerprints = true;
    Arc::new(CredentialStore::new(settings, None))
}

/// どのバックエンドからも鍵が得られない鍵ストア
pub fn credential_store_without_keys() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(
        credential_settings("/nonexistent/callback-certs"),
        None,
    ))
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// JSONオブジェクトをクレーム集合に変換する
pub fn claims(value: serde_json::Value) -> ClaimSet {
    value.as_object().cloned().unwrap()
}

/// Cosignerの秘密鍵で署名したリクエストJWT
pub fn sign_request(value: serde_json::Value) -> String {
    sign_request_at(value, now())
}

/// 発行時刻を指定してCosignerの秘密鍵で署名する
pub fn sign_request_at(value: serde_json::Value, issued_at: i64) -> String {
    callback_crypto::rs256_sign(&claims(value), COSIGNER_PRIVATE_PEM.as_bytes(), issued_at).unwrap()
}

/// クレームを書き換えずにCosignerの秘密鍵で署名する（`exp` の異常値を含むリクエスト用）
pub fn sign_request_raw(value: serde_json::Value) -> String {
    let key = jsonwebtoken::EncodingKey::from_rsa_pem(COSIGNER_PRIVATE_PEM.as_bytes()).unwrap();
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
        &value,
        &key,
    )
    .unwrap()
}

/// 任意のヘッダ・ペイロード・署名バイト列からJWTを組み立てる
pub fn assemble_token(header: serde_json::Value, payload: serde_json::Value, signature: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.{}",
        b64.encode(serde_json::to_vec(&header).unwrap()),
        b64.encode(serde_json::to_vec(&payload).unwrap()),
        b64.encode(signature)
    )
}

/// 署名が全て0x00（256バイト）のJWT
pub fn zero_signature_token(value: serde_json::Value) -> String {
    assemble_token(
        serde_json::json!({"alg": "RS256", "typ": "JWT"}),
        value,
        &[0u8; 256],
    )
}

/// 即時承認・テスト鍵のオーケストレータ
pub fn test_orchestrator(
    credentials: Arc<CredentialStore>,
    verifier: VerifierSettings,
    mode: ApprovalMode,
) -> Arc<Orchestrator> {
    let policy = policy_from_config(&DecisionConfig {
        mode,
        approval_delay: Duration::ZERO,
        rejection_reason: "blocked by test policy".to_string(),
    });
    Arc::new(Orchestrator::new(
        TokenVerifier::new(credentials.clone(), verifier),
        policy,
        TokenIssuer::new(credentials),
    ))
}

pub fn test_state(orchestrator: Arc<Orchestrator>) -> Arc<AppState> {
    Arc::new(AppState {
        orchestrator,
        full_jwt_logging: false,
        environment: "test".to_string(),
        started_at: Instant::now(),
    })
}

/// ルーターをエフェメラルポートで起動し、ベースURLを返す。
pub async fn start_server(state: Arc<AppState>) -> String {
    let app = crate::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}
