//! # リクエスト処理
//!
//! 1リクエストを 検証 → 判定 → 署名 の順に進め、各段階の失敗を
//! HTTPステータス付きの結果に変換する。
//!
//! ## 状態遷移
//! `Received → Verifying → (Verified | RejectedAuth) → Deciding → Signing →
//! (Completed | RejectedSigning)`
//!
//! | 失敗 | ステータス |
//! |------|-----------|
//! | 空入力・JWT形式不正 | 400 |
//! | 署名・有効期限の検証失敗 | 401 |
//! | 検証鍵の取得失敗・署名失敗・パニック | 500 |

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use callback_types::CallbackResponseClaims;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

use crate::decision::DecisionPolicy;
use crate::error::{
    CallbackError, MSG_INTERNAL, MSG_INVALID_JWT, MSG_SIGNING_FAILED, MSG_VERIFICATION_FAILED,
};
use crate::token::{TokenError, TokenIssuer, TokenVerifier};

/// リクエスト処理の段階。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestStage {
    Received = 0,
    Verifying = 1,
    Verified = 2,
    RejectedAuth = 3,
    Deciding = 4,
    Signing = 5,
    Completed = 6,
    RejectedSigning = 7,
}

impl RequestStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStage::Received => "RECEIVED",
            RequestStage::Verifying => "VERIFYING",
            RequestStage::Verified => "VERIFIED",
            RequestStage::RejectedAuth => "REJECTED_AUTH",
            RequestStage::Deciding => "DECIDING",
            RequestStage::Signing => "SIGNING",
            RequestStage::Completed => "COMPLETED",
            RequestStage::RejectedSigning => "REJECTED_SIGNING",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => RequestStage::Verifying,
            2 => RequestStage::Verified,
            3 => RequestStage::RejectedAuth,
            4 => RequestStage::Deciding,
            5 => RequestStage::Signing,
            6 => RequestStage::Completed,
            7 => RequestStage::RejectedSigning,
            _ => RequestStage::Received,
        }
    }
}

/// 処理タスクと呼び出し元で共有する現在の段階。
/// パニック時にどこまで進んだかを記録するために使う。
#[derive(Clone)]
struct StageTracker(Arc<AtomicU8>);

impl StageTracker {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(RequestStage::Received as u8)))
    }

    fn enter(&self, stage: RequestStage) {
        self.0.store(stage as u8, Ordering::SeqCst);
        tracing::debug!(stage = stage.as_str(), "ステージ遷移");
    }

    fn current(&self) -> RequestStage {
        RequestStage::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// 破棄されたら処理タスクも中断する `JoinHandle`。
/// 呼び出し元（HTTP接続）が途中で切れた場合に判定・署名を走らせ続けない。
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 結果の本文。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeBody {
    /// 署名済み応答JWT
    Token(String),
    /// 失敗理由
    Error(CallbackError),
}

/// 1リクエストの処理結果。トランスポート層がHTTPレスポンスに変換する。
#[derive(Debug, Clone)]
pub struct Outcome {
    pub success: bool,
    pub status: StatusCode,
    pub body: OutcomeBody,
    pub elapsed: Duration,
    /// 処理が終了した段階
    pub stage: RequestStage,
}

impl Outcome {
    fn new(result: Result<String, CallbackError>, stage: RequestStage, elapsed: Duration) -> Self {
        match result {
            Ok(token) => Self {
                success: true,
                status: StatusCode::OK,
                body: OutcomeBody::Token(token),
                elapsed,
                stage,
            },
            Err(err) => Self {
                success: false,
                status: err.status(),
                body: OutcomeBody::Error(err),
                elapsed,
                stage,
            },
        }
    }
}

/// 検証・判定・署名を順に実行する。
pub struct Orchestrator {
    verifier: TokenVerifier,
    policy: Arc<dyn DecisionPolicy>,
    issuer: TokenIssuer,
}

impl Orchestrator {
    pub fn new(verifier: TokenVerifier, policy: Arc<dyn DecisionPolicy>, issuer: TokenIssuer) -> Self {
        Self {
            verifier,
            policy,
            issuer,
        }
    }

    /// 受信トークンを処理する。
    ///
    /// 処理は別タスクで実行し、パニックは500の結果に変換する。
    /// どの失敗もこの関数の外には伝播しない。返り値のFutureを破棄すると処理タスクも中断される。
    pub async fn process(self: Arc<Self>, token: String) -> Outcome {
        let started = Instant::now();
        let tracker = StageTracker::new();

        let task = {
            let tracker = tracker.clone();
            AbortOnDrop(tokio::spawn(
                async move { self.run(&token, &tracker).await }.in_current_span(),
            ))
        };

        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    stage = tracker.current().as_str(),
                    error = %e,
                    "リクエスト処理中に予期しないエラーが発生"
                );
                Err(CallbackError::Internal(MSG_INTERNAL.to_string()))
            }
        };

        Outcome::new(result, tracker.current(), started.elapsed())
    }

    async fn run(&self, token: &str, tracker: &StageTracker) -> Result<String, CallbackError> {
        tracker.enter(RequestStage::Verifying);
        if token.trim().is_empty() {
            tracing::warn!("空のリクエスト本文を受信");
            tracker.enter(RequestStage::RejectedAuth);
            return Err(CallbackError::BadRequest(MSG_INVALID_JWT.to_string()));
        }

        let stage_started = Instant::now();
        let claims = match self.verifier.verify(token).await {
            Ok(claims) => claims,
            Err(e) => {
                tracker.enter(RequestStage::RejectedAuth);
                return Err(verification_error(e));
            }
        };
        tracing::info!(
            stage = "verify",
            elapsed_ms = elapsed_ms(stage_started),
            tx_id = claims.tx_id().unwrap_or("-"),
            request_id = claims.request_id().unwrap_or("-"),
            "JWT検証完了"
        );
        tracker.enter(RequestStage::Verified);

        tracker.enter(RequestStage::Deciding);
        let stage_started = Instant::now();
        let decision = self.policy.decide(&claims).await;
        tracing::info!(
            stage = "decide",
            elapsed_ms = elapsed_ms(stage_started),
            action = %decision.action,
            reason = %decision.reason,
            "承認判定完了"
        );

        tracker.enter(RequestStage::Signing);
        let stage_started = Instant::now();
        let response = CallbackResponseClaims::from_decision(&decision, &claims);
        match self.issuer.sign_response(&response).await {
            Ok(signed) => {
                tracing::info!(
                    stage = "sign",
                    elapsed_ms = elapsed_ms(stage_started),
                    token_len = signed.len(),
                    "応答JWTを署名しました"
                );
                tracker.enter(RequestStage::Completed);
                Ok(signed)
            }
            Err(e) => {
                tracing::error!(error = %e, "応答JWTの署名に失敗");
                tracker.enter(RequestStage::RejectedSigning);
                Err(CallbackError::Internal(MSG_SIGNING_FAILED.to_string()))
            }
        }
    }
}

fn verification_error(err: TokenError) -> CallbackError {
    match err {
        TokenError::Malformed(_) => CallbackError::BadRequest(MSG_INVALID_JWT.to_string()),
        TokenError::VerificationFailed(_) => {
            CallbackError::Unauthorized(MSG_VERIFICATION_FAILED.to_string())
        }
        TokenError::CredentialUnavailable(e) => {
            tracing::error!(error = %e, "検証鍵を取得できません");
            CallbackError::Internal(MSG_INTERNAL.to_string())
        }
        TokenError::SigningFailed(_) => CallbackError::Internal(MSG_INTERNAL.to_string()),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
