//! # 承認判定ポリシー
//!
//! 検証済みクレームから APPROVE / REJECT を決める。
//! 実際のルールエンジンは持たず、設定で選ぶスタブポリシーのみ提供する。

use std::sync::Arc;
use std::time::Duration;

use callback_types::{Action, Decision, VerifiedClaims};
use chrono::SecondsFormat;

use crate::config::{ApprovalMode, DecisionConfig};

/// 承認判定の抽象インターフェース。必ずAPPROVEかREJECTを返す。
#[async_trait::async_trait]
pub trait DecisionPolicy: Send + Sync {
    async fn decide(&self, claims: &VerifiedClaims) -> Decision;
}

/// 一定時間待ってから承認するポリシー。
pub struct DelayedApproval {
    delay: Duration,
}

impl DelayedApproval {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl DecisionPolicy for DelayedApproval {
    async fn decide(&self, claims: &VerifiedClaims) -> Decision {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        decision(Action::Approve, "Approved after delayed review", claims)
    }
}

/// 常に拒否するポリシー。
pub struct AlwaysReject {
    reason: String,
}

impl AlwaysReject {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl DecisionPolicy for AlwaysReject {
    async fn decide(&self, claims: &VerifiedClaims) -> Decision {
        decision(Action::Reject, &self.reason, claims)
    }
}

/// 設定からポリシーを構築する。
pub fn policy_from_config(config: &DecisionConfig) -> Arc<dyn DecisionPolicy> {
    match config.mode {
        ApprovalMode::Approve => Arc::new(DelayedApproval::new(config.approval_delay)),
        ApprovalMode::Reject => Arc::new(AlwaysReject::new(config.rejection_reason.clone())),
    }
}

fn decision(action: Action, reason: &str, claims: &VerifiedClaims) -> Decision {
    Decision {
        action,
        reason: reason.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        correlation_id: claims.correlation_id().map(str::to_string),
    }
}
