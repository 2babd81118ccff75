//! # Cosigner Callback 共有型定義
//!
//! Cosignerとの間でやり取りするJWTクレーム、承認判定、HTTPレスポンス本文の
//! データ構造をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - JWTクレームのキーはCosignerの仕様に合わせてcamelCase（`txId`, `requestId`）
//! - タイムスタンプはRFC 3339文字列（UTC）

use serde::{Deserialize, Serialize};

/// JWTクレームの集合（クレーム名 → JSON値）。
pub type ClaimSet = serde_json::Map<String, serde_json::Value>;

/// トランザクションIDのクレーム名
pub const CLAIM_TX_ID: &str = "txId";
/// リクエストIDのクレーム名（応答で必ずエコーする相関キー）
pub const CLAIM_REQUEST_ID: &str = "requestId";
/// オペレーション種別のクレーム名
pub const CLAIM_OPERATION: &str = "operation";

// ---------------------------------------------------------------------------
// 検証済みクレーム
// ---------------------------------------------------------------------------

/// 署名検証（またはゼロ署名バイパス）を通過したJWTペイロード。
///
/// 1リクエストの間だけ存在し、承認判定に渡される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifiedClaims(ClaimSet);

impl VerifiedClaims {
    /// クレーム集合から構築する。
    pub fn new(claims: ClaimSet) -> Self {
        Self(claims)
    }

    /// 内部のクレーム集合への参照を返す。
    pub fn as_map(&self) -> &ClaimSet {
        &self.0
    }

    /// 内部のクレーム集合を取り出す。
    pub fn into_inner(self) -> ClaimSet {
        self.0
    }

    /// 文字列クレームを取得する。数値クレームは文字列化しない。
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }

    /// トランザクションID（`txId`）
    pub fn tx_id(&self) -> Option<&str> {
        self.get_str(CLAIM_TX_ID)
    }

    /// CosignerのリクエストID（`requestId`）
    pub fn request_id(&self) -> Option<&str> {
        self.get_str(CLAIM_REQUEST_ID)
    }

    /// オペレーション種別（`operation`）
    pub fn operation(&self) -> Option<&str> {
        self.get_str(CLAIM_OPERATION)
    }

    /// 応答にエコーする相関キー。
    ///
    /// `requestId` を正とし、存在しない場合のみ `txId` で代替する。
    pub fn correlation_id(&self) -> Option<&str> {
        self.request_id().or_else(|| self.tx_id())
    }
}

// ---------------------------------------------------------------------------
// 承認判定
// ---------------------------------------------------------------------------

/// 承認判定のアクション。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// 署名を承認する
    Approve,
    /// 署名を拒否する
    Reject,
}

impl Action {
    /// ワイヤ表現（`"APPROVE"` / `"REJECT"`）
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "APPROVE",
            Action::Reject => "REJECT",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 承認判定の結果。判定ポリシーが生成し、応答JWTの署名に直ちに使われる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// 承認 / 拒否
    pub action: Action,
    /// 判定理由
    pub reason: String,
    /// 判定時刻（RFC 3339）
    pub timestamp: String,
    /// 相関キー（`requestId`、なければ `txId`）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

// ---------------------------------------------------------------------------
// 応答JWTのクレーム
// ---------------------------------------------------------------------------

/// Callback応答JWTのペイロード。
///
/// `iat` / `exp` は署名時に付与されるためここには含めない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResponseClaims {
    /// 承認 / 拒否
    pub action: Action,
    /// CosignerのrequestIdのエコー（なければtxId）
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// トランザクションID（受信クレームに存在した場合のみ）
    #[serde(rename = "txId", skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    /// 判定時刻（RFC 3339）
    pub timestamp: String,
    /// 拒否理由（REJECTの場合のみ）
    #[serde(rename = "rejectionReason", skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl CallbackResponseClaims {
    /// 判定結果と受信クレームから応答クレームを構築する。
    pub fn from_decision(decision: &Decision, claims: &VerifiedClaims) -> Self {
        let rejection_reason = match decision.action {
            Action::Reject => Some(decision.reason.clone()),
            Action::Approve => None,
        };
        Self {
            action: decision.action,
            request_id: decision
                .correlation_id
                .clone()
                .or_else(|| claims.correlation_id().map(str::to_string)),
            tx_id: claims.tx_id().map(str::to_string),
            timestamp: decision.timestamp.clone(),
            rejection_reason,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTPレスポンス本文
// ---------------------------------------------------------------------------

/// 失敗時のJSONレスポンス本文 `{"error": "..."}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// エラーメッセージ
    pub error: String,
}

/// GET /health レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// 常に "healthy"
    pub status: String,
    /// 応答時刻（RFC 3339）
    pub timestamp: String,
    /// プロセス起動からの経過秒数
    pub uptime_secs: u64,
    /// サーバーバージョン
    pub version: String,
    /// 実行環境ラベル（`APP_ENV` / `NODE_ENV`）
    pub environment: String,
    /// 公開しているエンドポイント
    pub endpoints: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(value: serde_json::Value) -> VerifiedClaims {
        VerifiedClaims::new(value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_correlation_prefers_request_id() {
        let c = claims(serde_json::json!({"txId": "tx-1", "requestId": "req-1"}));
        assert_eq!(c.correlation_id(), Some("req-1"));

        let c = claims(serde_json::json!({"txId": "tx-1"}));
        assert_eq!(c.correlation_id(), Some("tx-1"));

        let c = claims(serde_json::json!({"txId": "", "requestId": 42}));
        assert_eq!(c.correlation_id(), None);
    }

    #[test]
    fn test_response_claims_wire_format() {
        let c = claims(serde_json::json!({"txId": "tx-1", "requestId": "req-1"}));
        let decision = Decision {
            action: Action::Reject,
            reason: "blocked".to_string(),
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            correlation_id: c.correlation_id().map(str::to_string),
        };

        let value = serde_json::to_value(CallbackResponseClaims::from_decision(&decision, &c)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "action": "REJECT",
                "requestId": "req-1",
                "txId": "tx-1",
                "timestamp": "2025-01-01T00:00:00Z",
                "rejectionReason": "blocked",
            })
        );
    }

    /// APPROVEでは拒否理由を出力しない
    #[test]
    fn test_approve_omits_rejection_reason() {
        let c = claims(serde_json::json!({"requestId": "req-1"}));
        let decision = Decision {
            action: Action::Approve,
            reason: "ok".to_string(),
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            correlation_id: None,
        };

        let response = CallbackResponseClaims::from_decision(&decision, &c);
        assert_eq!(response.request_id.as_deref(), Some("req-1"));
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("rejectionReason").is_none());
        assert!(value.get("txId").is_none());
        assert_eq!(value["action"], "APPROVE");
    }
}
