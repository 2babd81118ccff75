//! # 応答JWTの発行
//!
//! Callback秘密鍵でRS256署名する。`iat` は無ければ現在時刻、`exp` は常に `iat` + 1時間。

use std::sync::Arc;

use callback_types::{CallbackResponseClaims, ClaimSet};

use super::TokenError;
use crate::credentials::{CredentialStore, KeyKind};

/// 応答JWTの発行器。
pub struct TokenIssuer {
    credentials: Arc<CredentialStore>,
}

impl TokenIssuer {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self { credentials }
    }

    /// 任意のクレームに署名する。鍵取得の失敗も `SigningFailed` として返す。
    pub async fn sign(&self, claims: &ClaimSet) -> Result<String, TokenError> {
        let key = self
            .credentials
            .resolve(KeyKind::Signing)
            .await
            .map_err(|e| TokenError::SigningFailed(e.to_string()))?;

        let issued_at = chrono::Utc::now().timestamp();
        callback_crypto::rs256_sign(claims, key, issued_at)
            .map_err(|e| TokenError::SigningFailed(e.to_string()))
    }

    /// 判定結果の応答クレームに署名する。
    pub async fn sign_response(
        &self,
        response: &CallbackResponseClaims,
    ) -> Result<String, TokenError> {
        let claims = match serde_json::to_value(response) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(other) => {
                return Err(TokenError::SigningFailed(format!(
                    "応答クレームがJSONオブジェクトではありません: {other}"
                )))
            }
            Err(e) => {
                return Err(TokenError::SigningFailed(format!(
                    "応答クレームのシリアライズに失敗: {e}"
                )))
            }
        };
        self.sign(&claims).await
    }
}
