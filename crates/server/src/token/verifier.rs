//! # 受信JWTの検証
//!
//! 1. 構造解析（3セグメント、ヘッダ/ペイロードがJSONオブジェクト）
//! 2. 非機密のサマリをDEBUGで出力
//! 3. `FULL_JWT_LOGGING` 有効時はヘッダとペイロードをWARNで全文出力
//! 4. `ALLOW_ZERO_SIGNATURE` 有効かつ署名が全て0x00なら暗号検証を省略
//! 5. それ以外はCosigner公開鍵でRS256検証（`alg` はRS256のみ、`exp` があれば数値として猶予なしで検証）

use std::sync::Arc;

use callback_crypto::{is_zero_signature, parse_token, rs256_verify, CryptoError};
use callback_types::VerifiedClaims;

use super::{prefix, TokenError, PREVIEW_CHARS};
use crate::config::VerifierSettings;
use crate::credentials::{CredentialStore, KeyKind};

/// 受信JWTの検証器。
pub struct TokenVerifier {
    credentials: Arc<CredentialStore>,
    settings: VerifierSettings,
}

impl TokenVerifier {
    pub fn new(credentials: Arc<CredentialStore>, settings: VerifierSettings) -> Self {
        Self {
            credentials,
            settings,
        }
    }

    /// JWTを検証し、クレームを返す。
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, TokenError> {
        let parsed = parse_token(token).map_err(|e| {
            tracing::warn!(
                token_len = token.len(),
                token_prefix = %prefix(token, PREVIEW_CHARS),
                error = %e,
                "JWTの構造解析に失敗"
            );
            TokenError::Malformed(e.to_string())
        })?;

        tracing::debug!(
            header_len = parsed.header_segment.len(),
            payload_len = parsed.payload_segment.len(),
            signature_len = parsed.signature_segment.len(),
            header_preview = %prefix(parsed.header_segment, PREVIEW_CHARS),
            payload_preview = %prefix(parsed.payload_segment, PREVIEW_CHARS),
            signature_preview = %prefix(parsed.signature_segment, PREVIEW_CHARS),
            "受信JWTのサマリ"
        );

        if self.settings.full_jwt_logging {
            tracing::warn!(
                header = %serde_json::Value::Object(parsed.header.clone()),
                payload = %serde_json::Value::Object(parsed.payload.clone()),
                "FULL_JWT_LOGGING: 受信JWTを全文出力しています（管理された環境でのみ使用すること）"
            );
        }

        if self.settings.allow_zero_signature && is_zero_signature(&parsed.signature) {
            let claims = VerifiedClaims::new(parsed.payload);
            tracing::warn!(
                tx_id = claims.tx_id().unwrap_or("-"),
                request_id = claims.request_id().unwrap_or("-"),
                signature_len = parsed.signature.len(),
                "ゼロ署名を検出。ALLOW_ZERO_SIGNATURE により署名検証と有効期限検証を省略します"
            );
            return Ok(claims);
        }

        let key = self.credentials.resolve(KeyKind::Verification).await?;
        let claims = rs256_verify(token, key).map_err(|e| {
            tracing::warn!(error = %e, "JWT署名検証に失敗");
            match e {
                CryptoError::MalformedToken(msg) => TokenError::Malformed(msg),
                other => TokenError::VerificationFailed(other.to_string()),
            }
        })?;

        let claims = VerifiedClaims::new(claims);
        tracing::debug!(
            tx_id = claims.tx_id().unwrap_or("-"),
            request_id = claims.request_id().unwrap_or("-"),
            operation = claims.operation().unwrap_or("-"),
            "JWT署名検証に成功"
        );
        Ok(claims)
    }
}
