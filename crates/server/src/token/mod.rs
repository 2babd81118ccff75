//! # JWT検証・発行
//!
//! 受信JWTの検証（`verifier`）と応答JWTの署名（`issuer`）。
//! 鍵素材は `CredentialStore` から借用する。

pub mod issuer;
pub mod verifier;

pub use issuer::TokenIssuer;
pub use verifier::TokenVerifier;

use crate::credentials::CredentialError;

/// ログに出すプレビューの文字数
pub(crate) const PREVIEW_CHARS: usize = 16;

/// JWT検証・発行のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// 3セグメントのJWTとして解釈できない
    #[error("JWTの形式が不正です: {0}")]
    Malformed(String),
    /// 署名・アルゴリズム・有効期限の検証に失敗
    #[error("JWT検証に失敗しました: {0}")]
    VerificationFailed(String),
    /// 検証用の鍵素材が取得できない
    #[error(transparent)]
    CredentialUnavailable(#[from] CredentialError),
    /// 応答JWTの署名に失敗（鍵取得失敗を含む）
    #[error("応答JWTの署名に失敗しました: {0}")]
    SigningFailed(String),
}

/// 先頭 `n` 文字
pub(crate) fn prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// 末尾 `n` 文字
pub(crate) fn suffix(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}
