//! # Cosigner Callback 暗号処理
//!
//! Cosignerとの相互認証に使う暗号プリミティブを実装する。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | 受信JWTの署名検証 | RS256 (RSASSA-PKCS1-v1_5 + SHA-256) |
//! | 応答JWTの署名 | RS256 |
//! | 鍵フィンガープリント | SHA-256 |

pub mod jwt;

use base64::Engine;
use sha2::{Digest, Sha256};

pub use jwt::{
    is_zero_signature, parse_token, rs256_sign, rs256_verify, ParsedToken,
    RESPONSE_TOKEN_TTL_SECS,
};

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// JWTの構造が不正（3セグメントでない、Base64url/JSONとして解釈できない等）
    #[error("JWTの形式が不正です: {0}")]
    MalformedToken(String),
    /// PEM鍵の読み込みに失敗
    #[error("鍵の読み込みに失敗しました: {0}")]
    InvalidKey(String),
    /// 署名またはアルゴリズムの検証に失敗
    #[error("JWT署名検証に失敗しました: {0}")]
    SignatureInvalid(String),
    /// 登録済みクレームの値が不正（`exp` が数値でない等）
    #[error("JWTのクレームが不正です: {0}")]
    InvalidClaim(String),
    /// `exp` を過ぎている
    #[error("JWTの有効期限が切れています")]
    Expired,
    /// JWT署名の生成に失敗
    #[error("JWT署名に失敗しました: {0}")]
    Signing(String),
}

/// SHA-256ハッシュ計算。
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// 鍵素材のフィンガープリント（鍵そのものは含まない）。
///
/// 鍵ローテーション時に正しい鍵が読み込まれたかを運用者が確認するために使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFingerprints {
    /// PEM本文をBase64デコードしたDERのSHA-256（hex）。PEMとして解釈できない場合は `None`
    pub der_sha256: Option<String>,
    /// PEMテキスト全体のSHA-256（hex）
    pub pem_sha256: String,
}

/// PEM鍵素材の2種類のフィンガープリントを計算する。
pub fn key_fingerprints(pem: &[u8]) -> KeyFingerprints {
    KeyFingerprints {
        der_sha256: pem_to_der(pem).map(|der| hex::encode(sha256(&der))),
        pem_sha256: hex::encode(sha256(pem)),
    }
}

/// PEMのヘッダ/フッタ行を除いた本文をデコードする。
fn pem_to_der(pem: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(pem).ok()?;
    if !text.contains("-----BEGIN ") {
        return None;
    }
    let body: String = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();
    base64::engine::general_purpose::STANDARD.decode(body).ok()
}
