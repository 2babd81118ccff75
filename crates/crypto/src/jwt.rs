//! # RS256 JWT
//!
//! 受信JWTの構造解析・署名検証と、応答JWTの署名。
//!
//! 署名検証は `jsonwebtoken` に委ね、アルゴリズムはRS256に固定する。
//! 構造解析（`parse_token`）は署名検証とは独立しており、ログ出力や
//! ゼロ署名判定のために検証前のヘッダ/ペイロードを取り出す用途に使う。

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use callback_types::ClaimSet;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::CryptoError;

/// 応答JWTの有効期間（秒）
pub const RESPONSE_TOKEN_TTL_SECS: i64 = 3600;

/// Base64urlエンジン（パディング有無を問わずデコード）
fn b64url() -> GeneralPurpose {
    GeneralPurpose::new(
        &base64::alphabet::URL_SAFE,
        GeneralPurposeConfig::new()
            .with_encode_padding(false)
            .with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
}

/// 署名未検証のJWTを3セグメントに分解した結果。
#[derive(Debug, Clone)]
pub struct ParsedToken<'a> {
    /// ヘッダセグメント（Base64urlのまま）
    pub header_segment: &'a str,
    /// ペイロードセグメント（Base64urlのまま）
    pub payload_segment: &'a str,
    /// 署名セグメント（Base64urlのまま）
    pub signature_segment: &'a str,
    /// デコード済みヘッダ
    pub header: ClaimSet,
    /// デコード済みペイロード（未検証）
    pub payload: ClaimSet,
    /// デコード済み署名バイト列
    pub signature: Vec<u8>,
}

/// JWTを `header.payload.signature` に分解し、各セグメントをデコードする。
///
/// 署名は検証しない。ヘッダとペイロードはJSONオブジェクトでなければならない。
/// 署名セグメントが空でも構造としては受理する（検証で失敗する）。
pub fn parse_token(token: &str) -> Result<ParsedToken<'_>, CryptoError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header_segment, payload_segment, signature_segment] = segments[..] else {
        return Err(CryptoError::MalformedToken(format!(
            "3セグメントである必要があります（実際: {}）",
            segments.len()
        )));
    };
    if header_segment.is_empty() || payload_segment.is_empty() {
        return Err(CryptoError::MalformedToken(
            "ヘッダまたはペイロードが空です".to_string(),
        ));
    }

    let header = decode_json_segment(header_segment, "ヘッダ")?;
    let payload = decode_json_segment(payload_segment, "ペイロード")?;
    let signature = b64url().decode(signature_segment).map_err(|e| {
        CryptoError::MalformedToken(format!("署名のBase64urlデコードに失敗: {e}"))
    })?;

    Ok(ParsedToken {
        header_segment,
        payload_segment,
        signature_segment,
        header,
        payload,
        signature,
    })
}

fn decode_json_segment(segment: &str, label: &str) -> Result<ClaimSet, CryptoError> {
    let bytes = b64url().decode(segment).map_err(|e| {
        CryptoError::MalformedToken(format!("{label}のBase64urlデコードに失敗: {e}"))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        CryptoError::MalformedToken(format!("{label}がJSONオブジェクトではありません: {e}"))
    })
}

/// 署名バイト列が空でなく、全て0x00であるかを判定する。
pub fn is_zero_signature(signature: &[u8]) -> bool {
    !signature.is_empty() && signature.iter().all(|b| *b == 0)
}

/// RS256署名を検証し、ペイロードを返す。
///
/// - ヘッダの `alg` はRS256のみ許可（未知のアルゴリズムや `none` も署名検証失敗として扱う）
/// - `exp` が存在する場合は数値でなければならず、猶予なしで期限を検証（`exp` 自体は必須ではない）
/// - `aud` は検証しない
pub fn rs256_verify(token: &str, public_key_pem: &[u8]) -> Result<ClaimSet, CryptoError> {
    let parsed = parse_token(token)?;
    match parsed.header.get("alg").and_then(|v| v.as_str()) {
        Some("RS256") => {}
        other => {
            return Err(CryptoError::SignatureInvalid(format!(
                "RS256以外のアルゴリズムは受け付けません: {}",
                other.unwrap_or("(未指定)")
            )))
        }
    }

    let key = DecodingKey::from_rsa_pem(public_key_pem)
        .map_err(|e| CryptoError::InvalidKey(format!("公開鍵PEMの解析に失敗: {e}")))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = 0;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    // 構造は parse_token で検証済みのため、ここでの解析失敗は検証失敗として扱う
    let data = jsonwebtoken::decode::<ClaimSet>(token, &key, &validation).map_err(|e| {
        match map_jwt_error(e) {
            CryptoError::MalformedToken(msg) => CryptoError::SignatureInvalid(msg),
            other => other,
        }
    })?;

    check_expiry(&data.claims, jsonwebtoken::get_current_timestamp())?;
    Ok(data.claims)
}

/// `exp` を検証する。`jsonwebtoken` は `u64` として読めない `exp`（負数・文字列）を
/// 黙って無視するため、ペイロードの値を直接確認する。
fn check_expiry(claims: &ClaimSet, now: u64) -> Result<(), CryptoError> {
    let Some(exp) = claims.get("exp") else {
        return Ok(());
    };
    let exp = exp
        .as_f64()
        .ok_or_else(|| CryptoError::InvalidClaim(format!("exp が数値ではありません: {exp}")))?;
    if now as f64 >= exp {
        return Err(CryptoError::Expired);
    }
    Ok(())
}

/// クレームにRS256で署名する。
///
/// `iat` が無ければ `issued_at` を設定し、`exp` は常に `issued_at` +
/// [`RESPONSE_TOKEN_TTL_SECS`] で上書きする。
pub fn rs256_sign(
    claims: &ClaimSet,
    private_key_pem: &[u8],
    issued_at: i64,
) -> Result<String, CryptoError> {
    let key = EncodingKey::from_rsa_pem(private_key_pem)
        .map_err(|e| CryptoError::InvalidKey(format!("秘密鍵PEMの解析に失敗: {e}")))?;

    let mut claims = claims.clone();
    claims
        .entry("iat")
        .or_insert_with(|| serde_json::Value::from(issued_at));
    claims.insert(
        "exp".to_string(),
        serde_json::Value::from(issued_at + RESPONSE_TOKEN_TTL_SECS),
    );

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| CryptoError::Signing(e.to_string()))
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> CryptoError {
    match err.kind() {
        ErrorKind::ExpiredSignature => CryptoError::Expired,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => CryptoError::MalformedToken(err.to_string()),
        ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
            CryptoError::InvalidKey(err.to_string())
        }
        _ => CryptoError::SignatureInvalid(err.to_string()),
    }
}
