//! # POST — Cosignerコールバック
//!
//! 本文全体をJWTとして受け取り、検証・判定・署名の結果を返す。
//!
//! - `Content-Transfer-Encoding: base64` ヘッダがあれば本文をBase64デコード
//! - 前後の空白と、囲んでいる二重引用符1組を除去
//! - 成功: 200 `text/plain` で署名済みJWT
//! - 失敗: `{"error": "..."}` と 400 / 401 / 405 / 500

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use tracing::Instrument;

use super::SECURITY_HEADERS;
use crate::config::AppState;
use crate::error::{CallbackError, MSG_INVALID_BODY};
use crate::orchestrator::{Outcome, OutcomeBody};
use crate::token::{prefix, suffix, PREVIEW_CHARS};

/// 本文がBase64であることを示すヘッダ
const CONTENT_TRANSFER_ENCODING: &str = "content-transfer-encoding";

/// Cosignerからのコールバックを処理する。POST以外は405。
pub async fn handle_callback(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        tracing::warn!(method = %method, "許可されていないメソッド");
        return CallbackError::MethodNotAllowed.into_response();
    }

    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("request", request_id = %request_id);

    async move {
        tracing::info!(body_len = body.len(), "コールバックを受信");

        let token = match normalize_body(&headers, &body) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "リクエスト本文のデコードに失敗");
                return e.into_response();
            }
        };

        tracing::debug!(
            token_len = token.len(),
            token_prefix = %prefix(&token, PREVIEW_CHARS),
            token_suffix = %suffix(&token, PREVIEW_CHARS),
            "正規化したトークン"
        );
        if state.full_jwt_logging {
            tracing::warn!(
                raw_body = %String::from_utf8_lossy(&body),
                token = %token,
                "FULL_JWT_LOGGING: 受信本文と正規化後のトークンを全文出力しています"
            );
        }

        let outcome = state.orchestrator.clone().process(token).await;
        tracing::info!(
            status = outcome.status.as_u16(),
            success = outcome.success,
            stage = outcome.stage.as_str(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "リクエスト処理完了"
        );
        outcome.into_response()
    }
    .instrument(span)
    .await
}

/// 本文からトークン文字列を取り出す。
pub fn normalize_body(headers: &HeaderMap, body: &[u8]) -> Result<String, CallbackError> {
    let is_base64 = headers
        .get(CONTENT_TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("base64"));

    let decoded;
    let bytes = if is_base64 {
        let text = std::str::from_utf8(body)
            .map_err(|_| CallbackError::BadRequest(MSG_INVALID_BODY.to_string()))?;
        decoded = base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|_| CallbackError::BadRequest(MSG_INVALID_BODY.to_string()))?;
        decoded.as_slice()
    } else {
        body
    };

    let text = std::str::from_utf8(bytes)
        .map_err(|_| CallbackError::BadRequest(MSG_INVALID_BODY.to_string()))?
        .trim();
    let unquoted = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    Ok(unquoted.trim().to_string())
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self.body {
            OutcomeBody::Token(token) => (
                StatusCode::OK,
                SECURITY_HEADERS,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                token,
            )
                .into_response(),
            OutcomeBody::Error(err) => err.into_response(),
        }
    }
}
