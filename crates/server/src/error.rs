//! # Callback エラー型
//!
//! トランスポート層でHTTPレスポンスに変換されるエラー型。
//! メッセージはCosignerにそのまま返るため、秘密情報や内部状態を含めない。

use axum::http::StatusCode;
use axum::Json;
use callback_types::ErrorBody;

use crate::endpoints::SECURITY_HEADERS;

/// JWTとして解釈できない入力
pub const MSG_INVALID_JWT: &str = "Invalid JWT format";
/// 署名・有効期限の検証失敗
pub const MSG_VERIFICATION_FAILED: &str = "JWT verification failed";
/// 応答JWTの署名失敗
pub const MSG_SIGNING_FAILED: &str = "Failed to generate response JWT";
/// 鍵取得失敗・パニック等
pub const MSG_INTERNAL: &str = "Internal server error";
/// 本文のデコード失敗
pub const MSG_INVALID_BODY: &str = "Invalid request body";

/// Callbackエラー型。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    /// 不正なリクエスト（JWT形式不正、本文デコード失敗）
    #[error("{0}")]
    BadRequest(String),
    /// JWT署名検証に失敗
    #[error("{0}")]
    Unauthorized(String),
    /// POST以外のメソッド
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    /// 内部エラー（鍵取得失敗、署名失敗、予期しないパニック）
    #[error("{0}")]
    Internal(String),
}

impl CallbackError {
    /// 対応するHTTPステータス
    pub fn status(&self) -> StatusCode {
        match self {
            CallbackError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CallbackError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CallbackError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            CallbackError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for CallbackError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), SECURITY_HEADERS, Json(body)).into_response()
    }
}
