//! # Callbackエンドポイント
//!
//! - `POST` (任意のパス) — 受信JWTを検証し、署名済み応答JWTを返す
//! - `GET /health`, `GET /` — ヘルスチェック
//!
//! 全てのレスポンスにセキュリティヘッダを付与する。

pub mod callback;
pub mod health;

pub use callback::handle_callback;
pub use health::handle_health;

use axum::http::header::{self, HeaderName};

/// 全レスポンス共通のセキュリティヘッダ
pub const SECURITY_HEADERS: [(HeaderName, &str); 3] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
];
