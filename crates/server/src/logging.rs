//! # ログ初期化
//!
//! JSON形式の構造化ログを標準出力に出す。
//! `LOG_LEVEL`（DEBUG / INFO / WARN / ERROR、大文字小文字を問わない）が優先され、
//! 未設定なら本番環境はINFO、それ以外はDEBUG。

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CallbackConfig;

/// ログレベルを決定する。未知の `LOG_LEVEL` は環境に応じた既定値に戻す。
pub fn resolve_level(config: &CallbackConfig) -> tracing::Level {
    let fallback = if config.is_production() {
        tracing::Level::INFO
    } else {
        tracing::Level::DEBUG
    };
    config
        .log_level
        .as_deref()
        .and_then(parse_level)
        .unwrap_or(fallback)
}

/// 受け付けるのは DEBUG / INFO / WARN / ERROR の4段階のみ（TRACE や数値は不可）
fn parse_level(value: &str) -> Option<tracing::Level> {
    match value.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

/// グローバルのtracing subscriberを設定する。二度目以降の呼び出しはエラー。
pub fn init_tracing(config: &CallbackConfig) -> anyhow::Result<()> {
    let level = resolve_level(config);
    let filter = tracing_subscriber::EnvFilter::new(level.as_str().to_ascii_lowercase());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}
