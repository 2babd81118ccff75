//! # Callback設定・共有状態
//!
//! 環境変数からの設定読み込みとハンドラ間で共有する状態の定義。
//!
//! 設定は注入可能なlookup関数から組み立てるため、テストでプロセスの
//! 環境変数を書き換える必要はない。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::credentials::{CredentialSettings, KeySource};
use crate::orchestrator::Orchestrator;

/// 既定の待ち受けアドレス
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
/// 既定のAWSリージョン
pub const DEFAULT_AWS_REGION: &str = "ap-northeast-1";
/// 既定の鍵ファイルディレクトリ
pub const DEFAULT_CERTS_DIR: &str = "certs";
/// スタブ承認の既定待ち時間（ミリ秒）
pub const DEFAULT_APPROVAL_DELAY_MS: u64 = 1000;
/// 拒否モードの既定の拒否理由
pub const DEFAULT_REJECTION_REASON: &str = "Rejected by callback policy";

/// 設定エラー。起動時に報告される。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 数値として解釈できない
    #[error("{name} の値が数値ではありません: {value}")]
    InvalidNumber {
        /// 環境変数名
        name: &'static str,
        /// 与えられた値
        value: String,
    },
    /// `APPROVAL_MODE` が未知の値
    #[error("APPROVAL_MODE が不正です（approve / reject）: {0}")]
    InvalidApprovalMode(String),
}

/// スタブ判定ポリシーの動作モード。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    /// 一定時間待ってから承認
    Approve,
    /// 常に拒否
    Reject,
}

impl std::str::FromStr for ApprovalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(ApprovalMode::Approve),
            "reject" => Ok(ApprovalMode::Reject),
            _ => Err(ConfigError::InvalidApprovalMode(s.to_string())),
        }
    }
}

/// 承認判定の設定。
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// 動作モード
    pub mode: ApprovalMode,
    /// 承認までの待ち時間
    pub approval_delay: Duration,
    /// 拒否モードで返す理由
    pub rejection_reason: String,
}

/// トークン検証の設定。
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifierSettings {
    /// 全ゼロ署名の検証バイパスを許可するか
    pub allow_zero_signature: bool,
    /// トークン全体をログ出力するか
    pub full_jwt_logging: bool,
}

/// Callbackサーバーの全設定。
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// 待ち受けアドレス
    pub listen_addr: String,
    /// SSMのリージョン
    pub aws_region: String,
    /// 鍵素材の取得元
    pub credentials: CredentialSettings,
    /// トークン検証
    pub verifier: VerifierSettings,
    /// 承認判定
    pub decision: DecisionConfig,
    /// 実行環境ラベル（`APP_ENV`、なければ `NODE_ENV`）
    pub environment: String,
    /// `LOG_LEVEL` の値（未設定なら `None`）
    pub log_level: Option<String>,
}

impl CallbackConfig {
    /// プロセスの環境変数から読み込む。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意のlookup関数から読み込む。空文字列は未設定として扱う。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let flag = |name: &str| {
            get(name)
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        let approval_delay_ms = match get("APPROVAL_DELAY_MS") {
            Some(v) => v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                name: "APPROVAL_DELAY_MS",
                value: v.clone(),
            })?,
            None => DEFAULT_APPROVAL_DELAY_MS,
        };
        let mode = match get("APPROVAL_MODE") {
            Some(v) => v.parse()?,
            None => ApprovalMode::Approve,
        };

        Ok(Self {
            listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            aws_region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
            credentials: CredentialSettings {
                use_secret_store: flag("USE_SSM_PARAMETERS"),
                verification: KeySource {
                    parameter_name: get("COSIGNER_PUBLIC_KEY_PARAMETER"),
                    env_value: get("COSIGNER_PUBLIC_KEY"),
                },
                signing: KeySource {
                    parameter_name: get("CALLBACK_PRIVATE_KEY_PARAMETER"),
                    env_value: get("CALLBACK_PRIVATE_KEY"),
                },
                certs_dir: PathBuf::from(
                    get("CERTS_DIR").unwrap_or_else(|| DEFAULT_CERTS_DIR.to_string()),
                ),
                log_fingerprints: flag("LOG_KEY_FINGERPRINTS"),
            },
            verifier: VerifierSettings {
                allow_zero_signature: flag("ALLOW_ZERO_SIGNATURE"),
                full_jwt_logging: flag("FULL_JWT_LOGGING"),
            },
            decision: DecisionConfig {
                mode,
                approval_delay: Duration::from_millis(approval_delay_ms),
                rejection_reason: get("REJECTION_REASON")
                    .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string()),
            },
            environment: get("APP_ENV")
                .or_else(|| get("NODE_ENV"))
                .unwrap_or_else(|| "development".to_string()),
            log_level: get("LOG_LEVEL"),
        })
    }

    /// 本番環境か（`prod` / `production`）
    pub fn is_production(&self) -> bool {
        matches!(
            self.environment.to_ascii_lowercase().as_str(),
            "prod" | "production"
        )
    }
}

/// ハンドラ間で共有する状態。
pub struct AppState {
    /// リクエスト処理の本体
    pub orchestrator: Arc<Orchestrator>,
    /// 受信トークン全体をログ出力するか
    pub full_jwt_logging: bool,
    /// 実行環境ラベル
    pub environment: String,
    /// プロセス起動時刻（ヘルスチェックの稼働時間用）
    pub started_at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<CallbackConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CallbackConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.aws_region, DEFAULT_AWS_REGION);
        assert!(!config.credentials.use_secret_store);
        assert!(config.credentials.verification.parameter_name.is_none());
        assert_eq!(config.credentials.certs_dir, PathBuf::from("certs"));
        assert!(!config.verifier.allow_zero_signature);
        assert!(!config.verifier.full_jwt_logging);
        assert_eq!(config.decision.mode, ApprovalMode::Approve);
        assert_eq!(config.decision.approval_delay, Duration::from_millis(1000));
        assert_eq!(config.decision.rejection_reason, DEFAULT_REJECTION_REASON);
        assert_eq!(config.environment, "development");
        assert!(!config.is_production());
    }

    #[test]
    fn test_full_configuration() {
        let config = config_from(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("USE_SSM_PARAMETERS", "TRUE"),
            ("AWS_REGION", "us-east-1"),
            ("COSIGNER_PUBLIC_KEY_PARAMETER", "/cb/cosigner"),
            ("CALLBACK_PRIVATE_KEY_PARAMETER", "/cb/private"),
            ("COSIGNER_PUBLIC_KEY", "pub-pem"),
            ("CALLBACK_PRIVATE_KEY", "priv-pem"),
            ("CERTS_DIR", "/etc/callback"),
            ("ALLOW_ZERO_SIGNATURE", "true"),
            ("FULL_JWT_LOGGING", "True"),
            ("LOG_KEY_FINGERPRINTS", "true"),
            ("APPROVAL_MODE", "Reject"),
            ("APPROVAL_DELAY_MS", "0"),
            ("REJECTION_REASON", "manual review"),
            ("NODE_ENV", "production"),
            ("LOG_LEVEL", "warn"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.aws_region, "us-east-1");
        assert!(config.credentials.use_secret_store);
        assert_eq!(
            config.credentials.verification.parameter_name.as_deref(),
            Some("/cb/cosigner")
        );
        assert_eq!(config.credentials.signing.env_value.as_deref(), Some("priv-pem"));
        assert_eq!(config.credentials.certs_dir, PathBuf::from("/etc/callback"));
        assert!(config.credentials.log_fingerprints);
        assert!(config.verifier.allow_zero_signature);
        assert!(config.verifier.full_jwt_logging);
        assert_eq!(config.decision.mode, ApprovalMode::Reject);
        assert_eq!(config.decision.approval_delay, Duration::ZERO);
        assert_eq!(config.decision.rejection_reason, "manual review");
        assert!(config.is_production());
        assert_eq!(config.log_level.as_deref(), Some("warn"));
    }

    /// "true" 以外の値や空文字列はフラグ無効として扱う
    #[test]
    fn test_flags_require_true() {
        let config = config_from(&[
            ("ALLOW_ZERO_SIGNATURE", "1"),
            ("USE_SSM_PARAMETERS", "yes"),
            ("COSIGNER_PUBLIC_KEY", ""),
        ])
        .unwrap();
        assert!(!config.verifier.allow_zero_signature);
        assert!(!config.credentials.use_secret_store);
        assert!(config.credentials.verification.env_value.is_none());
    }

    /// APP_ENV は NODE_ENV より優先される
    #[test]
    fn test_environment_precedence() {
        let config = config_from(&[("APP_ENV", "prod"), ("NODE_ENV", "development")]).unwrap();
        assert_eq!(config.environment, "prod");
        assert!(config.is_production());
    }

    #[test]
    fn test_invalid_values() {
        let err = config_from(&[("APPROVAL_DELAY_MS", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber { name: "APPROVAL_DELAY_MS", .. }
        ));

        let err = config_from(&[("APPROVAL_MODE", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidApprovalMode(_)));
    }
}
