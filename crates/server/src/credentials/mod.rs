//! # 鍵素材ストア
//!
//! Cosigner署名検証用の公開鍵とCallback応答署名用の秘密鍵を解決し、
//! プロセス存続中キャッシュする。
//!
//! ## 解決順序（最初に成功したものを採用）
//! 1. パラメータストア（`USE_SSM_PARAMETERS=true` かつパラメータ名が設定されている場合）。
//!    失敗はログに記録して次へフォールバックする。
//! 2. 環境変数（PEMテキストそのもの）
//! 3. `{CERTS_DIR}/{既定ファイル名}` のローカルファイル。無ければ `Unavailable`。
//!
//! パラメータストアの実装は `SecretStore` トレイトで抽象化する。
//! AWS SSM実装は `ssm` サブモジュールを参照。

#[cfg(feature = "vendor-aws")]
pub mod ssm;

#[cfg(feature = "vendor-aws")]
pub use ssm::SsmSecretStore;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;

/// 鍵の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Cosignerの署名検証用公開鍵
    Verification,
    /// Callback応答署名用秘密鍵
    Signing,
}

impl KeyKind {
    /// ローカルファイルの既定ファイル名
    pub fn default_file_name(self) -> &'static str {
        match self {
            KeyKind::Verification => "cosigner_public.pem",
            KeyKind::Signing => "callback_private.pem",
        }
    }

    /// ログ用の説明
    pub fn description(self) -> &'static str {
        match self {
            KeyKind::Verification => "Cosigner公開鍵",
            KeyKind::Signing => "Callback秘密鍵",
        }
    }
}

/// 鍵素材の取得エラー。
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// パラメータストアからの取得に失敗（フォールバック対象）
    #[error("パラメータストアからの取得に失敗: {0}")]
    SecretStore(String),
    /// 全てのバックエンドで鍵素材が得られなかった
    #[error("{kind}が見つかりません: {detail}")]
    Unavailable {
        /// 鍵の説明
        kind: &'static str,
        /// 最後に試したバックエンドの失敗内容
        detail: String,
    },
}

/// パラメータストアの抽象インターフェース。
///
/// 名前を指定して秘密値を取得する能力だけを要求する。
/// テストではネットワークを使わない偽実装に差し替える。
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// パラメータ名に対応する値（復号済み）を取得する。
    async fn fetch_secret(&self, name: &str) -> Result<Vec<u8>, CredentialError>;
}

/// 1種類の鍵に対する取得元設定。
#[derive(Debug, Clone, Default)]
pub struct KeySource {
    /// パラメータストアのパラメータ名
    pub parameter_name: Option<String>,
    /// 環境変数で直接与えられたPEMテキスト
    pub env_value: Option<String>,
}

/// 鍵素材ストアの設定。
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    /// パラメータストアを使用するか
    pub use_secret_store: bool,
    /// Cosigner公開鍵の取得元
    pub verification: KeySource,
    /// Callback秘密鍵の取得元
    pub signing: KeySource,
    /// ローカル鍵ファイルのディレクトリ
    pub certs_dir: PathBuf,
    /// 解決した鍵のフィンガープリントをログ出力するか
    pub log_fingerprints: bool,
}

impl CredentialSettings {
    fn source(&self, kind: KeyKind) -> &KeySource {
        match kind {
            KeyKind::Verification => &self.verification,
            KeyKind::Signing => &self.signing,
        }
    }
}

/// 解決済み鍵素材の組。種類ごとに一度だけ初期化され、以後は変更されない。
#[derive(Default)]
struct CredentialPair {
    verification_key: OnceCell<Vec<u8>>,
    signing_key: OnceCell<Vec<u8>>,
}

/// 鍵素材ストア。
///
/// 同時に最初のアクセスが来た場合も取得処理は一度だけ走り、
/// 他の呼び出し元は同じ初期化の完了を待つ。失敗はキャッシュしない。
pub struct CredentialStore {
    settings: CredentialSettings,
    secret_store: Option<Arc<dyn SecretStore>>,
    pair: CredentialPair,
}

impl CredentialStore {
    /// 設定とパラメータストア実装から構築する。
    pub fn new(settings: CredentialSettings, secret_store: Option<Arc<dyn SecretStore>>) -> Self {
        Self {
            settings,
            secret_store,
            pair: CredentialPair::default(),
        }
    }

    /// 鍵素材（PEMバイト列）を解決する。2回目以降はキャッシュを返す。
    pub async fn resolve(&self, kind: KeyKind) -> Result<&[u8], CredentialError> {
        let cell = match kind {
            KeyKind::Verification => &self.pair.verification_key,
            KeyKind::Signing => &self.pair.signing_key,
        };
        let key = cell.get_or_try_init(|| self.load(kind)).await?;
        Ok(key.as_slice())
    }

    async fn load(&self, kind: KeyKind) -> Result<Vec<u8>, CredentialError> {
        let key = self.load_from_chain(kind).await?;

        if self.settings.log_fingerprints {
            let fp = callback_crypto::key_fingerprints(&key);
            tracing::info!(
                key = kind.description(),
                der_sha256 = fp.der_sha256.as_deref().unwrap_or("-"),
                pem_sha256 = %fp.pem_sha256,
                "鍵フィンガープリント"
            );
        }
        Ok(key)
    }

    async fn load_from_chain(&self, kind: KeyKind) -> Result<Vec<u8>, CredentialError> {
        let source = self.settings.source(kind);
        let description = kind.description();

        // 1. パラメータストア
        if self.settings.use_secret_store {
            if let Some(name) = source.parameter_name.as_deref() {
                match self.fetch_from_secret_store(name).await {
                    Ok(value) => {
                        tracing::info!(key = description, parameter = name, "パラメータストアから鍵を読み込みました");
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::error!(
                            key = description,
                            parameter = name,
                            error = %e,
                            "パラメータストアからの読み込みに失敗。他の取得元にフォールバックします"
                        );
                    }
                }
            }
        }

        // 2. 環境変数
        if let Some(value) = source.env_value.as_deref().filter(|v| !v.is_empty()) {
            tracing::info!(key = description, "環境変数から鍵を読み込みました");
            return Ok(value.as_bytes().to_vec());
        }

        // 3. ローカルファイル
        let path = self.settings.certs_dir.join(kind.default_file_name());
        match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                tracing::info!(key = description, path = %path.display(), "ファイルから鍵を読み込みました");
                Ok(bytes)
            }
            Ok(_) => {
                tracing::error!(key = description, path = %path.display(), "鍵ファイルが空です");
                Err(CredentialError::Unavailable {
                    kind: description,
                    detail: format!("{} が空です", path.display()),
                })
            }
            Err(e) => {
                tracing::error!(key = description, path = %path.display(), error = %e, "鍵の読み込みに失敗");
                Err(CredentialError::Unavailable {
                    kind: description,
                    detail: format!("{}: {e}", path.display()),
                })
            }
        }
    }

    async fn fetch_from_secret_store(&self, name: &str) -> Result<Vec<u8>, CredentialError> {
        let store = self.secret_store.as_ref().ok_or_else(|| {
            CredentialError::SecretStore("パラメータストアクライアントが未設定です".to_string())
        })?;
        let value = store.fetch_secret(name).await?;
        if value.is_empty() {
            return Err(CredentialError::SecretStore(format!(
                "パラメータ {name} の値が空です"
            )));
        }
        Ok(value)
    }
}
