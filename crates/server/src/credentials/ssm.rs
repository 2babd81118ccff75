//! # AWS SSM パラメータストア実装
//!
//! SecureStringパラメータを復号付きで取得する `SecretStore` 実装。
//! 認証情報はAWS SDKの標準チェーン（環境変数、IAMロール等）から解決する。

use aws_config::BehaviorVersion;
use aws_sdk_ssm::error::DisplayErrorContext;

use super::{CredentialError, SecretStore};

/// AWS SSMパラメータストアによる `SecretStore` 実装。
pub struct SsmSecretStore {
    client: aws_sdk_ssm::Client,
}

impl SsmSecretStore {
    /// 既存のSSMクライアントから構築する。
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }

    /// リージョンを指定してSDK設定を読み込み、クライアントを構築する。
    pub async fn from_region(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        tracing::info!(region, "SSMクライアントを初期化しました");
        Self::new(aws_sdk_ssm::Client::new(&config))
    }
}

#[async_trait::async_trait]
impl SecretStore for SsmSecretStore {
    async fn fetch_secret(&self, name: &str) -> Result<Vec<u8>, CredentialError> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| {
                CredentialError::SecretStore(format!(
                    "GetParameter {name} に失敗: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let value = output
            .parameter()
            .and_then(|p| p.value())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CredentialError::SecretStore(format!("パラメータ {name} に値がありません"))
            })?;

        Ok(value.as_bytes().to_vec())
    }
}
