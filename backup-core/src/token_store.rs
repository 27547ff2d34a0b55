use crate::api_config::ApiEndpoints;
use crate::config::{AppConfig, GoogleConfig};
use crate::constants::oauth;
use crate::drive::DriveClient;
use crate::error::{BackupError, Result};
use chrono::Utc;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// 持久化的 OAuth2 令牌记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    /// 过期时间（epoch 毫秒）
    pub expiry_date: Option<i64>,
}

impl TokenRecord {
    /// 访问令牌是否仍然新鲜（带提前量）
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        self.expiry_date
            .is_some_and(|expiry| expiry - oauth::EXPIRY_SKEW_MS > now_ms)
    }

    /// 合并一次令牌更新：refresh_token 不会被空值覆盖，
    /// access_token/scope/token_type/expiry_date 总是覆盖
    pub fn merge(&mut self, update: TokenUpdate) {
        if let Some(refresh_token) = update.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = Some(refresh_token);
        }
        self.access_token = update.access_token;
        self.scope = update.scope;
        self.token_type = update.token_type;
        self.expiry_date = update.expiry_date;
    }
}

/// 一次令牌刷新或授权码交换产生的更新
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    pub expiry_date: Option<i64>,
}

/// OAuth2 令牌端点的原始响应
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
    /// 有效期（秒）
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_update(self, now_ms: i64) -> TokenUpdate {
        TokenUpdate {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scope: self.scope,
            token_type: self.token_type,
            expiry_date: self.expires_in.map(|secs| now_ms + secs * 1000),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
}

/// 凭据存储：独占持有持久化的令牌记录，负责授权校验与透明刷新
#[derive(Debug, Clone)]
pub struct TokenStore {
    http: Client,
    google: GoogleConfig,
    token_path: PathBuf,
    endpoints: ApiEndpoints,
}

impl TokenStore {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_endpoints(config, ApiEndpoints::default())
    }

    pub fn with_endpoints(config: &AppConfig, endpoints: ApiEndpoints) -> Self {
        Self {
            http: Client::new(),
            google: config.google.clone(),
            token_path: config.token_path(),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    /// 是否存在持久化的令牌记录
    pub fn has_token(&self) -> bool {
        self.token_path.exists()
    }

    /// 读取持久化的令牌记录
    pub fn load(&self) -> Result<Option<TokenRecord>> {
        if !self.token_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.token_path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// 持久化令牌记录
    pub fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.token_path, content)?;
        Ok(())
    }

    /// 校验 OAuth2 客户端配置是否完整
    fn require_config(&self) -> Result<()> {
        if self.google.client_id.is_empty()
            || self.google.client_secret.is_empty()
            || self.google.redirect_uri.is_empty()
        {
            return Err(BackupError::missing_config(
                "client_id、client_secret 和 redirect_uri 需要在配置文件的 [google] 段中设置",
            ));
        }
        Ok(())
    }

    /// 生成用户授权链接（离线访问 + drive.file 权限）
    pub fn consent_url(&self) -> Result<String> {
        self.require_config()?;
        let url = Url::parse_with_params(
            &self.endpoints.auth_url,
            &[
                ("client_id", self.google.client_id.as_str()),
                ("redirect_uri", self.google.redirect_uri.as_str()),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("scope", oauth::SCOPE_DRIVE_FILE),
            ],
        )
        .map_err(|e| BackupError::custom(format!("构造授权链接失败: {e}")))?;
        Ok(url.to_string())
    }

    /// 获取一个已授权的 Drive 客户端。
    ///
    /// 无配置返回 `MissingConfig`；无令牌返回 `NotAuthorized`（附授权链接）；
    /// 刷新令牌已失效返回 `ReauthorizationRequired`（不自动重试，失效的
    /// refresh token 无法自愈）；其它探测失败返回 `TransientAuth`。
    pub async fn authorize(&self) -> Result<DriveClient> {
        self.require_config()?;

        let Some(mut record) = self.load()? else {
            return Err(BackupError::NotAuthorized {
                consent_url: self.consent_url()?,
            });
        };

        let now_ms = Utc::now().timestamp_millis();
        if !record.is_fresh(now_ms) {
            let Some(refresh_token) = record.refresh_token.clone() else {
                return Err(BackupError::ReauthorizationRequired {
                    consent_url: self.consent_url()?,
                });
            };

            let update = match self.refresh_access_token(&refresh_token).await {
                Ok(update) => update,
                Err(e @ BackupError::ReauthorizationRequired { .. }) => return Err(e),
                Err(BackupError::TransientAuth(msg)) => {
                    return Err(BackupError::TransientAuth(msg));
                }
                Err(e) => return Err(BackupError::TransientAuth(e.to_string())),
            };
            record.merge(update);
            self.save(&record)?;
            info!("访问令牌已刷新并保存");
        }

        Ok(DriveClient::new(self.clone(), record))
    }

    /// 向令牌端点刷新访问令牌
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenUpdate> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.google.client_id.as_str()),
                ("client_secret", self.google.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| BackupError::transient_auth(format!("刷新访问令牌请求失败: {e}")))?;

        if response.status().is_success() {
            let token: TokenResponse = response
                .json()
                .await
                .map_err(|e| BackupError::transient_auth(format!("令牌响应格式无效: {e}")))?;
            Ok(token.into_update(Utc::now().timestamp_millis()))
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if is_invalid_grant(&text) {
                Err(BackupError::ReauthorizationRequired {
                    consent_url: self.consent_url()?,
                })
            } else {
                Err(BackupError::transient_auth(format!(
                    "刷新访问令牌失败: {status} - {text}"
                )))
            }
        }
    }

    /// 用授权码交换初始令牌并持久化
    pub async fn exchange_code(&self, code: &str) -> Result<TokenRecord> {
        self.require_config()?;

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.google.client_id.as_str()),
                ("client_secret", self.google.client_secret.as_str()),
                ("redirect_uri", self.google.redirect_uri.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if response.status().is_success() {
            let token: TokenResponse = response.json().await?;
            let mut record = TokenRecord::default();
            record.merge(token.into_update(Utc::now().timestamp_millis()));
            self.save(&record)?;
            info!("令牌已保存: {}", self.token_path.display());
            Ok(record)
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(BackupError::custom(format!(
                "交换授权码失败: {status} - {text}"
            )))
        }
    }

    /// 记录一次令牌更新（Drive 客户端在刷新后回调此方法）
    pub fn record_update(&self, update: TokenUpdate) -> Result<()> {
        let mut record = self.load()?.unwrap_or_default();
        record.merge(update);
        self.save(&record)?;
        info!("令牌更新已保存");
        Ok(())
    }

    /// 删除持久化的令牌记录
    pub fn revoke(&self) -> Result<()> {
        if !self.token_path.exists() {
            return Err(BackupError::NothingToRevoke);
        }
        std::fs::remove_file(&self.token_path)?;
        info!("授权已撤销，令牌文件已删除");
        Ok(())
    }
}

fn is_invalid_grant(body: &str) -> bool {
    serde_json::from_str::<OAuthErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .is_some_and(|e| e == "invalid_grant")
}
