use crate::constants::{drive, oauth, slack};
use serde::{Deserialize, Serialize};
/// API配置模块 - 内置 Google/Slack 端点配置
use std::fmt;

/// 外部服务端点配置。默认指向线上服务，测试中可整体替换为 mock 服务器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoints {
    /// OAuth2 授权页地址
    pub auth_url: String,
    /// OAuth2 令牌交换/刷新端点
    pub token_url: String,
    /// Drive 文件元数据端点
    pub files_url: String,
    /// Drive multipart 上传端点
    pub upload_url: String,
    /// Slack 消息发送端点
    pub slack_post_message_url: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            auth_url: oauth::AUTH_URL.to_string(),
            token_url: oauth::TOKEN_URL.to_string(),
            files_url: drive::FILES_URL.to_string(),
            upload_url: drive::UPLOAD_URL.to_string(),
            slack_post_message_url: slack::POST_MESSAGE_URL.to_string(),
        }
    }
}

impl ApiEndpoints {
    /// 构造指向同一基础地址的端点集合（wiremock 测试用）
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            auth_url: format!("{base_url}/o/oauth2/v2/auth"),
            token_url: format!("{base_url}/token"),
            files_url: format!("{base_url}/drive/v3/files"),
            upload_url: format!("{base_url}/upload/drive/v3/files"),
            slack_post_message_url: format!("{base_url}/api/chat.postMessage"),
        }
    }
}

impl fmt::Display for ApiEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "当前API端点:")?;
        writeln!(f, "  OAuth2 授权: {}", self.auth_url)?;
        writeln!(f, "  OAuth2 令牌: {}", self.token_url)?;
        writeln!(f, "  Drive 文件: {}", self.files_url)?;
        writeln!(f, "  Drive 上传: {}", self.upload_url)?;
        writeln!(f, "  Slack 通知: {}", self.slack_post_message_url)?;
        Ok(())
    }
}
