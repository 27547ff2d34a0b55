use crate::api_config::ApiEndpoints;
use crate::config::SlackConfig;
use crate::error::{BackupError, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

/// chat.postMessage 响应
#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Slack 通知器。token 和 channel 任一未配置时静默跳过。
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    http: Client,
    token: Option<String>,
    channel: Option<String>,
    post_message_url: String,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig, endpoints: &ApiEndpoints) -> Self {
        // 空字符串视为未配置
        let token = config.token.clone().filter(|t| !t.is_empty());
        let channel = config.channel.clone().filter(|c| !c.is_empty());
        Self {
            http: Client::new(),
            token,
            channel,
            post_message_url: endpoints.slack_post_message_url.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.channel.is_some()
    }

    /// 发送一条通知消息
    pub async fn notify(&self, text: &str) -> Result<()> {
        let (Some(token), Some(channel)) = (&self.token, &self.channel) else {
            debug!("Slack 未配置，跳过通知");
            return Ok(());
        };

        let response = self
            .http
            .post(&self.post_message_url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "channel": channel,
                "text": text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(BackupError::custom(format!("Slack 通知失败: {status}")));
        }

        let body: PostMessageResponse = response.json().await?;
        if !body.ok {
            return Err(BackupError::custom(format!(
                "Slack 通知被拒绝: {}",
                body.error.unwrap_or_else(|| "未知错误".to_string())
            )));
        }

        info!("Slack 通知已发送");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(token: Option<&str>, channel: Option<&str>, base_url: &str) -> SlackNotifier {
        let config = SlackConfig {
            token: token.map(String::from),
            channel: channel.map(String::from),
        };
        SlackNotifier::new(&config, &ApiEndpoints::with_base_url(base_url))
    }

    #[tokio::test]
    async fn test_unconfigured_notifier_is_silent_noop() {
        // 未挂载 mock，真发请求会失败
        let notifier = notifier(None, None, "http://127.0.0.1:1");
        assert!(!notifier.is_configured());
        notifier.notify("消息").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_strings_count_as_unconfigured() {
        let notifier = notifier(Some(""), Some(""), "http://127.0.0.1:1");
        assert!(!notifier.is_configured());
        notifier.notify("消息").await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_posts_to_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_string_contains("#backups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier(Some("xoxb-test"), Some("#backups"), &server.uri());
        notifier.notify("备份完成").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_message_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"ok": false, "error": "channel_not_found"}),
            ))
            .mount(&server)
            .await;

        let notifier = notifier(Some("xoxb-test"), Some("#missing"), &server.uri());
        let result = notifier.notify("备份完成").await;
        assert!(result.is_err());
    }
}
