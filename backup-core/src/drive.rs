use crate::api_config::ApiEndpoints;
use crate::constants::drive;
use crate::error::{BackupError, Result};
use crate::token_store::{TokenRecord, TokenStore};
use chrono::Utc;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// multipart/related 请求体的分隔符
const MULTIPART_BOUNDARY: &str = "drive_backup_boundary";

/// 上传成功后返回的云端文件句柄
#[derive(Debug, Clone)]
pub struct RemoteFileHandle {
    pub id: String,
    pub name: String,
}

/// files.list 响应
#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Drive 文件元数据
#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

/// 已授权的 Drive 客户端包装器。
/// 访问令牌过期时透明刷新，并把每次令牌更新回调给凭据存储持久化。
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: Client,
    endpoints: ApiEndpoints,
    store: TokenStore,
    token: Arc<RwLock<TokenRecord>>,
}

impl DriveClient {
    pub fn new(store: TokenStore, record: TokenRecord) -> Self {
        Self {
            http: Client::new(),
            endpoints: store.endpoints().clone(),
            store,
            token: Arc::new(RwLock::new(record)),
        }
    }

    /// 获取一个新鲜的访问令牌，必要时先刷新
    async fn access_token(&self) -> Result<String> {
        let now_ms = Utc::now().timestamp_millis();
        {
            let token = self.token.read().await;
            if token.is_fresh(now_ms) {
                return Ok(token.access_token.clone());
            }
        }

        let mut token = self.token.write().await;
        // 写锁间隙内可能已被其它调用刷新
        if token.is_fresh(now_ms) {
            return Ok(token.access_token.clone());
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(BackupError::ReauthorizationRequired {
                consent_url: self.store.consent_url()?,
            });
        };

        let update = self.store.refresh_access_token(&refresh_token).await?;
        token.merge(update.clone());
        // 令牌更新回调：持久化逻辑留在凭据存储中
        self.store.record_update(update)?;
        Ok(token.access_token.clone())
    }

    /// 按名称（和可选父文件夹）查找文件夹，不存在则创建，返回文件夹 id。
    /// 并发创建者之间没有事务保护，可能产生重名文件夹；调度自身串行执行，
    /// 该竞态可接受。
    pub async fn find_or_create_folder(
        &self,
        folder_name: &str,
        parent_folder_id: Option<&str>,
    ) -> Result<String> {
        let escaped_name = escape_query_term(folder_name);
        let query = match parent_folder_id {
            Some(parent) => format!(
                "name='{}' and mimeType='{}' and '{}' in parents",
                escaped_name,
                drive::FOLDER_MIME_TYPE,
                parent
            ),
            None => format!(
                "name='{}' and mimeType='{}'",
                escaped_name,
                drive::FOLDER_MIME_TYPE
            ),
        };

        let response = self
            .http
            .get(&self.endpoints.files_url)
            .bearer_auth(self.access_token().await?)
            .query(&[("q", query.as_str()), ("fields", "files(id, name)")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackupError::custom(format!(
                "查询文件夹失败: {status} - {text}"
            )));
        }

        let list: FileList = response.json().await?;
        if let Some(folder) = list
            .files
            .into_iter()
            .find(|f| f.name.as_deref() == Some(folder_name))
        {
            return Ok(folder.id);
        }

        // 不存在则创建
        let mut metadata = serde_json::json!({
            "name": folder_name,
            "mimeType": drive::FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent_folder_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let response = self
            .http
            .post(&self.endpoints.files_url)
            .bearer_auth(self.access_token().await?)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackupError::custom(format!(
                "创建文件夹失败: {status} - {text}"
            )));
        }

        let folder: DriveFile = response.json().await?;
        info!("已创建云端文件夹: {} ({})", folder_name, folder.id);
        Ok(folder.id)
    }

    /// 将归档上传到 `<folder_name>/<date>/` 下，文件名保留。
    ///
    /// 失败时按固定次数倒数重试（不退避）；重试耗尽返回 `UploadFailed`
    /// 并保留本地文件。成功后删除本地归档，云端成为唯一保留副本。
    pub async fn upload(
        &self,
        file_path: &Path,
        folder_name: &str,
        date: &str,
        max_retries: u32,
    ) -> Result<RemoteFileHandle> {
        let mut remaining = max_retries;
        loop {
            match self.try_upload(file_path, folder_name, date).await {
                Ok(handle) => {
                    // 云端副本已存在，本地删除失败不影响本次运行的结果
                    match tokio::fs::remove_file(file_path).await {
                        Ok(()) => info!(
                            "上传成功，已删除本地归档: {} -> 云端文件 {}",
                            file_path.display(),
                            handle.id
                        ),
                        Err(e) => warn!(
                            "上传成功但删除本地归档失败: {} - {}，等待轮换清理",
                            file_path.display(),
                            e
                        ),
                    }
                    return Ok(handle);
                }
                Err(e) => {
                    remaining = remaining.saturating_sub(1);
                    if remaining == 0 {
                        return Err(BackupError::UploadFailed {
                            attempts: max_retries,
                            message: e.to_string(),
                        });
                    }
                    warn!("上传出错，剩余重试次数: {}，错误: {}", remaining, e);
                }
            }
        }
    }

    /// 单次上传尝试：解析两级文件夹并发送 multipart 请求
    async fn try_upload(
        &self,
        file_path: &Path,
        folder_name: &str,
        date: &str,
    ) -> Result<RemoteFileHandle> {
        let backup_folder_id = self.find_or_create_folder(folder_name, None).await?;
        let date_folder_id = self
            .find_or_create_folder(date, Some(&backup_folder_id))
            .await?;

        let file_name = file_path
            .file_name()
            .ok_or_else(|| BackupError::custom("无法获取归档文件名"))?
            .to_string_lossy()
            .to_string();
        let content = tokio::fs::read(file_path).await?;

        let metadata = serde_json::json!({
            "name": file_name,
            "parents": [date_folder_id],
        });
        let body = multipart_related_body(&metadata, &content)?;

        let response = self
            .http
            .post(&self.endpoints.upload_url)
            .bearer_auth(self.access_token().await?)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackupError::custom(format!(
                "上传请求失败: {status} - {text}"
            )));
        }

        let file: DriveFile = response.json().await?;
        Ok(RemoteFileHandle {
            id: file.id,
            name: file_name,
        })
    }
}

/// 转义 files.list 查询中的字符串字面量（反斜杠和单引号）
fn escape_query_term(term: &str) -> String {
    term.replace('\\', "\\\\").replace('\'', "\\'")
}

/// 构造 multipart/related 请求体：JSON 元数据 + 二进制媒体内容
fn multipart_related_body(metadata: &serde_json::Value, content: &[u8]) -> Result<Vec<u8>> {
    let metadata_json = serde_json::to_string(metadata)?;
    let mut body = Vec::with_capacity(content.len() + metadata_json.len() + 256);
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata_json}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: {}\r\n\r\n",
            drive::ARCHIVE_MIME_TYPE
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--").as_bytes());
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::constants::oauth;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param_contains};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.google.client_id = "test-client".to_string();
        config.google.client_secret = "test-secret".to_string();
        config.google.redirect_uri = "http://localhost:1234/callback".to_string();
        config.storage.data_dir = dir.path().join("data").to_string_lossy().to_string();
        config
    }

    fn fresh_record() -> TokenRecord {
        TokenRecord {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            scope: Some(oauth::SCOPE_DRIVE_FILE.to_string()),
            token_type: Some("Bearer".to_string()),
            expiry_date: Some(Utc::now().timestamp_millis() + 3_600_000),
        }
    }

    async fn test_client(dir: &TempDir, server: &MockServer) -> DriveClient {
        let endpoints = ApiEndpoints::with_base_url(&server.uri());
        let store = TokenStore::with_endpoints(&test_config(dir), endpoints);
        store.save(&fresh_record()).unwrap();
        DriveClient::new(store, fresh_record())
    }

    /// 挂载两级文件夹查找都命中已有文件夹的 mock
    async fn mock_existing_folders(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param_contains("q", "name='backups'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "root-folder", "name": "backups"}]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param_contains("q", "name='2024-03-01'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "date-folder", "name": "2024-03-01"}]
            })))
            .mount(server)
            .await;
    }

    fn write_archive(dir: &TempDir) -> std::path::PathBuf {
        let file = dir.path().join("backup-02-00-00.tar.gz");
        std::fs::write(&file, b"fake gzip content").unwrap();
        file
    }

    #[tokio::test]
    async fn test_find_existing_folder_reuses_id() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mock_existing_folders(&server).await;

        let client = test_client(&dir, &server).await;
        let id = client.find_or_create_folder("backups", None).await.unwrap();
        assert_eq!(id, "root-folder");
    }

    #[tokio::test]
    async fn test_missing_folder_is_created() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "created"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&dir, &server).await;
        let id = client
            .find_or_create_folder("2024-03-01", Some("root-folder"))
            .await
            .unwrap();
        assert_eq!(id, "created");
    }

    #[tokio::test]
    async fn test_upload_success_deletes_local_file() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mock_existing_folders(&server).await;

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "file-1"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&dir, &server).await;
        let archive = write_archive(&dir);

        let handle = client
            .upload(&archive, "backups", "2024-03-01", 3)
            .await
            .unwrap();
        assert_eq!(handle.id, "file-1");
        assert_eq!(handle.name, "backup-02-00-00.tar.gz");
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_upload_retries_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mock_existing_folders(&server).await;

        // 前两次失败，之后成功
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "file-2"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&dir, &server).await;
        let archive = write_archive(&dir);

        let handle = client
            .upload(&archive, "backups", "2024-03-01", 3)
            .await
            .unwrap();
        assert_eq!(handle.id, "file-2");
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_upload_exhausted_retries_keeps_local_file() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mock_existing_folders(&server).await;

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&dir, &server).await;
        let archive = write_archive(&dir);

        let result = client.upload(&archive, "backups", "2024-03-01", 3).await;
        assert!(matches!(
            result,
            Err(BackupError::UploadFailed { attempts: 3, .. })
        ));
        // 本地文件保留，等待下次轮换或人工恢复
        assert!(archive.exists());
    }

    #[test]
    fn test_escape_query_term_handles_quotes_and_backslashes() {
        assert_eq!(escape_query_term("backups"), "backups");
        assert_eq!(escape_query_term("it's"), "it\\'s");
        assert_eq!(escape_query_term("a\\b"), "a\\\\b");
    }

    #[tokio::test]
    async fn test_folder_name_with_quote_builds_escaped_query() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param_contains("q", "name='it\\'s'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "quoted-folder", "name": "it's"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&dir, &server).await;
        let id = client.find_or_create_folder("it's", None).await.unwrap();
        assert_eq!(id, "quoted-folder");
    }

    #[tokio::test]
    async fn test_upload_succeeds_when_local_delete_fails() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mock_existing_folders(&server).await;

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "file-3"}))
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&dir, &server).await;
        let archive = write_archive(&dir);

        // 请求在途期间删除本地文件，上传后的删除必然失败
        let path = archive.clone();
        let eraser = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            std::fs::remove_file(&path).unwrap();
        });

        // 云端副本已建立，本地删除失败不应让上传返回错误
        let handle = client
            .upload(&archive, "backups", "2024-03-01", 3)
            .await
            .unwrap();
        assert_eq!(handle.id, "file-3");
        eraser.await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_persisted_mid_session() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mock_existing_folders(&server).await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "refreshed-mid-session",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let endpoints = ApiEndpoints::with_base_url(&server.uri());
        let store = TokenStore::with_endpoints(&test_config(&dir), endpoints);
        store.save(&fresh_record()).unwrap();

        let expired = TokenRecord {
            expiry_date: Some(Utc::now().timestamp_millis() - 1_000),
            ..fresh_record()
        };
        let client = DriveClient::new(store.clone(), expired);

        client.find_or_create_folder("backups", None).await.unwrap();

        // 刷新结果必须回写到凭据存储
        let record = store.load().unwrap().unwrap();
        assert_eq!(record.access_token, "refreshed-mid-session");
        assert_eq!(record.refresh_token.as_deref(), Some("rt"));
    }
}
