use crate::constants::{backup, config, storage};
use crate::error::{BackupError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub google: GoogleConfig,
    pub backup: BackupConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub slack: SlackConfig,
}

/// Google OAuth2 客户端凭据
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// 备份相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupConfig {
    pub source_dir: String,
    pub folder_name: String,
    pub timezone: String,
    pub max_backups: usize,
    pub max_retries: u32,
}

/// 持久化文件相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
}

/// Slack 通知配置（可选）
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SlackConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            google: GoogleConfig::default(),
            backup: BackupConfig {
                source_dir: "./source".to_string(),
                folder_name: backup::DEFAULT_FOLDER_NAME.to_string(),
                timezone: backup::DEFAULT_TIMEZONE.to_string(),
                max_backups: backup::DEFAULT_MAX_BACKUPS,
                max_retries: backup::DEFAULT_MAX_RETRIES,
            },
            storage: StorageConfig {
                data_dir: storage::get_default_data_dir()
                    .to_string_lossy()
                    .to_string(),
            },
            slack: SlackConfig::default(),
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> drive-backup.toml -> .drive-backup.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in &config::CONFIG_FILE_CANDIDATES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        Err(BackupError::ConfigNotFound)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_with_comments();
        fs::write(&path, content)?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        TEMPLATE
            .replace("{client_id}", &self.google.client_id)
            .replace("{client_secret}", &self.google.client_secret)
            .replace("{redirect_uri}", &self.google.redirect_uri)
            .replace("{source_dir}", &self.backup.source_dir)
            .replace("{folder_name}", &self.backup.folder_name)
            .replace("{timezone}", &self.backup.timezone)
            .replace("{max_backups}", &self.backup.max_backups.to_string())
            .replace("{max_retries}", &self.backup.max_retries.to_string())
            .replace("{data_dir}", &self.storage.data_dir)
            .replace("{slack_token}", self.slack.token.as_deref().unwrap_or(""))
            .replace(
                "{slack_channel}",
                self.slack.channel.as_deref().unwrap_or(""),
            )
    }

    /// 解析配置的时区
    pub fn timezone(&self) -> Result<Tz> {
        self.backup
            .timezone
            .parse::<Tz>()
            .map_err(|_| BackupError::InvalidTimezone(self.backup.timezone.clone()))
    }

    /// 确保数据目录存在
    pub fn ensure_data_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.storage.data_dir)?;
        Ok(())
    }

    /// 获取数据目录路径
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    /// OAuth2 令牌文件路径
    pub fn token_path(&self) -> PathBuf {
        self.data_dir().join(storage::TOKEN_FILE_NAME)
    }

    /// 定时任务映射文件路径
    pub fn cron_path(&self) -> PathBuf {
        self.data_dir().join(storage::CRON_FILE_NAME)
    }

    /// 备份启用状态文件路径
    pub fn state_path(&self) -> PathBuf {
        self.data_dir().join(storage::STATE_FILE_NAME)
    }

    /// 备份历史文件路径
    pub fn history_path(&self) -> PathBuf {
        self.data_dir().join(storage::HISTORY_FILE_NAME)
    }

    /// 获取本地暂存根目录：源目录的父目录 + 备份文件夹名
    pub fn backup_root(&self) -> PathBuf {
        let source = PathBuf::from(&self.backup.source_dir);
        let parent = source.parent().map(Path::to_path_buf).unwrap_or_default();
        parent.join(&self.backup.folder_name)
    }
}
