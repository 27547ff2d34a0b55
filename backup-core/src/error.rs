use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("HTTP 请求错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("目录遍历错误: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("路径错误: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error("OAuth2 配置不完整: {0}")]
    MissingConfig(String),

    #[error("尚未授权。请访问以下地址完成授权: {consent_url}")]
    NotAuthorized { consent_url: String },

    #[error("授权已失效。请重新访问以下地址完成授权: {consent_url}")]
    ReauthorizationRequired { consent_url: String },

    #[error("校验访问令牌失败: {0}")]
    TransientAuth(String),

    #[error("归档操作失败: {0}")]
    Archive(String),

    #[error("上传失败，已重试 {attempts} 次: {message}")]
    UploadFailed { attempts: u32, message: String },

    #[error("无效的 cron 表达式: {0}")]
    InvalidCronExpression(String),

    #[error("定时任务不存在: {0}")]
    NotFound(String),

    #[error("没有可撤销的授权")]
    NothingToRevoke,

    #[error("无效的时区: {0}")]
    InvalidTimezone(String),

    #[error("配置文件未找到")]
    ConfigNotFound,

    #[error("自定义错误: {0}")]
    Custom(String),
}

impl BackupError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    pub fn missing_config(msg: impl Into<String>) -> Self {
        Self::MissingConfig(msg.into())
    }

    pub fn transient_auth(msg: impl Into<String>) -> Self {
        Self::TransientAuth(msg.into())
    }
}
