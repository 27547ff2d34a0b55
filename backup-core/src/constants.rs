/// Google OAuth2 相关常量
pub mod oauth {
    /// 授权页地址（生成用户授权链接时使用）
    pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

    /// 令牌交换/刷新端点
    pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

    /// Drive 文件级访问权限 scope
    pub const SCOPE_DRIVE_FILE: &str = "https://www.googleapis.com/auth/drive.file";

    /// 访问令牌的过期提前量（毫秒），临近过期视为已过期
    pub const EXPIRY_SKEW_MS: i64 = 60_000;
}

/// Google Drive API 相关常量
pub mod drive {
    /// Drive v3 文件元数据端点（list/create folder）
    pub const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

    /// Drive v3 multipart 上传端点
    pub const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

    /// 文件夹的 MIME 类型
    pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

    /// 备份归档的 MIME 类型
    pub const ARCHIVE_MIME_TYPE: &str = "application/gzip";
}

/// Slack 通知相关常量
pub mod slack {
    /// chat.postMessage 端点
    pub const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";
}

/// 备份相关常量
pub mod backup {
    /// 默认保留的本地归档数量
    pub const DEFAULT_MAX_BACKUPS: usize = 7;

    /// 上传失败时的默认重试次数
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// 归档文件名前缀
    pub const ARCHIVE_PREFIX: &str = "backup-";

    /// 归档文件扩展名
    pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

    /// 日期目录的格式（也用于云端日期文件夹命名）
    pub const DATE_FORMAT: &str = "%Y-%m-%d";

    /// 归档文件名中的时间格式
    pub const TIME_FORMAT: &str = "%H-%M-%S";

    /// 默认时区
    pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

    /// 默认的云端/本地备份文件夹名
    pub const DEFAULT_FOLDER_NAME: &str = "backups";
}

/// 持久化文件相关常量
pub mod storage {
    use std::path::{Path, PathBuf};

    /// 数据目录名
    pub const DATA_DIR_NAME: &str = "data";

    /// OAuth2 令牌文件名
    pub const TOKEN_FILE_NAME: &str = "token.json";

    /// 定时任务映射文件名
    pub const CRON_FILE_NAME: &str = "crons.json";

    /// 备份启用状态文件名
    pub const STATE_FILE_NAME: &str = "backupState.json";

    /// 备份历史文件名
    pub const HISTORY_FILE_NAME: &str = "backupHistory.json";

    /// 获取默认数据目录路径（跨平台）
    pub fn get_default_data_dir() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME)
    }
}

/// 应用配置相关常量
pub mod config {
    /// 配置文件查找顺序
    pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
        ["config.toml", "drive-backup.toml", ".drive-backup.toml"];

    /// 默认配置文件名
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}

/// Cron 任务相关常量
pub mod cron {
    /// 不含秒字段的 cron 表达式字段数量（标准 crontab 写法）
    pub const CRON_FIELDS_WITHOUT_SECONDS: usize = 5;
}
