use crate::config::AppConfig;
use crate::constants::backup;
use crate::error::{BackupError, Result};
use chrono::Utc;
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;
use walkdir::WalkDir;

/// 一次归档构建的产物
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub date: String,
    pub time: String,
}

/// 归档构建器：把源目录压缩为带日期/时间戳的 tar.gz，
/// 并对本地暂存目录执行保留数量轮换
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    source_dir: PathBuf,
    backup_root: PathBuf,
    timezone: Tz,
    max_backups: usize,
}

impl ArchiveBuilder {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            source_dir: PathBuf::from(&config.backup.source_dir),
            backup_root: config.backup_root(),
            timezone: config.timezone()?,
            max_backups: config.backup.max_backups,
        })
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// 在配置时区下计算当前的日期/时间戳，
    /// 保证文件名与云端文件夹命名不受宿主机时区影响
    pub fn now_stamp(&self) -> (String, String) {
        let now = Utc::now().with_timezone(&self.timezone);
        (
            now.format(backup::DATE_FORMAT).to_string(),
            now.format(backup::TIME_FORMAT).to_string(),
        )
    }

    /// 创建归档：`<backup_root>/<date>/backup-<time>.tar.gz`。
    /// 构建前先轮换暂存目录（为新归档预留一个名额），
    /// 轮换同样覆盖上传失败遗留的孤儿归档。
    pub async fn create_archive(&self) -> Result<ArchiveInfo> {
        if !self.source_dir.exists() {
            return Err(BackupError::archive(format!(
                "源目录不存在: {}",
                self.source_dir.display()
            )));
        }

        let (date, time) = self.now_stamp();

        // 轮换必须在创建日期目录之前执行：空目录清理会删掉刚建好的目标目录
        self.rotate_keeping(self.max_backups.saturating_sub(1))
            .await?;

        let backup_dir = self.backup_root.join(&date);
        tokio::fs::create_dir_all(&backup_dir)
            .await
            .map_err(|e| BackupError::archive(format!("创建备份目录失败: {e}")))?;

        let output_path = backup_dir.join(format!(
            "{}{}{}",
            backup::ARCHIVE_PREFIX,
            time,
            backup::ARCHIVE_EXTENSION
        ));

        info!(
            "开始备份: {} -> {}",
            self.source_dir.display(),
            output_path.display()
        );

        let source_dir = self.source_dir.clone();
        let archive_path = output_path.clone();
        tokio::task::spawn_blocking(move || build_archive_sync(&source_dir, &archive_path))
            .await??;

        info!("归档创建成功: {}", output_path.display());
        Ok(ArchiveInfo {
            path: output_path,
            date,
            time,
        })
    }

    /// 轮换暂存目录：保留最近修改的 `max_backups` 个归档
    pub async fn rotate_old_backups(&self) -> Result<()> {
        self.rotate_keeping(self.max_backups).await
    }

    async fn rotate_keeping(&self, keep: usize) -> Result<()> {
        let backup_root = self.backup_root.clone();
        tokio::task::spawn_blocking(move || rotate_sync(&backup_root, keep)).await?
    }
}

/// 同步轮换：按修改时间降序排序，删除超出保留数量的文件，
/// 并清理清空后的日期目录
fn rotate_sync(backup_root: &Path, keep: usize) -> Result<()> {
    if !backup_root.exists() {
        return Ok(());
    }

    let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in WalkDir::new(backup_root) {
        let entry = entry?;
        if entry.path().is_file() {
            let modified = entry.metadata()?.modified()?;
            files.push((entry.into_path(), modified));
        }
    }

    files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in files.iter().skip(keep) {
        std::fs::remove_file(path)?;
        info!("删除过期备份: {}", path.display());
    }

    for entry in std::fs::read_dir(backup_root)? {
        let entry = entry?;
        if entry.path().is_dir() && std::fs::read_dir(entry.path())?.next().is_none() {
            std::fs::remove_dir(entry.path())?;
        }
    }

    Ok(())
}

/// 同步构建 tar.gz 归档，在阻塞线程中执行避免卡住异步运行时
fn build_archive_sync(source_dir: &Path, output_path: &Path) -> Result<()> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs::File;
    use tar::Builder;

    let file =
        File::create(output_path).map_err(|e| BackupError::archive(format!("创建归档文件失败: {e}")))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut archive = Builder::new(encoder);

    let dir_name = source_dir
        .file_name()
        .ok_or_else(|| BackupError::archive("无法获取源目录名"))?
        .to_string_lossy();

    for entry in WalkDir::new(source_dir) {
        let entry = entry.map_err(|e| BackupError::archive(format!("遍历源目录失败: {e}")))?;
        let path = entry.path();

        if path.is_file() {
            let relative_path = path
                .strip_prefix(source_dir)
                .map_err(|e| BackupError::archive(format!("计算相对路径失败: {e}")))?;

            // tar归档内部使用Unix风格路径（/）是标准做法，跨平台兼容
            let archive_path = if cfg!(windows) {
                format!(
                    "{}/{}",
                    dir_name,
                    relative_path.display().to_string().replace('\\', "/")
                )
            } else {
                format!("{}/{}", dir_name, relative_path.display())
            };

            archive
                .append_path_with_name(path, archive_path)
                .map_err(|e| BackupError::archive(format!("添加文件到归档失败: {e}")))?;
        }
    }

    let encoder = archive
        .into_inner()
        .map_err(|e| BackupError::archive(format!("完成归档失败: {e}")))?;
    encoder
        .finish()
        .map_err(|e| BackupError::archive(format!("完成压缩失败: {e}")))?;

    Ok(())
}
