use crate::archive::{ArchiveBuilder, ArchiveInfo};
use crate::error::Result;
use crate::history::{BackupRunEvent, RunHistory, RunStatus};
use crate::notify::SlackNotifier;
use crate::token_store::TokenStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// 备份管道：凭据 -> 归档 -> 上传 -> 历史 -> 通知 的无状态编排器。
/// 任何组件失败都转化为一条 Failure 运行记录，不会向外抛出。
#[derive(Debug, Clone)]
pub struct BackupPipeline {
    token_store: TokenStore,
    archive_builder: ArchiveBuilder,
    history: RunHistory,
    notifier: SlackNotifier,
    folder_name: String,
    max_retries: u32,
    /// 同一时刻至多一次运行；定时触发与手动触发共用此锁
    run_lock: Arc<Mutex<()>>,
}

impl BackupPipeline {
    pub fn new(
        token_store: TokenStore,
        archive_builder: ArchiveBuilder,
        history: RunHistory,
        notifier: SlackNotifier,
        folder_name: String,
        max_retries: u32,
    ) -> Self {
        Self {
            token_store,
            archive_builder,
            history,
            notifier,
            folder_name,
            max_retries,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 执行一次完整的备份运行并返回其运行记录。
    /// 返回 Err 仅当历史记录本身无法落盘。
    pub async fn run_once(&self) -> Result<BackupRunEvent> {
        let _guard = self.run_lock.lock().await;

        let event = match self.execute().await {
            Ok(info) => {
                info!("备份与上传全部完成: {}", info.path.display());
                BackupRunEvent::success(info.date, info.time)
            }
            Err(e) => {
                error!("备份流程失败: {}", e);
                let (date, time) = self.archive_builder.now_stamp();
                BackupRunEvent::failure(date, time, e.to_string())
            }
        };

        self.history.append(event.clone()).await?;

        let message = match event.status {
            RunStatus::Success => {
                format!("备份创建并上传成功: {}/{}", event.date, event.time)
            }
            RunStatus::Failure => format!(
                "备份过程出错: {}",
                event.error.as_deref().unwrap_or("未知错误")
            ),
        };
        // 通知失败只记录日志，不影响本次运行的结果
        if let Err(e) = self.notifier.notify(&message).await {
            warn!("发送通知失败: {}", e);
        }

        Ok(event)
    }

    /// 按顺序执行三个叶子组件；授权失败时不会尝试创建归档
    async fn execute(&self) -> Result<ArchiveInfo> {
        let client = self.token_store.authorize().await?;
        let info = self.archive_builder.create_archive().await?;
        client
            .upload(&info.path, &self.folder_name, &info.date, self.max_retries)
            .await?;
        Ok(info)
    }
}
