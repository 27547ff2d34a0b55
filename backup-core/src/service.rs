use crate::api_config::ApiEndpoints;
use crate::archive::ArchiveBuilder;
use crate::config::AppConfig;
use crate::error::Result;
use crate::history::{BackupRunEvent, BackupState, RunHistory};
use crate::notify::SlackNotifier;
use crate::pipeline::BackupPipeline;
use crate::scheduler::ScheduleRegistry;
use crate::token_store::TokenStore;
use std::sync::Arc;
use tracing::{info, warn};

/// 备份服务门面：组装各组件并承载全局启用/禁用语义。
/// CLI 与常驻进程都通过它驱动备份系统。
pub struct BackupService {
    config: AppConfig,
    token_store: TokenStore,
    pipeline: Arc<BackupPipeline>,
    registry: Arc<ScheduleRegistry>,
    state: BackupState,
    history: RunHistory,
}

impl BackupService {
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_endpoints(config, ApiEndpoints::default())
    }

    pub fn with_endpoints(config: AppConfig, endpoints: ApiEndpoints) -> Result<Self> {
        config.ensure_data_dir()?;

        let token_store = TokenStore::with_endpoints(&config, endpoints.clone());
        let history = RunHistory::load(config.history_path())?;
        let state = BackupState::load(config.state_path())?;
        let notifier = SlackNotifier::new(&config.slack, &endpoints);
        let archive_builder = ArchiveBuilder::new(&config)?;

        let pipeline = Arc::new(BackupPipeline::new(
            token_store.clone(),
            archive_builder,
            history.clone(),
            notifier,
            config.backup.folder_name.clone(),
            config.backup.max_retries,
        ));
        let registry = Arc::new(ScheduleRegistry::load(
            config.cron_path(),
            config.timezone()?,
            pipeline.clone(),
        )?);

        Ok(Self {
            config,
            token_store,
            pipeline,
            registry,
            state,
            history,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.token_store
    }

    pub fn registry(&self) -> &ScheduleRegistry {
        &self.registry
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.is_enabled().await
    }

    /// 进程启动时按持久化的启用状态重新布防定时任务
    pub async fn start(&self) -> Result<()> {
        if self.state.is_enabled().await {
            info!("备份已启用，恢复定时任务");
            self.registry.arm_all().await;
        } else {
            info!("备份处于禁用状态，定时任务不布防");
        }
        Ok(())
    }

    /// 手动触发一次备份运行
    pub async fn run_once(&self) -> Result<BackupRunEvent> {
        self.pipeline.run_once().await
    }

    /// 全局启用：先确认凭据可用，再立即执行一次备份并布防全部定时任务。
    /// 凭据不可用时启用失败，持久化状态保持原值。
    pub async fn enable(&self) -> Result<()> {
        if let Err(e) = self.token_store.authorize().await {
            warn!("启用失败，凭据不可用: {}", e);
            return Err(e);
        }

        self.state.set_enabled(true).await?;

        // 立即执行一次；运行失败记入历史，不回滚启用状态
        if let Err(e) = self.pipeline.run_once().await {
            warn!("启用时的立即备份未完成: {}", e);
        }

        self.registry.arm_all().await;
        info!("备份已启用");
        Ok(())
    }

    /// 全局禁用：撤防全部定时任务并持久化禁用状态
    pub async fn disable(&self) -> Result<()> {
        self.state.set_enabled(false).await?;
        self.registry.disarm_all().await;
        info!("备份已禁用");
        Ok(())
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        if enabled {
            self.enable().await
        } else {
            self.disable().await
        }
    }

    /// 新增调度记录；全局已启用时立即布防
    pub async fn create_schedule(&self, expression: &str) -> Result<String> {
        let armed = self.state.is_enabled().await;
        self.registry.create(expression, armed).await
    }

    pub async fn update_schedule(&self, id: &str, expression: &str) -> Result<()> {
        self.registry.update(id, expression).await
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<()> {
        self.registry.delete(id).await
    }

    pub async fn list_schedules(&self) -> Vec<(String, String, bool)> {
        self.registry.list().await
    }
}
