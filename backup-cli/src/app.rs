use backup_core::config::AppConfig;
use backup_core::error::Result;
use backup_core::service::BackupService;

use crate::cli::{AuthCommand, Commands, ScheduleCommand};
use crate::commands;

pub struct CliApp {
    pub config: AppConfig,
    pub service: BackupService,
}

impl CliApp {
    /// 使用智能配置查找初始化CLI应用
    pub async fn new_with_auto_config() -> Result<Self> {
        let config = AppConfig::find_and_load_config()?;
        let service = BackupService::new(config.clone())?;
        Ok(Self { config, service })
    }

    /// 运行应用命令
    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Init { .. } => unreachable!(), // 已经在 main.rs 中处理
            Commands::Run => commands::run_backup(self).await,
            Commands::Enable => commands::run_enable(self).await,
            Commands::Disable => commands::run_disable(self).await,
            Commands::History { limit } => commands::run_history(self, limit).await,
            Commands::Schedule(schedule_cmd) => self.run_schedule_command(schedule_cmd).await,
            Commands::Auth(auth_cmd) => self.run_auth_command(auth_cmd).await,
            Commands::Serve => commands::run_serve(self).await,
        }
    }

    /// 运行调度管理相关命令
    async fn run_schedule_command(&self, cmd: ScheduleCommand) -> Result<()> {
        match cmd {
            ScheduleCommand::Create { expression } => {
                commands::run_schedule_create(self, &expression).await
            }
            ScheduleCommand::Edit { id, expression } => {
                commands::run_schedule_edit(self, &id, &expression).await
            }
            ScheduleCommand::Delete { id } => commands::run_schedule_delete(self, &id).await,
            ScheduleCommand::List => commands::run_schedule_list(self).await,
        }
    }

    /// 运行授权管理相关命令
    async fn run_auth_command(&self, cmd: AuthCommand) -> Result<()> {
        match cmd {
            AuthCommand::Url => commands::run_auth_url(self).await,
            AuthCommand::Callback { code } => commands::run_auth_callback(self, &code).await,
            AuthCommand::Revoke => commands::run_auth_revoke(self).await,
            AuthCommand::Status => commands::run_auth_status(self).await,
        }
    }
}
