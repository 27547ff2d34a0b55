use crate::app::CliApp;
use backup_core::error::Result;
use tracing::info;

/// 以常驻进程运行：按持久化的启用状态恢复定时任务，
/// 收到 Ctrl+C 后撤防并退出
pub async fn run_serve(app: &CliApp) -> Result<()> {
    info!("🚀 Drive Backup 常驻服务启动");
    app.service.start().await?;

    let armed = app.service.registry().armed_count().await;
    if armed > 0 {
        info!("⏰ {} 个定时任务已布防", armed);
    }
    info!("按 Ctrl+C 退出");

    tokio::signal::ctrl_c()
        .await
        .map_err(backup_core::BackupError::Io)?;

    info!("收到退出信号，撤防定时任务...");
    app.service.registry().disarm_all().await;
    info!("👋 服务已退出");
    Ok(())
}
