use crate::app::CliApp;
use backup_core::error::Result;
use backup_core::history::RunStatus;
use tracing::{error, info};

/// 立即执行一次备份运行
pub async fn run_backup(app: &CliApp) -> Result<()> {
    info!("🚀 开始手动备份...");
    let event = app.service.run_once().await?;
    match event.status {
        RunStatus::Success => info!("✅ 备份完成: {} {}", event.date, event.time),
        RunStatus::Failure => error!(
            "❌ 备份失败: {}",
            event.error.as_deref().unwrap_or("未知错误")
        ),
    }
    Ok(())
}

/// 启用定时备份
pub async fn run_enable(app: &CliApp) -> Result<()> {
    app.service.enable().await?;
    let armed = app.service.registry().armed_count().await;
    info!("✅ 定时备份已启用，{} 个调度已布防", armed);
    Ok(())
}

/// 禁用定时备份
pub async fn run_disable(app: &CliApp) -> Result<()> {
    app.service.disable().await?;
    info!("✅ 定时备份已禁用");
    Ok(())
}

/// 显示备份运行历史
pub async fn run_history(app: &CliApp, limit: Option<usize>) -> Result<()> {
    let events = app.service.history().list().await;
    if events.is_empty() {
        info!("📭 暂无备份运行记录");
        return Ok(());
    }

    let skip = limit.map_or(0, |n| events.len().saturating_sub(n));
    info!("📜 备份运行历史 (共 {} 条):", events.len());
    for event in events.iter().skip(skip) {
        match event.status {
            RunStatus::Success => info!("  ✅ {} {}", event.date, event.time),
            RunStatus::Failure => info!(
                "  ❌ {} {} - {}",
                event.date,
                event.time,
                event.error.as_deref().unwrap_or("未知错误")
            ),
        }
    }
    Ok(())
}
