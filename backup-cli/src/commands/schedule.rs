use crate::app::CliApp;
use backup_core::error::Result;
use tracing::info;

/// 新增一条调度记录
pub async fn run_schedule_create(app: &CliApp, expression: &str) -> Result<()> {
    let id = app.service.create_schedule(expression).await?;
    info!("✅ 调度已创建");
    info!("   ID: {}", id);
    info!("   表达式: {}", expression);
    if app.service.is_enabled().await {
        info!("   状态: 已布防");
    } else {
        info!("   状态: 未布防（运行 'backup-cli enable' 启用定时备份）");
    }
    Ok(())
}

/// 修改已有调度的表达式
pub async fn run_schedule_edit(app: &CliApp, id: &str, expression: &str) -> Result<()> {
    app.service.update_schedule(id, expression).await?;
    info!("✅ 调度 {} 已更新为: {}", id, expression);
    Ok(())
}

/// 删除一条调度记录
pub async fn run_schedule_delete(app: &CliApp, id: &str) -> Result<()> {
    app.service.delete_schedule(id).await?;
    info!("✅ 调度 {} 已删除", id);
    Ok(())
}

/// 列出全部调度记录
pub async fn run_schedule_list(app: &CliApp) -> Result<()> {
    let items = app.service.list_schedules().await;
    if items.is_empty() {
        info!("📭 暂无调度记录");
        info!("💡 使用 'backup-cli schedule create <表达式>' 新增调度");
        return Ok(());
    }

    info!("📋 调度列表 (共 {} 条):", items.len());
    for (id, expression, armed) in items {
        let status = if armed { "已布防" } else { "未布防" };
        info!("  {} | {} | {}", id, expression, status);
    }
    Ok(())
}
