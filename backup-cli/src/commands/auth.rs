use crate::app::CliApp;
use backup_core::error::{BackupError, Result};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// 打印授权同意页面 URL，供用户在浏览器中完成授权
pub async fn run_auth_url(app: &CliApp) -> Result<()> {
    let url = app.service.token_store().consent_url()?;
    info!("🔗 请在浏览器中打开以下链接完成授权:");
    info!("{}", url);
    info!("💡 授权完成后，使用回调中的 code 参数运行:");
    info!("   backup-cli auth callback <code>");
    Ok(())
}

/// 用授权回调的 code 换取并保存凭据
pub async fn run_auth_callback(app: &CliApp, code: &str) -> Result<()> {
    let record = app.service.token_store().exchange_code(code).await?;
    info!("✅ 授权成功，凭据已保存");
    if record.refresh_token.is_none() {
        warn!("⚠️  授权服务器未返回 refresh_token，凭据过期后需要重新授权");
    }
    Ok(())
}

/// 删除本地保存的凭据
pub async fn run_auth_revoke(app: &CliApp) -> Result<()> {
    match app.service.token_store().revoke() {
        Ok(()) => {
            info!("✅ 本地凭据已删除");
            Ok(())
        }
        Err(BackupError::NothingToRevoke) => {
            info!("ℹ️  没有已保存的凭据");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// 显示当前授权状态
pub async fn run_auth_status(app: &CliApp) -> Result<()> {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();

    match app.service.token_store().load()? {
        None => {
            info!("❌ 未授权");
            info!("👉 运行 'backup-cli auth url' 开始授权流程");
        }
        Some(record) => {
            if record.is_fresh(now_ms) {
                info!("✅ 已授权，访问令牌有效");
            } else if record.refresh_token.is_some() {
                info!("🔄 访问令牌已过期，将在下次运行时自动刷新");
            } else {
                warn!("⚠️  访问令牌已过期且没有 refresh_token，需要重新授权");
            }
        }
    }
    Ok(())
}
