use backup_core::config::AppConfig;
use backup_core::constants::config;
use backup_core::error::Result;
use tracing::{info, warn};

/// 运行独立的初始化流程：生成配置文件与数据目录
pub async fn run_init(force: bool) -> Result<()> {
    info!("📦 Drive Backup 初始化");
    info!("======================");

    let config_path = config::CONFIG_FILE_CANDIDATES[0];
    if !force && std::path::Path::new(config_path).exists() {
        warn!("⚠️  检测到已存在的配置文件: {}", config_path);
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: backup-cli init --force");
        return Ok(());
    }

    info!("📋 步骤 1: 创建配置文件");
    let app_config = AppConfig::default();
    app_config.save_to_file(config_path)?;
    info!("   ✅ 创建配置文件: {}", config_path);

    info!("📋 步骤 2: 创建数据目录");
    app_config.ensure_data_dir()?;
    info!("   ✅ 创建数据目录: {}", app_config.storage.data_dir);

    info!("🎉 初始化完成！");
    info!("💡 接下来:");
    info!("   1. 编辑 {} 填入 Google OAuth 客户端信息", config_path);
    info!("   2. 运行 'backup-cli auth url' 获取授权链接");
    info!("   3. 运行 'backup-cli auth callback <code>' 完成授权");
    info!("   4. 运行 'backup-cli enable' 启用定时备份");

    Ok(())
}
