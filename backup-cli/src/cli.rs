use clap::{Parser, Subcommand};

/// 调度管理相关命令
#[derive(Subcommand, Debug)]
pub enum ScheduleCommand {
    /// 新增一条定时备份调度
    Create {
        /// cron 表达式，例如 "0 3 * * *" 表示每天凌晨3点
        #[arg(help = "cron 表达式，例如 '0 3 * * *' 表示每天凌晨3点")]
        expression: String,
    },
    /// 修改已有调度的 cron 表达式
    Edit {
        /// 调度 ID
        id: String,
        /// 新的 cron 表达式
        expression: String,
    },
    /// 删除一条调度
    Delete {
        /// 调度 ID
        id: String,
    },
    /// 列出全部调度
    List,
}

/// 授权管理相关命令
#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// 打印授权同意页面的 URL
    Url,
    /// 使用授权回调返回的 code 换取凭据
    Callback {
        /// 授权服务器回调中的 code 参数
        code: String,
    },
    /// 删除本地保存的凭据
    Revoke,
    /// 显示当前授权状态
    Status,
}

/// Drive Backup CLI - 定时备份与云端上传工具
#[derive(Parser)]
#[command(name = "backup-cli")]
#[command(about = "将本地目录定时打包上传到 Google Drive")]
#[command(version)]
pub struct Cli {
    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 首次使用时初始化，创建配置文件和数据目录
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 立即执行一次备份
    Run,
    /// 启用定时备份（校验凭据、立即备份并布防全部调度）
    Enable,
    /// 禁用定时备份（撤防全部调度）
    Disable,
    /// 显示备份运行历史
    History {
        /// 只显示最近的 N 条记录
        #[arg(long)]
        limit: Option<usize>,
    },
    /// 调度管理
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    /// 授权管理
    #[command(subcommand)]
    Auth(AuthCommand),
    /// 以常驻进程运行，按持久化状态执行定时备份
    Serve,
}
