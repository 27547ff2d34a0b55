use crate::constants::cron as cron_constants;
use crate::error::{BackupError, Result};
use crate::pipeline::BackupPipeline;
use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// crons.json 中的单条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedEntry {
    schedule: String,
}

/// 调度注册表：维护 id -> cron 表达式的持久化映射，
/// 并在全局启用时为每条记录布防一个定时任务。
/// 定时任务与注册表条目一一对应，撤防即中止对应任务。
pub struct ScheduleRegistry {
    path: PathBuf,
    timezone: Tz,
    pipeline: Arc<BackupPipeline>,
    entries: RwLock<HashMap<String, String>>,
    timers: RwLock<HashMap<String, JoinHandle<()>>>,
}

impl ScheduleRegistry {
    /// 从 crons.json 加载注册表；文件不存在视为空注册表
    pub fn load(path: PathBuf, timezone: Tz, pipeline: Arc<BackupPipeline>) -> Result<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let persisted: HashMap<String, PersistedEntry> = serde_json::from_str(&content)?;
            persisted
                .into_iter()
                .map(|(id, entry)| (id, entry.schedule))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            timezone,
            pipeline,
            entries: RwLock::new(entries),
            timers: RwLock::new(HashMap::new()),
        })
    }

    /// 校验 cron 表达式。接受标准 5 字段写法，
    /// 内部统一补上秒字段再解析
    pub fn validate(expression: &str) -> Result<Schedule> {
        let normalized = normalize_expression(expression);
        Schedule::from_str(&normalized)
            .map_err(|_| BackupError::InvalidCronExpression(expression.to_string()))
    }

    /// 新增一条调度记录并返回其 id。
    /// 全局已启用时立即布防新记录。
    pub async fn create(&self, expression: &str, armed: bool) -> Result<String> {
        let schedule = Self::validate(expression)?;
        let id = Uuid::new_v4().to_string();

        {
            let mut entries = self.entries.write().await;
            entries.insert(id.clone(), expression.to_string());
            self.persist(&entries)?;
        }

        if armed {
            self.arm(&id, schedule).await;
        }
        info!("新增调度: {} -> {}", id, expression);
        Ok(id)
    }

    /// 修改已有调度记录的表达式。
    /// 该记录已布防时按新表达式重新布防。
    pub async fn update(&self, id: &str, expression: &str) -> Result<()> {
        let schedule = Self::validate(expression)?;

        {
            let mut entries = self.entries.write().await;
            if !entries.contains_key(id) {
                return Err(BackupError::NotFound(format!("调度记录不存在: {id}")));
            }
            entries.insert(id.to_string(), expression.to_string());
            self.persist(&entries)?;
        }

        let was_armed = self.timers.read().await.contains_key(id);
        if was_armed {
            self.arm(id, schedule).await;
        }
        info!("更新调度: {} -> {}", id, expression);
        Ok(())
    }

    /// 删除一条调度记录并中止其定时任务
    pub async fn delete(&self, id: &str) -> Result<()> {
        {
            let mut entries = self.entries.write().await;
            if entries.remove(id).is_none() {
                return Err(BackupError::NotFound(format!("调度记录不存在: {id}")));
            }
            self.persist(&entries)?;
        }

        if let Some(handle) = self.timers.write().await.remove(id) {
            handle.abort();
        }
        info!("删除调度: {}", id);
        Ok(())
    }

    /// 返回全部记录（id、表达式、是否已布防）
    pub async fn list(&self) -> Vec<(String, String, bool)> {
        let entries = self.entries.read().await;
        let timers = self.timers.read().await;
        let mut items: Vec<(String, String, bool)> = entries
            .iter()
            .map(|(id, expr)| (id.clone(), expr.clone(), timers.contains_key(id)))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    /// 为注册表中的每条记录布防定时任务。
    /// 持久化文件中的非法表达式在此处跳过并告警，不阻塞其余记录。
    pub async fn arm_all(&self) {
        let entries = self.entries.read().await.clone();
        for (id, expression) in entries {
            match Self::validate(&expression) {
                Ok(schedule) => self.arm(&id, schedule).await,
                Err(e) => error!("调度 {} 的表达式无效，跳过布防: {}", id, e),
            }
        }
        info!("已布防 {} 个定时任务", self.armed_count().await);
    }

    /// 中止全部定时任务；已过布防时刻的任务不再触发
    pub async fn disarm_all(&self) {
        let mut timers = self.timers.write().await;
        for (id, handle) in timers.drain() {
            handle.abort();
            debug!("撤防调度: {}", id);
        }
        info!("已撤防全部定时任务");
    }

    pub async fn armed_count(&self) -> usize {
        self.timers.read().await.len()
    }

    /// 为单条记录布防：循环计算下一次触发时刻，
    /// 休眠到点后执行一次备份运行
    async fn arm(&self, id: &str, schedule: Schedule) {
        let pipeline = self.pipeline.clone();
        let timezone = self.timezone;
        let task_id = id.to_string();

        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now().with_timezone(&timezone);
                let Some(next) = schedule.after(&now).next() else {
                    debug!("调度 {} 没有后续触发时刻，任务退出", task_id);
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                debug!("调度 {} 下次触发: {}", task_id, next);
                tokio::time::sleep(wait).await;

                if let Err(e) = pipeline.run_once().await {
                    error!("调度 {} 触发的备份运行失败: {}", task_id, e);
                }
            }
        });

        // 重新布防时先中止旧任务
        if let Some(previous) = self.timers.write().await.insert(id.to_string(), handle) {
            previous.abort();
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let persisted: HashMap<&String, PersistedEntry> = entries
            .iter()
            .map(|(id, expr)| {
                (
                    id,
                    PersistedEntry {
                        schedule: expr.clone(),
                    },
                )
            })
            .collect();
        let content = serde_json::to_string_pretty(&persisted)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// 5 字段表达式补上秒字段（整分触发），6/7 字段原样返回
fn normalize_expression(expression: &str) -> String {
    let fields = expression.split_whitespace().count();
    if fields == cron_constants::CRON_FIELDS_WITHOUT_SECONDS {
        format!("0 {}", expression.trim())
    } else {
        expression.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_config::ApiEndpoints;
    use crate::archive::ArchiveBuilder;
    use crate::config::AppConfig;
    use crate::history::RunHistory;
    use crate::notify::SlackNotifier;
    use crate::token_store::TokenStore;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> AppConfig {
        let source = dir.path().join("app").join("source");
        std::fs::create_dir_all(&source).unwrap();

        let mut config = AppConfig::default();
        config.backup.source_dir = source.to_string_lossy().to_string();
        config.backup.timezone = "UTC".to_string();
        config.storage.data_dir = dir.path().join("data").to_string_lossy().to_string();
        config.ensure_data_dir().unwrap();
        config
    }

    fn registry_for(config: &AppConfig) -> ScheduleRegistry {
        let endpoints = ApiEndpoints::with_base_url("http://127.0.0.1:1");
        let pipeline = Arc::new(BackupPipeline::new(
            TokenStore::with_endpoints(config, endpoints.clone()),
            ArchiveBuilder::new(config).unwrap(),
            RunHistory::load(config.history_path()).unwrap(),
            SlackNotifier::new(&config.slack, &endpoints),
            config.backup.folder_name.clone(),
            config.backup.max_retries,
        ));
        ScheduleRegistry::load(config.cron_path(), config.timezone().unwrap(), pipeline).unwrap()
    }

    fn test_registry(dir: &TempDir) -> ScheduleRegistry {
        registry_for(&test_config(dir))
    }

    #[test]
    fn test_validate_accepts_five_field_expressions() {
        assert!(ScheduleRegistry::validate("0 3 * * *").is_ok());
        assert!(ScheduleRegistry::validate("*/5 * * * *").is_ok());
    }

    #[test]
    fn test_validate_accepts_six_field_expressions() {
        assert!(ScheduleRegistry::validate("30 0 3 * * *").is_ok());
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(matches!(
            ScheduleRegistry::validate("每天凌晨三点"),
            Err(BackupError::InvalidCronExpression(_))
        ));
        assert!(matches!(
            ScheduleRegistry::validate("99 99 * * *"),
            Err(BackupError::InvalidCronExpression(_))
        ));
    }

    #[tokio::test]
    async fn test_create_persists_and_lists() {
        let dir = TempDir::new().unwrap();
        let registry = test_registry(&dir);

        let id = registry.create("0 3 * * *", false).await.unwrap();
        let items = registry.list().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, id);
        assert_eq!(items[0].1, "0 3 * * *");
        assert!(!items[0].2);

        // 持久化文件使用 {id: {"schedule": expr}} 结构
        let content = std::fs::read_to_string(dir.path().join("data").join("crons.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed[&id]["schedule"], "0 3 * * *");
    }

    #[tokio::test]
    async fn test_invalid_expression_leaves_registry_unchanged() {
        let dir = TempDir::new().unwrap();
        let registry = test_registry(&dir);
        registry.create("0 3 * * *", false).await.unwrap();

        assert!(registry.create("not a cron", false).await.is_err());
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_id() {
        let dir = TempDir::new().unwrap();
        let registry = test_registry(&dir);

        assert!(matches!(
            registry.update("missing-id", "0 3 * * *").await,
            Err(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let registry = test_registry(&dir);

        let id = registry.create("0 3 * * *", false).await.unwrap();
        registry.update(&id, "30 4 * * *").await.unwrap();
        assert_eq!(registry.list().await[0].1, "30 4 * * *");

        registry.delete(&id).await.unwrap();
        assert!(registry.list().await.is_empty());
        assert!(matches!(
            registry.delete(&id).await,
            Err(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_arm_all_arms_one_timer_per_entry() {
        let dir = TempDir::new().unwrap();
        let registry = test_registry(&dir);
        registry.create("0 3 * * *", false).await.unwrap();
        registry.create("0 4 * * *", false).await.unwrap();
        assert_eq!(registry.armed_count().await, 0);

        registry.arm_all().await;
        assert_eq!(registry.armed_count().await, 2);

        registry.disarm_all().await;
        assert_eq!(registry.armed_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_while_armed_arms_new_entry() {
        let dir = TempDir::new().unwrap();
        let registry = test_registry(&dir);

        registry.create("0 3 * * *", true).await.unwrap();
        assert_eq!(registry.armed_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete_disarms_timer() {
        let dir = TempDir::new().unwrap();
        let registry = test_registry(&dir);

        let id = registry.create("0 3 * * *", true).await.unwrap();
        registry.delete(&id).await.unwrap();
        assert_eq!(registry.armed_count().await, 0);
    }

    #[tokio::test]
    async fn test_armed_timer_triggers_run() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let registry = registry_for(&config);

        // 每秒触发；未授权的运行会留下 Failure 历史记录
        registry.create("* * * * * *", true).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;

        let history = RunHistory::load(config.history_path()).unwrap();
        assert!(history.len().await >= 1);
    }

    #[tokio::test]
    async fn test_disarmed_timer_never_fires() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let registry = registry_for(&config);

        registry.create("* * * * * *", true).await.unwrap();
        registry.disarm_all().await;

        // 撤防后触发时刻流逝也不得执行备份
        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        let history = RunHistory::load(config.history_path()).unwrap();
        assert_eq!(history.len().await, 0);
    }

    #[tokio::test]
    async fn test_deleted_schedule_timer_never_fires() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let registry = registry_for(&config);

        let id = registry.create("* * * * * *", true).await.unwrap();
        registry.delete(&id).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        let history = RunHistory::load(config.history_path()).unwrap();
        assert_eq!(history.len().await, 0);
    }

    #[tokio::test]
    async fn test_registry_reloads_from_disk() {
        let dir = TempDir::new().unwrap();
        let id = {
            let registry = test_registry(&dir);
            registry.create("0 3 * * *", false).await.unwrap()
        };

        let registry = test_registry(&dir);
        let items = registry.list().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, id);
    }
}
