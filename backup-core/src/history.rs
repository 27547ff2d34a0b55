use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 单次备份运行的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failure,
}

/// 单次备份运行的不可变记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRunEvent {
    pub date: String,
    pub time: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackupRunEvent {
    pub fn success(date: String, time: String) -> Self {
        Self {
            date,
            time,
            status: RunStatus::Success,
            error: None,
        }
    }

    pub fn failure(date: String, time: String, error: String) -> Self {
        Self {
            date,
            time,
            status: RunStatus::Failure,
            error: Some(error),
        }
    }
}

/// 备份历史，仅追加，按时间顺序持久化为 JSON 数组
#[derive(Debug, Clone)]
pub struct RunHistory {
    path: PathBuf,
    events: Arc<RwLock<Vec<BackupRunEvent>>>,
}

impl RunHistory {
    /// 从持久化文件加载历史；文件不存在时从空历史开始
    pub fn load(path: PathBuf) -> Result<Self> {
        let events = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            events: Arc::new(RwLock::new(events)),
        })
    }

    /// 追加一条运行记录并立即落盘
    pub async fn append(&self, event: BackupRunEvent) -> Result<()> {
        let mut events = self.events.write().await;
        events.push(event);
        self.persist(&events).await?;
        tracing::info!("备份历史已保存: {}", self.path.display());
        Ok(())
    }

    /// 按追加顺序返回全部运行记录
    pub async fn list(&self) -> Vec<BackupRunEvent> {
        self.events.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    async fn persist(&self, events: &[BackupRunEvent]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(events)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    #[serde(rename = "isBackupEnabled")]
    is_backup_enabled: bool,
}

/// 全局"备份已启用"开关，单实例、持久化
#[derive(Debug, Clone)]
pub struct BackupState {
    path: PathBuf,
    enabled: Arc<RwLock<bool>>,
}

impl BackupState {
    /// 从持久化文件加载状态；文件不存在时默认禁用
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                PersistedState::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            PersistedState::default()
        };

        Ok(Self {
            path,
            enabled: Arc::new(RwLock::new(state.is_backup_enabled)),
        })
    }

    pub async fn is_enabled(&self) -> bool {
        *self.enabled.read().await
    }

    /// 更新并持久化启用状态
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        *self.enabled.write().await = enabled;
        self.persist(enabled).await?;
        tracing::info!("备份启用状态已保存: {}", enabled);
        Ok(())
    }

    async fn persist(&self, enabled: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let state = PersistedState {
            is_backup_enabled: enabled,
        };
        let content = serde_json::to_string_pretty(&state)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_history_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backupHistory.json");

        let history = RunHistory::load(path.clone()).unwrap();
        history
            .append(BackupRunEvent::success(
                "2024-03-01".to_string(),
                "02-00-00".to_string(),
            ))
            .await
            .unwrap();
        history
            .append(BackupRunEvent::failure(
                "2024-03-02".to_string(),
                "02-00-00".to_string(),
                "上传失败".to_string(),
            ))
            .await
            .unwrap();

        let reloaded = RunHistory::load(path).unwrap();
        assert_eq!(reloaded.list().await, history.list().await);
        assert_eq!(reloaded.len().await, 2);
        assert_eq!(reloaded.list().await[1].status, RunStatus::Failure);
    }

    #[tokio::test]
    async fn test_history_preserves_append_order() {
        let dir = tempdir().unwrap();
        let history = RunHistory::load(dir.path().join("h.json")).unwrap();

        for i in 0..5 {
            history
                .append(BackupRunEvent::success(
                    format!("2024-03-0{}", i + 1),
                    "00-00-00".to_string(),
                ))
                .await
                .unwrap();
        }

        let dates: Vec<_> = history.list().await.into_iter().map(|e| e.date).collect();
        assert_eq!(
            dates,
            vec![
                "2024-03-01",
                "2024-03-02",
                "2024-03-03",
                "2024-03-04",
                "2024-03-05"
            ]
        );
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backupState.json");

        let state = BackupState::load(path.clone()).unwrap();
        assert!(!state.is_enabled().await);

        state.set_enabled(true).await.unwrap();

        let reloaded = BackupState::load(path.clone()).unwrap();
        assert!(reloaded.is_enabled().await);

        // 持久化字段名与历史格式保持一致
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("isBackupEnabled"));
    }

    #[test]
    fn test_success_event_has_no_error_field() {
        let event = BackupRunEvent::success("2024-01-01".to_string(), "12-00-00".to_string());
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("error"));
    }
}
