//! 持久化服务
//!
//! 持有共享状态句柄和仓储，对外提供加载、保存、按用户保存和定时自动保存。
//! 同一时刻只允许一个加载或保存过程运行。

use crate::config::config::{AppConfig, ConversationConfig};
use crate::error::Result;
use crate::models::UserId;
use crate::observability::StoreMetrics;
use crate::state::{StateHandle, StoreState};
use crate::storage::layout::StorePaths;
use crate::storage::repository::{JsonStateRepository, LoadReport, SaveReport, StateRepository};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// 持久化服务
pub struct PersistenceService {
    repository: Arc<dyn StateRepository>,
    state: StateHandle,
    pass_lock: Mutex<()>,
    bot_label: String,
}

impl PersistenceService {
    pub fn new(repository: Arc<dyn StateRepository>, state: StateHandle) -> Self {
        Self {
            repository,
            state,
            pass_lock: Mutex::new(()),
            bot_label: ConversationConfig::default().bot_label,
        }
    }

    /// 设置格式化历史时机器人一方的名称
    pub fn with_bot_label(mut self, bot_label: impl Into<String>) -> Self {
        self.bot_label = bot_label.into();
        self
    }

    /// 共享状态句柄
    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// 从磁盘重建全部状态
    ///
    /// 先加载到新的容器中再整体替换，读者不会看到加载到一半的状态。
    /// 存储不可用时容器被清空并返回错误。
    pub async fn load(&self) -> Result<LoadReport> {
        let _pass = self.pass_lock.lock().await;

        let max_history = self.state.read().await.conversations.max_history();
        let mut fresh = StoreState::new(max_history);
        let result = self
            .repository
            .load_all(&mut fresh.emotions, &mut fresh.conversations)
            .await;

        *self.state.write().await = fresh;
        result
    }

    /// 保存全部状态
    pub async fn save(&self) -> Result<SaveReport> {
        let _pass = self.pass_lock.lock().await;
        let snapshot = self.snapshot().await;
        self.repository
            .save_all(&snapshot.emotions, Some(&snapshot.conversations))
            .await
    }

    /// 保存单个用户的全部文档
    pub async fn save_user(&self, user_id: UserId) -> SaveReport {
        let _pass = self.pass_lock.lock().await;
        let snapshot = self.snapshot().await;
        self.repository
            .save_user(user_id, &snapshot.emotions, Some(&snapshot.conversations))
            .await
    }

    /// 一次对话结束后保存该用户的对话历史、摘要和画像
    pub async fn save_user_conversation(&self, user_id: UserId) -> SaveReport {
        let _pass = self.pass_lock.lock().await;
        let conversations = self.state.read().await.conversations.clone();
        self.repository
            .save_conversation(user_id, &conversations)
            .await
    }

    /// 按配置的机器人名称格式化某用户的对话历史
    pub async fn format_history(&self, user_id: UserId) -> String {
        self.state
            .read()
            .await
            .conversations
            .format_history(user_id, &self.bot_label)
    }

    async fn snapshot(&self) -> StoreState {
        self.state.read().await.clone()
    }

    /// 按固定间隔自动保存，直到 `shutdown` 完成，退出前再保存一次
    ///
    /// 周期保存的失败只记录日志；最终保存的结果返回给调用方。
    pub async fn run_autosave<F>(&self, interval: Duration, shutdown: F) -> Result<SaveReport>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即完成
        ticker.tick().await;

        tokio::pin!(shutdown);
        info!("Autosave started with interval {:?}", interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => match self.save().await {
                    Ok(report) if !report.is_success() => {
                        warn!("Autosave wrote {} files, {} failed", report.written, report.failed());
                    }
                    Ok(_) => {}
                    Err(e) => error!("Autosave failed: {}", e),
                },
            }
        }

        info!("Autosave stopping, running final save");
        self.save().await
    }
}

/// 按配置创建基于 JSON 文件的持久化服务
pub fn create_persistence_service(config: &AppConfig, metrics: StoreMetrics) -> PersistenceService {
    let repository = JsonStateRepository::with_metrics(StorePaths::from(&config.storage), metrics);
    let state = StoreState::new(config.conversation.max_history).into_handle();
    PersistenceService::new(Arc::new(repository), state)
        .with_bot_label(config.conversation.bot_label.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config::StorageConfig;
    use crate::storage::layout::FileFamily;
    use serde_json::json;

    fn service(dir: &tempfile::TempDir) -> (PersistenceService, StoreMetrics) {
        let mut config = AppConfig::default();
        config.storage = StorageConfig::with_data_dir(dir.path());
        config.conversation.max_history = 3;
        let metrics = StoreMetrics::default();
        (create_persistence_service(&config, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_save_then_load_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(&dir);

        {
            let mut state = service.state().write().await;
            state.emotions.emotions_mut(11).insert("mood".into(), json!("curious"));
            state.emotions.record_interaction(11, "greet");
            state.conversations.add_message(11, "hey", false);
        }
        assert!(service.save().await.unwrap().is_success());

        service.state().write().await.emotions.clear();
        let report = service.load().await.unwrap();
        assert!(report.has_profiles());

        let state = service.state().read().await;
        assert_eq!(state.emotions.user_emotions[&11]["mood"], "curious");
        assert_eq!(state.emotions.interaction_stats[&11]["greet"], 1);
        assert_eq!(state.conversations.conversations[&11].len(), 1);
        assert_eq!(state.conversations.max_history(), 3);
    }

    #[tokio::test]
    async fn test_save_user_conversation_only_touches_conversation_files() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(&dir);
        service.load().await.unwrap();

        {
            let mut state = service.state().write().await;
            state.emotions.emotions_mut(4);
            state.conversations.add_message(4, "hello", false);
            state.conversations.get_or_create_profile(4, Some("sam"));
        }
        let report = service.save_user_conversation(4).await;
        assert_eq!(report.written, 2);

        let paths = StorePaths::under(dir.path());
        assert!(paths.family_path(FileFamily::Conversations, 4).exists());
        assert!(paths.family_path(FileFamily::UserProfile, 4).exists());
        assert!(!paths.family_path(FileFamily::Emotional, 4).exists());
    }

    #[tokio::test]
    async fn test_format_history_uses_configured_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage = StorageConfig::with_data_dir(dir.path());
        config.conversation.bot_label = "Aria".into();
        let service = create_persistence_service(&config, StoreMetrics::default());

        assert_eq!(service.format_history(3).await, "No prior conversation.");

        {
            let mut state = service.state().write().await;
            state.conversations.add_message(3, "hi", false);
            state.conversations.add_message(3, "hello again", true);
        }
        assert_eq!(service.format_history(3).await, "User: hi\nAria: hello again");
    }

    #[tokio::test]
    async fn test_concurrent_saves_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let (service, metrics) = service(&dir);
        service.state().write().await.emotions.emotions_mut(1);

        let (a, b) = tokio::join!(service.save(), service.save());
        assert!(a.unwrap().is_success());
        assert!(b.unwrap().is_success());
        assert_eq!(metrics.snapshot().save_passes, 2);
    }

    #[tokio::test]
    async fn test_autosave_runs_final_save_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (service, metrics) = service(&dir);
        service.state().write().await.emotions.emotions_mut(9);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let stop = async move {
            let _ = rx.await;
        };
        let trigger = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(());
        };

        let (report, _) = tokio::join!(service.run_autosave(Duration::from_secs(3600), stop), trigger);
        assert!(report.unwrap().is_success());
        assert_eq!(metrics.snapshot().save_passes, 1);
        assert!(
            StorePaths::under(dir.path())
                .family_path(FileFamily::Emotional, 9)
                .exists()
        );
    }

    #[tokio::test]
    async fn test_load_unavailable_leaves_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut config = AppConfig::default();
        config.storage = StorageConfig::with_data_dir(&blocker);
        let service = create_persistence_service(&config, StoreMetrics::default());
        service.state().write().await.emotions.emotions_mut(1);

        assert!(service.load().await.is_err());
        assert!(service.state().read().await.emotions.user_emotions.is_empty());
    }
}
