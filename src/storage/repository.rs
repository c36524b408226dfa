//! 状态仓储
//!
//! 把内存容器映射到按文件族组织的 JSON 文档。除数据目录不可写外，任何单个文件的
//! 错误都只影响该文件对应的实体，不会中断整体加载或保存。

use crate::error::{AppError, Result};
use crate::models::{
    ConversationMessage, ConversationSummary, DmSettings, EmotionalDocument, UserId, UserProfile,
};
use crate::observability::StoreMetrics;
use crate::state::{ConversationState, EmotionState};
use crate::storage::codec::{read_document, write_document};
use crate::storage::layout::{FileFamily, StorePaths, WRITE_PROBE};
use crate::storage::migrations::migrate_record;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, warn};

/// 状态仓储 trait
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// 确保目录存在且可写
    async fn verify_directories(&self) -> Result<()>;

    /// 清空容器并从磁盘重建全部状态
    ///
    /// 只有存储不可用时返回错误；单个文件的问题记录在报告中。
    async fn load_all(
        &self,
        emotions: &mut EmotionState,
        conversations: &mut ConversationState,
    ) -> Result<LoadReport>;

    /// 保存全部状态
    async fn save_all(
        &self,
        emotions: &EmotionState,
        conversations: Option<&ConversationState>,
    ) -> Result<SaveReport>;

    /// 保存单个用户的全部文档
    async fn save_user(
        &self,
        user_id: UserId,
        emotions: &EmotionState,
        conversations: Option<&ConversationState>,
    ) -> SaveReport;

    /// 只保存单个用户的对话历史、摘要和画像
    async fn save_conversation(
        &self,
        user_id: UserId,
        conversations: &ConversationState,
    ) -> SaveReport;
}

/// 单个文件族的加载计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FamilyCounts {
    /// 成功加载的文件数
    pub loaded: usize,
    /// 跳过的文件数（文件名或内容无法解析）
    pub errors: usize,
}

/// 加载报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub profiles: FamilyCounts,
    pub memories: FamilyCounts,
    pub events: FamilyCounts,
    pub milestones: FamilyCounts,
    pub user_profiles: FamilyCounts,
    pub conversations: FamilyCounts,
    pub summaries: FamilyCounts,
    /// 私信许可用户数
    pub dm_enabled_users: usize,
    /// 私信设置文件是否损坏
    pub settings_error: bool,
    /// 被迁移步骤修改过的情感记录数
    pub migrated_records: usize,
}

impl LoadReport {
    pub fn family(&self, family: FileFamily) -> FamilyCounts {
        match family {
            FileFamily::Emotional => self.profiles,
            FileFamily::Memories => self.memories,
            FileFamily::Events => self.events,
            FileFamily::Milestones => self.milestones,
            FileFamily::UserProfile => self.user_profiles,
            FileFamily::Conversations => self.conversations,
            FileFamily::Summary => self.summaries,
        }
    }

    fn family_mut(&mut self, family: FileFamily) -> &mut FamilyCounts {
        match family {
            FileFamily::Emotional => &mut self.profiles,
            FileFamily::Memories => &mut self.memories,
            FileFamily::Events => &mut self.events,
            FileFamily::Milestones => &mut self.milestones,
            FileFamily::UserProfile => &mut self.user_profiles,
            FileFamily::Conversations => &mut self.conversations,
            FileFamily::Summary => &mut self.summaries,
        }
    }

    /// 是否至少加载了一个情感档案
    pub fn has_profiles(&self) -> bool {
        self.profiles.loaded > 0
    }

    /// 所有文件族的错误总数
    pub fn total_errors(&self) -> usize {
        FileFamily::ALL
            .into_iter()
            .map(|f| self.family(f).errors)
            .sum::<usize>()
            + usize::from(self.settings_error)
    }
}

/// 保存报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// 写入成功的文件数
    pub written: usize,
    /// 因来源为空而跳过的写入数
    pub skipped: usize,
    /// 写入失败的文件
    pub failures: Vec<PathBuf>,
}

impl SaveReport {
    /// 所有写入是否都成功
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// 合并另一份报告
    pub fn merge(&mut self, other: SaveReport) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }
}

/// 一次目录扫描的结果
#[derive(Debug)]
struct FamilyScan<T> {
    entries: Vec<(UserId, T)>,
    errors: usize,
}

impl<T> Default for FamilyScan<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            errors: 0,
        }
    }
}

/// 基于 JSON 文件的状态仓储实现
#[derive(Clone)]
pub struct JsonStateRepository {
    paths: StorePaths,
    metrics: StoreMetrics,
}

impl JsonStateRepository {
    pub fn new(paths: StorePaths) -> Self {
        Self::with_metrics(paths, StoreMetrics::default())
    }

    pub fn with_metrics(paths: StorePaths, metrics: StoreMetrics) -> Self {
        Self { paths, metrics }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    // ===== 单文件读写 =====

    async fn write<T: Serialize + Sync + ?Sized>(&self, path: &Path, record: &T) -> Result<()> {
        let result = write_document(path, record).await;
        self.metrics.record_write(result.is_ok());
        if result.is_ok() {
            debug!("Saved {}", path.display());
        }
        result
    }

    /// 读取单个用户在某文件族中的文档
    async fn read<T: DeserializeOwned>(&self, family: FileFamily, user_id: UserId) -> Result<Option<T>> {
        let path = self.paths.family_path(family, user_id);
        let doc = read_document(&path).await;
        match &doc {
            Ok(Some(_)) => self.metrics.record_loaded(),
            Err(AppError::Malformed { .. }) => self.metrics.record_skipped(),
            _ => {}
        }
        doc
    }

    /// 读取单个用户的复合情感文档
    pub async fn load_emotional(&self, user_id: UserId) -> Result<Option<EmotionalDocument>> {
        self.read(FileFamily::Emotional, user_id).await
    }

    /// 读取单个用户的情感文档并拆分到容器中
    pub async fn load_user_emotions(&self, user_id: UserId, emotions: &mut EmotionState) -> Result<bool> {
        let Some(doc) = self.load_emotional(user_id).await? else {
            return Ok(false);
        };
        insert_emotional(emotions, user_id, doc, Utc::now());
        Ok(true)
    }

    /// 组合并写入单个用户的复合情感文档
    pub async fn save_emotional(&self, user_id: UserId, emotions: &EmotionState) -> Result<()> {
        let empty = Default::default();
        let doc = EmotionalDocument::compose(
            emotions.user_emotions.get(&user_id).unwrap_or(&empty),
            emotions.relationship_progress.get(&user_id),
            emotions.interaction_stats.get(&user_id),
        );
        self.write(&self.paths.family_path(FileFamily::Emotional, user_id), &doc)
            .await
    }

    /// 读取记忆、事件或里程碑列表
    pub async fn load_records(&self, family: FileFamily, user_id: UserId) -> Result<Option<Vec<Value>>> {
        self.read(family, user_id).await
    }

    /// 写入记忆、事件或里程碑列表，列表为空时不写，返回是否写入
    pub async fn save_records(&self, family: FileFamily, user_id: UserId, records: &[Value]) -> Result<bool> {
        if records.is_empty() {
            return Ok(false);
        }
        self.write(&self.paths.family_path(family, user_id), records)
            .await?;
        Ok(true)
    }

    /// 读取用户画像
    pub async fn load_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let doc: Option<Value> = self.read(FileFamily::UserProfile, user_id).await?;
        Ok(doc.map(|doc| UserProfile::from_document(&doc)))
    }

    /// 写入用户画像
    pub async fn save_user_profile(&self, user_id: UserId, profile: &UserProfile) -> Result<()> {
        self.write(
            &self.paths.family_path(FileFamily::UserProfile, user_id),
            &profile.to_document(),
        )
        .await
    }

    /// 读取单个用户的对话历史和摘要
    ///
    /// 两个文件互不影响：历史损坏时仍会尝试读取摘要，最后返回遇到的第一个错误。
    pub async fn load_conversation(&self, user_id: UserId, conversations: &mut ConversationState) -> Result<()> {
        let history = self
            .read::<Vec<ConversationMessage>>(FileFamily::Conversations, user_id)
            .await;
        let summary = self
            .read::<ConversationSummary>(FileFamily::Summary, user_id)
            .await;

        let mut first_error = None;
        match history {
            Ok(Some(messages)) => conversations.restore_history(user_id, messages),
            Ok(None) => {}
            Err(e) => first_error = Some(e),
        }
        match summary {
            Ok(Some(summary)) => {
                conversations.summaries.insert(user_id, summary);
            }
            Ok(None) => {}
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 写入对话历史，历史为空时不写
    pub async fn save_history(&self, user_id: UserId, conversations: &ConversationState) -> Result<bool> {
        match conversations.conversations.get(&user_id) {
            Some(history) if !history.is_empty() => {
                let path = self.paths.family_path(FileFamily::Conversations, user_id);
                self.write(&path, &history.to_vec()).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// 写入对话摘要，没有摘要时不写
    pub async fn save_summary(&self, user_id: UserId, conversations: &ConversationState) -> Result<bool> {
        match conversations.summaries.get(&user_id) {
            Some(summary) => {
                let path = self.paths.family_path(FileFamily::Summary, user_id);
                self.write(&path, summary).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 读取私信许可设置，文件不存在时为空集合
    pub async fn load_dm_settings(&self) -> Result<HashSet<UserId>> {
        let settings: Option<DmSettings> = read_document(&self.paths.dm_settings_file).await?;
        match settings {
            Some(settings) => {
                let users = settings.into_set();
                info!("Loaded DM settings for {} users", users.len());
                Ok(users)
            }
            None => {
                debug!("No DM settings file found");
                Ok(HashSet::new())
            }
        }
    }

    /// 写入私信许可设置
    pub async fn save_dm_settings(&self, users: &HashSet<UserId>) -> Result<()> {
        self.write(&self.paths.dm_settings_file, &DmSettings::from_set(users))
            .await
    }

    // ===== 目录扫描 =====

    /// 扫描某文件族的目录并解码所有匹配的文档
    async fn scan_family<T: DeserializeOwned + Send>(&self, family: FileFamily) -> FamilyScan<T> {
        let dir = self.paths.family_dir(family);
        let mut scan = FamilyScan::default();

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read {} directory {}: {}", family.label(), dir.display(), e);
                scan.errors += 1;
                return scan;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error while scanning {}: {}", dir.display(), e);
                    scan.errors += 1;
                    break;
                }
            };

            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let user_id = match family.match_file_name(file_name) {
                None => continue,
                Some(Ok(user_id)) => user_id,
                Some(Err(e)) => {
                    warn!("Skipping {} file {}: {}", family.label(), path.display(), e);
                    scan.errors += 1;
                    continue;
                }
            };

            match read_document::<T>(&path).await {
                Ok(Some(doc)) => {
                    self.metrics.record_loaded();
                    scan.entries.push((user_id, doc));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Error loading {} file: {}", family.label(), e);
                    self.metrics.record_skipped();
                    scan.errors += 1;
                }
            }
        }

        scan.entries.sort_by_key(|(user_id, _)| *user_id);
        scan
    }

    async fn ensure_directories(&self) -> Result<()> {
        for dir in self.paths.directories() {
            fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Unavailable(format!("无法创建目录 {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    fn record_write(report: &mut SaveReport, path: PathBuf, result: Result<bool>) {
        match result {
            Ok(true) => report.written += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                error!("Error saving {}: {}", path.display(), e);
                report.failures.push(path);
            }
        }
    }
}

/// 拆分情感文档、执行迁移并放入容器，返回迁移是否修改了记录
fn insert_emotional(
    emotions: &mut EmotionState,
    user_id: UserId,
    doc: EmotionalDocument,
    now: DateTime<Utc>,
) -> bool {
    let (mut fields, relationship, stats) = doc.into_parts();
    let migrated = migrate_record(&mut fields, now);
    emotions.user_emotions.insert(user_id, fields);
    emotions.relationship_progress.insert(user_id, relationship);
    emotions.interaction_stats.insert(user_id, stats);
    migrated
}

#[async_trait]
impl StateRepository for JsonStateRepository {
    async fn verify_directories(&self) -> Result<()> {
        debug!("Data directory: {}", self.paths.data_dir.display());
        self.ensure_directories().await?;

        let probe = self.paths.data_dir.join(WRITE_PROBE);
        fs::write(&probe, "Test write access").await.map_err(|e| {
            AppError::Unavailable(format!("数据目录不可写 {}: {}", probe.display(), e))
        })?;
        fs::remove_file(&probe).await.map_err(|e| {
            AppError::Unavailable(format!("无法删除探测文件 {}: {}", probe.display(), e))
        })?;

        debug!("Write access verified");
        Ok(())
    }

    async fn load_all(
        &self,
        emotions: &mut EmotionState,
        conversations: &mut ConversationState,
    ) -> Result<LoadReport> {
        emotions.clear();
        conversations.clear();

        if let Err(e) = self.verify_directories().await {
            error!("Data directories not available, memory functions disabled: {}", e);
            return Err(e);
        }

        info!("Beginning data load from {}", self.paths.data_dir.display());

        let (profiles, memories, events, milestones, user_profiles, histories, summaries) = tokio::join!(
            self.scan_family::<EmotionalDocument>(FileFamily::Emotional),
            self.scan_family::<Vec<Value>>(FileFamily::Memories),
            self.scan_family::<Vec<Value>>(FileFamily::Events),
            self.scan_family::<Vec<Value>>(FileFamily::Milestones),
            self.scan_family::<Value>(FileFamily::UserProfile),
            self.scan_family::<Vec<ConversationMessage>>(FileFamily::Conversations),
            self.scan_family::<ConversationSummary>(FileFamily::Summary),
        );

        let mut report = LoadReport::default();
        let mut tally = |family: FileFamily, loaded: usize, errors: usize| {
            *report.family_mut(family) = FamilyCounts { loaded, errors };
        };
        tally(FileFamily::Emotional, profiles.entries.len(), profiles.errors);
        tally(FileFamily::Memories, memories.entries.len(), memories.errors);
        tally(FileFamily::Events, events.entries.len(), events.errors);
        tally(FileFamily::Milestones, milestones.entries.len(), milestones.errors);
        tally(FileFamily::UserProfile, user_profiles.entries.len(), user_profiles.errors);
        tally(FileFamily::Conversations, histories.entries.len(), histories.errors);
        tally(FileFamily::Summary, summaries.entries.len(), summaries.errors);

        let now = Utc::now();
        for (user_id, doc) in profiles.entries {
            if insert_emotional(emotions, user_id, doc, now) {
                report.migrated_records += 1;
            }
        }
        emotions.user_memories.extend(memories.entries);
        emotions.user_events.extend(events.entries);
        emotions.user_milestones.extend(milestones.entries);

        for (user_id, doc) in user_profiles.entries {
            let profile = UserProfile::from_document(&doc);
            if profile.user_id.is_some_and(|id| id != user_id) {
                warn!(
                    "Profile file for user {} carries user_id {:?}",
                    user_id, profile.user_id
                );
            }
            conversations.user_profiles.insert(user_id, profile);
        }
        for (user_id, messages) in histories.entries {
            conversations.restore_history(user_id, messages);
        }
        conversations.summaries.extend(summaries.entries);

        match self.load_dm_settings().await {
            Ok(users) => emotions.dm_enabled_users = users,
            Err(e) => {
                warn!("Error loading DM settings: {}", e);
                report.settings_error = true;
            }
        }
        report.dm_enabled_users = emotions.dm_enabled_users.len();

        info!(
            "Loaded {} profiles with {} errors",
            report.profiles.loaded, report.profiles.errors
        );
        info!(
            "Loaded {} memory files, {} event files, {} milestone files",
            report.memories.loaded, report.events.loaded, report.milestones.loaded
        );
        info!(
            "Loaded {} user profiles, {} conversations and {} summaries",
            report.user_profiles.loaded, report.conversations.loaded, report.summaries.loaded
        );
        if report.total_errors() > 0 {
            warn!("Data load finished with {} skipped files", report.total_errors());
        } else {
            info!("Data load complete");
        }

        Ok(report)
    }

    async fn save_all(
        &self,
        emotions: &EmotionState,
        conversations: Option<&ConversationState>,
    ) -> Result<SaveReport> {
        self.ensure_directories().await?;

        let mut users: Vec<_> = emotions.user_emotions.keys().copied().collect();
        users.sort_unstable();

        let mut report = SaveReport::default();
        for &user_id in &users {
            report.merge(self.save_user(user_id, emotions, conversations).await);
        }

        let result = self
            .save_dm_settings(&emotions.dm_enabled_users)
            .await
            .map(|_| true);
        Self::record_write(&mut report, self.paths.dm_settings_file.clone(), result);

        self.metrics.record_save_pass();
        if report.is_success() {
            info!(
                "Data save complete for {} users ({} files written)",
                users.len(),
                report.written
            );
        } else {
            warn!(
                "Data save for {} users finished with {} failed writes",
                users.len(),
                report.failed()
            );
        }

        Ok(report)
    }

    async fn save_user(
        &self,
        user_id: UserId,
        emotions: &EmotionState,
        conversations: Option<&ConversationState>,
    ) -> SaveReport {
        let mut report = SaveReport::default();

        let result = self.save_emotional(user_id, emotions).await.map(|_| true);
        Self::record_write(
            &mut report,
            self.paths.family_path(FileFamily::Emotional, user_id),
            result,
        );

        let lists = [
            (FileFamily::Memories, emotions.user_memories.get(&user_id)),
            (FileFamily::Events, emotions.user_events.get(&user_id)),
            (FileFamily::Milestones, emotions.user_milestones.get(&user_id)),
        ];
        for (family, records) in lists {
            let records = records.map(Vec::as_slice).unwrap_or_default();
            let result = self.save_records(family, user_id, records).await;
            Self::record_write(&mut report, self.paths.family_path(family, user_id), result);
        }

        if let Some(conversations) = conversations {
            report.merge(self.save_conversation(user_id, conversations).await);
        }

        report
    }

    async fn save_conversation(
        &self,
        user_id: UserId,
        conversations: &ConversationState,
    ) -> SaveReport {
        let mut report = SaveReport::default();

        let result = self.save_history(user_id, conversations).await;
        Self::record_write(
            &mut report,
            self.paths.family_path(FileFamily::Conversations, user_id),
            result,
        );

        let result = self.save_summary(user_id, conversations).await;
        Self::record_write(
            &mut report,
            self.paths.family_path(FileFamily::Summary, user_id),
            result,
        );

        let result = match conversations.user_profiles.get(&user_id) {
            Some(profile) => self.save_user_profile(user_id, profile).await.map(|_| true),
            None => Ok(false),
        };
        Self::record_write(
            &mut report,
            self.paths.family_path(FileFamily::UserProfile, user_id),
            result,
        );

        report
    }
}
