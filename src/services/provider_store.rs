//! Provider 存储（每个工具一个实例）
//!
//! 每个工具的记录与通用配置保存在 `<data_dir>/providers/<tool>.json`。
//! 所有修改都在「进程内互斥锁 + fs2 文件锁」保护下完成一次读-改-写，
//! 整个文档通过临时文件 + rename 原子替换，读方不会看到中间状态。
//!
//! `isApplied` 只能通过 `transition_applied` 修改，保证同一工具至多一条记录处于已应用状态。

use crate::core::error::{AppError, AppResult};
use crate::data::JsonManager;
use crate::models::{
    ProviderDraft, ProviderPatch, ProviderRecord, ProviderStoreFile, ToolId, PROVIDER_STORE_VERSION,
};
use crate::services::codec;
use crate::utils::AppPaths;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 记录 id 同时用作 OpenCode `provider` 表的键，限制为安全字符
static RECORD_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").unwrap_or_else(|e| {
        unreachable!("invalid record id pattern: {e}")
    })
});

pub fn validate_record_id(id: &str) -> AppResult<()> {
    if RECORD_ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "记录 id 只能包含字母、数字、点、下划线和连字符: {id}"
        )))
    }
}

pub struct ProviderStore {
    tool: ToolId,
    path: PathBuf,
    json: JsonManager,
    write_guard: Mutex<()>,
}

impl ProviderStore {
    pub fn new(tool: ToolId, path: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            path: path.into(),
            json: JsonManager::new(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn tool(&self) -> ToolId {
        self.tool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> AppResult<ProviderStoreFile> {
        let doc: ProviderStoreFile = self.json.read(&self.path)?.unwrap_or_default();
        if doc.version > PROVIDER_STORE_VERSION {
            return Err(AppError::codec(
                "version",
                format!(
                    "存储版本 {} 高于当前支持的 {}",
                    doc.version, PROVIDER_STORE_VERSION
                ),
            ));
        }
        Ok(doc)
    }

    /// 串行化的读-改-写；闭包返回错误时文件保持不变
    fn mutate<R>(&self, f: impl FnOnce(&mut ProviderStoreFile) -> AppResult<R>) -> AppResult<R> {
        let _guard = self.write_guard.lock().unwrap_or_else(|p| p.into_inner());
        self.json.update(&self.path, |doc: &mut ProviderStoreFile| {
            if doc.version > PROVIDER_STORE_VERSION {
                return Err(AppError::codec("version", "存储版本过高，拒绝写入"));
            }
            let output = f(doc)?;
            doc.version = PROVIDER_STORE_VERSION;
            doc.updated_at = Utc::now();
            Ok(output)
        })
    }

    // ==================== 查询 ====================

    /// 按 sortIndex 排序（相同时按创建时间、id）
    pub fn list(&self) -> AppResult<Vec<ProviderRecord>> {
        let mut providers = self.load()?.providers;
        sort_records(&mut providers);
        Ok(providers)
    }

    pub fn get(&self, id: &str) -> AppResult<ProviderRecord> {
        self.load()?
            .providers
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| self.not_found(id))
    }

    pub fn applied(&self) -> AppResult<Option<ProviderRecord>> {
        Ok(self.load()?.providers.into_iter().find(|p| p.is_applied))
    }

    pub fn common_config(&self) -> AppResult<Option<String>> {
        Ok(self.load()?.common_config)
    }

    // ==================== 修改 ====================

    pub fn create(&self, draft: ProviderDraft) -> AppResult<ProviderRecord> {
        self.ensure_settings_tool(&draft.settings)?;
        let name = validate_name(&draft.name)?;
        let settings_config = codec::encode_settings(&draft.settings)?;
        let id = match draft.id {
            Some(id) => {
                validate_record_id(&id)?;
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let record = self.mutate(|doc| {
            if doc.providers.iter().any(|p| p.id == id) {
                return Err(AppError::Validation(format!("记录 id 已存在: {id}")));
            }
            let now = Utc::now();
            let sort_index = doc
                .providers
                .iter()
                .map(|p| p.sort_index)
                .max()
                .map_or(0, |max| max + 1);

            let record = ProviderRecord {
                id: id.clone(),
                name,
                category: draft.category,
                settings_config,
                source_provider_id: draft.source_provider_id,
                website_url: draft.website_url,
                notes: draft.notes,
                icon: draft.icon,
                icon_color: draft.icon_color,
                sort_index,
                is_applied: false,
                is_disabled: false,
                is_current: false,
                created_at: now,
                updated_at: now,
            };
            doc.providers.push(record.clone());
            Ok(record)
        })?;

        tracing::info!(tool = %self.tool, id = %record.id, name = %record.name, "已创建 Provider");
        Ok(record)
    }

    pub fn update(&self, id: &str, patch: ProviderPatch) -> AppResult<ProviderRecord> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let settings_config = match &patch.settings {
            Some(settings) => {
                self.ensure_settings_tool(settings)?;
                Some(codec::encode_settings(settings)?)
            }
            None => None,
        };

        let record = self.mutate(|doc| {
            let record = doc
                .providers
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| self.not_found(id))?;

            if let Some(name) = name {
                record.name = name;
            }
            if let Some(category) = patch.category {
                record.category = category;
            }
            if let Some(settings_config) = settings_config {
                record.settings_config = settings_config;
            }
            if let Some(website_url) = patch.website_url {
                record.website_url = website_url;
            }
            if let Some(notes) = patch.notes {
                record.notes = notes;
            }
            if let Some(icon) = patch.icon {
                record.icon = icon;
            }
            if let Some(icon_color) = patch.icon_color {
                record.icon_color = icon_color;
            }
            record.updated_at = Utc::now();
            Ok(record.clone())
        })?;

        tracing::info!(tool = %self.tool, id = %id, "已更新 Provider");
        Ok(record)
    }

    /// 删除记录；已应用的记录需先切换或清除
    pub fn delete(&self, id: &str) -> AppResult<()> {
        self.mutate(|doc| {
            let index = doc
                .providers
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| self.not_found(id))?;
            if doc.providers[index].is_applied {
                return Err(AppError::InUse(format!(
                    "{} 当前已应用，请先应用其它配置或清除应用状态",
                    doc.providers[index].name
                )));
            }
            doc.providers.remove(index);
            Ok(())
        })?;

        tracing::info!(tool = %self.tool, id = %id, "已删除 Provider");
        Ok(())
    }

    /// 按完整 id 列表重排（必须与现有记录集合完全一致）
    pub fn reorder(&self, ids: &[String]) -> AppResult<()> {
        self.mutate(|doc| {
            let requested: HashSet<&str> = ids.iter().map(String::as_str).collect();
            let existing: HashSet<&str> = doc.providers.iter().map(|p| p.id.as_str()).collect();
            if requested.len() != ids.len() {
                return Err(AppError::Validation("排序列表包含重复 id".to_string()));
            }
            if requested != existing {
                return Err(AppError::Validation(format!(
                    "排序列表与现有记录不一致（期望 {} 条，收到 {} 条）",
                    existing.len(),
                    ids.len()
                )));
            }

            let now = Utc::now();
            for record in doc.providers.iter_mut() {
                let position = ids
                    .iter()
                    .position(|id| *id == record.id)
                    .unwrap_or_default() as i64;
                if record.sort_index != position {
                    record.sort_index = position;
                    record.updated_at = now;
                }
            }
            Ok(())
        })?;

        tracing::debug!(tool = %self.tool, count = ids.len(), "已重新排序 Provider");
        Ok(())
    }

    /// 标记界面当前选中项（不应用）
    pub fn select(&self, id: &str) -> AppResult<()> {
        self.mutate(|doc| {
            if !doc.providers.iter().any(|p| p.id == id) {
                return Err(self.not_found(id));
            }
            for record in doc.providers.iter_mut() {
                record.is_current = record.id == id;
            }
            Ok(())
        })
    }

    /// 将 `id` 设为唯一已应用记录
    pub fn set_applied(&self, id: &str) -> AppResult<ProviderRecord> {
        let record = self.mutate(|doc| {
            transition_applied(&mut doc.providers, Some(id))?;
            doc.providers
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| self.not_found(id))
        })?;

        tracing::info!(tool = %self.tool, id = %id, "已标记为当前应用");
        Ok(record)
    }

    /// 清除已应用标记，返回之前已应用的 id
    pub fn clear_applied(&self) -> AppResult<Option<String>> {
        let previous = self.mutate(|doc| {
            let previous = doc
                .providers
                .iter()
                .find(|p| p.is_applied)
                .map(|p| p.id.clone());
            transition_applied(&mut doc.providers, None)?;
            Ok(previous)
        })?;

        if let Some(id) = &previous {
            tracing::info!(tool = %self.tool, id = %id, "已清除应用状态");
        }
        Ok(previous)
    }

    /// 启用/禁用；已应用的记录不能被禁用
    pub fn set_disabled(&self, id: &str, disabled: bool) -> AppResult<ProviderRecord> {
        self.mutate(|doc| {
            let record = doc
                .providers
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| self.not_found(id))?;
            if disabled && record.is_applied {
                return Err(AppError::InUse(format!(
                    "{} 当前已应用，不能禁用",
                    record.name
                )));
            }
            if record.is_disabled != disabled {
                record.is_disabled = disabled;
                record.updated_at = Utc::now();
            }
            Ok(record.clone())
        })
    }

    /// 保存通用配置（空文本表示清除）
    pub fn save_common_config(&self, blob: &str) -> AppResult<()> {
        let value = if blob.trim().is_empty() {
            None
        } else {
            codec::validate_common(self.tool, blob)?;
            Some(blob.to_string())
        };
        self.mutate(|doc| {
            doc.common_config = value;
            Ok(())
        })?;
        tracing::info!(tool = %self.tool, "已保存通用配置");
        Ok(())
    }

    /// 恢复记录修改前的内容（不改变应用、选中、禁用状态）
    pub(crate) fn restore(&self, previous: &ProviderRecord) -> AppResult<()> {
        self.mutate(|doc| {
            let record = doc
                .providers
                .iter_mut()
                .find(|p| p.id == previous.id)
                .ok_or_else(|| self.not_found(&previous.id))?;
            record.name = previous.name.clone();
            record.category = previous.category.clone();
            record.settings_config = previous.settings_config.clone();
            record.source_provider_id = previous.source_provider_id.clone();
            record.website_url = previous.website_url.clone();
            record.notes = previous.notes.clone();
            record.icon = previous.icon.clone();
            record.icon_color = previous.icon_color.clone();
            record.updated_at = previous.updated_at;
            Ok(())
        })?;
        tracing::warn!(tool = %self.tool, id = %previous.id, "已恢复记录修改前的内容");
        Ok(())
    }

    /// 恢复之前的通用配置（之前的内容已通过校验）
    pub(crate) fn restore_common_config(&self, previous: Option<String>) -> AppResult<()> {
        self.mutate(|doc| {
            doc.common_config = previous;
            Ok(())
        })?;
        tracing::warn!(tool = %self.tool, "已恢复修改前的通用配置");
        Ok(())
    }

    fn ensure_settings_tool(&self, settings: &crate::models::ToolSettings) -> AppResult<()> {
        if settings.tool() == self.tool {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "{} 的设置不能保存到 {}",
                settings.tool(),
                self.tool
            )))
        }
    }

    fn not_found(&self, id: &str) -> AppError {
        AppError::NotFound(format!("{} 记录不存在: {id}", self.tool))
    }
}

/// 唯一修改 `is_applied` 的入口
///
/// `Some(id)`：目标必须存在且未禁用，否则返回 `NotFound` 且不做任何修改。
/// `None`：清除所有已应用标记。
fn transition_applied(records: &mut [ProviderRecord], target: Option<&str>) -> AppResult<()> {
    if let Some(id) = target {
        match records.iter().find(|p| p.id == id) {
            Some(record) if !record.is_disabled => {}
            Some(_) => return Err(AppError::NotFound(format!("记录已禁用: {id}"))),
            None => return Err(AppError::NotFound(format!("记录不存在: {id}"))),
        }
    }

    let now = Utc::now();
    for record in records.iter_mut() {
        let applied = Some(record.id.as_str()) == target;
        if record.is_applied != applied {
            record.is_applied = applied;
            record.updated_at = now;
        }
    }
    Ok(())
}

fn validate_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("名称不能为空".to_string()));
    }
    Ok(trimmed.to_string())
}

fn sort_records(records: &mut [ProviderRecord]) {
    records.sort_by(|a, b| {
        a.sort_index
            .cmp(&b.sort_index)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// 所有工具的存储实例
pub struct ProviderStores {
    claude_code: ProviderStore,
    codex: ProviderStore,
    open_code: ProviderStore,
    oh_my_open_code: ProviderStore,
}

impl ProviderStores {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            claude_code: ProviderStore::new(
                ToolId::ClaudeCode,
                paths.provider_store(ToolId::ClaudeCode),
            ),
            codex: ProviderStore::new(ToolId::Codex, paths.provider_store(ToolId::Codex)),
            open_code: ProviderStore::new(ToolId::OpenCode, paths.provider_store(ToolId::OpenCode)),
            oh_my_open_code: ProviderStore::new(
                ToolId::OhMyOpenCode,
                paths.provider_store(ToolId::OhMyOpenCode),
            ),
        }
    }

    pub fn get(&self, tool: ToolId) -> &ProviderStore {
        match tool {
            ToolId::ClaudeCode => &self.claude_code,
            ToolId::Codex => &self.codex,
            ToolId::OpenCode => &self.open_code,
            ToolId::OhMyOpenCode => &self.oh_my_open_code,
        }
    }
}
