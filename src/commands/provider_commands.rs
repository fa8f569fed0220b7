//! Provider 管理命令

use super::AppState;
use crate::core::error::{AppError, AppResult};
use crate::models::{ProviderDraft, ProviderPatch, ProviderRecord, ToolId};
use crate::services::ChangeOrigin;

/// 列出工具的所有记录（按排序）
pub fn list_providers(state: &AppState, tool: ToolId) -> AppResult<Vec<ProviderRecord>> {
    state.stores.get(tool).list()
}

pub fn get_provider(state: &AppState, tool: ToolId, id: &str) -> AppResult<ProviderRecord> {
    state.stores.get(tool).get(id)
}

pub fn create_provider(state: &AppState, draft: ProviderDraft) -> AppResult<ProviderRecord> {
    state.stores.get(draft.settings.tool()).create(draft)
}

/// 更新记录；若该记录当前已应用，立即重新写入原生配置
///
/// 重新写入失败时记录保持修改前的内容。
pub fn update_provider(
    state: &AppState,
    tool: ToolId,
    id: &str,
    patch: ProviderPatch,
) -> AppResult<ProviderRecord> {
    state
        .apply
        .update_and_reapply(tool, id, patch, ChangeOrigin::App)
}

pub fn delete_provider(state: &AppState, tool: ToolId, id: &str) -> AppResult<()> {
    state.stores.get(tool).delete(id)
}

pub fn reorder_providers(state: &AppState, tool: ToolId, ids: &[String]) -> AppResult<()> {
    state.stores.get(tool).reorder(ids)
}

/// 仅标记为当前选中，不写入原生配置
pub fn select_provider(state: &AppState, tool: ToolId, id: &str) -> AppResult<()> {
    state.stores.get(tool).select(id)
}

pub fn apply_config(
    state: &AppState,
    tool: ToolId,
    id: &str,
    origin: ChangeOrigin,
) -> AppResult<ProviderRecord> {
    state.apply.apply(tool, id, origin)
}

pub fn toggle_disabled(
    state: &AppState,
    tool: ToolId,
    id: &str,
    disabled: bool,
) -> AppResult<ProviderRecord> {
    state.stores.get(tool).set_disabled(id, disabled)
}

/// 清除已应用标记（原生配置文件保持不变）
pub fn clear_applied(state: &AppState, tool: ToolId) -> AppResult<Option<String>> {
    let previous = state.stores.get(tool).clear_applied()?;
    if previous.is_some() {
        state.events.config_changed(tool, ChangeOrigin::App, None);
    }
    Ok(previous)
}

pub fn get_common_config(state: &AppState, tool: ToolId) -> AppResult<Option<String>> {
    state.stores.get(tool).common_config()
}

/// 保存通用配置并重新应用当前记录；重新应用失败时通用配置保持不变
pub fn save_common_config(state: &AppState, tool: ToolId, blob: &str) -> AppResult<()> {
    state
        .apply
        .save_common_and_reapply(tool, blob, ChangeOrigin::App)?;
    Ok(())
}

/// 按名称或 id 查找记录（CLI 使用）
pub fn find_provider(state: &AppState, tool: ToolId, key: &str) -> AppResult<ProviderRecord> {
    let records = state.stores.get(tool).list()?;
    if let Some(record) = records.iter().find(|r| r.id == key) {
        return Ok(record.clone());
    }
    let mut matches = records.into_iter().filter(|r| r.name == key);
    match (matches.next(), matches.next()) {
        (Some(record), None) => Ok(record),
        (Some(_), Some(_)) => Err(AppError::Validation(format!(
            "存在多个名为 {key} 的记录，请使用 id"
        ))),
        (None, _) => Err(AppError::NotFound(format!("{tool} 中不存在记录: {key}"))),
    }
}
