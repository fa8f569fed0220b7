//! 远程 SSH 同步命令

use super::AppState;
use crate::core::error::{AppError, AppResult};
use crate::models::{
    FileMapping, SSHConnection, SSHSyncConfig, SyncModule, SyncResult, SyncStatusSnapshot,
};
use crate::services::sync::{self, default_file_mappings, SyncHandle};
use std::time::Duration;

pub fn get_ssh_config(state: &AppState) -> AppResult<SSHSyncConfig> {
    state.ssh_config.load()
}

/// 保存配置后启用触发的首次同步
#[derive(Debug)]
pub enum EnableSync {
    /// 本次保存没有从禁用切换为启用
    NotTriggered,
    Started(SyncHandle),
    /// 配置已保存，但首次同步未能开始
    Failed(AppError),
}

/// 保存同步配置；从禁用切换为启用时立即发起一次完整同步
///
/// 需要在 tokio 运行时中调用。
pub fn save_ssh_config(state: &AppState, config: SSHSyncConfig) -> AppResult<EnableSync> {
    if !state.ssh_config.save(config)? {
        return Ok(EnableSync::NotTriggered);
    }
    tracing::info!("远程同步已启用，开始首次同步");
    match state.sync.start(None) {
        Ok(handle) => Ok(EnableSync::Started(handle)),
        Err(e) => {
            tracing::warn!(error = %e, "启用后的首次同步未能开始");
            Ok(EnableSync::Failed(e))
        }
    }
}

pub async fn sync_now(state: &AppState, module: Option<SyncModule>) -> AppResult<SyncResult> {
    state.sync.sync(module).await
}

pub fn start_sync(state: &AppState, module: Option<SyncModule>) -> AppResult<SyncHandle> {
    state.sync.start(module)
}

pub fn cancel_sync(state: &AppState) -> bool {
    state.sync.cancel_current()
}

pub fn get_sync_status(state: &AppState) -> SyncStatusSnapshot {
    state.sync.status()
}

pub fn get_default_mappings() -> Vec<FileMapping> {
    default_file_mappings()
}

pub fn reset_file_mappings(state: &AppState) -> AppResult<Vec<FileMapping>> {
    state.ssh_config.reset_file_mappings()
}

/// 测试连接（不读取、不修改已保存的配置）
pub async fn test_ssh_connection(state: &AppState, connection: &SSHConnection) -> AppResult<()> {
    let timeout = Duration::from_secs(state.config.sync.connect_timeout_secs);
    sync::test_connection(connection, timeout).await?;
    tracing::info!(target_host = %connection.target(), "SSH 连接测试成功");
    Ok(())
}

// ==================== 连接预设 ====================

pub fn save_ssh_connection(
    state: &AppState,
    connection: SSHConnection,
) -> AppResult<SSHConnection> {
    state.ssh_config.upsert_connection(connection)
}

pub fn delete_ssh_connection(state: &AppState, id: &str) -> AppResult<()> {
    state.ssh_config.delete_connection(id)
}

pub fn set_active_connection(state: &AppState, id: Option<String>) -> AppResult<()> {
    state.ssh_config.set_active_connection(id)
}

// ==================== 文件映射 ====================

pub fn save_file_mapping(state: &AppState, mapping: FileMapping) -> AppResult<()> {
    state.ssh_config.upsert_mapping(mapping)
}

pub fn delete_file_mapping(state: &AppState, id: &str) -> AppResult<()> {
    state.ssh_config.delete_mapping(id)
}
