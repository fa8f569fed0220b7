//! SSH 同步配置存储（`<data_dir>/ssh_sync.json`）
//!
//! 连接预设、文件映射与上次同步记录保存在同一文档中，
//! 每次保存前都会完整校验（连接参数、映射路径、启用映射的本地路径不重复）。

use crate::core::error::{AppError, AppResult};
use crate::data::JsonManager;
use crate::models::{
    AuthMethod, FileMapping, LastSyncStatus, RunStatus, SSHConnection, SSHSyncConfig, SyncResult,
};
use crate::services::sync::resolver::{default_file_mappings, MappingResolver};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

pub struct SshConfigStore {
    path: PathBuf,
    json: JsonManager,
    resolver: MappingResolver,
    write_guard: Mutex<()>,
}

impl SshConfigStore {
    pub fn new(path: impl Into<PathBuf>, resolver: MappingResolver) -> Self {
        Self {
            path: path.into(),
            json: JsonManager::new(),
            resolver,
            write_guard: Mutex::new(()),
        }
    }

    pub fn resolver(&self) -> &MappingResolver {
        &self.resolver
    }

    /// 读取配置，文件不存在时返回默认配置（含默认映射）
    pub fn load(&self) -> AppResult<SSHSyncConfig> {
        Ok(self.json.read(&self.path)?.unwrap_or_default())
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut SSHSyncConfig) -> AppResult<R>) -> AppResult<R> {
        let _guard = self.write_guard.lock().unwrap_or_else(|p| p.into_inner());
        self.json.update(&self.path, |config: &mut SSHSyncConfig| {
            let output = f(config)?;
            self.validate(config)?;
            Ok(output)
        })
    }

    /// 整体保存；返回 `enabled` 是否由 false 变为 true
    ///
    /// 上次同步记录由引擎维护，这里沿用已保存的值。
    pub fn save(&self, mut config: SSHSyncConfig) -> AppResult<bool> {
        let enabled_now = self.mutate(|current| {
            let was_enabled = current.enabled;
            config.last_sync_time = current.last_sync_time;
            config.last_sync_status = current.last_sync_status;
            config.last_sync_error = current.last_sync_error.take();
            *current = config;
            Ok(!was_enabled && current.enabled)
        })?;

        tracing::info!(enabled_now, "已保存 SSH 同步配置");
        Ok(enabled_now)
    }

    fn validate(&self, config: &SSHSyncConfig) -> AppResult<()> {
        let mut ids = HashSet::new();
        for connection in &config.connections {
            validate_connection(connection)?;
            if !ids.insert(connection.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "连接 id 重复: {}",
                    connection.id
                )));
            }
        }
        if let Some(active) = &config.active_connection_id {
            if !ids.contains(active.as_str()) {
                return Err(AppError::Validation(format!("当前连接不存在: {active}")));
            }
        }
        self.resolver.validate(&config.file_mappings)
    }

    /// 记录一次完成的同步
    pub fn record_last_sync(&self, result: &SyncResult) -> AppResult<()> {
        let _guard = self.write_guard.lock().unwrap_or_else(|p| p.into_inner());
        self.json.update(&self.path, |config: &mut SSHSyncConfig| {
            config.last_sync_time = Some(result.finished_at);
            if result.status == RunStatus::Success {
                config.last_sync_status = LastSyncStatus::Success;
                config.last_sync_error = None;
            } else {
                config.last_sync_status = LastSyncStatus::Error;
                config.last_sync_error = Some(summarize_errors(result));
            }
            Ok::<_, AppError>(())
        })
    }

    // ==================== 连接预设 ====================

    /// 新增或更新连接（id 为空时生成）
    pub fn upsert_connection(&self, mut connection: SSHConnection) -> AppResult<SSHConnection> {
        if connection.id.trim().is_empty() {
            connection.id = uuid::Uuid::new_v4().to_string();
        }
        let saved = connection.clone();
        self.mutate(|config| {
            match config.connections.iter_mut().find(|c| c.id == connection.id) {
                Some(existing) => *existing = connection,
                None => {
                    if connection.sort_order == 0 {
                        connection.sort_order = config
                            .connections
                            .iter()
                            .map(|c| c.sort_order)
                            .max()
                            .map_or(0, |max| max + 1);
                    }
                    config.connections.push(connection);
                }
            }
            Ok(())
        })?;
        tracing::info!(id = %saved.id, host = %saved.host, "已保存 SSH 连接");
        Ok(saved)
    }

    /// 删除连接；若为当前连接则同时清除选择
    pub fn delete_connection(&self, id: &str) -> AppResult<()> {
        self.mutate(|config| {
            let before = config.connections.len();
            config.connections.retain(|c| c.id != id);
            if config.connections.len() == before {
                return Err(AppError::NotFound(format!("SSH 连接不存在: {id}")));
            }
            if config.active_connection_id.as_deref() == Some(id) {
                config.active_connection_id = None;
            }
            Ok(())
        })
    }

    pub fn set_active_connection(&self, id: Option<String>) -> AppResult<()> {
        self.mutate(|config| {
            config.active_connection_id = id;
            Ok(())
        })
    }

    // ==================== 文件映射 ====================

    pub fn upsert_mapping(&self, mapping: FileMapping) -> AppResult<()> {
        let id = mapping.id.clone();
        self.mutate(|config| {
            match config.file_mappings.iter_mut().find(|m| m.id == mapping.id) {
                Some(existing) => *existing = mapping,
                None => config.file_mappings.push(mapping),
            }
            Ok(())
        })?;
        tracing::debug!(id = %id, "已保存文件映射");
        Ok(())
    }

    pub fn delete_mapping(&self, id: &str) -> AppResult<()> {
        self.mutate(|config| {
            let before = config.file_mappings.len();
            config.file_mappings.retain(|m| m.id != id);
            if config.file_mappings.len() == before {
                return Err(AppError::NotFound(format!("文件映射不存在: {id}")));
            }
            Ok(())
        })
    }

    /// 恢复默认映射
    pub fn reset_file_mappings(&self) -> AppResult<Vec<FileMapping>> {
        let mappings = default_file_mappings();
        let saved = mappings.clone();
        self.mutate(|config| {
            config.file_mappings = mappings;
            Ok(())
        })?;
        tracing::info!(count = saved.len(), "已恢复默认文件映射");
        Ok(saved)
    }
}

fn validate_connection(connection: &SSHConnection) -> AppResult<()> {
    let label = if connection.name.is_empty() {
        connection.id.as_str()
    } else {
        connection.name.as_str()
    };
    if connection.id.trim().is_empty() {
        return Err(AppError::Validation("连接 id 不能为空".to_string()));
    }
    if connection.host.trim().is_empty() {
        return Err(AppError::Validation(format!("连接 {label} 缺少主机地址")));
    }
    if connection.username.trim().is_empty() {
        return Err(AppError::Validation(format!("连接 {label} 缺少用户名")));
    }
    if connection.port == 0 {
        return Err(AppError::Validation(format!("连接 {label} 的端口无效")));
    }
    if connection.auth_method == AuthMethod::Password
        && connection.password.as_deref().map_or(true, str::is_empty)
    {
        return Err(AppError::Validation(format!(
            "连接 {label} 使用密码认证但未填写密码"
        )));
    }
    Ok(())
}

fn summarize_errors(result: &SyncResult) -> String {
    if let Some(error) = &result.error {
        return error.clone();
    }
    let failures: Vec<String> = result
        .mappings
        .iter()
        .filter_map(|m| match &m.outcome {
            crate::models::MappingOutcome::Failed { reason } => {
                Some(format!("{}: {reason}", m.mapping_id))
            }
            _ => None,
        })
        .collect();
    failures.join("; ")
}
