//! SSH 远程同步配置模型

use super::tool::SyncModule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SSH 认证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    Key,
    Password,
}

/// SSH 连接预设
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SSHConnection {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub auth_method: AuthMethod,
    /// 密码认证时使用（明文保存，不做加密）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// 密钥认证时的私钥路径；为空时使用 ssh-agent / 默认密钥
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
}

fn default_port() -> u16 {
    22
}

impl SSHConnection {
    /// `user@host` 形式的目标
    pub fn target(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

/// 同步方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// 本地 → 远程
    #[default]
    Push,
    /// 远程 → 本地
    Pull,
    /// 按修改时间，新的一侧覆盖旧的一侧
    Bidirectional,
}

/// 文件映射
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMapping {
    pub id: String,
    pub name: String,
    pub module: SyncModule,
    pub local_path: String,
    pub remote_path: String,
    #[serde(default)]
    pub direction: SyncDirection,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// 上次同步的持久化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LastSyncStatus {
    #[default]
    Never,
    Success,
    Error,
}

/// SSH 同步配置（`<data_dir>/ssh_sync.json`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SSHSyncConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_connection_id: Option<String>,
    #[serde(default)]
    pub connections: Vec<SSHConnection>,
    /// 缺省时使用内置默认映射；显式的空列表保持为空
    #[serde(default = "crate::services::sync::resolver::default_file_mappings")]
    pub file_mappings: Vec<FileMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sync_status: LastSyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_error: Option<String>,
}

impl Default for SSHSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            active_connection_id: None,
            connections: Vec::new(),
            file_mappings: crate::services::sync::resolver::default_file_mappings(),
            last_sync_time: None,
            last_sync_status: LastSyncStatus::Never,
            last_sync_error: None,
        }
    }
}

impl SSHSyncConfig {
    pub fn active_connection(&self) -> Option<&SSHConnection> {
        let id = self.active_connection_id.as_deref()?;
        self.connections.iter().find(|c| c.id == id)
    }
}
