//! 同步运行结果、进度与状态

use super::tool::SyncModule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    /// 本地文件不存在（双向映射两端都不存在时同样使用）
    LocalMissing,
    RemoteMissing,
    ModuleFiltered,
}

/// 失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    Cancelled,
    Connection(String),
    PermissionDenied(String),
    Io(String),
    /// 写入后校验大小不一致
    Verification(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Cancelled => write!(f, "已取消"),
            FailureReason::Connection(msg) => write!(f, "连接中断: {msg}"),
            FailureReason::PermissionDenied(msg) => write!(f, "权限不足: {msg}"),
            FailureReason::Io(msg) => write!(f, "读写失败: {msg}"),
            FailureReason::Verification(msg) => write!(f, "校验失败: {msg}"),
        }
    }
}

/// 实际执行的传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Push,
    Pull,
}

/// 单个映射的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MappingOutcome {
    Succeeded {
        direction: TransferDirection,
        bytes: u64,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        reason: FailureReason,
    },
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingResult {
    pub mapping_id: String,
    #[serde(flatten)]
    pub outcome: MappingOutcome,
}

/// 一次运行的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Error,
}

/// 非致命警告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWarning {
    pub mapping_id: String,
    pub message: String,
}

/// 一次同步运行的结果（返回后不再修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_filter: Option<SyncModule>,
    pub mappings: Vec<MappingResult>,
    #[serde(default)]
    pub warnings: Vec<SyncWarning>,
    /// 会话级错误（连接失败、取消）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn outcome(&self, mapping_id: &str) -> Option<&MappingOutcome> {
        self.mappings
            .iter()
            .find(|m| m.mapping_id == mapping_id)
            .map(|m| &m.outcome)
    }

    fn count(&self, pred: impl Fn(&MappingOutcome) -> bool) -> usize {
        self.mappings.iter().filter(|m| pred(&m.outcome)).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(|o| matches!(o, MappingOutcome::Succeeded { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, MappingOutcome::Skipped { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, MappingOutcome::Failed { .. }))
    }

    pub fn not_attempted_count(&self) -> usize {
        self.count(|o| matches!(o, MappingOutcome::NotAttempted))
    }
}

/// 面向简单消费方的持久状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Success,
    Error,
}

impl From<RunStatus> for SyncStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Success => SyncStatus::Success,
            RunStatus::PartialFailure | RunStatus::Error => SyncStatus::Error,
        }
    }
}

/// 运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Connecting,
    Listing,
    Transferring,
    Verifying,
}

/// 运行中的进度（不持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_mapping_id: Option<String>,
    pub bytes_transferred: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    pub phase: SyncPhase,
}

/// `getStatus` 返回值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusSnapshot {
    pub status: SyncStatus,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<SyncResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<SyncProgress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_collapses_to_error() {
        assert_eq!(SyncStatus::from(RunStatus::Success), SyncStatus::Success);
        assert_eq!(SyncStatus::from(RunStatus::PartialFailure), SyncStatus::Error);
        assert_eq!(SyncStatus::from(RunStatus::Error), SyncStatus::Error);
    }

    #[test]
    fn mapping_result_serializes_flat() {
        let result = MappingResult {
            mapping_id: "codex-auth".into(),
            outcome: MappingOutcome::Skipped {
                reason: SkipReason::LocalMissing,
            },
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "mappingId": "codex-auth",
                "outcome": "skipped",
                "reason": "local_missing"
            })
        );
    }
}
