//! 远程传输抽象
//!
//! 同步引擎只依赖 `RemoteTransport` / `RemoteSession` 两个 trait，
//! 生产环境使用系统 OpenSSH 客户端实现，测试使用内存实现。

use crate::core::error::AppError;
use crate::models::{FailureReason, SSHConnection};
use async_trait::async_trait;
use thiserror::Error;

/// 远程文件元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub size: u64,
    /// 修改时间（Unix 秒）
    pub mtime: i64,
}

/// 远程操作错误
///
/// `Connection` 表示会话本身已不可用，其余变体只影响当前文件。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("连接失败: {0}")]
    Connection(String),

    #[error("远程文件不存在: {0}")]
    NotFound(String),

    #[error("远程权限不足: {0}")]
    PermissionDenied(String),

    #[error("远程操作失败: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_connection(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }

    /// 文件级失败原因
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            TransportError::Connection(msg) => FailureReason::Connection(msg.clone()),
            TransportError::PermissionDenied(msg) => FailureReason::PermissionDenied(msg.clone()),
            TransportError::NotFound(msg) | TransportError::Other(msg) => {
                FailureReason::Io(msg.clone())
            }
        }
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::Connection(err.to_string())
    }
}

/// 一次已建立的远程会话（整个同步运行复用）
#[async_trait]
pub trait RemoteSession: Send {
    /// 文件不存在时返回 `Ok(None)`
    async fn stat(&mut self, path: &str) -> Result<Option<RemoteStat>, TransportError>;

    async fn read_file(&mut self, path: &str) -> Result<Vec<u8>, TransportError>;

    /// 写入文件，自动创建父目录
    async fn write_file(&mut self, path: &str, content: &[u8]) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn connect(
        &self,
        connection: &SSHConnection,
    ) -> Result<Box<dyn RemoteSession>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_are_session_level() {
        assert!(TransportError::Connection("reset".into()).is_connection());
        assert!(!TransportError::PermissionDenied("/etc".into()).is_connection());
        assert_eq!(
            TransportError::PermissionDenied("/etc/x".into()).failure_reason(),
            FailureReason::PermissionDenied("/etc/x".into())
        );
        assert_eq!(
            TransportError::Other("disk full".into()).failure_reason(),
            FailureReason::Io("disk full".into())
        );
    }
}
