//! 内存远程传输（仅测试使用）
//!
//! 支持注入连接失败与连接延迟、会话中途断开、按路径拒绝写入以及延迟写入。

use super::transport::{RemoteSession, RemoteStat, RemoteTransport, TransportError};
use crate::models::SSHConnection;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RemoteState {
    files: HashMap<String, (Vec<u8>, i64)>,
    denied: HashSet<String>,
    connect_error: Option<String>,
    connect_delay: Option<Duration>,
    /// 执行该数量的文件操作后会话断开
    drop_after_ops: Option<usize>,
    ops: usize,
    connects: usize,
    closes: usize,
    write_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RemoteState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    pub fn put_file(&self, path: &str, content: &[u8], mtime: i64) {
        self.with_state(|s| {
            s.files.insert(path.to_string(), (content.to_vec(), mtime));
        });
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.with_state(|s| s.files.get(path).map(|(c, _)| c.clone()))
    }

    pub fn deny(&self, path: &str) {
        self.with_state(|s| {
            s.denied.insert(path.to_string());
        });
    }

    pub fn fail_connect(&self, message: &str) {
        self.with_state(|s| s.connect_error = Some(message.to_string()));
    }

    pub fn delay_connect(&self, delay: Duration) {
        self.with_state(|s| s.connect_delay = Some(delay));
    }

    pub fn drop_after_ops(&self, ops: usize) {
        self.with_state(|s| s.drop_after_ops = Some(ops));
    }

    pub fn delay_writes(&self, delay: Duration) {
        self.with_state(|s| s.write_delay = Some(delay));
    }

    pub fn connect_count(&self) -> usize {
        self.with_state(|s| s.connects)
    }

    pub fn close_count(&self) -> usize {
        self.with_state(|s| s.closes)
    }
}

#[async_trait]
impl RemoteTransport for MemoryTransport {
    async fn connect(
        &self,
        _connection: &SSHConnection,
    ) -> Result<Box<dyn RemoteSession>, TransportError> {
        let delay = self.with_state(|s| s.connect_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|s| {
            if let Some(message) = &s.connect_error {
                return Err(TransportError::Connection(message.clone()));
            }
            s.connects += 1;
            s.ops = 0;
            Ok(())
        })?;
        Ok(Box::new(MemorySession {
            transport: self.clone(),
        }))
    }
}

struct MemorySession {
    transport: MemoryTransport,
}

impl MemorySession {
    /// 计数一次操作；超过断开阈值后返回连接错误
    fn begin_op(state: &mut RemoteState) -> Result<(), TransportError> {
        if let Some(limit) = state.drop_after_ops {
            if state.ops >= limit {
                return Err(TransportError::Connection("connection reset by peer".into()));
            }
        }
        state.ops += 1;
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn stat(&mut self, path: &str) -> Result<Option<RemoteStat>, TransportError> {
        self.transport.with_state(|s| {
            Self::begin_op(s)?;
            Ok(s.files.get(path).map(|(content, mtime)| RemoteStat {
                size: content.len() as u64,
                mtime: *mtime,
            }))
        })
    }

    async fn read_file(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.transport.with_state(|s| {
            Self::begin_op(s)?;
            if s.denied.contains(path) {
                return Err(TransportError::PermissionDenied(path.to_string()));
            }
            s.files
                .get(path)
                .map(|(content, _)| content.clone())
                .ok_or_else(|| TransportError::NotFound(path.to_string()))
        })
    }

    async fn write_file(&mut self, path: &str, content: &[u8]) -> Result<(), TransportError> {
        let delay = self.transport.with_state(|s| s.write_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.transport.with_state(|s| {
            Self::begin_op(s)?;
            if s.denied.contains(path) {
                return Err(TransportError::PermissionDenied(path.to_string()));
            }
            s.files
                .insert(path.to_string(), (content.to_vec(), chrono::Utc::now().timestamp()));
            Ok(())
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.transport.with_state(|s| s.closes += 1);
        Ok(())
    }
}
