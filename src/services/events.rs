//! 应用事件总线
//!
//! 单一生产方（各服务）通过 `EventBus::publish` 发送类型化事件，
//! 任意数量的订阅者各自持有 `broadcast::Receiver`。
//! `shutdown` 之后所有订阅者收到 `RecvError::Closed`。

use crate::models::{SyncProgress, SyncResult, SyncWarning, ToolId};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// 配置变更来源
///
/// 订阅方据此区分自己触发的变更与后台/外部变更，具体刷新策略由订阅方决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    /// 应用内命令
    App,
    /// 托盘菜单
    Tray,
    /// 外部程序修改了原生配置文件
    External,
    /// 远程同步拉取覆盖了原生配置文件
    Sync,
}

/// 应用事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AppEvent {
    ConfigChanged {
        tool: ToolId,
        origin: ChangeOrigin,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    SyncProgress(SyncProgress),
    SyncWarning(SyncWarning),
    SyncCompleted(SyncResult),
}

/// 类型化广播通道
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<RwLock<Option<broadcast::Sender<AppEvent>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sender: Arc::new(RwLock::new(Some(sender))),
        }
    }

    /// 订阅事件；总线已关闭时返回一个立即结束的接收端
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        let guard = self.sender.read().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (closed, receiver) = broadcast::channel(1);
                drop(closed);
                receiver
            }
        }
    }

    /// 发布事件（无订阅者时静默丢弃）
    pub fn publish(&self, event: AppEvent) {
        let guard = self.sender.read().unwrap_or_else(|p| p.into_inner());
        if let Some(sender) = guard.as_ref() {
            if sender.send(event).is_err() {
                tracing::trace!("事件无订阅者，已丢弃");
            }
        }
    }

    pub fn config_changed(&self, tool: ToolId, origin: ChangeOrigin, provider_id: Option<String>) {
        self.publish(AppEvent::ConfigChanged {
            tool,
            origin,
            provider_id,
            path: None,
        });
    }

    /// 关闭总线，订阅者在读完缓冲后收到 Closed
    pub fn shutdown(&self) {
        let mut guard = self.sender.write().unwrap_or_else(|p| p.into_inner());
        if guard.take().is_some() {
            tracing::debug!("事件总线已关闭");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.config_changed(ToolId::Codex, ChangeOrigin::App, Some("a".into()));
        bus.config_changed(ToolId::Codex, ChangeOrigin::External, None);

        match rx.recv().await.unwrap() {
            AppEvent::ConfigChanged { origin, .. } => assert_eq!(origin, ChangeOrigin::App),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            AppEvent::ConfigChanged { origin, .. } => assert_eq!(origin, ChangeOrigin::External),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_closes_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.shutdown();

        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
        let mut late = bus.subscribe();
        assert!(matches!(late.recv().await, Err(RecvError::Closed)));
        // 关闭后发布不会 panic
        bus.config_changed(ToolId::ClaudeCode, ChangeOrigin::Tray, None);
    }

    #[test]
    fn config_changed_serializes_with_origin() {
        let event = AppEvent::ConfigChanged {
            tool: ToolId::ClaudeCode,
            origin: ChangeOrigin::Tray,
            provider_id: None,
            path: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "config-changed", "tool": "claude-code", "origin": "tray"})
        );
    }
}
