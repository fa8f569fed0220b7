//! 原生配置文件外部变更检测
//!
//! Apply 与同步拉取写入原生文件后，把内容校验和登记到 `ChecksumLedger`；
//! watcher 收到文件事件时重新计算校验和，与登记值不同才视为外部修改，
//! 并以 `ChangeOrigin::External` 发布 `ConfigChanged`。

use crate::core::error::{AppError, AppResult};
use crate::models::{Tool, ToolId};
use crate::services::events::{AppEvent, ChangeOrigin, EventBus};
use crate::services::file_locks::PathLocks;
use crate::utils::{content_checksum, file_checksum};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// 已知的原生文件校验和（`None` 表示文件不存在）
#[derive(Clone, Default)]
pub struct ChecksumLedger {
    inner: Arc<Mutex<HashMap<PathBuf, Option<String>>>>,
}

impl ChecksumLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记应用自身写入的内容
    pub fn record(&self, path: &Path, content: &[u8]) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(path.to_path_buf(), Some(content_checksum(content)));
    }

    /// 用磁盘上的当前校验和更新登记值，返回是否与之前不同
    ///
    /// 首次观察某个路径只建立基线，不算变更。
    pub fn observe(&self, path: &Path, checksum: Option<String>) -> bool {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match map.insert(path.to_path_buf(), checksum.clone()) {
            Some(previous) => previous != checksum,
            None => false,
        }
    }

    pub fn checksum(&self, path: &Path) -> Option<String> {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.get(path).cloned().flatten()
    }
}

/// 一次外部变更
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalChange {
    pub tool: ToolId,
    pub path: PathBuf,
}

/// 需要关注的原生文件（OpenCode 系列同时关注 `.json` 与 `.jsonc`）
pub fn watched_files(tools: &[Tool]) -> Vec<(ToolId, PathBuf)> {
    let mut files = Vec::new();
    for tool in tools {
        match tool.id {
            ToolId::OpenCode | ToolId::OhMyOpenCode => {
                for ext in ["jsonc", "json"] {
                    files.push((
                        tool.id,
                        tool.config_dir.join(format!("{}.{ext}", tool.config_file)),
                    ));
                }
            }
            _ => {
                for path in tool.native_files() {
                    files.push((tool.id, path));
                }
            }
        }
    }
    files
}

/// 检查单个文件；持有该路径的写锁再读取，避免读到 Apply 写入中途的状态
fn check_file(
    tool: ToolId,
    path: &Path,
    ledger: &ChecksumLedger,
    locks: &PathLocks,
) -> Option<ExternalChange> {
    let _guard = locks.acquire([path.to_path_buf()]);
    let checksum = match file_checksum(path) {
        Ok(checksum) => checksum,
        Err(e) => {
            warn!(path = ?path, error = %e, "读取配置文件校验和失败");
            return None;
        }
    };
    ledger.observe(path, checksum).then(|| ExternalChange {
        tool,
        path: path.to_path_buf(),
    })
}

/// 轮询方式检查所有原生文件（首次调用只建立基线）
pub fn scan_external_changes(
    tools: &[Tool],
    ledger: &ChecksumLedger,
    locks: &PathLocks,
) -> Vec<ExternalChange> {
    watched_files(tools)
        .into_iter()
        .filter_map(|(tool, path)| check_file(tool, &path, ledger, locks))
        .collect()
}

/// 基于 notify 的实时 watcher（监听配置目录，目录不存在时跳过）
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    watched_dirs: usize,
}

impl ConfigWatcher {
    pub fn start(
        tools: Vec<Tool>,
        ledger: ChecksumLedger,
        locks: PathLocks,
        events: EventBus,
    ) -> AppResult<Self> {
        // 建立基线
        scan_external_changes(&tools, &ledger, &locks);

        let files: HashMap<PathBuf, ToolId> = watched_files(&tools)
            .into_iter()
            .map(|(tool, path)| (path, tool))
            .collect();
        let dirs: HashSet<PathBuf> = tools.iter().map(|t| t.config_dir.clone()).collect();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "配置文件监听出错");
                        return;
                    }
                };
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                for path in &event.paths {
                    let Some(tool) = files.get(path) else {
                        continue;
                    };
                    if let Some(change) = check_file(*tool, path, &ledger, &locks) {
                        debug!(tool = %change.tool, path = ?change.path, "检测到配置文件外部改动");
                        events.publish(AppEvent::ConfigChanged {
                            tool: change.tool,
                            origin: ChangeOrigin::External,
                            provider_id: None,
                            path: Some(change.path),
                        });
                    }
                }
            },
            NotifyConfig::default(),
        )
        .map_err(notify_error)?;

        let mut watched_dirs = 0;
        for dir in dirs {
            if !dir.is_dir() {
                debug!(dir = ?dir, "配置目录不存在，跳过监听");
                continue;
            }
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(notify_error)?;
            watched_dirs += 1;
        }

        debug!(count = watched_dirs, "配置文件 watcher 启动完成");
        Ok(Self {
            _watcher: watcher,
            watched_dirs,
        })
    }

    pub fn watched_dirs(&self) -> usize {
        self.watched_dirs
    }
}

fn notify_error(err: notify::Error) -> AppError {
    let path = err.paths.first().cloned().unwrap_or_default();
    AppError::io(path, std::io::Error::other(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn ledger_distinguishes_self_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let ledger = ChecksumLedger::new();

        assert!(!ledger.observe(&path, None));
        ledger.record(&path, b"{}");
        assert!(!ledger.observe(&path, Some(content_checksum(b"{}"))));
        assert!(ledger.observe(&path, Some(content_checksum(b"{\"x\":1}"))));
    }

    #[test]
    fn scan_reports_only_external_edits() {
        let home = TempDir::new().unwrap();
        let tools = vec![Tool::new(ToolId::ClaudeCode, home.path())];
        let settings = tools[0].primary_config();
        fs::create_dir_all(settings.parent().unwrap()).unwrap();
        fs::write(&settings, "{}").unwrap();

        let ledger = ChecksumLedger::new();
        let locks = PathLocks::new();
        assert!(scan_external_changes(&tools, &ledger, &locks).is_empty());

        // 应用自身写入：先登记再落盘
        ledger.record(&settings, b"{\"env\":{}}");
        fs::write(&settings, "{\"env\":{}}").unwrap();
        assert!(scan_external_changes(&tools, &ledger, &locks).is_empty());

        fs::write(&settings, "{\"model\":\"opus\"}").unwrap();
        let changes = scan_external_changes(&tools, &ledger, &locks);
        assert_eq!(
            changes,
            vec![ExternalChange {
                tool: ToolId::ClaudeCode,
                path: settings.clone()
            }]
        );
        assert!(scan_external_changes(&tools, &ledger, &locks).is_empty());
    }

    #[test]
    fn opencode_watches_both_extensions() {
        let home = TempDir::new().unwrap();
        let files = watched_files(&[Tool::new(ToolId::OpenCode, home.path())]);
        let names: Vec<String> = files
            .iter()
            .map(|(_, p)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["opencode.jsonc", "opencode.json"]);
    }
}
