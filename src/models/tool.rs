use crate::core::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 受管理的工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ToolId {
    #[serde(rename = "claude-code")]
    ClaudeCode,
    #[serde(rename = "codex")]
    Codex,
    #[serde(rename = "opencode")]
    OpenCode,
    /// 插件式工具（按 agent 槽位配置）
    #[serde(rename = "oh-my-opencode")]
    OhMyOpenCode,
}

impl ToolId {
    pub const ALL: [ToolId; 4] = [
        ToolId::ClaudeCode,
        ToolId::Codex,
        ToolId::OpenCode,
        ToolId::OhMyOpenCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::ClaudeCode => "claude-code",
            ToolId::Codex => "codex",
            ToolId::OpenCode => "opencode",
            ToolId::OhMyOpenCode => "oh-my-opencode",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ToolId::ClaudeCode => "Claude Code",
            ToolId::Codex => "Codex",
            ToolId::OpenCode => "OpenCode",
            ToolId::OhMyOpenCode => "Oh My OpenCode",
        }
    }

    /// 远程同步时所属的模块
    pub fn module(&self) -> SyncModule {
        match self {
            ToolId::ClaudeCode => SyncModule::Claude,
            ToolId::Codex => SyncModule::Codex,
            ToolId::OpenCode | ToolId::OhMyOpenCode => SyncModule::OpenCode,
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        ToolId::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("不支持的工具 ID: {s}")))
    }
}

/// 同步映射所属模块（用于按模块过滤同步）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncModule {
    Claude,
    Codex,
    OpenCode,
}

impl SyncModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncModule::Claude => "claude",
            SyncModule::Codex => "codex",
            SyncModule::OpenCode => "opencode",
        }
    }
}

impl FromStr for SyncModule {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "claude" => Ok(SyncModule::Claude),
            "codex" => Ok(SyncModule::Codex),
            "opencode" => Ok(SyncModule::OpenCode),
            other => Err(AppError::Validation(format!("未知的同步模块: {other}"))),
        }
    }
}

/// 工具定义（原生配置位置）
#[derive(Debug, Clone)]
pub struct Tool {
    pub id: ToolId,
    pub config_dir: PathBuf,
    /// 主配置文件名（OpenCode 系列为不带扩展名的基础名）
    pub config_file: &'static str,
}

impl Tool {
    /// 基于指定主目录构造工具定义
    pub fn new(id: ToolId, home: &Path) -> Self {
        match id {
            ToolId::ClaudeCode => Tool {
                id,
                config_dir: home.join(".claude"),
                config_file: "settings.json",
            },
            ToolId::Codex => Tool {
                id,
                config_dir: home.join(".codex"),
                config_file: "config.toml",
            },
            ToolId::OpenCode => Tool {
                id,
                config_dir: home.join(".config").join("opencode"),
                config_file: "opencode",
            },
            ToolId::OhMyOpenCode => Tool {
                id,
                config_dir: home.join(".config").join("opencode"),
                config_file: "oh-my-opencode",
            },
        }
    }

    pub fn all(home: &Path) -> Vec<Tool> {
        ToolId::ALL.iter().map(|id| Tool::new(*id, home)).collect()
    }

    /// 主配置文件路径
    ///
    /// OpenCode 系列优先使用已存在的 `.jsonc`，否则使用 `.json`。
    pub fn primary_config(&self) -> PathBuf {
        match self.id {
            ToolId::OpenCode | ToolId::OhMyOpenCode => {
                let jsonc = self.config_dir.join(format!("{}.jsonc", self.config_file));
                if jsonc.exists() {
                    jsonc
                } else {
                    self.config_dir.join(format!("{}.json", self.config_file))
                }
            }
            _ => self.config_dir.join(self.config_file),
        }
    }

    /// Apply 写入的全部原生文件（主配置在前）
    pub fn native_files(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.primary_config()];
        if self.id == ToolId::Codex {
            paths.push(self.config_dir.join("auth.json"));
        }
        paths
    }
}
