//! 各工具的结构化设置
//!
//! 已知字段类型化，未知字段通过 `extra` 原样透传，不丢弃任何用户配置。

use super::tool::ToolId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ==================== Claude Code ====================

/// Claude Code `settings.json` 片段
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaudeSettings {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// 渲染为 `ANTHROPIC_MODEL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// 渲染为 `ANTHROPIC_DEFAULT_HAIKU_MODEL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub haiku_model: Option<String>,
    /// 渲染为 `ANTHROPIC_DEFAULT_SONNET_MODEL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sonnet_model: Option<String>,
    /// 渲染为 `ANTHROPIC_DEFAULT_OPUS_MODEL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opus_model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ==================== Codex ====================

/// Codex 设置：`auth.json` 内容 + `config.toml` 文本
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodexSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ==================== OpenCode ====================

/// OpenCode `provider.<id>` 条目
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenCodeProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub options: OpenCodeOptions,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub models: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenCodeOptions {
    #[serde(rename = "baseURL", default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_cache_key: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ==================== Oh My OpenCode ====================

/// 内置 agent 槽位（配置中也可出现其它自定义槽位）
pub const BUILTIN_AGENT_SLOTS: [&str; 7] = [
    "Sisyphus",
    "oracle",
    "librarian",
    "explore",
    "frontend-ui-ux-engineer",
    "document-writer",
    "multimodal-looker",
];

/// 插件式工具的 agent 配置档
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentsProfile {
    #[serde(default)]
    pub agents: BTreeMap<String, Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentsProfile {
    /// 不在内置列表中的槽位
    pub fn custom_slots(&self) -> Vec<&str> {
        self.agents
            .keys()
            .map(String::as_str)
            .filter(|slot| !BUILTIN_AGENT_SLOTS.contains(slot))
            .collect()
    }
}

// ==================== 统一类型 ====================

/// 按工具区分的设置值（存储边界使用的类型化形态）
#[derive(Debug, Clone, PartialEq)]
pub enum ToolSettings {
    Claude(ClaudeSettings),
    Codex(CodexSettings),
    OpenCode(OpenCodeProvider),
    Agents(AgentsProfile),
}

impl ToolSettings {
    pub fn tool(&self) -> ToolId {
        match self {
            ToolSettings::Claude(_) => ToolId::ClaudeCode,
            ToolSettings::Codex(_) => ToolId::Codex,
            ToolSettings::OpenCode(_) => ToolId::OpenCode,
            ToolSettings::Agents(_) => ToolId::OhMyOpenCode,
        }
    }
}
