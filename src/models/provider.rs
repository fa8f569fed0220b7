//! Provider 记录与存储文档

use super::settings::ToolSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 当前存储文档版本
pub const PROVIDER_STORE_VERSION: u32 = 1;

/// Provider 分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCategory {
    Official,
    ThirdParty,
    #[default]
    Custom,
}

/// 单条 Provider/Profile 记录（持久化形态）
///
/// `settings_config` 保存序列化后的设置文本，只在 Apply 时解码。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: ProviderCategory,
    pub settings_config: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_color: Option<String>,
    pub sort_index: i64,
    #[serde(default)]
    pub is_applied: bool,
    #[serde(default)]
    pub is_disabled: bool,
    /// 界面当前选中项（不影响原生配置）
    #[serde(default)]
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 创建 Provider 的输入
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDraft {
    /// 指定 id（导入场景）；为空时自动生成
    pub id: Option<String>,
    pub name: String,
    pub category: ProviderCategory,
    pub settings: ToolSettings,
    pub source_provider_id: Option<String>,
    pub website_url: Option<String>,
    pub notes: Option<String>,
    pub icon: Option<String>,
    pub icon_color: Option<String>,
}

impl ProviderDraft {
    pub fn new(name: impl Into<String>, settings: ToolSettings) -> Self {
        Self {
            id: None,
            name: name.into(),
            category: ProviderCategory::default(),
            settings,
            source_provider_id: None,
            website_url: None,
            notes: None,
            icon: None,
            icon_color: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// 更新 Provider 的输入（`None` 表示保持不变）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderPatch {
    pub name: Option<String>,
    pub category: Option<ProviderCategory>,
    pub settings: Option<ToolSettings>,
    pub website_url: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub icon: Option<Option<String>>,
    pub icon_color: Option<Option<String>>,
}

/// 单个工具的存储文档（`<data_dir>/providers/<tool>.json`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStoreFile {
    pub version: u32,
    #[serde(default)]
    pub providers: Vec<ProviderRecord>,
    /// 通用配置（序列化文本，每次 Apply 都会合并）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_config: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ProviderStoreFile {
    fn default() -> Self {
        Self {
            version: PROVIDER_STORE_VERSION,
            providers: Vec::new(),
            common_config: None,
            updated_at: Utc::now(),
        }
    }
}
