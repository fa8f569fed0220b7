//! 配置文本编解码
//!
//! 在持久化的设置文本与各工具的结构化设置之间转换，并负责把
//! Provider 设置与通用配置合并渲染为原生配置文件内容。
//!
//! 约定：
//! - 畸形输入一律返回 `AppError::Codec`，并尽量给出出错字段路径
//! - 合并时 Provider 字段优先，未知字段原样保留
//! - decode(encode(x)) 与 x 语义相等

pub mod agents;
pub mod claude;
pub mod codex;
pub mod jsonc;
pub mod open_code;

use crate::core::error::{AppError, AppResult};
use crate::models::{Tool, ToolId, ToolSettings};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// 渲染后待写入的原生文件
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// 解码存储的设置文本
pub fn decode_settings(tool: ToolId, blob: &str) -> AppResult<ToolSettings> {
    Ok(match tool {
        ToolId::ClaudeCode => ToolSettings::Claude(claude::decode(blob)?),
        ToolId::Codex => ToolSettings::Codex(codex::decode(blob)?),
        ToolId::OpenCode => ToolSettings::OpenCode(open_code::decode(blob)?),
        ToolId::OhMyOpenCode => ToolSettings::Agents(agents::decode(blob)?),
    })
}

/// 编码为存储文本
pub fn encode_settings(settings: &ToolSettings) -> AppResult<String> {
    match settings {
        ToolSettings::Claude(s) => to_json_text(s),
        ToolSettings::Codex(s) => to_json_text(s),
        ToolSettings::OpenCode(s) => to_json_text(s),
        ToolSettings::Agents(s) => to_json_text(s),
    }
}

/// 校验通用配置文本
pub fn validate_common(tool: ToolId, blob: &str) -> AppResult<()> {
    match tool {
        ToolId::ClaudeCode => claude::decode_common(blob).map(|_| ()),
        ToolId::Codex => codex::decode_common(blob).map(|_| ()),
        ToolId::OpenCode => open_code::decode_common(blob).map(|_| ()),
        ToolId::OhMyOpenCode => agents::decode_common(blob).map(|_| ()),
    }
}

/// 将 Provider 设置与通用配置合并，渲染为原生文件内容
///
/// `record_id` 用作 OpenCode `provider` 表中的键。
pub fn render(
    tool: &Tool,
    record_id: &str,
    settings: &ToolSettings,
    common: Option<&str>,
) -> AppResult<Vec<RenderedFile>> {
    if settings.tool() != tool.id {
        return Err(AppError::Validation(format!(
            "设置类型 {} 与工具 {} 不匹配",
            settings.tool(),
            tool.id
        )));
    }

    let paths = tool.native_files();
    let contents = match settings {
        ToolSettings::Claude(s) => vec![claude::render(s, common)?],
        ToolSettings::Codex(s) => {
            let (config, auth) = codex::render(s, common)?;
            vec![config, auth]
        }
        ToolSettings::OpenCode(s) => vec![open_code::render(record_id, s, common)?],
        ToolSettings::Agents(s) => vec![agents::render(s, common)?],
    };

    Ok(paths
        .into_iter()
        .zip(contents)
        .map(|(path, content)| RenderedFile { path, content })
        .collect())
}

// ==================== 公共辅助 ====================

/// 深度合并 JSON 值（source 优先）
pub fn merge_values(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target_obj), Value::Object(source_obj)) => {
            for (key, value) in source_obj {
                if let Some(target_value) = target_obj.get_mut(key) {
                    merge_values(target_value, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target, source) => {
            // 非对象类型，直接替换
            *target = source.clone();
        }
    }
}

pub(crate) fn to_json_text<T: Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::codec("$", e.to_string()))
}

pub(crate) fn to_json_bytes(value: &Value) -> AppResult<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|e| AppError::codec("$", e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// 解析根为对象的 JSON 文本
pub(crate) fn parse_object(blob: &str) -> AppResult<Map<String, Value>> {
    let value: Value = serde_json::from_str(blob).map_err(|e| {
        AppError::codec(
            "$",
            format!("JSON 格式错误（第 {} 行第 {} 列）: {e}", e.line(), e.column()),
        )
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(AppError::codec(
            "$",
            format!("根节点应为对象，实际为 {}", type_name(&other)),
        )),
    }
}

/// 解析 JSONC 文本（根为对象）
pub(crate) fn parse_object_jsonc(blob: &str) -> AppResult<Map<String, Value>> {
    parse_object(&jsonc::strip_jsonc_comments(blob))
}

pub(crate) fn expect_object<'a>(value: &'a Value, path: &str) -> AppResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        AppError::codec(path, format!("应为对象，实际为 {}", type_name(value)))
    })
}

pub(crate) fn expect_optional_string(
    map: &Map<String, Value>,
    key: &str,
    path: &str,
) -> AppResult<()> {
    match map.get(key) {
        None | Some(Value::String(_)) => Ok(()),
        Some(other) => Err(AppError::codec(
            join_path(path, key),
            format!("应为字符串，实际为 {}", type_name(other)),
        )),
    }
}

pub(crate) fn expect_string_values(map: &Map<String, Value>, path: &str) -> AppResult<()> {
    for (key, value) in map {
        if !value.is_string() {
            return Err(AppError::codec(
                join_path(path, key),
                format!("应为字符串，实际为 {}", type_name(value)),
            ));
        }
    }
    Ok(())
}

pub(crate) fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() || parent == "$" {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "布尔值",
        Value::Number(_) => "数字",
        Value::String(_) => "字符串",
        Value::Array(_) => "数组",
        Value::Object(_) => "对象",
    }
}

/// 已校验的对象转换为目标类型
pub(crate) fn from_object<T: serde::de::DeserializeOwned>(map: Map<String, Value>) -> AppResult<T> {
    serde_json::from_value(Value::Object(map)).map_err(|e| AppError::codec("$", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClaudeSettings, CodexSettings};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_merge_values() {
        let mut target = json!({"a": 1, "b": {"c": 2}});
        merge_values(&mut target, &json!({"b": {"d": 3}, "e": 4}));
        assert_eq!(target, json!({"a": 1, "b": {"c": 2, "d": 3}, "e": 4}));
    }

    #[test]
    fn merge_prefers_source_on_collision() {
        let mut target = json!({"env": {"KEY": "common", "KEEP": "x"}});
        merge_values(&mut target, &json!({"env": {"KEY": "provider"}}));
        assert_eq!(target, json!({"env": {"KEY": "provider", "KEEP": "x"}}));
    }

    #[test]
    fn parse_object_rejects_non_object_root() {
        let err = parse_object("[1, 2]").unwrap_err();
        assert!(matches!(err, AppError::Codec { ref path, .. } if path == "$"));
    }

    #[test]
    fn decode_dispatches_by_tool() {
        let settings = decode_settings(ToolId::ClaudeCode, r#"{"env": {}}"#).unwrap();
        assert_eq!(settings.tool(), ToolId::ClaudeCode);
        assert!(decode_settings(ToolId::Codex, "not json").is_err());
    }

    #[test]
    fn render_rejects_mismatched_settings() {
        let home = TempDir::new().unwrap();
        let tool = Tool::new(ToolId::Codex, home.path());
        let settings = ToolSettings::Claude(ClaudeSettings::default());
        assert!(matches!(
            render(&tool, "p1", &settings, None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn render_codex_targets_both_files() {
        let home = TempDir::new().unwrap();
        let tool = Tool::new(ToolId::Codex, home.path());
        let settings = ToolSettings::Codex(CodexSettings {
            auth: Some(json!({"OPENAI_API_KEY": "sk-1"}).as_object().unwrap().clone()),
            config: Some("model = \"gpt-5\"\n".into()),
            ..Default::default()
        });

        let files = render(&tool, "p1", &settings, None).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("config.toml"));
        assert!(files[1].path.ends_with("auth.json"));
    }
}
