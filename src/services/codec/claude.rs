//! Claude Code `settings.json`

use super::{
    expect_object, expect_optional_string, expect_string_values, from_object, merge_values,
    parse_object, to_json_bytes,
};
use crate::core::error::{AppError, AppResult};
use crate::models::ClaudeSettings;
use serde_json::{Map, Value};

const MODEL_ENV_KEYS: [(&str, &str); 4] = [
    ("model", "ANTHROPIC_MODEL"),
    ("haikuModel", "ANTHROPIC_DEFAULT_HAIKU_MODEL"),
    ("sonnetModel", "ANTHROPIC_DEFAULT_SONNET_MODEL"),
    ("opusModel", "ANTHROPIC_DEFAULT_OPUS_MODEL"),
];

pub fn decode(blob: &str) -> AppResult<ClaudeSettings> {
    let map = parse_object(blob)?;
    if let Some(env) = map.get("env") {
        expect_string_values(expect_object(env, "env")?, "env")?;
    }
    for (key, _) in MODEL_ENV_KEYS {
        expect_optional_string(&map, key, "$")?;
    }
    from_object(map)
}

/// 通用配置：任意 JSON 对象，`env` 若存在必须为字符串表
pub fn decode_common(blob: &str) -> AppResult<Map<String, Value>> {
    let map = parse_object(blob)?;
    if let Some(env) = map.get("env") {
        expect_string_values(expect_object(env, "env")?, "env")?;
    }
    Ok(map)
}

pub fn render(settings: &ClaudeSettings, common: Option<&str>) -> AppResult<Vec<u8>> {
    let mut merged = Value::Object(match common {
        Some(blob) => decode_common(blob)?,
        None => Map::new(),
    });

    let provider = serde_json::to_value(settings)
        .map_err(|e| AppError::codec("$", e.to_string()))?;
    let Value::Object(mut provider) = provider else {
        return Err(AppError::codec("$", "设置应序列化为对象"));
    };

    // 模型字段不直接写入 settings.json，而是映射为 env
    let mut model_env = Map::new();
    for (field, env_key) in MODEL_ENV_KEYS {
        if let Some(Value::String(model)) = provider.remove(field) {
            if !model.is_empty() {
                model_env.insert(env_key.to_string(), Value::String(model));
            }
        }
    }

    merge_values(&mut merged, &Value::Object(provider));

    if !model_env.is_empty() {
        let Value::Object(root) = &mut merged else {
            return Err(AppError::codec("$", "根节点应为对象"));
        };
        let env = root
            .entry("env")
            .or_insert_with(|| Value::Object(Map::new()));
        let env = env
            .as_object_mut()
            .ok_or_else(|| AppError::codec("env", "应为对象"))?;
        env.extend(model_env);
    }

    to_json_bytes(&merged)
}
