//! OpenCode `opencode.json(c)` 中的 `provider.<id>` 条目

use super::{
    expect_object, expect_optional_string, expect_string_values, from_object, join_path,
    merge_values, parse_object, parse_object_jsonc, to_json_bytes, type_name,
};
use crate::core::error::{AppError, AppResult};
use crate::models::OpenCodeProvider;
use serde_json::{Map, Value};

pub fn decode(blob: &str) -> AppResult<OpenCodeProvider> {
    let map = parse_object(blob)?;
    expect_optional_string(&map, "npm", "$")?;
    expect_optional_string(&map, "name", "$")?;

    if let Some(options) = map.get("options") {
        let options = expect_object(options, "options")?;
        expect_optional_string(options, "baseURL", "options")?;
        expect_optional_string(options, "apiKey", "options")?;
        if let Some(headers) = options.get("headers") {
            expect_string_values(expect_object(headers, "options.headers")?, "options.headers")?;
        }
        match options.get("setCacheKey") {
            None | Some(Value::Bool(_)) => {}
            Some(other) => {
                return Err(AppError::codec(
                    "options.setCacheKey",
                    format!("应为布尔值，实际为 {}", type_name(other)),
                ))
            }
        }
    }

    if let Some(models) = map.get("models") {
        for (id, model) in expect_object(models, "models")? {
            expect_object(model, &join_path("models", id))?;
        }
    }

    from_object(map)
}

/// 通用配置：`opencode.json` 除 Provider 以外的部分（接受 JSONC）
pub fn decode_common(blob: &str) -> AppResult<Map<String, Value>> {
    let map = parse_object_jsonc(blob)?;
    if let Some(provider) = map.get("provider") {
        expect_object(provider, "provider")?;
    }
    Ok(map)
}

/// 渲染完整的 `opencode.json`
///
/// Provider 写入 `provider.<record_id>`，与通用配置中同名条目深度合并。
pub fn render(
    record_id: &str,
    settings: &OpenCodeProvider,
    common: Option<&str>,
) -> AppResult<Vec<u8>> {
    let mut root = match common {
        Some(blob) => decode_common(blob)?,
        None => Map::new(),
    };
    root.entry("$schema")
        .or_insert_with(|| Value::String("https://opencode.ai/config.json".to_string()));

    let providers = root
        .entry("provider")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| AppError::codec("provider", "应为对象"))?;

    let provider_value =
        serde_json::to_value(settings).map_err(|e| AppError::codec("$", e.to_string()))?;
    let entry = providers
        .entry(record_id.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    merge_values(entry, &provider_value);

    to_json_bytes(&Value::Object(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpenCodeOptions, ToolId, ToolSettings};
    use crate::services::codec;
    use serde_json::json;

    fn sample() -> OpenCodeProvider {
        let mut headers = std::collections::BTreeMap::new();
        headers.insert("X-Team".to_string(), "infra".to_string());
        OpenCodeProvider {
            npm: Some("@ai-sdk/openai-compatible".into()),
            name: Some("Relay".into()),
            options: OpenCodeOptions {
                base_url: Some("https://relay.example.com/v1".into()),
                api_key: Some("sk-oc".into()),
                headers,
                set_cache_key: Some(true),
                extra: json!({"timeout": 600000}).as_object().unwrap().clone(),
            },
            models: json!({"gpt-5": {"name": "GPT-5"}}).as_object().unwrap().clone(),
            extra: Default::default(),
        }
    }

    #[test]
    fn decode_encode_roundtrip() {
        let minimal = OpenCodeProvider {
            options: OpenCodeOptions {
                base_url: Some("http://localhost:11434/v1".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut with_extra = sample();
        with_extra.options.set_cache_key = Some(false);
        with_extra
            .extra
            .insert("disabled_models".into(), json!(["gpt-4o"]));
        with_extra.models.insert(
            "o3".into(),
            json!({"name": "o3", "limit": {"context": 200000, "output": 100000}}),
        );

        for original in [OpenCodeProvider::default(), sample(), minimal, with_extra] {
            let settings = ToolSettings::OpenCode(original);
            let blob = codec::encode_settings(&settings).unwrap();
            assert_eq!(codec::decode_settings(ToolId::OpenCode, &blob).unwrap(), settings);
        }
    }

    #[test]
    fn decode_names_nested_fields() {
        let err = decode(r#"{"options": {"baseURL": 1}}"#).unwrap_err();
        assert!(matches!(err, AppError::Codec { ref path, .. } if path == "options.baseURL"));

        let err = decode(r#"{"options": {"headers": {"X": false}}}"#).unwrap_err();
        assert!(matches!(err, AppError::Codec { ref path, .. } if path == "options.headers.X"));

        let err = decode(r#"{"models": {"gpt-5": "x"}}"#).unwrap_err();
        assert!(matches!(err, AppError::Codec { ref path, .. } if path == "models.gpt-5"));
    }

    #[test]
    fn render_inserts_provider_and_keeps_common() {
        let common = r#"{
            // 全局设置
            "theme": "opencode",
            "provider": {"existing": {"name": "Existing"}}
        }"#;
        let bytes = render("relay", &sample(), Some(common)).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["theme"], json!("opencode"));
        assert_eq!(value["provider"]["existing"]["name"], json!("Existing"));
        assert_eq!(
            value["provider"]["relay"]["options"]["baseURL"],
            json!("https://relay.example.com/v1")
        );
        assert_eq!(value["provider"]["relay"]["options"]["timeout"], json!(600000));
        assert_eq!(value["$schema"], json!("https://opencode.ai/config.json"));
    }
}
