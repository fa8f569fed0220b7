//! Oh My OpenCode `oh-my-opencode.json(c)`
//!
//! 配置档只覆盖部分 agent 槽位；渲染时与全局配置按槽位深度合并。

use super::{
    expect_object, expect_optional_string, from_object, join_path, merge_values, parse_object,
    parse_object_jsonc, to_json_bytes,
};
use crate::core::error::{AppError, AppResult};
use crate::models::AgentsProfile;
use serde_json::{Map, Value};

pub fn decode(blob: &str) -> AppResult<AgentsProfile> {
    let map = parse_object(blob)?;
    validate_agents(&map)?;
    from_object(map)
}

/// 全局配置（接受 JSONC）
pub fn decode_common(blob: &str) -> AppResult<Map<String, Value>> {
    let map = parse_object_jsonc(blob)?;
    validate_agents(&map)?;
    Ok(map)
}

fn validate_agents(map: &Map<String, Value>) -> AppResult<()> {
    let Some(agents) = map.get("agents") else {
        return Ok(());
    };
    for (slot, settings) in expect_object(agents, "agents")? {
        let slot_path = join_path("agents", slot);
        let settings = expect_object(settings, &slot_path)?;
        expect_optional_string(settings, "model", &slot_path)?;
    }
    Ok(())
}

pub fn render(profile: &AgentsProfile, common: Option<&str>) -> AppResult<Vec<u8>> {
    let mut merged = Value::Object(match common {
        Some(blob) => decode_common(blob)?,
        None => Map::new(),
    });
    let overlay =
        serde_json::to_value(profile).map_err(|e| AppError::codec("$", e.to_string()))?;
    merge_values(&mut merged, &overlay);
    to_json_bytes(&merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ToolId, ToolSettings};
    use crate::services::codec;
    use serde_json::json;

    fn sample() -> AgentsProfile {
        let mut profile = AgentsProfile::default();
        profile.agents.insert(
            "oracle".into(),
            json!({"model": "openai/gpt-5", "temperature": 0.2})
                .as_object()
                .unwrap()
                .clone(),
        );
        profile.agents.insert(
            "reviewer".into(),
            json!({"model": "anthropic/claude-opus"}).as_object().unwrap().clone(),
        );
        profile
    }

    #[test]
    fn decode_encode_roundtrip() {
        let mut with_extra = sample();
        with_extra.extra.insert("google_auth".into(), json!(true));
        with_extra
            .extra
            .insert("disabled_hooks".into(), json!(["comment-checker"]));

        let mut builtin_only = AgentsProfile::default();
        builtin_only.agents.insert(
            "explore".into(),
            json!({"model": "opencode/grok", "prompt_append": "只读"})
                .as_object()
                .unwrap()
                .clone(),
        );

        for original in [AgentsProfile::default(), sample(), with_extra, builtin_only] {
            let settings = ToolSettings::Agents(original);
            let blob = codec::encode_settings(&settings).unwrap();
            assert_eq!(
                codec::decode_settings(ToolId::OhMyOpenCode, &blob).unwrap(),
                settings
            );
        }
        assert_eq!(sample().custom_slots(), vec!["reviewer"]);
    }

    #[test]
    fn decode_names_slot_path() {
        let err = decode(r#"{"agents": {"oracle": "gpt"}}"#).unwrap_err();
        assert!(matches!(err, AppError::Codec { ref path, .. } if path == "agents.oracle"));

        let err = decode(r#"{"agents": {"explore": {"model": 5}}}"#).unwrap_err();
        assert!(matches!(err, AppError::Codec { ref path, .. } if path == "agents.explore.model"));
    }

    #[test]
    fn render_merges_slots_with_profile_precedence() {
        let common = r#"{
            "google_auth": false,
            "agents": {
                "oracle": {"model": "google/gemini", "prompt_append": "be brief"},
                "librarian": {"model": "opencode/grok"}
            }
        }"#;
        let bytes = render(&sample(), Some(common)).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["google_auth"], json!(false));
        assert_eq!(value["agents"]["oracle"]["model"], json!("openai/gpt-5"));
        assert_eq!(value["agents"]["oracle"]["prompt_append"], json!("be brief"));
        assert_eq!(value["agents"]["librarian"]["model"], json!("opencode/grok"));
        assert_eq!(value["agents"]["reviewer"]["model"], json!("anthropic/claude-opus"));
    }
}
