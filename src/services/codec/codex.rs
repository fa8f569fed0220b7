//! Codex `config.toml` + `auth.json`

use super::{expect_object, from_object, parse_object, to_json_bytes, type_name};
use crate::core::error::{AppError, AppResult};
use crate::models::CodexSettings;
use serde_json::Value;
use toml_edit::{DocumentMut, Item, Table};

pub fn decode(blob: &str) -> AppResult<CodexSettings> {
    let map = parse_object(blob)?;

    match map.get("auth") {
        None | Some(Value::Null) => {}
        Some(auth) => {
            expect_object(auth, "auth")?;
        }
    }

    match map.get("config") {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) => {
            parse_toml(text, "config")?;
        }
        Some(other) => {
            return Err(AppError::codec(
                "config",
                format!("应为 TOML 文本，实际为 {}", type_name(other)),
            ))
        }
    }

    from_object(map)
}

/// 通用配置：TOML 文本
pub fn decode_common(blob: &str) -> AppResult<DocumentMut> {
    parse_toml(blob, "$")
}

/// 渲染 `(config.toml, auth.json)`
///
/// `config.toml` = 通用配置合并 Provider 配置（Provider 优先）；
/// `auth.json` 完全来自 Provider。
pub fn render(settings: &CodexSettings, common: Option<&str>) -> AppResult<(Vec<u8>, Vec<u8>)> {
    let mut doc = match common {
        Some(text) => decode_common(text)?,
        None => DocumentMut::new(),
    };

    if let Some(text) = &settings.config {
        let provider = parse_toml(text, "config")?;
        merge_toml_tables(doc.as_table_mut(), provider.as_table());
    }

    let auth = Value::Object(settings.auth.clone().unwrap_or_default());
    Ok((doc.to_string().into_bytes(), to_json_bytes(&auth)?))
}

fn parse_toml(text: &str, path: &str) -> AppResult<DocumentMut> {
    let doc = text
        .parse::<DocumentMut>()
        .map_err(|e| {
            AppError::codec(path, format!("TOML 格式错误: {}", e.to_string().trim()))
        })?;

    if let Some(item) = doc.get("model_providers") {
        if !item.is_table_like() {
            let field = if path == "$" {
                "model_providers".to_string()
            } else {
                format!("{path}.model_providers")
            };
            return Err(AppError::codec(field, "应为表"));
        }
    }

    Ok(doc)
}

/// 深度合并 TOML 表（source 优先，保留 target 中已有值的注释装饰）
fn merge_toml_tables(target: &mut Table, source: &Table) {
    for (key, item) in source.iter() {
        match item {
            Item::Table(source_table) => {
                if let Some(target_table) = target.get_mut(key).and_then(Item::as_table_mut) {
                    merge_toml_tables(target_table, source_table);
                    continue;
                }
                target.insert(key, item.clone());
            }
            Item::Value(source_value) => {
                if let Some(existing_value) = target.get_mut(key).and_then(Item::as_value_mut) {
                    let prefix = existing_value.decor().prefix().cloned();
                    let suffix = existing_value.decor().suffix().cloned();
                    *existing_value = source_value.clone();
                    let decor = existing_value.decor_mut();
                    decor.clear();
                    if let Some(pref) = prefix {
                        decor.set_prefix(pref);
                    }
                    if let Some(suf) = suffix {
                        decor.set_suffix(suf);
                    }
                    continue;
                }
                target.insert(key, item.clone());
            }
            _ => {
                target.insert(key, item.clone());
            }
        }
    }
}
