//! 文件映射解析
//!
//! 把用户配置的 `FileMapping` 转换为可执行的同步操作：展开 `~`、
//! 校验本地路径必须是绝对路径且位于允许的根目录内（同时检查符号链接解析后的真实路径），
//! 并处理 OpenCode 配置 `.jsonc` / `.json` 的动态选择。

use crate::core::error::{AppError, AppResult};
use crate::models::{FileMapping, SyncDirection, SyncModule};
use crate::utils::path::{
    canonicalize_existing_prefix, expand_tilde, has_parent_component, strip_cur_dir,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// 解析后的同步操作
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOperation {
    pub mapping_id: String,
    pub name: String,
    pub module: SyncModule,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub direction: SyncDirection,
}

fn mapping(id: &str, name: &str, module: SyncModule, path: &str, enabled: bool) -> FileMapping {
    FileMapping {
        id: id.to_string(),
        name: name.to_string(),
        module,
        local_path: path.to_string(),
        remote_path: path.to_string(),
        direction: SyncDirection::Push,
        enabled,
    }
}

/// 内置默认映射
///
/// 只允许在末尾追加条目；已有条目的删除或重排属于不兼容变更。
pub fn default_file_mappings() -> Vec<FileMapping> {
    vec![
        // OpenCode
        mapping(
            "opencode-main",
            "OpenCode 主配置",
            SyncModule::OpenCode,
            "~/.config/opencode/opencode.jsonc",
            true,
        ),
        mapping(
            "opencode-oh-my",
            "Oh My OpenCode 配置",
            SyncModule::OpenCode,
            "~/.config/opencode/oh-my-opencode.jsonc",
            true,
        ),
        mapping(
            "opencode-oh-my-slim",
            "Oh My OpenCode Slim 配置",
            SyncModule::OpenCode,
            "~/.config/opencode/oh-my-opencode-slim.json",
            false,
        ),
        mapping(
            "opencode-auth",
            "OpenCode 认证信息",
            SyncModule::OpenCode,
            "~/.local/share/opencode/auth.json",
            true,
        ),
        // Claude Code
        mapping(
            "claude-settings",
            "Claude Code 设置",
            SyncModule::Claude,
            "~/.claude/settings.json",
            true,
        ),
        mapping(
            "claude-config",
            "Claude Code 配置",
            SyncModule::Claude,
            "~/.claude/config.json",
            true,
        ),
        // Codex
        mapping(
            "codex-auth",
            "Codex 认证",
            SyncModule::Codex,
            "~/.codex/auth.json",
            true,
        ),
        mapping(
            "codex-config",
            "Codex 配置",
            SyncModule::Codex,
            "~/.codex/config.toml",
            true,
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct MappingResolver {
    home: PathBuf,
    allowed_roots: Vec<PathBuf>,
}

impl MappingResolver {
    /// `allowed_roots` 为空时只允许主目录
    pub fn new(home: impl Into<PathBuf>, allowed_roots: Vec<PathBuf>) -> Self {
        let home = home.into();
        let allowed_roots = if allowed_roots.is_empty() {
            vec![home.clone()]
        } else {
            allowed_roots
        };
        Self {
            home,
            allowed_roots,
        }
    }

    /// 解析所有启用的映射（保持声明顺序）
    pub fn resolve(&self, mappings: &[FileMapping]) -> AppResult<Vec<ResolvedOperation>> {
        let operations = mappings
            .iter()
            .filter(|m| m.enabled)
            .map(|m| self.resolve_one(m))
            .collect::<AppResult<Vec<_>>>()?;
        ensure_distinct_locals(&operations)?;
        Ok(operations)
    }

    pub fn resolve_one(&self, mapping: &FileMapping) -> AppResult<ResolvedOperation> {
        let mut local_path = self.local_path(mapping)?;
        let mut remote_path = validate_remote_path(mapping)?;

        // `.jsonc` 不存在时使用同名 `.json`，远程文件名保持一致
        if local_path.extension().is_some_and(|ext| ext == "jsonc") && !local_path.exists() {
            local_path.set_extension("json");
            if let Some(stem) = remote_path.strip_suffix(".jsonc") {
                remote_path = format!("{stem}.json");
            }
        }

        Ok(ResolvedOperation {
            mapping_id: mapping.id.clone(),
            name: mapping.name.clone(),
            module: mapping.module,
            local_path,
            remote_path,
            direction: mapping.direction,
        })
    }

    /// 展开并校验本地路径
    fn local_path(&self, mapping: &FileMapping) -> AppResult<PathBuf> {
        let raw = mapping.local_path.trim();
        let expanded = expand_tilde(raw, &self.home);
        if !expanded.is_absolute() {
            return Err(AppError::Validation(format!(
                "映射 {} 的本地路径必须是绝对路径: {raw}",
                mapping.id
            )));
        }
        if has_parent_component(&expanded) {
            return Err(AppError::Validation(format!(
                "映射 {} 的本地路径不能包含 `..`: {raw}",
                mapping.id
            )));
        }
        let lexical = strip_cur_dir(&expanded);

        let within_lexically = self
            .allowed_roots
            .iter()
            .any(|root| lexical.starts_with(strip_cur_dir(root)));
        if !within_lexically {
            return Err(self.outside_roots(mapping, raw));
        }

        // 符号链接可能指向根目录之外
        let real = canonicalize_existing_prefix(&lexical).map_err(|e| AppError::io(&lexical, e))?;
        let mut within_real = false;
        for root in &self.allowed_roots {
            let real_root = canonicalize_existing_prefix(root).map_err(|e| AppError::io(root, e))?;
            if real.starts_with(&real_root) {
                within_real = true;
                break;
            }
        }
        if !within_real {
            return Err(self.outside_roots(mapping, raw));
        }

        Ok(lexical)
    }

    fn outside_roots(&self, mapping: &FileMapping, raw: &str) -> AppError {
        AppError::Validation(format!(
            "映射 {} 的本地路径不在允许的目录内: {raw}",
            mapping.id
        ))
    }

    /// 保存前的整体校验
    ///
    /// - id 非空且唯一
    /// - 两个启用的映射不能指向同一本地文件
    /// - 每个启用映射的路径都能解析
    pub fn validate(&self, mappings: &[FileMapping]) -> AppResult<()> {
        let mut ids = HashSet::new();
        for mapping in mappings {
            if mapping.id.trim().is_empty() {
                return Err(AppError::Validation("映射 id 不能为空".to_string()));
            }
            if !ids.insert(mapping.id.as_str()) {
                return Err(AppError::Validation(format!("映射 id 重复: {}", mapping.id)));
            }
        }

        let mut seen: HashMap<PathBuf, &str> = HashMap::new();
        for mapping in mappings.iter().filter(|m| m.enabled) {
            let local = self.local_path(mapping)?;
            validate_remote_path(mapping)?;
            let key = collision_key(&local)?;
            if let Some(other) = seen.insert(key, mapping.id.as_str()) {
                return Err(duplicate_local(other, &mapping.id, &local));
            }
        }
        Ok(())
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

/// 判断两个本地路径是否指向同一文件的键
///
/// `.jsonc` 与同名 `.json` 视为同一文件（解析时可能相互回退），
/// 已存在的前缀按真实路径比较，符号链接别名也会冲突。
fn collision_key(local: &Path) -> AppResult<PathBuf> {
    let mut key = local.to_path_buf();
    if key.extension().is_some_and(|ext| ext == "jsonc") {
        key.set_extension("json");
    }
    canonicalize_existing_prefix(&key).map_err(|e| AppError::io(&key, e))
}

fn duplicate_local(first: &str, second: &str, local: &Path) -> AppError {
    AppError::Validation(format!(
        "映射 {first} 与 {second} 使用了相同的本地路径: {}",
        local.display()
    ))
}

/// 执行前检查解析后的操作没有指向同一本地文件
pub fn ensure_distinct_locals<'a>(
    operations: impl IntoIterator<Item = &'a ResolvedOperation>,
) -> AppResult<()> {
    let mut seen: HashMap<PathBuf, &str> = HashMap::new();
    for op in operations {
        let key = collision_key(&op.local_path)?;
        if let Some(other) = seen.insert(key, op.mapping_id.as_str()) {
            return Err(duplicate_local(other, &op.mapping_id, &op.local_path));
        }
    }
    Ok(())
}

/// 远程路径必须是绝对路径或以 `~/` 开头，且不含 `..`
fn validate_remote_path(mapping: &FileMapping) -> AppResult<String> {
    let raw = mapping.remote_path.trim();
    let is_home_relative = raw.starts_with("~/");
    if !(is_home_relative || raw.starts_with('/')) || raw.ends_with('/') {
        return Err(AppError::Validation(format!(
            "映射 {} 的远程路径必须是文件的绝对路径或以 ~/ 开头: {raw}",
            mapping.id
        )));
    }
    if raw.split('/').any(|part| part == "..") {
        return Err(AppError::Validation(format!(
            "映射 {} 的远程路径不能包含 `..`: {raw}",
            mapping.id
        )));
    }
    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn custom(id: &str, local: &str) -> FileMapping {
        FileMapping {
            id: id.into(),
            name: id.into(),
            module: SyncModule::Claude,
            local_path: local.into(),
            remote_path: "~/.claude/settings.json".into(),
            direction: SyncDirection::Push,
            enabled: true,
        }
    }

    #[test]
    fn default_mappings_are_stable() {
        let first = default_file_mappings();
        assert_eq!(first, default_file_mappings());

        let ids: Vec<&str> = first.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "opencode-main",
                "opencode-oh-my",
                "opencode-oh-my-slim",
                "opencode-auth",
                "claude-settings",
                "claude-config",
                "codex-auth",
                "codex-config",
            ]
        );
    }

    #[test]
    fn default_mappings_resolve_under_home() {
        let home = TempDir::new().unwrap();
        let resolver = MappingResolver::new(home.path(), Vec::new());
        resolver.validate(&default_file_mappings()).unwrap();

        let ops = resolver.resolve(&default_file_mappings()).unwrap();
        // slim 默认禁用
        assert_eq!(ops.len(), 7);
        assert_eq!(ops[0].mapping_id, "opencode-main");
        assert!(ops.iter().all(|op| op.local_path.starts_with(home.path())));
    }

    #[test]
    fn jsonc_falls_back_to_json_when_missing() {
        let home = TempDir::new().unwrap();
        let resolver = MappingResolver::new(home.path(), Vec::new());
        let main = &default_file_mappings()[0];

        let op = resolver.resolve_one(main).unwrap();
        assert!(op.local_path.ends_with(".config/opencode/opencode.json"));
        assert_eq!(op.remote_path, "~/.config/opencode/opencode.json");

        let dir = home.path().join(".config/opencode");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("opencode.jsonc"), "{}").unwrap();
        let op = resolver.resolve_one(main).unwrap();
        assert!(op.local_path.ends_with("opencode.jsonc"));
        assert_eq!(op.remote_path, "~/.config/opencode/opencode.jsonc");
    }

    #[test]
    fn rejects_relative_and_escaping_paths() {
        let home = TempDir::new().unwrap();
        let resolver = MappingResolver::new(home.path(), Vec::new());

        for local in ["relative/file.json", "~/../etc/passwd", "/etc/passwd"] {
            let err = resolver.resolve_one(&custom("x", local)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{local}");
        }

        let mut bad_remote = custom("x", "~/.claude/settings.json");
        bad_remote.remote_path = "relative.json".into();
        assert!(matches!(
            resolver.resolve_one(&bad_remote),
            Err(AppError::Validation(_))
        ));
        bad_remote.remote_path = "~/../../etc/shadow".into();
        assert!(matches!(
            resolver.resolve_one(&bad_remote),
            Err(AppError::Validation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escaping_root() {
        let home = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), home.path().join("link")).unwrap();

        let resolver = MappingResolver::new(home.path(), Vec::new());
        let err = resolver
            .resolve_one(&custom("x", "~/link/secret.json"))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn validate_rejects_duplicate_enabled_local_paths() {
        let home = TempDir::new().unwrap();
        let resolver = MappingResolver::new(home.path(), Vec::new());

        let a = custom("a", "~/.claude/settings.json");
        let mut b = custom("b", "~/./.claude/settings.json");
        assert!(matches!(
            resolver.validate(&[a.clone(), b.clone()]),
            Err(AppError::Validation(_))
        ));

        // 禁用其中一个即可保存
        b.enabled = false;
        resolver.validate(&[a.clone(), b]).unwrap();

        assert!(matches!(
            resolver.validate(&[a.clone(), a]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn validate_treats_jsonc_and_json_siblings_as_one_file() {
        let home = TempDir::new().unwrap();
        let resolver = MappingResolver::new(home.path(), Vec::new());

        let mut mappings = default_file_mappings();
        let mut mine = custom("mine", "~/.config/opencode/opencode.json");
        mine.module = SyncModule::OpenCode;
        mine.remote_path = "~/.config/opencode/opencode.json".into();
        mappings.push(mine.clone());

        let err = resolver.validate(&mappings).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("mine")), "{err}");
        assert!(matches!(
            resolver.resolve(&mappings),
            Err(AppError::Validation(_))
        ));

        // `.jsonc` 存在时同样冲突：删除 `.jsonc` 后两者会落到同一文件
        let dir = home.path().join(".config/opencode");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("opencode.jsonc"), "{}").unwrap();
        assert!(resolver.validate(&mappings).is_err());

        mappings[0].enabled = false;
        resolver.validate(&mappings).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn validate_rejects_symlink_alias_of_same_file() {
        let home = TempDir::new().unwrap();
        let claude_dir = home.path().join(".claude");
        fs::create_dir_all(&claude_dir).unwrap();
        std::os::unix::fs::symlink(&claude_dir, home.path().join("claude-alias")).unwrap();

        let resolver = MappingResolver::new(home.path(), Vec::new());
        let mappings = [
            custom("a", "~/.claude/settings.json"),
            custom("b", "~/claude-alias/settings.json"),
        ];
        assert!(matches!(
            resolver.validate(&mappings),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            resolver.resolve(&mappings),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn disabled_mappings_are_filtered_in_order() {
        let home = TempDir::new().unwrap();
        let resolver = MappingResolver::new(home.path(), Vec::new());
        let mut b = custom("b", "~/b.json");
        b.enabled = false;
        let ops = resolver
            .resolve(&[custom("a", "~/a.json"), b, custom("c", "~/c.json")])
            .unwrap();
        let ids: Vec<&str> = ops.iter().map(|op| op.mapping_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
