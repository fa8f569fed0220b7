//! Apply：把 Provider 设置与通用配置合并后写入工具的原生配置文件
//!
//! 步骤：读取记录与通用配置 → 解码 → 合并渲染 → 多文件事务写入 → `set_applied`。
//! 写入失败时不修改存储，之前已应用的记录保持已应用。
//! 修改记录或通用配置后的重新应用失败时，存储恢复为修改前的内容。

use crate::core::error::{AppError, AppResult};
use crate::data::FileTransaction;
use crate::models::{ProviderPatch, ProviderRecord, ToolId};
use crate::services::codec::{self, RenderedFile};
use crate::services::events::{ChangeOrigin, EventBus};
use crate::services::file_locks::PathLocks;
use crate::services::provider_store::ProviderStores;
use crate::services::watcher::ChecksumLedger;
use crate::utils::AppPaths;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct ApplyEngine {
    stores: Arc<ProviderStores>,
    paths: AppPaths,
    locks: PathLocks,
    ledger: ChecksumLedger,
    events: EventBus,
    /// 同一工具的 Apply 串行执行
    tool_guards: [Mutex<()>; 4],
}

fn guard_slot(tool: ToolId) -> usize {
    match tool {
        ToolId::ClaudeCode => 0,
        ToolId::Codex => 1,
        ToolId::OpenCode => 2,
        ToolId::OhMyOpenCode => 3,
    }
}

impl ApplyEngine {
    pub fn new(
        stores: Arc<ProviderStores>,
        paths: AppPaths,
        locks: PathLocks,
        ledger: ChecksumLedger,
        events: EventBus,
    ) -> Self {
        Self {
            stores,
            paths,
            locks,
            ledger,
            events,
            tool_guards: Default::default(),
        }
    }

    /// 渲染某条记录将写入的原生文件（不落盘）
    pub fn render(&self, tool: ToolId, provider_id: &str) -> AppResult<Vec<RenderedFile>> {
        let store = self.stores.get(tool);
        let record = store.get(provider_id)?;
        if record.is_disabled {
            return Err(AppError::NotFound(format!("记录已禁用: {provider_id}")));
        }
        let common = store.common_config()?;
        self.render_record(tool, &record, common.as_deref())
    }

    fn render_record(
        &self,
        tool: ToolId,
        record: &ProviderRecord,
        common: Option<&str>,
    ) -> AppResult<Vec<RenderedFile>> {
        let settings = codec::decode_settings(tool, &record.settings_config)?;
        codec::render(&self.paths.tool(tool), &record.id, &settings, common)
    }

    /// 应用指定记录
    pub fn apply(
        &self,
        tool: ToolId,
        provider_id: &str,
        origin: ChangeOrigin,
    ) -> AppResult<ProviderRecord> {
        let _tool_guard = self.lock_tool(tool);
        self.apply_locked(tool, provider_id, origin)
    }

    fn lock_tool(&self, tool: ToolId) -> MutexGuard<'_, ()> {
        self.tool_guards[guard_slot(tool)]
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }

    /// 调用方需持有该工具的 `tool_guards`
    fn apply_locked(
        &self,
        tool: ToolId,
        provider_id: &str,
        origin: ChangeOrigin,
    ) -> AppResult<ProviderRecord> {
        let files = self.render(tool, provider_id)?;

        let mut transaction = FileTransaction::new();
        for file in &files {
            transaction.stage(&file.path, &file.content)?;
        }

        {
            let _path_guard = self.locks.acquire(transaction.targets());
            if let Err(e) = transaction.commit() {
                tracing::error!(
                    tool = %tool,
                    provider_id = %provider_id,
                    error = %e,
                    "写入原生配置失败"
                );
                return Err(e.into());
            }
            for file in &files {
                self.ledger.record(&file.path, &file.content);
            }
        }

        let record = self.stores.get(tool).set_applied(provider_id)?;
        tracing::info!(
            tool = %tool,
            provider_id = %provider_id,
            files = files.len(),
            "配置已应用"
        );
        self.events
            .config_changed(tool, origin, Some(record.id.clone()));
        Ok(record)
    }

    /// 修改记录；若记录已应用则重新写入原生配置。
    ///
    /// 重新应用失败时记录恢复为修改前的内容并返回原错误，
    /// 存储与原生配置保持一致。
    pub fn update_and_reapply(
        &self,
        tool: ToolId,
        provider_id: &str,
        patch: ProviderPatch,
        origin: ChangeOrigin,
    ) -> AppResult<ProviderRecord> {
        let _tool_guard = self.lock_tool(tool);
        let store = self.stores.get(tool);
        let previous = store.get(provider_id)?;
        let record = store.update(provider_id, patch)?;
        if !record.is_applied {
            return Ok(record);
        }

        tracing::debug!(tool = %tool, id = %provider_id, "已应用的记录被修改，重新应用");
        self.apply_locked(tool, provider_id, origin).inspect_err(|e| {
            tracing::error!(
                tool = %tool,
                id = %provider_id,
                error = %e,
                "重新应用失败，回滚记录"
            );
            if let Err(restore_err) = store.restore(&previous) {
                tracing::error!(
                    tool = %tool,
                    id = %provider_id,
                    error = %restore_err,
                    "回滚记录失败"
                );
            }
        })
    }

    /// 保存通用配置并重新应用当前记录；失败时恢复之前的通用配置
    pub fn save_common_and_reapply(
        &self,
        tool: ToolId,
        blob: &str,
        origin: ChangeOrigin,
    ) -> AppResult<Option<ProviderRecord>> {
        let _tool_guard = self.lock_tool(tool);
        let store = self.stores.get(tool);
        let previous = store.common_config()?;
        store.save_common_config(blob)?;

        let Some(applied) = store.applied()? else {
            return Ok(None);
        };
        match self.apply_locked(tool, &applied.id, origin) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::error!(tool = %tool, error = %e, "重新应用失败，回滚通用配置");
                if let Err(restore_err) = store.restore_common_config(previous) {
                    tracing::error!(tool = %tool, error = %restore_err, "回滚通用配置失败");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClaudeSettings, CodexSettings, ProviderDraft, ToolSettings};
    use crate::services::events::AppEvent;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _home: TempDir,
        paths: AppPaths,
        stores: Arc<ProviderStores>,
        events: EventBus,
        ledger: ChecksumLedger,
        engine: ApplyEngine,
    }

    fn fixture() -> Fixture {
        let home = TempDir::new().unwrap();
        let paths = AppPaths::with_home(home.path());
        let stores = Arc::new(ProviderStores::new(&paths));
        let events = EventBus::new();
        let ledger = ChecksumLedger::new();
        let engine = ApplyEngine::new(
            Arc::clone(&stores),
            paths.clone(),
            PathLocks::new(),
            ledger.clone(),
            events.clone(),
        );
        Fixture {
            _home: home,
            paths,
            stores,
            events,
            ledger,
            engine,
        }
    }

    fn codex_draft(id: &str, key: &str, model: &str) -> ProviderDraft {
        let settings = CodexSettings {
            auth: Some(
                serde_json::json!({"OPENAI_API_KEY": key})
                    .as_object()
                    .unwrap()
                    .clone(),
            ),
            config: Some(format!("model = \"{model}\"\n")),
            extra: Default::default(),
        };
        ProviderDraft::new(id, ToolSettings::Codex(settings)).with_id(id)
    }

    #[test]
    fn apply_writes_native_file_and_marks_applied() {
        let fx = fixture();
        let mut settings = ClaudeSettings::default();
        settings
            .env
            .insert("ANTHROPIC_AUTH_TOKEN".into(), "sk-test".into());
        settings.model = Some("claude-opus".into());
        let store = fx.stores.get(ToolId::ClaudeCode);
        store
            .create(ProviderDraft::new("A", ToolSettings::Claude(settings)).with_id("a"))
            .unwrap();
        store
            .save_common_config(
                r#"{"permissions": {"allow": ["Bash"]}, "env": {"DISABLE_TELEMETRY": "1"}}"#,
            )
            .unwrap();

        let mut rx = fx.events.subscribe();
        fx.engine
            .apply(ToolId::ClaudeCode, "a", ChangeOrigin::App)
            .unwrap();

        let path = fx.paths.tool(ToolId::ClaudeCode).primary_config();
        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["env"]["ANTHROPIC_AUTH_TOKEN"], "sk-test");
        assert_eq!(written["env"]["DISABLE_TELEMETRY"], "1");
        assert_eq!(written["env"]["ANTHROPIC_MODEL"], "claude-opus");
        assert_eq!(written["permissions"]["allow"][0], "Bash");

        assert!(store.get("a").unwrap().is_applied);
        assert!(fx.ledger.checksum(&path).is_some());
        match rx.try_recv().unwrap() {
            AppEvent::ConfigChanged {
                tool,
                origin,
                provider_id,
                ..
            } => {
                assert_eq!(tool, ToolId::ClaudeCode);
                assert_eq!(origin, ChangeOrigin::App);
                assert_eq!(provider_id.as_deref(), Some("a"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn failed_auth_write_leaves_both_files_and_applied_record() {
        let fx = fixture();
        let store = fx.stores.get(ToolId::Codex);
        store.create(codex_draft("old", "sk-old", "gpt-4")).unwrap();
        store.create(codex_draft("new", "sk-new", "gpt-5")).unwrap();
        fx.engine
            .apply(ToolId::Codex, "old", ChangeOrigin::App)
            .unwrap();

        let tool = fx.paths.tool(ToolId::Codex);
        let config_path = tool.config_dir.join("config.toml");
        let auth_path = tool.config_dir.join("auth.json");
        let config_before = fs::read(&config_path).unwrap();

        // 用非空目录替换 auth.json，使第二个文件的 rename 失败
        fs::remove_file(&auth_path).unwrap();
        fs::create_dir_all(auth_path.join("blocker")).unwrap();

        let err = fx
            .engine
            .apply(ToolId::Codex, "new", ChangeOrigin::App)
            .unwrap_err();
        assert!(matches!(err, AppError::Io { ref path, .. } if *path == auth_path));

        assert_eq!(fs::read(&config_path).unwrap(), config_before);
        assert!(auth_path.is_dir());
        assert_eq!(store.applied().unwrap().map(|p| p.id), Some("old".into()));
    }

    #[test]
    fn failed_reapply_after_update_restores_record() {
        let fx = fixture();
        let store = fx.stores.get(ToolId::Codex);
        store.create(codex_draft("a", "sk-old", "gpt-4")).unwrap();
        let applied = fx
            .engine
            .apply(ToolId::Codex, "a", ChangeOrigin::App)
            .unwrap();

        let tool = fx.paths.tool(ToolId::Codex);
        let config_path = tool.config_dir.join("config.toml");
        let auth_path = tool.config_dir.join("auth.json");
        let config_before = fs::read(&config_path).unwrap();
        fs::remove_file(&auth_path).unwrap();
        fs::create_dir_all(auth_path.join("blocker")).unwrap();

        let patch = ProviderPatch {
            settings: Some(codex_draft("a", "sk-new", "gpt-5").settings),
            ..Default::default()
        };
        assert!(fx
            .engine
            .update_and_reapply(ToolId::Codex, "a", patch, ChangeOrigin::App)
            .is_err());

        let stored = store.get("a").unwrap();
        assert_eq!(stored.settings_config, applied.settings_config);
        assert_eq!(stored.updated_at, applied.updated_at);
        assert!(stored.is_applied);
        assert_eq!(fs::read(&config_path).unwrap(), config_before);
    }

    #[test]
    fn disabled_or_missing_record_is_not_found() {
        let fx = fixture();
        let store = fx.stores.get(ToolId::Codex);
        store.create(codex_draft("a", "sk", "gpt-5")).unwrap();
        store.set_disabled("a", true).unwrap();

        assert!(matches!(
            fx.engine.apply(ToolId::Codex, "a", ChangeOrigin::App),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.engine.apply(ToolId::Codex, "zzz", ChangeOrigin::App),
            Err(AppError::NotFound(_))
        ));
        assert!(!fx.paths.tool(ToolId::Codex).config_dir.exists());
    }

    #[test]
    fn malformed_blob_surfaces_codec_error() {
        let fx = fixture();
        let store = fx.stores.get(ToolId::Codex);
        store.create(codex_draft("a", "sk", "gpt-5")).unwrap();

        // 直接篡改存储文本
        let store_path = fx.paths.provider_store(ToolId::Codex);
        let raw = fs::read_to_string(&store_path).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        doc["providers"][0]["settingsConfig"] = serde_json::json!(r#"{"config": "model = "}"#);
        fs::write(&store_path, serde_json::to_vec(&doc).unwrap()).unwrap();

        assert!(matches!(
            fx.engine.apply(ToolId::Codex, "a", ChangeOrigin::App),
            Err(AppError::Codec { .. })
        ));
        assert!(store.applied().unwrap().is_none());
    }

    #[test]
    fn common_change_rewrites_applied_record() {
        let fx = fixture();
        let store = fx.stores.get(ToolId::Codex);
        store.create(codex_draft("a", "sk", "gpt-5")).unwrap();
        assert!(fx
            .engine
            .save_common_and_reapply(ToolId::Codex, "# 空\n", ChangeOrigin::App)
            .unwrap()
            .is_none());

        fx.engine
            .apply(ToolId::Codex, "a", ChangeOrigin::App)
            .unwrap();
        let record = fx
            .engine
            .save_common_and_reapply(
                ToolId::Codex,
                "approval_policy = \"never\"\n",
                ChangeOrigin::App,
            )
            .unwrap();
        assert_eq!(record.map(|r| r.id).as_deref(), Some("a"));

        let config =
            fs::read_to_string(fx.paths.tool(ToolId::Codex).config_dir.join("config.toml"))
                .unwrap();
        assert!(config.contains("approval_policy"));
        assert!(config.contains("gpt-5"));
    }
}
