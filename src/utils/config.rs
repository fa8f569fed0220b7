//! 应用目录与全局配置读写

use crate::core::error::{AppError, AppResult};
use crate::data::JsonManager;
use crate::models::{AppConfig, Tool, ToolId};
use std::path::{Path, PathBuf};

/// 数据目录环境变量（覆盖默认的 `~/.aitoolbox`）
pub const DATA_DIR_ENV: &str = "AITOOLBOX_HOME";

const DATA_DIR_NAME: &str = ".aitoolbox";

/// 应用使用的所有路径
///
/// 由主目录和数据目录推导，测试中可指向临时目录。
#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    pub home: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// 从环境解析（`AITOOLBOX_HOME` 优先，否则 `~/.aitoolbox`）
    pub fn from_env() -> AppResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::NotFound("无法获取用户主目录".to_string()))?;
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => home.join(DATA_DIR_NAME),
        };
        Ok(Self { home, data_dir })
    }

    /// 以指定主目录构造（数据目录位于其下）
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let data_dir = home.join(DATA_DIR_NAME);
        Self { home, data_dir }
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn provider_store(&self, tool: ToolId) -> PathBuf {
        self.data_dir
            .join("providers")
            .join(format!("{}.json", tool.as_str()))
    }

    pub fn ssh_config(&self) -> PathBuf {
        self.data_dir.join("ssh_sync.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn tool(&self, id: ToolId) -> Tool {
        Tool::new(id, &self.home)
    }

    pub fn tools(&self) -> Vec<Tool> {
        Tool::all(&self.home)
    }
}

/// 读取全局配置（文件不存在时返回默认值）
pub fn load_app_config(path: &Path) -> AppResult<AppConfig> {
    Ok(JsonManager::new().read(path)?.unwrap_or_default())
}

pub fn save_app_config(path: &Path, config: &AppConfig) -> AppResult<()> {
    JsonManager::new().write(path, config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn data_dir_env_overrides_default() {
        let dir = TempDir::new().unwrap();
        std::env::set_var(DATA_DIR_ENV, dir.path());
        let paths = AppPaths::from_env().unwrap();
        std::env::remove_var(DATA_DIR_ENV);

        assert_eq!(paths.data_dir, dir.path());
        assert_eq!(paths.ssh_config(), dir.path().join("ssh_sync.json"));
    }

    #[test]
    fn provider_store_is_per_tool() {
        let paths = AppPaths::with_home("/home/dev");
        assert_eq!(
            paths.provider_store(ToolId::Codex),
            PathBuf::from("/home/dev/.aitoolbox/providers/codex.json")
        );
    }

    #[test]
    fn app_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(load_app_config(&path).unwrap(), AppConfig::default());

        let mut config = AppConfig::default();
        config.sync.connect_timeout_secs = 3;
        save_app_config(&path, &config).unwrap();
        assert_eq!(load_app_config(&path).unwrap(), config);
    }
}
