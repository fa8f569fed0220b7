// 命令层：每个操作一个入口，供 CLI 或其它前端调用

pub mod config_commands;
pub mod provider_commands;
pub mod sync_commands;

pub use config_commands::*;
pub use provider_commands::*;
pub use sync_commands::*;

use crate::core::error::AppResult;
use crate::models::AppConfig;
use crate::services::sync::{OpenSshTransport, RemoteTransport};
use crate::services::{
    ApplyEngine, ChecksumLedger, ConfigWatcher, EventBus, MappingResolver, PathLocks,
    ProviderStores, SshConfigStore, SyncEngine,
};
use crate::utils::{load_app_config, AppPaths};
use std::sync::Arc;
use std::time::Duration;

/// 进程内共享的服务集合
pub struct AppState {
    pub paths: AppPaths,
    pub config: AppConfig,
    pub events: EventBus,
    pub locks: PathLocks,
    pub ledger: ChecksumLedger,
    pub stores: Arc<ProviderStores>,
    pub apply: ApplyEngine,
    pub ssh_config: Arc<SshConfigStore>,
    pub sync: SyncEngine,
}

impl AppState {
    /// 从环境加载路径与全局配置
    pub fn load() -> AppResult<Self> {
        let paths = AppPaths::from_env()?;
        let config = load_app_config(&paths.config_file())?;
        Ok(Self::new(paths, config))
    }

    /// 使用系统 OpenSSH 客户端作为远程传输
    pub fn new(paths: AppPaths, config: AppConfig) -> Self {
        let timeout = Duration::from_secs(config.sync.connect_timeout_secs);
        Self::with_transport(paths, config, Arc::new(OpenSshTransport::new(timeout)))
    }

    pub fn with_transport(
        paths: AppPaths,
        config: AppConfig,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        let events = EventBus::new();
        let locks = PathLocks::new();
        let ledger = ChecksumLedger::new();
        let stores = Arc::new(ProviderStores::new(&paths));
        let apply = ApplyEngine::new(
            Arc::clone(&stores),
            paths.clone(),
            locks.clone(),
            ledger.clone(),
            events.clone(),
        );
        let resolver = MappingResolver::new(&paths.home, config.sync.allowed_roots.clone());
        let ssh_config = Arc::new(SshConfigStore::new(paths.ssh_config(), resolver));
        let sync = SyncEngine::new(
            transport,
            Arc::clone(&ssh_config),
            paths.clone(),
            config.sync.clone(),
            locks.clone(),
            ledger.clone(),
            events.clone(),
        );

        Self {
            paths,
            config,
            events,
            locks,
            ledger,
            stores,
            apply,
            ssh_config,
            sync,
        }
    }

    /// 启动原生配置文件的外部改动监听
    pub fn start_watcher(&self) -> AppResult<ConfigWatcher> {
        ConfigWatcher::start(
            self.paths.tools(),
            self.ledger.clone(),
            self.locks.clone(),
            self.events.clone(),
        )
    }
}
