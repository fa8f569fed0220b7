// 服务层模块
//
// - provider_store: 各工具的供应商记录（唯一生效）
// - codec: 配置块编解码与原生文件渲染
// - apply: 将供应商写入工具原生配置
// - ssh_config_store / sync: 远程 SSH 同步
// - watcher: 外部修改监听
// - events / file_locks: 进程内事件与路径锁

pub mod apply;
pub mod codec;
pub mod events;
pub mod file_locks;
pub mod provider_store;
pub mod ssh_config_store;
pub mod sync;
pub mod watcher;

pub use apply::ApplyEngine;
pub use events::{AppEvent, ChangeOrigin, EventBus};
pub use file_locks::{PathLockGuard, PathLocks};
pub use provider_store::{ProviderStore, ProviderStores};
pub use ssh_config_store::SshConfigStore;
pub use sync::{MappingResolver, SyncEngine, SyncEvent, SyncHandle};
pub use watcher::{ChecksumLedger, ConfigWatcher};
