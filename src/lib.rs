// lib.rs - 暴露服务层给 CLI 及其它前端使用

pub mod commands;
pub mod core;
pub mod data;
pub mod models;
pub mod services;
pub mod utils;

pub use core::error::{AppError, AppResult};
pub use models::*;
pub use services::{
    AppEvent, ApplyEngine, ChangeOrigin, EventBus, ProviderStore, ProviderStores, SshConfigStore,
    SyncEngine, SyncEvent, SyncHandle,
};
pub use utils::AppPaths;
