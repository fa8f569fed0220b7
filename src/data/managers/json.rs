//! JSON 存储管理器
//!
//! 提供应用自有 JSON 文档（Provider 存储、SSH 同步配置、全局配置）的读写：
//! - 类型化读取，文件不存在时返回 `None`
//! - 原子写入（同目录临时文件 + rename）
//! - 写入时持有 `.lock` 排他锁
//! - Unix 权限设置（0o600）

use crate::data::atomic::{read_optional, write_atomic, StoreLock};
use crate::data::{DataError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// JSON 存储管理器
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonManager;

impl JsonManager {
    pub fn new() -> Self {
        Self
    }

    /// 读取并反序列化 JSON 文件
    ///
    /// # 返回
    ///
    /// - `Ok(None)`: 文件不存在
    /// - `Ok(Some(T))`: 解析成功
    /// - `Err(DataError)`: 读取或解析失败（携带文件路径）
    pub fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let Some(bytes) = read_optional(path)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| DataError::json(path, e))
    }

    /// 序列化并原子写入 JSON 文件（格式化输出）
    pub fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_vec_pretty(value).map_err(|e| DataError::json(path, e))?;
        write_atomic(path, &content)
    }

    /// 在排他锁保护下执行读-改-写
    ///
    /// 闭包返回 `Ok` 时写回文件；返回 `Err` 时文件保持不变。
    pub fn update<T, R, E, F>(&self, path: &Path, mutate: F) -> std::result::Result<R, E>
    where
        T: DeserializeOwned + Serialize + Default,
        E: From<DataError>,
        F: FnOnce(&mut T) -> std::result::Result<R, E>,
    {
        let _lock = StoreLock::acquire(path)?;
        let mut value: T = self.read(path)?.unwrap_or_default();
        let output = mutate(&mut value)?;
        self.write(path, &value)?;
        Ok(output)
    }
}
