//! 统一错误类型定义
//!
//! 使用 `thiserror` 定义数据管理模块的所有错误类型，上层通过 `From` 转换为 `AppError`。

use std::path::PathBuf;
use thiserror::Error;

/// 数据管理模块的统一错误类型
#[derive(Error, Debug)]
pub enum DataError {
    /// 文件 I/O 错误
    #[error("文件 I/O 错误: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON 序列化/反序列化错误
    #[error("JSON 解析错误: {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// TOML 编辑错误（toml_edit）
    #[error("TOML 解析错误: {}: {message}", path.display())]
    TomlEdit { path: PathBuf, message: String },

    /// 资源未找到
    #[error("未找到资源: {0}")]
    NotFound(String),

    /// 文件锁错误
    #[error("获取文件锁失败: {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 便于与现有代码集成的类型别名
pub type Result<T> = std::result::Result<T, DataError>;

/// 便捷的错误构造器
impl DataError {
    /// 从 `std::io::Error` 和路径创建 I/O 错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DataError::NotFound("config.json".to_string());
        assert_eq!(err.to_string(), "未找到资源: config.json");
    }

    #[test]
    fn test_io_error_construction() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = DataError::io("/path/to/file", io_err);
        assert!(err.to_string().contains("/path/to/file"));
    }

    #[test]
    fn test_json_error_keeps_path() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let err = DataError::json("/data/providers/codex.json", json_err);
        assert!(err.to_string().contains("codex.json"));
    }
}
