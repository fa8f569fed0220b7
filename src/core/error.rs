//! 应用级错误分类
//!
//! 所有对外操作（Provider Store、Apply、远程同步）统一返回 `AppResult<T>`，
//! 调用方按变体区分处理方式，不依赖错误文本。

use crate::data::DataError;
use std::path::PathBuf;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 输入结构不合法（如 reorder 的 id 集合不匹配）
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// 记录不存在或不可用
    #[error("未找到: {0}")]
    NotFound(String),

    /// 删除/禁用当前已应用的记录
    #[error("记录正在使用中: {0}")]
    InUse(String),

    /// 存储的配置内容或原生配置文件格式错误
    #[error("配置解析失败 [{path}]: {message}")]
    Codec { path: String, message: String },

    /// 文件系统错误（携带失败路径）
    #[error("文件 I/O 错误: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 远程会话错误
    #[error("远程连接失败: {0}")]
    Connection(String),

    /// 已有同步任务在运行
    #[error("同步任务正在运行，请稍后再试")]
    AlreadyRunning,

    /// 操作被取消
    #[error("操作已取消")]
    Cancelled,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn codec(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Codec {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 错误类别标识（用于日志和前端展示）
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::InUse(_) => "in_use",
            AppError::Codec { .. } => "codec",
            AppError::Io { .. } => "io",
            AppError::Connection(_) => "connection",
            AppError::AlreadyRunning => "already_running",
            AppError::Cancelled => "cancelled",
        }
    }
}

impl From<DataError> for AppError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Io { path, source } => AppError::Io { path, source },
            DataError::Json { path, source } => AppError::Codec {
                path: path.display().to_string(),
                message: source.to_string(),
            },
            DataError::TomlEdit { path, message } => AppError::Codec {
                path: path.display().to_string(),
                message,
            },
            DataError::NotFound(msg) => AppError::NotFound(msg),
            DataError::Lock { path, source } => AppError::Io { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_names_field_path() {
        let err = AppError::codec("env.ANTHROPIC_BASE_URL", "应为字符串");
        assert_eq!(
            err.to_string(),
            "配置解析失败 [env.ANTHROPIC_BASE_URL]: 应为字符串"
        );
        assert_eq!(err.kind(), "codec");
    }

    #[test]
    fn io_error_keeps_failing_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = AppError::io("/tmp/auth.json", io_err);
        assert!(err.to_string().contains("/tmp/auth.json"));
    }

    #[test]
    fn data_error_maps_to_app_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: AppError = DataError::json("/tmp/store.json", json_err).into();
        assert!(matches!(err, AppError::Codec { ref path, .. } if path == "/tmp/store.json"));

        let err: AppError = DataError::NotFound("x".into()).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
