//! 统一数据管理模块
//!
//! 提供应用自有 JSON 文档的读写、原子写入和多文件事务。
//!
//! # 模块组织
//!
//! - `error`: 统一错误类型定义
//! - `atomic`: 原子写入与 fs2 文件锁
//! - `transaction`: 多文件写入事务（失败回滚）
//! - `managers`: 各格式管理器

pub mod atomic;
pub mod error;
pub mod managers;
pub mod transaction;

pub use error::{DataError, Result};
pub use managers::JsonManager;
pub use transaction::FileTransaction;
