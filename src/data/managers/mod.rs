//! 数据管理器实现
//!
//! - `json`: JSON 管理器（类型化读写，原子写入，锁保护的读-改-写）

pub mod json;

pub use json::JsonManager;
