//! 核心基础设施：错误分类与日志系统

pub mod error;
pub mod logger;

pub use error::{AppError, AppResult};
pub use logger::{init_logger, update_log_level};
