//! 全局配置命令

use crate::core::error::{AppError, AppResult};
use crate::core::logger;
use crate::models::{AppConfig, LogLevel};
use crate::utils::{load_app_config, save_app_config, AppPaths};

pub fn get_app_config(paths: &AppPaths) -> AppResult<AppConfig> {
    load_app_config(&paths.config_file())
}

/// 修改日志级别：写入配置并热重载
pub fn set_log_level(paths: &AppPaths, level: LogLevel) -> AppResult<AppConfig> {
    let path = paths.config_file();
    let mut config = load_app_config(&path)?;
    config.log.level = level;
    save_app_config(&path, &config)?;

    if let Err(e) = logger::update_log_level(level) {
        // 日志系统未初始化时仅保存配置
        tracing::debug!(error = %e, "跳过日志级别热重载");
    }
    Ok(config)
}

pub fn parse_log_level(level: &str) -> AppResult<LogLevel> {
    LogLevel::parse(level).ok_or_else(|| AppError::Validation(format!("无效的日志级别: {level}")))
}
