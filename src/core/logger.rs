use crate::models::config::{LogConfig, LogFormat, LogLevel, LogOutput};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// 全局日志级别 reload handle
static LOG_LEVEL_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

/// 文件输出的后台写入 guard（进程结束前保持存活）
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "aitoolbox";

/// 初始化日志系统
///
/// 支持基于配置的日志输出，包括：
/// - 日志级别（trace/debug/info/warn/error），`RUST_LOG` 优先
/// - 输出格式（JSON/纯文本）
/// - 输出目标（控制台/文件/both），文件按天滚动
///
/// 日志级别可以通过 `update_log_level` 动态调整；格式和输出目标需要重启后生效。
/// 控制台输出写入 stderr，stdout 留给命令行结果。
pub fn init_logger(config: &LogConfig, default_log_dir: &Path) -> anyhow::Result<()> {
    let filter = create_env_filter(&config.level);
    let (filter_layer, reload_handle) = reload::Layer::new(filter);

    if LOG_LEVEL_HANDLE.set(reload_handle).is_err() {
        anyhow::bail!("日志系统已初始化，不能重复初始化");
    }

    let console = matches!(config.output, LogOutput::Console | LogOutput::Both)
        .then(|| create_console_layer(config.format));
    let file = match config.output {
        LogOutput::File | LogOutput::Both => {
            let dir = get_log_dir(config.file_path.as_deref(), default_log_dir)?;
            Some(create_file_layer(config.format, dir))
        }
        LogOutput::Console => None,
    };

    Registry::default()
        .with(filter_layer)
        .with(console)
        .with(file)
        .init();

    tracing::info!(
        level = config.level.as_str(),
        format = ?config.format,
        output = ?config.output,
        file_path = ?config.file_path,
        "日志系统初始化完成"
    );

    Ok(())
}

/// 创建环境过滤器
fn create_env_filter(level: &LogLevel) -> EnvFilter {
    // 优先从环境变量读取，格式：RUST_LOG=debug 或 RUST_LOG=aitoolbox=trace,notify=warn
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // 默认配置：应用代码使用指定级别，第三方库使用 WARN
        EnvFilter::new(format!(
            "aitoolbox={},notify=warn,tokio=warn",
            level.as_str()
        ))
    })
}

fn create_console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(cfg!(debug_assertions))
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(cfg!(debug_assertions))
            .with_thread_ids(false)
            .boxed(),
    }
}

fn create_file_layer<S>(
    format: LogFormat,
    log_dir: PathBuf,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let file_appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = non_blocking(file_appender);
    // 仅初始化一次，set 失败说明已有 guard
    let _ = FILE_GUARD.set(guard);

    match format {
        LogFormat::Text => fmt::layer()
            .with_writer(writer)
            .with_target(cfg!(debug_assertions))
            .with_thread_ids(false)
            .with_ansi(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .boxed(),
    }
}

/// 获取日志目录（不存在时创建）
fn get_log_dir(file_path: Option<&str>, default_log_dir: &Path) -> anyhow::Result<PathBuf> {
    let dir = match file_path {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => default_log_dir.to_path_buf(),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// 动态更新日志级别（热重载）
pub fn update_log_level(new_level: LogLevel) -> anyhow::Result<()> {
    let handle = LOG_LEVEL_HANDLE
        .get()
        .ok_or_else(|| anyhow::anyhow!("日志系统未初始化"))?;

    let new_filter = create_env_filter(&new_level);
    handle
        .reload(new_filter)
        .map_err(|e| anyhow::anyhow!("重载日志级别失败: {}", e))?;

    tracing::info!(new_level = new_level.as_str(), "日志级别已动态更新");
    Ok(())
}
