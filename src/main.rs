use aitoolbox::commands::{self, AppState};
use aitoolbox::core::init_logger;
use aitoolbox::models::{
    LastSyncStatus, MappingOutcome, ProviderRecord, SyncModule, SyncPhase, SyncResult, ToolId,
};
use aitoolbox::services::ChangeOrigin;
use aitoolbox::SyncEvent;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

/// AI 编程工具供应商配置管理与 SSH 远程同步
#[derive(Debug, Parser)]
#[command(name = "aitoolbox", version, about)]
struct Cli {
    /// 覆盖配置中的日志级别（error/warn/info/debug/trace）
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 列出工具的供应商记录
    List {
        /// claude-code / codex / opencode / oh-my-opencode
        tool: ToolId,
    },
    /// 将记录写入工具的原生配置
    Apply {
        tool: ToolId,
        /// 记录 id 或名称
        provider: String,
    },
    /// 清除工具的已应用标记
    Clear { tool: ToolId },
    /// 显示同步文件映射
    Mappings {
        /// 显示内置默认映射而非已保存的映射
        #[arg(long, default_value_t = false)]
        defaults: bool,
    },
    /// 立即执行一次远程同步
    Sync {
        /// 仅同步指定模块（claude / codex / opencode）
        #[arg(long)]
        module: Option<SyncModule>,
    },
    /// 显示同步状态
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let state = AppState::load().context("加载应用配置失败")?;

    let mut log_config = state.config.log.clone();
    if let Some(level) = cli.log_level.as_deref() {
        log_config.level = commands::parse_log_level(level)?;
    }
    init_logger(&log_config, &state.paths.log_dir())?;

    match cli.command {
        Commands::List { tool } => {
            let records = commands::list_providers(&state, tool)?;
            if records.is_empty() {
                println!("{} 暂无供应商记录", tool.display_name());
            }
            for record in &records {
                print_record(record);
            }
        }
        Commands::Apply { tool, provider } => {
            let record = commands::find_provider(&state, tool, &provider)?;
            let record = commands::apply_config(&state, tool, &record.id, ChangeOrigin::App)?;
            println!("已应用 {} ({})", record.name, record.id);
        }
        Commands::Clear { tool } => match commands::clear_applied(&state, tool)? {
            Some(id) => println!("已清除 {} 的应用状态（之前为 {id}）", tool.display_name()),
            None => println!("{} 当前没有已应用的记录", tool.display_name()),
        },
        Commands::Mappings { defaults } => {
            let mappings = if defaults {
                commands::get_default_mappings()
            } else {
                commands::get_ssh_config(&state)?.file_mappings
            };
            for m in &mappings {
                println!(
                    "{} {:<22} {:<9} {:?}  {} -> {}",
                    if m.enabled { "+" } else { " " },
                    m.id,
                    m.module.as_str(),
                    m.direction,
                    m.local_path,
                    m.remote_path
                );
            }
        }
        Commands::Sync { module } => {
            let result = run_sync(&state, module).await?;
            print_result(&result);
            if result.status != aitoolbox::models::RunStatus::Success {
                std::process::exit(1);
            }
        }
        Commands::Status => {
            let config = commands::get_ssh_config(&state)?;
            let active = config
                .active_connection()
                .map(|c| c.target())
                .unwrap_or_else(|| "-".to_string());
            println!("启用: {}", if config.enabled { "是" } else { "否" });
            println!("连接: {active}");
            match config.last_sync_status {
                LastSyncStatus::Never => println!("上次同步: 从未同步"),
                status => {
                    let time = config
                        .last_sync_time
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default();
                    println!("上次同步: {status:?} {time}");
                    if let Some(error) = &config.last_sync_error {
                        println!("错误: {error}");
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_record(record: &ProviderRecord) {
    let marker = if record.is_applied {
        "*"
    } else if record.is_disabled {
        "-"
    } else {
        " "
    };
    println!("{marker} {:<38} {}", record.id, record.name);
}

/// 执行同步并在终端输出进度；Ctrl-C 取消
async fn run_sync(state: &AppState, module: Option<SyncModule>) -> Result<SyncResult> {
    let mut handle = commands::start_sync(state, module)?;
    let cancel = handle.cancel_token();

    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(SyncEvent::Progress(p)) => {
                    if p.phase == SyncPhase::Transferring {
                        if let (Some(id), Some(total)) = (&p.current_mapping_id, p.total_bytes) {
                            eprintln!("  {id}: {}/{total} 字节", p.bytes_transferred);
                        }
                    }
                }
                Some(SyncEvent::Warning(w)) => eprintln!("警告 [{}]: {}", w.mapping_id, w.message),
                Some(SyncEvent::Completed(_)) | None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                eprintln!("正在取消同步...");
                cancel.cancel();
            }
        }
    }

    Ok(handle.wait().await?)
}

fn print_result(result: &SyncResult) {
    for mapping in &result.mappings {
        let line = match &mapping.outcome {
            MappingOutcome::Succeeded { direction, bytes } => {
                format!("成功 {direction:?} {bytes} 字节")
            }
            MappingOutcome::Skipped { reason } => format!("跳过 {reason:?}"),
            MappingOutcome::Failed { reason } => format!("失败 {reason}"),
            MappingOutcome::NotAttempted => "未执行".to_string(),
        };
        println!("{:<22} {line}", mapping.mapping_id);
    }
    if let Some(error) = &result.error {
        println!("错误: {error}");
    }
    println!(
        "{:?}: 成功 {} / 跳过 {} / 失败 {} / 未执行 {}",
        result.status,
        result.succeeded_count(),
        result.skipped_count(),
        result.failed_count(),
        result.not_attempted_count()
    );
}
