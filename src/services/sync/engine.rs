//! 远程同步引擎
//!
//! 一次运行的状态流转：
//! `Idle → Connecting → 每个映射 (Listing → Transferring → Verifying)`
//! `→ Success | PartialFailure | Error → Idle`
//!
//! - 整个运行只建立一个远程会话；连接失败直接结束为 `Error`
//! - 单个映射的文件级错误只记录为 `Failed`，继续处理后续映射
//! - 会话级错误（连接断开）使当前映射失败，其余映射记为 `NotAttempted`
//! - 同一时间只允许一个运行，新的请求返回 `AlreadyRunning`
//! - 每个映射开始前检查取消；传输过程中取消的映射记为 `Failed(Cancelled)`

use super::resolver::{ensure_distinct_locals, ResolvedOperation};
use super::transport::{RemoteSession, RemoteTransport, TransportError};
use crate::core::error::{AppError, AppResult};
use crate::data::atomic::write_atomic;
use crate::models::{
    FailureReason, LastSyncStatus, MappingOutcome, MappingResult, RunStatus, SSHConnection,
    SSHSyncConfig, SkipReason, SyncDirection, SyncModule, SyncPhase, SyncProgress, SyncResult,
    SyncSettings, SyncStatus, SyncStatusSnapshot, SyncWarning, ToolId, TransferDirection,
};
use crate::services::events::{AppEvent, ChangeOrigin, EventBus};
use crate::services::file_locks::PathLocks;
use crate::services::ssh_config_store::SshConfigStore;
use crate::services::watcher::{watched_files, ChecksumLedger};
use crate::utils::AppPaths;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CANCELLED_MESSAGE: &str = "同步已取消";

/// 单次运行推送给观察者的事件（按发生顺序）
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Progress(SyncProgress),
    Warning(SyncWarning),
    Completed(SyncResult),
}

impl From<SyncEvent> for AppEvent {
    fn from(event: SyncEvent) -> Self {
        match event {
            SyncEvent::Progress(p) => AppEvent::SyncProgress(p),
            SyncEvent::Warning(w) => AppEvent::SyncWarning(w),
            SyncEvent::Completed(r) => AppEvent::SyncCompleted(r),
        }
    }
}

/// 正在进行的同步运行
#[derive(Debug)]
pub struct SyncHandle {
    pub run_id: String,
    /// 本次运行的事件流，运行结束后关闭
    pub events: mpsc::UnboundedReceiver<SyncEvent>,
    cancel: CancellationToken,
    join: JoinHandle<SyncResult>,
}

impl SyncHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> AppResult<SyncResult> {
        self.join.await.map_err(|e| {
            if e.is_cancelled() {
                AppError::Cancelled
            } else {
                AppError::Connection(format!("同步任务异常终止: {e}"))
            }
        })
    }
}

#[derive(Default)]
struct RunState {
    running: Option<(String, CancellationToken)>,
    status: SyncStatus,
    last_result: Option<SyncResult>,
    progress: Option<SyncProgress>,
}

struct Inner {
    transport: Arc<dyn RemoteTransport>,
    config_store: Arc<SshConfigStore>,
    paths: AppPaths,
    settings: SyncSettings,
    locks: PathLocks,
    ledger: ChecksumLedger,
    events: EventBus,
    state: Mutex<RunState>,
}

impl Inner {
    fn state(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl RunState {
    /// 仅当槽位仍属于 `run_id` 时释放；返回是否释放
    fn release(&mut self, run_id: &str) -> bool {
        if self.running.as_ref().is_some_and(|(id, _)| id == run_id) {
            self.running = None;
            self.progress = None;
            true
        } else {
            false
        }
    }
}

/// 运行结束（包括任务异常退出）时释放运行槽位
struct RunSlot {
    inner: Arc<Inner>,
    run_id: String,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        if self.inner.state().release(&self.run_id) {
            tracing::debug!(run_id = %self.run_id, "运行任务退出，释放运行槽位");
        }
    }
}

enum Planned {
    Skip(SkipReason),
    Run(ResolvedOperation),
}

struct PlanEntry {
    mapping_id: String,
    planned: Planned,
}

struct RunContext {
    run_id: String,
    connection: SSHConnection,
    module_filter: Option<SyncModule>,
    plan: Vec<PlanEntry>,
    cancel: CancellationToken,
    observer: mpsc::UnboundedSender<SyncEvent>,
}

#[derive(Clone, Copy)]
struct LocalStat {
    mtime: i64,
}

/// 传输阶段的结果：`Err` 只用于会话级错误
type StepResult = Result<MappingOutcome, TransportError>;

fn failed(reason: FailureReason) -> MappingOutcome {
    MappingOutcome::Failed { reason }
}

fn skipped(reason: SkipReason) -> MappingOutcome {
    MappingOutcome::Skipped { reason }
}

/// 会话级错误向上传递，文件级错误转为 `Failed`
fn classify(err: TransportError) -> StepResult {
    if err.is_connection() {
        Err(err)
    } else {
        Ok(failed(err.failure_reason()))
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        config_store: Arc<SshConfigStore>,
        paths: AppPaths,
        settings: SyncSettings,
        locks: PathLocks,
        ledger: ChecksumLedger,
        events: EventBus,
    ) -> Self {
        let status = match config_store.load() {
            Ok(config) => match config.last_sync_status {
                LastSyncStatus::Never => SyncStatus::Idle,
                LastSyncStatus::Success => SyncStatus::Success,
                LastSyncStatus::Error => SyncStatus::Error,
            },
            Err(e) => {
                tracing::warn!(error = %e, "读取 SSH 同步配置失败，状态按未同步处理");
                SyncStatus::Idle
            }
        };

        Self {
            inner: Arc::new(Inner {
                transport,
                config_store,
                paths,
                settings,
                locks,
                ledger,
                events,
                state: Mutex::new(RunState {
                    status,
                    ..Default::default()
                }),
            }),
        }
    }

    /// 启动一次同步（需要在 tokio 运行时中调用）
    pub fn start(&self, module_filter: Option<SyncModule>) -> AppResult<SyncHandle> {
        let config = self.inner.config_store.load()?;
        if !config.enabled {
            return Err(AppError::Validation("远程同步未启用".to_string()));
        }
        let connection = config
            .active_connection()
            .cloned()
            .ok_or_else(|| AppError::Validation("未选择 SSH 连接".to_string()))?;
        let plan = self.plan(&config, module_filter)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        {
            let mut state = self.inner.state();
            if state.running.is_some() {
                return Err(AppError::AlreadyRunning);
            }
            state.running = Some((run_id.clone(), cancel.clone()));
            state.progress = None;
        }

        let (observer, events) = mpsc::unbounded_channel();
        let ctx = RunContext {
            run_id: run_id.clone(),
            connection,
            module_filter,
            plan,
            cancel: cancel.clone(),
            observer,
        };
        let slot = RunSlot {
            inner: Arc::clone(&self.inner),
            run_id: run_id.clone(),
        };
        let engine = self.clone();
        let join = tokio::spawn(async move {
            let result = engine.execute(ctx).await;
            drop(slot);
            result
        });

        Ok(SyncHandle {
            run_id,
            events,
            cancel,
            join,
        })
    }

    /// 同步并等待结束
    pub async fn sync(&self, module_filter: Option<SyncModule>) -> AppResult<SyncResult> {
        self.start(module_filter)?.wait().await
    }

    /// 取消当前运行；没有运行时返回 false
    pub fn cancel_current(&self) -> bool {
        match &self.inner.state().running {
            Some((run_id, token)) => {
                tracing::info!(run_id = %run_id, "请求取消同步");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state().running.is_some()
    }

    pub fn status(&self) -> SyncStatusSnapshot {
        let state = self.inner.state();
        SyncStatusSnapshot {
            status: state.status,
            running: state.running.is_some(),
            last_result: state.last_result.clone(),
            progress: state.progress.clone(),
        }
    }

    fn plan(
        &self,
        config: &SSHSyncConfig,
        module_filter: Option<SyncModule>,
    ) -> AppResult<Vec<PlanEntry>> {
        let resolver = self.inner.config_store.resolver();
        let plan = config
            .file_mappings
            .iter()
            .map(|mapping| {
                let planned = if !mapping.enabled {
                    Planned::Skip(SkipReason::Disabled)
                } else if module_filter.is_some_and(|m| m != mapping.module) {
                    Planned::Skip(SkipReason::ModuleFiltered)
                } else {
                    Planned::Run(resolver.resolve_one(mapping)?)
                };
                Ok(PlanEntry {
                    mapping_id: mapping.id.clone(),
                    planned,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        // 配置文件可能被手工修改而绕过保存时的校验
        let operations: Vec<&ResolvedOperation> = plan
            .iter()
            .filter_map(|entry| match &entry.planned {
                Planned::Run(op) => Some(op),
                Planned::Skip(_) => None,
            })
            .collect();
        ensure_distinct_locals(operations)?;
        Ok(plan)
    }

    // ==================== 运行 ====================

    async fn execute(&self, ctx: RunContext) -> SyncResult {
        let started_at = Utc::now();
        tracing::info!(
            run_id = %ctx.run_id,
            target_host = %ctx.connection.target(),
            module = ?ctx.module_filter,
            "开始远程同步"
        );

        let mut outcomes: Vec<MappingOutcome> = ctx
            .plan
            .iter()
            .map(|entry| match &entry.planned {
                Planned::Skip(reason) => skipped(*reason),
                Planned::Run(_) => MappingOutcome::NotAttempted,
            })
            .collect();
        let mut warnings = Vec::new();
        let mut error: Option<String> = None;

        self.emit_progress(&ctx, None, 0, None, SyncPhase::Connecting);
        let timeout = Duration::from_secs(self.inner.settings.connect_timeout_secs);
        let connect = tokio::time::timeout(timeout, self.inner.transport.connect(&ctx.connection));
        let connected = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(CANCELLED_MESSAGE.to_string()),
            res = connect => match res {
                Err(_) => Err(format!("连接超时（{} 秒）", timeout.as_secs())),
                Ok(Err(e)) => Err(e.to_string()),
                Ok(Ok(session)) => Ok(session),
            },
        };

        match connected {
            Err(message) => {
                tracing::error!(run_id = %ctx.run_id, error = %message, "建立远程会话失败");
                error = Some(message);
            }
            Ok(mut session) => {
                for (index, entry) in ctx.plan.iter().enumerate() {
                    let Planned::Run(op) = &entry.planned else {
                        continue;
                    };
                    if ctx.cancel.is_cancelled() {
                        error = Some(CANCELLED_MESSAGE.to_string());
                        break;
                    }

                    match self.run_mapping(&ctx, session.as_mut(), op, &mut warnings).await {
                        Ok(outcome) => {
                            if let MappingOutcome::Failed { reason } = &outcome {
                                tracing::warn!(
                                    mapping_id = %op.mapping_id,
                                    reason = %reason,
                                    "映射同步失败"
                                );
                            }
                            outcomes[index] = outcome;
                        }
                        Err(e) => {
                            tracing::error!(
                                mapping_id = %op.mapping_id,
                                error = %e,
                                "远程会话中断"
                            );
                            outcomes[index] = failed(e.failure_reason());
                            error = Some(e.to_string());
                            break;
                        }
                    }
                }

                if error.is_none() && ctx.cancel.is_cancelled() {
                    error = Some(CANCELLED_MESSAGE.to_string());
                }
                if let Err(e) = session.close().await {
                    tracing::warn!(error = %e, "关闭远程会话失败");
                }
            }
        }

        let status = if error.is_some() {
            RunStatus::Error
        } else if outcomes
            .iter()
            .any(|o| matches!(o, MappingOutcome::Failed { .. }))
        {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        };

        let result = SyncResult {
            run_id: ctx.run_id.clone(),
            status,
            module_filter: ctx.module_filter,
            mappings: ctx
                .plan
                .iter()
                .zip(outcomes)
                .map(|(entry, outcome)| MappingResult {
                    mapping_id: entry.mapping_id.clone(),
                    outcome,
                })
                .collect(),
            warnings,
            error,
            started_at,
            finished_at: Utc::now(),
        };

        self.finish(&ctx, &result);
        result
    }

    fn finish(&self, ctx: &RunContext, result: &SyncResult) {
        if let Err(e) = self.inner.config_store.record_last_sync(result) {
            tracing::warn!(error = %e, "保存同步记录失败");
        }
        {
            let mut state = self.inner.state();
            state.status = result.status.into();
            state.last_result = Some(result.clone());
            state.release(&ctx.run_id);
        }

        tracing::info!(
            run_id = %result.run_id,
            status = ?result.status,
            succeeded = result.succeeded_count(),
            skipped = result.skipped_count(),
            failed = result.failed_count(),
            not_attempted = result.not_attempted_count(),
            "远程同步结束"
        );
        self.emit(ctx, SyncEvent::Completed(result.clone()));
    }

    async fn run_mapping(
        &self,
        ctx: &RunContext,
        session: &mut dyn RemoteSession,
        op: &ResolvedOperation,
        warnings: &mut Vec<SyncWarning>,
    ) -> StepResult {
        self.set_phase(ctx, op, SyncPhase::Listing);

        let local = match local_stat(&op.local_path) {
            Ok(stat) => stat,
            Err(message) => return Ok(failed(FailureReason::Io(message))),
        };
        let remote = if op.direction == SyncDirection::Push {
            None
        } else {
            match session.stat(&op.remote_path).await {
                Ok(stat) => stat,
                Err(e) => return classify(e),
            }
        };

        let direction = match op.direction {
            SyncDirection::Push if local.is_none() => return Ok(skipped(SkipReason::LocalMissing)),
            SyncDirection::Push => TransferDirection::Push,
            SyncDirection::Pull if remote.is_none() => {
                return Ok(skipped(SkipReason::RemoteMissing))
            }
            SyncDirection::Pull => TransferDirection::Pull,
            SyncDirection::Bidirectional => match (local, remote) {
                (None, None) => return Ok(skipped(SkipReason::LocalMissing)),
                (Some(_), None) => TransferDirection::Push,
                (None, Some(_)) => TransferDirection::Pull,
                (Some(l), Some(r)) if l.mtime > r.mtime => TransferDirection::Push,
                (Some(l), Some(r)) if l.mtime < r.mtime => TransferDirection::Pull,
                (Some(_), Some(_)) => {
                    let warning = SyncWarning {
                        mapping_id: op.mapping_id.clone(),
                        message: "本地与远程文件修改时间相同，已使用本地文件覆盖远程".to_string(),
                    };
                    warnings.push(warning.clone());
                    self.emit(ctx, SyncEvent::Warning(warning));
                    TransferDirection::Push
                }
            },
        };

        match direction {
            TransferDirection::Push => self.push(ctx, session, op).await,
            TransferDirection::Pull => {
                let expected = remote.map(|r| r.size);
                self.pull(ctx, session, op, expected).await
            }
        }
    }

    async fn push(
        &self,
        ctx: &RunContext,
        session: &mut dyn RemoteSession,
        op: &ResolvedOperation,
    ) -> StepResult {
        let locks = self.inner.locks.clone();
        let path = op.local_path.clone();
        // 路径锁可能被 Apply 长时间持有，不能阻塞运行时线程
        let read = tokio::task::spawn_blocking(move || {
            let _guard = locks.acquire([path.clone()]);
            fs::read(&path)
        })
        .await;
        let content = match read {
            Ok(Ok(content)) => content,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(skipped(SkipReason::LocalMissing))
            }
            Ok(Err(e)) => {
                let message = format!("{}: {e}", op.local_path.display());
                return Ok(failed(FailureReason::Io(message)));
            }
            Err(e) => return Ok(failed(FailureReason::Io(format!("读取任务异常终止: {e}")))),
        };
        let total = content.len() as u64;

        if total >= self.inner.settings.progress_threshold_bytes {
            self.emit_progress(ctx, Some(op), 0, Some(total), SyncPhase::Transferring);
        }
        let written = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(failed(FailureReason::Cancelled)),
            res = session.write_file(&op.remote_path, &content) => res,
        };
        if let Err(e) = written {
            return classify(e);
        }

        self.set_phase(ctx, op, SyncPhase::Verifying);
        match session.stat(&op.remote_path).await {
            Ok(Some(stat)) if stat.size == total => {}
            Ok(Some(stat)) => {
                return Ok(failed(FailureReason::Verification(format!(
                    "远程文件大小 {} 与本地 {total} 不一致",
                    stat.size
                ))))
            }
            Ok(None) => {
                return Ok(failed(FailureReason::Verification(
                    "写入后远程文件不存在".to_string(),
                )))
            }
            Err(e) => return classify(e),
        }

        self.emit_progress(ctx, Some(op), total, Some(total), SyncPhase::Transferring);
        tracing::debug!(mapping_id = %op.mapping_id, bytes = total, "已推送到远程");
        Ok(MappingOutcome::Succeeded {
            direction: TransferDirection::Push,
            bytes: total,
        })
    }

    async fn pull(
        &self,
        ctx: &RunContext,
        session: &mut dyn RemoteSession,
        op: &ResolvedOperation,
        expected: Option<u64>,
    ) -> StepResult {
        let threshold = self.inner.settings.progress_threshold_bytes;
        if let Some(size) = expected.filter(|s| *s >= threshold) {
            self.emit_progress(ctx, Some(op), 0, Some(size), SyncPhase::Transferring);
        }
        let read = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(failed(FailureReason::Cancelled)),
            res = session.read_file(&op.remote_path) => res,
        };
        let content = match read {
            Ok(content) => content,
            Err(TransportError::NotFound(_)) => return Ok(skipped(SkipReason::RemoteMissing)),
            Err(e) => return classify(e),
        };
        let total = content.len() as u64;

        let locks = self.inner.locks.clone();
        let ledger = self.inner.ledger.clone();
        let path = op.local_path.clone();
        let written = tokio::task::spawn_blocking(move || {
            let _guard = locks.acquire([path.clone()]);
            write_atomic(&path, &content).map_err(|e| FailureReason::Io(e.to_string()))?;
            ledger.record(&path, &content);
            Ok::<_, FailureReason>(())
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Ok(failed(reason)),
            Err(e) => return Ok(failed(FailureReason::Io(format!("写入任务异常终止: {e}")))),
        }

        self.set_phase(ctx, op, SyncPhase::Verifying);
        match tokio::fs::metadata(&op.local_path).await {
            Ok(meta) if meta.len() == total => {}
            Ok(meta) => {
                return Ok(failed(FailureReason::Verification(format!(
                    "本地文件大小 {} 与远程 {total} 不一致",
                    meta.len()
                ))))
            }
            Err(e) => return Ok(failed(FailureReason::Io(e.to_string()))),
        }

        self.emit_progress(ctx, Some(op), total, Some(total), SyncPhase::Transferring);
        if let Some(tool) = self.native_tool(&op.local_path) {
            self.inner.events.publish(AppEvent::ConfigChanged {
                tool,
                origin: ChangeOrigin::Sync,
                provider_id: None,
                path: Some(op.local_path.clone()),
            });
        }
        tracing::debug!(mapping_id = %op.mapping_id, bytes = total, "已从远程拉取");
        Ok(MappingOutcome::Succeeded {
            direction: TransferDirection::Pull,
            bytes: total,
        })
    }

    /// 拉取覆盖的文件是否为某个工具的原生配置
    fn native_tool(&self, path: &Path) -> Option<ToolId> {
        watched_files(&self.inner.paths.tools())
            .into_iter()
            .find(|(_, p)| p == path)
            .map(|(tool, _)| tool)
    }

    // ==================== 事件 ====================

    fn emit(&self, ctx: &RunContext, event: SyncEvent) {
        // 观察者可能已放弃接收
        let _ = ctx.observer.send(event.clone());
        self.inner.events.publish(event.into());
    }

    fn set_phase(&self, ctx: &RunContext, op: &ResolvedOperation, phase: SyncPhase) {
        let mut state = self.inner.state();
        let bytes = state
            .progress
            .as_ref()
            .filter(|p| p.current_mapping_id.as_deref() == Some(op.mapping_id.as_str()))
            .map_or(0, |p| p.bytes_transferred);
        state.progress = Some(SyncProgress {
            run_id: ctx.run_id.clone(),
            current_mapping_id: Some(op.mapping_id.clone()),
            bytes_transferred: bytes,
            total_bytes: None,
            phase,
        });
    }

    fn emit_progress(
        &self,
        ctx: &RunContext,
        op: Option<&ResolvedOperation>,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
        phase: SyncPhase,
    ) {
        let progress = SyncProgress {
            run_id: ctx.run_id.clone(),
            current_mapping_id: op.map(|op| op.mapping_id.clone()),
            bytes_transferred,
            total_bytes,
            phase,
        };
        self.inner.state().progress = Some(progress.clone());
        self.emit(ctx, SyncEvent::Progress(progress));
    }
}

fn local_stat(path: &Path) -> Result<Option<LocalStat>, String> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(format!("{} 是目录", path.display())),
        Ok(meta) => {
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs() as i64);
            Ok(Some(LocalStat { mtime }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("{}: {e}", path.display())),
    }
}
