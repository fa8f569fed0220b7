//! 基于系统 OpenSSH 客户端的远程传输
//!
//! 连接时以 ControlMaster 模式启动一个后台主连接，之后的每个文件操作都通过
//! 同一个控制套接字复用该连接，整个同步运行只认证一次。
//! 密码认证依赖 `sshpass`（通过 `SSHPASS` 环境变量传递，不出现在命令行上）。

use super::transport::{RemoteSession, RemoteStat, RemoteTransport, TransportError};
use crate::models::{AuthMethod, SSHConnection};
use crate::utils::path::expand_tilde;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// ssh 自身错误（连接断开、认证失败等）的退出码
const SSH_ERROR_EXIT: i32 = 255;

pub struct OpenSshTransport {
    connect_timeout: Duration,
}

impl OpenSshTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl RemoteTransport for OpenSshTransport {
    async fn connect(
        &self,
        connection: &SSHConnection,
    ) -> Result<Box<dyn RemoteSession>, TransportError> {
        let control_dir = tempfile::Builder::new()
            .prefix("aitoolbox-ssh-")
            .tempdir()
            .map_err(|e| TransportError::Other(format!("创建控制目录失败: {e}")))?;
        let control_path = control_dir.path().join("cm");

        // 后台化的主连接会继承 stderr，写入文件而不是管道，避免等待 EOF
        let log_path = control_dir.path().join("master.log");
        let log_file = std::fs::File::create(&log_path)
            .map_err(|e| TransportError::Other(format!("创建连接日志失败: {e}")))?;

        let mut cmd = master_command(connection, &control_path, self.connect_timeout);
        cmd.stderr(Stdio::from(log_file));
        tracing::debug!(
            target_host = %connection.target(),
            port = connection.port,
            auth = ?connection.auth_method,
            "建立 SSH 主连接"
        );

        let deadline = self.connect_timeout + Duration::from_secs(5);
        let status = tokio::time::timeout(deadline, cmd.status())
            .await
            .map_err(|_| TransportError::Connection("连接超时".to_string()))?
            .map_err(|e| TransportError::Connection(spawn_error_message(connection, e)))?;

        if !status.success() {
            let stderr = std::fs::read_to_string(&log_path).unwrap_or_default();
            let stderr = stderr.trim();
            return Err(TransportError::Connection(if stderr.is_empty() {
                format!("ssh 退出码 {:?}", status.code())
            } else {
                stderr.to_string()
            }));
        }

        tracing::info!(target_host = %connection.target(), "SSH 连接已建立");
        Ok(Box::new(OpenSshSession {
            _control_dir: control_dir,
            control_path,
            target: connection.target(),
            port: connection.port,
            closed: false,
        }))
    }
}

fn spawn_error_message(connection: &SSHConnection, err: std::io::Error) -> String {
    if err.kind() == std::io::ErrorKind::NotFound {
        match connection.auth_method {
            AuthMethod::Password => "未找到 sshpass，密码认证需要安装 sshpass".to_string(),
            AuthMethod::Key => "未找到 ssh 客户端".to_string(),
        }
    } else {
        format!("启动 ssh 失败: {err}")
    }
}

/// 构造后台主连接命令
fn master_command(connection: &SSHConnection, control_path: &Path, timeout: Duration) -> Command {
    let secret = match connection.auth_method {
        AuthMethod::Password => connection.password.as_deref(),
        AuthMethod::Key => connection.passphrase.as_deref(),
    };

    let mut cmd = match secret {
        Some(secret) => {
            let mut cmd = Command::new("sshpass");
            if connection.auth_method == AuthMethod::Key {
                // 匹配私钥口令提示
                cmd.args(["-P", "passphrase"]);
            }
            cmd.arg("-e").arg("ssh").env("SSHPASS", secret);
            cmd
        }
        None => Command::new("ssh"),
    };

    cmd.args(["-o", "ControlMaster=yes"])
        .arg("-o")
        .arg(format!("ControlPath={}", control_path.display()))
        .args(["-o", "ControlPersist=yes"])
        .arg("-o")
        .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)))
        .args(["-o", "StrictHostKeyChecking=accept-new"])
        .args(["-o", "ServerAliveInterval=15"])
        .args(["-o", "ServerAliveCountMax=2"])
        .arg("-p")
        .arg(connection.port.to_string());

    match connection.auth_method {
        AuthMethod::Key => {
            if let Some(key) = connection.private_key_path.as_deref().filter(|k| !k.is_empty()) {
                let home = dirs::home_dir().unwrap_or_default();
                cmd.arg("-i").arg(expand_tilde(key, &home));
            }
            if secret.is_none() {
                cmd.args(["-o", "BatchMode=yes"]);
            }
        }
        AuthMethod::Password => {
            cmd.args(["-o", "PreferredAuthentications=password,keyboard-interactive"])
                .args(["-o", "PubkeyAuthentication=no"]);
        }
    }

    cmd.args(["-f", "-N"])
        .arg(connection.target())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

pub struct OpenSshSession {
    _control_dir: TempDir,
    control_path: PathBuf,
    target: String,
    port: u16,
    closed: bool,
}

impl OpenSshSession {
    fn command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .args(["-o", "ControlMaster=no"])
            .args(["-o", "BatchMode=yes"])
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-T");
        cmd
    }

    /// 在远程执行 shell 脚本
    async fn run(&self, script: &str, stdin: Option<&[u8]>) -> Result<Output, TransportError> {
        let mut cmd = self.command();
        cmd.arg(&self.target)
            .arg("--")
            .arg(script)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| TransportError::Connection(format!("启动 ssh 失败: {e}")))?;

        if let (Some(content), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(content)
                .await
                .map_err(|e| TransportError::Connection(format!("写入远程管道失败: {e}")))?;
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TransportError::Connection(format!("等待 ssh 退出失败: {e}")))?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(classify_failure(&output))
        }
    }
}

/// 按退出码和 stderr 区分会话级错误与文件级错误
fn classify_failure(output: &Output) -> TransportError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if output.status.code() == Some(SSH_ERROR_EXIT) || output.status.code().is_none() {
        return TransportError::Connection(if stderr.is_empty() {
            "SSH 会话已断开".to_string()
        } else {
            stderr
        });
    }
    if stderr.contains("Permission denied") || stderr.contains("Read-only file system") {
        TransportError::PermissionDenied(stderr)
    } else if stderr.contains("No such file") {
        TransportError::NotFound(stderr)
    } else {
        TransportError::Other(stderr)
    }
}

/// 转为远程 shell 中安全的双引号字符串，开头的 `~` 展开为 `$HOME`
fn quote_remote_path(path: &str) -> String {
    let (prefix, rest) = if path == "~" {
        ("$HOME", "")
    } else if let Some(rest) = path.strip_prefix("~/") {
        ("$HOME/", rest)
    } else {
        ("", path)
    };

    let mut escaped = String::with_capacity(rest.len());
    for ch in rest.chars() {
        if matches!(ch, '"' | '\\' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("\"{prefix}{escaped}\"")
}

fn parse_stat(stdout: &[u8]) -> Result<Option<RemoteStat>, TransportError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text == "missing" {
        return Ok(None);
    }
    let mut parts = text.split_whitespace();
    let (Some(size), Some(mtime)) = (parts.next(), parts.next()) else {
        return Err(TransportError::Other(format!("无法解析 stat 输出: {text}")));
    };
    let size = size
        .parse()
        .map_err(|_| TransportError::Other(format!("无法解析文件大小: {size}")))?;
    let mtime = mtime
        .parse()
        .map_err(|_| TransportError::Other(format!("无法解析修改时间: {mtime}")))?;
    Ok(Some(RemoteStat { size, mtime }))
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn stat(&mut self, path: &str) -> Result<Option<RemoteStat>, TransportError> {
        let p = quote_remote_path(path);
        // GNU stat 与 BSD stat 参数不同，依次尝试
        let script = format!(
            "if [ -e {p} ]; then stat -c '%s %Y' {p} 2>/dev/null || stat -f '%z %m' {p}; \
             else echo missing; fi"
        );
        let output = self.run(&script, None).await?;
        parse_stat(&output.stdout)
    }

    async fn read_file(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        let output = self
            .run(&format!("cat {}", quote_remote_path(path)), None)
            .await?;
        Ok(output.stdout)
    }

    async fn write_file(&mut self, path: &str, content: &[u8]) -> Result<(), TransportError> {
        let p = quote_remote_path(path);
        let tmp = quote_remote_path(&format!("{path}.aitoolbox-tmp"));
        let script = format!("mkdir -p \"$(dirname {p})\" && cat > {tmp} && mv -f {tmp} {p}");
        self.run(&script, Some(content)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let output = self
            .command()
            .args(["-O", "exit"])
            .arg(&self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TransportError::Other(format!("关闭 SSH 连接失败: {e}")))?;
        if !output.status.success() {
            tracing::debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "关闭 SSH 主连接返回非零"
            );
        }
        Ok(())
    }
}

impl Drop for OpenSshSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // 未显式关闭时尽力结束后台主连接
        let result = std::process::Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .args(["-O", "exit"])
            .arg(&self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            tracing::warn!(error = %e, "结束 SSH 主连接失败");
        }
    }
}

/// 测试连接：建立会话并执行一条空命令
pub async fn test_connection(
    connection: &SSHConnection,
    connect_timeout: Duration,
) -> Result<(), TransportError> {
    let transport = OpenSshTransport::new(connect_timeout);
    let mut session = transport.connect(connection).await?;
    let result = session.stat("~").await.map(|_| ());
    session.close().await?;
    result
}
