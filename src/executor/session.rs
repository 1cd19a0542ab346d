//! 常驻 shell 会话
//!
//! 每个 `Session` 独占一个交互式 shell 子进程，命令通过标准输入写入，
//! 通过结束标记行判断输出是否读完。进程死亡后在下一次使用时透明重启。

use super::parser::OutcomeCollector;
use super::shell::ShellSpec;
use super::types::{ExecError, ExecutionOutcome};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Notify;

/// 结束标记前缀，正常输出中不应出现
const END_OF_COMMAND_TOKEN: &str = "---TWEAK-RUNNER-END-OF-EXECUTION";

/// 进程句柄；与 I/O 分开存放，使终止操作不必等待正在进行的命令
struct ProcessSlot {
    child: Child,
    pid: Option<u32>,
    killed: Arc<Notify>,
}

/// 只有持有会话内部锁的一方才能读写
struct ShellIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    killed: Arc<Notify>,
}

pub struct Session {
    id: usize,
    spec: Arc<ShellSpec>,
    io: tokio::sync::Mutex<Option<ShellIo>>,
    process: Mutex<Option<ProcessSlot>>,
    disposed: AtomicBool,
    seq: AtomicU64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("program", &self.spec.program)
            .field("pid", &self.pid())
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Session {
    /// 创建空会话，进程在首次使用或预热时才启动
    pub fn new(id: usize, spec: Arc<ShellSpec>) -> Self {
        Self {
            id,
            spec,
            io: tokio::sync::Mutex::new(None),
            process: Mutex::new(None),
            disposed: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock_process().as_ref().and_then(|slot| slot.pid)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// 进程存在且尚未退出
    pub fn is_alive(&self) -> bool {
        match self.lock_process().as_mut() {
            Some(slot) => matches!(slot.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// 预热：确保进程已启动
    pub async fn start(&self) -> Result<(), ExecError> {
        let mut io = self.io.lock().await;
        self.ensure_process(&mut io)
    }

    pub async fn run(&self, command: &str) -> ExecutionOutcome {
        self.run_with_timeout(command, None).await
    }

    /// 执行一条命令。超时后终止整个进程树并返回失败，下次使用时重启进程。
    pub async fn run_with_timeout(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> ExecutionOutcome {
        // 会话内部锁：同一时刻最多一条命令在执行
        let mut io = self.io.lock().await;

        if let Err(e) = self.ensure_process(&mut io) {
            log::warn!("[session {}] {}", self.id, e);
            return e.into();
        }

        let sentinel = format!(
            "{}-{}-{}---",
            END_OF_COMMAND_TOKEN,
            self.id,
            self.seq.fetch_add(1, Ordering::SeqCst)
        );
        let framed = self.spec.flavor.frame(command, &sentinel);

        let Some(shell) = io.as_mut() else {
            return ExecError::StdinUnavailable.into();
        };

        // 调用方在读完结束标记前丢弃 future 时，管道里会留下残余输出
        let mut guard = KillOnCancel::new(self);
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange(shell, &framed, &sentinel)).await
            {
                Ok(result) => result,
                Err(_) => {
                    log::warn!("[session {}] 命令超时 ({:?})，终止进程", self.id, limit);
                    self.kill();
                    Err(ExecError::Timeout(limit))
                }
            },
            None => exchange(shell, &framed, &sentinel).await,
        };
        guard.disarm();

        match result {
            Ok(Exchange::Completed(collector)) => collector.finish(),
            Ok(Exchange::Truncated(mut collector)) => {
                // 进程在输出结束标记前退出：返回已累积的内容，标记为失败
                log::warn!("[session {}] shell 进程在命令完成前退出", self.id);
                *io = None;
                collector.push_error("shell 进程在命令完成前退出");
                collector.finish()
            }
            Err(e) => {
                // 交换中途出错后流的位置不可信，丢弃 I/O 并终止进程，下次使用时重启
                *io = None;
                if !matches!(e, ExecError::Timeout(_) | ExecError::Killed) {
                    log::warn!("[session {}] {}，终止进程", self.id, e);
                    self.kill();
                }
                e.into()
            }
        }
    }

    /// 终止当前进程树；会话保持可用，下次使用时重新启动进程
    pub fn kill(&self) {
        let slot = self.lock_process().take();
        if let Some(mut slot) = slot {
            log::debug!("[session {}] 终止进程 {:?}", self.id, slot.pid);
            kill_process_tree(&mut slot.child, slot.pid);
            slot.killed.notify_one();
        }
    }

    /// 释放会话：终止进程且不再重启。可重复调用。
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            log::debug!("[session {}] 释放", self.id);
        }
        self.kill();
    }

    /// 进程缺失或已退出时启动新进程（调用方持有内部锁）
    fn ensure_process(&self, io: &mut Option<ShellIo>) -> Result<(), ExecError> {
        if self.is_disposed() {
            return Err(ExecError::Disposed);
        }
        if io.is_some() && self.is_alive() {
            return Ok(());
        }
        if io.is_some() {
            log::warn!("[session {}] shell 进程已退出，重新启动", self.id);
        }
        *io = None;
        // 丢弃残留的死进程句柄
        self.kill();
        *io = Some(self.spawn()?);
        Ok(())
    }

    fn spawn(&self) -> Result<ShellIo, ExecError> {
        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // 独立进程组，方便统一杀死 shell 及其派生的整棵进程树
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: self.spec.program.clone(),
            source,
        })?;

        let pid = child.id();
        let stdin = child.stdin.take().ok_or(ExecError::StdinUnavailable)?;
        let stdout = child.stdout.take().ok_or(ExecError::StdinUnavailable)?;

        if let Some(stderr) = child.stderr.take() {
            let id = self.id;
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                while let Ok(Some(line)) = read_line_lossy(&mut reader, &mut buf).await {
                    log::debug!("[session {}] stderr: {}", id, line);
                }
            });
        }

        let killed = Arc::new(Notify::new());
        {
            let mut process = self.lock_process();
            *process = Some(ProcessSlot {
                child,
                pid,
                killed: killed.clone(),
            });
        }

        // dispose 可能与启动并发发生，此时立即终止刚启动的进程
        if self.is_disposed() {
            self.kill();
            return Err(ExecError::Disposed);
        }

        log::debug!("[session {}] 已启动 {} (pid {:?})", self.id, self.spec.program, pid);

        Ok(ShellIo {
            stdin,
            stdout: BufReader::new(stdout),
            killed,
        })
    }

    fn lock_process(&self) -> MutexGuard<'_, Option<ProcessSlot>> {
        self.process.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.kill();
    }
}

/// 命令执行期间存活；未被解除就被丢弃说明调用方取消了等待
struct KillOnCancel<'a> {
    session: &'a Session,
    armed: bool,
}

impl<'a> KillOnCancel<'a> {
    fn new(session: &'a Session) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for KillOnCancel<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("[session {}] 命令被取消，终止进程", self.session.id);
            self.session.kill();
        }
    }
}

enum Exchange {
    Completed(OutcomeCollector),
    Truncated(OutcomeCollector),
}

/// 写入包装后的命令并读取输出直到结束标记
async fn exchange(shell: &mut ShellIo, framed: &str, sentinel: &str) -> Result<Exchange, ExecError> {
    shell.stdin.write_all(framed.as_bytes()).await?;
    shell.stdin.flush().await?;

    let mut collector = OutcomeCollector::new();
    let mut buf = Vec::new();
    loop {
        let line = tokio::select! {
            line = read_line_lossy(&mut shell.stdout, &mut buf) => line?,
            _ = shell.killed.notified() => return Err(ExecError::Killed),
        };

        match line {
            Some(line) if line.contains(sentinel) => return Ok(Exchange::Completed(collector)),
            // 其他命令留下的结束标记不属于本次输出
            Some(line) if line.trim_start().starts_with(END_OF_COMMAND_TOKEN) => {
                log::debug!("忽略过期的结束标记: {}", line.trim());
            }
            Some(line) => collector.push(&line),
            None => return Ok(Exchange::Truncated(collector)),
        }
    }
}

/// 按字节读取一行并宽松解码，非 UTF-8 字节替换为 U+FFFD，不会中断读取
async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    while matches!(buf.last().copied(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// 终止进程及其整个进程组 / 进程树
fn kill_process_tree(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) {
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(pid) = pid {
            let status = std::process::Command::new("taskkill")
                .args(["/T", "/F", "/PID", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            if let Err(e) = status {
                log::warn!("taskkill {} 失败: {}", pid, e);
            }
        }
    }

    if let Err(e) = child.start_kill() {
        // 进程已经退出时同样会走到这里
        log::debug!("start_kill {:?}: {}", pid, e);
    }
}
