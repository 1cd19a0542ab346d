//! 安装 / 卸载队列
//!
//! 请求按提交顺序逐个在 Installer 通道执行。`submit` 立即返回
//! `TaskTicket`，后台只会有一个排空任务在运行：单许可信号量拿不到时
//! 说明已有排空任务，它会一直循环到队列为空。

use super::types::{QueueEvent, WingetCompleted, WingetProgress, WingetTask};
use crate::executor::{render_package_template, Executor, Lane};
use chrono::Local;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

struct QueueEntry {
    task: WingetTask,
    result: oneshot::Sender<bool>,
}

struct QueueInner {
    executor: Arc<Executor>,
    pending: Mutex<VecDeque<QueueEntry>>,
    worker_gate: Arc<Semaphore>,
    events: mpsc::UnboundedSender<QueueEvent>,
    timeout: Duration,
}

#[derive(Clone)]
pub struct InstallQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for InstallQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallQueue")
            .field("pending", &self.pending_len())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl InstallQueue {
    /// 超时取执行器配置中的安装上限
    pub fn new(executor: Arc<Executor>) -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let timeout = executor.timeouts().install();
        Self::with_timeout(executor, timeout)
    }

    pub fn with_timeout(
        executor: Arc<Executor>,
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let queue = Self {
            inner: Arc::new(QueueInner {
                executor,
                pending: Mutex::new(VecDeque::new()),
                worker_gate: Arc::new(Semaphore::new(1)),
                events,
                timeout,
            }),
        };
        (queue, events_rx)
    }

    /// 入队并返回结果凭证；必须在 tokio 运行时内调用
    pub fn submit(
        &self,
        package_id: impl Into<String>,
        install: bool,
        display_name: impl Into<String>,
    ) -> TaskTicket {
        let task = WingetTask::new(package_id, install, display_name);
        let (tx, rx) = oneshot::channel();
        let ticket = TaskTicket {
            package_id: task.package_id.clone(),
            rx,
        };

        log::debug!("入队: {} ({})", task.package_id, task.status());
        self.inner.lock_pending().push_back(QueueEntry { task, result: tx });
        QueueInner::kick(&self.inner);

        ticket
    }

    pub fn submit_install(
        &self,
        package_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> TaskTicket {
        self.submit(package_id, true, display_name)
    }

    pub fn submit_uninstall(
        &self,
        package_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> TaskTicket {
        self.submit(package_id, false, display_name)
    }

    /// 尚未开始执行的任务数
    pub fn pending_len(&self) -> usize {
        self.inner.lock_pending().len()
    }

    /// 队列不做去重，调用方可以据此自行决定是否重复提交
    pub fn is_pending(&self, package_id: &str) -> bool {
        self.inner
            .lock_pending()
            .iter()
            .any(|entry| entry.task.package_id == package_id)
    }
}

impl QueueInner {
    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 没有排空任务在运行时启动一个
    fn kick(inner: &Arc<Self>) {
        let Ok(permit) = inner.worker_gate.clone().try_acquire_owned() else {
            return;
        };
        let inner = inner.clone();
        tokio::spawn(async move {
            inner.drain(permit).await;
        });
    }

    async fn drain(self: Arc<Self>, mut permit: OwnedSemaphorePermit) {
        loop {
            loop {
                let entry = self.lock_pending().pop_front();
                match entry {
                    Some(entry) => self.process(entry).await,
                    None => break,
                }
            }

            drop(permit);
            // 释放许可与新任务入队之间存在窗口，需要重新检查
            if self.lock_pending().is_empty() {
                return;
            }
            match self.worker_gate.clone().try_acquire_owned() {
                Ok(next) => permit = next,
                Err(_) => return,
            }
        }
    }

    async fn process(&self, entry: QueueEntry) {
        let QueueEntry { task, result } = entry;

        log::info!("开始 {} {}", task.status(), task.package_id);
        self.emit(QueueEvent::Progress(WingetProgress {
            package_id: task.package_id.clone(),
            display_name: task.display_name.clone(),
            status: task.status(),
        }));

        // 在独立任务中执行，panic 只影响当前任务，排空循环继续
        let executor = self.executor.clone();
        let timeout = self.timeout;
        let job = task.clone();
        let success = match tokio::spawn(async move { run_task(&executor, &job, timeout).await }).await {
            Ok(success) => success,
            Err(e) => {
                log::warn!("任务 {} 异常: {}", task.package_id, e);
                false
            }
        };

        log::info!(
            "完成 {} {}: {}",
            task.status(),
            task.package_id,
            if success { "成功" } else { "失败" }
        );
        self.emit(QueueEvent::Completed(WingetCompleted {
            package_id: task.package_id.clone(),
            display_name: task.display_name.clone(),
            success,
            was_install: task.install,
            finished_at: Local::now(),
        }));

        let _ = result.send(success);
    }

    /// 界面层已丢弃接收端时事件直接作废
    fn emit(&self, event: QueueEvent) {
        if self.events.send(event).is_err() {
            log::trace!("事件无人接收");
        }
    }
}

async fn run_task(executor: &Executor, task: &WingetTask, timeout: Duration) -> bool {
    let templates = executor.templates();
    let template = if task.install {
        &templates.install
    } else {
        &templates.uninstall
    };

    let command = match render_package_template(template, &task.package_id) {
        Ok(command) => command,
        Err(e) => {
            log::warn!("{}", e);
            return false;
        }
    };

    executor
        .execute_with_timeout(&command, Lane::Installer, Some(timeout))
        .await
        .success
}

/// 单个请求的结果凭证，await 得到是否成功
#[derive(Debug)]
pub struct TaskTicket {
    package_id: String,
    rx: oneshot::Receiver<bool>,
}

impl TaskTicket {
    pub fn package_id(&self) -> &str {
        &self.package_id
    }
}

impl Future for TaskTicket {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        // 队列在完成前被丢弃时视为失败
        Pin::new(&mut self.rx).poll(cx).map(|r| r.unwrap_or(false))
    }
}
