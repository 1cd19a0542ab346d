//! 通道会话池
//!
//! 计数信号量限制同一通道内同时执行的命令数，空闲会话放在共享列表中，
//! 谁拿到许可谁就取走任意一个空闲会话，用完后通过 `LeasedSession` 的
//! `Drop` 归还。

use super::session::Session;
use super::shell::ShellSpec;
use super::types::{ExecError, Lane};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

#[derive(Debug, Default)]
struct PoolShared {
    idle: Mutex<Vec<Arc<Session>>>,
    closed: AtomicBool,
}

impl PoolShared {
    fn lock_idle(&self) -> MutexGuard<'_, Vec<Arc<Session>>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
pub struct LanePool {
    lane: Lane,
    capacity: usize,
    spec: Arc<ShellSpec>,
    gate: Arc<Semaphore>,
    shared: Arc<PoolShared>,
    /// 曾经创建过的全部会话（含借出中的），关闭时逐个释放
    all: Mutex<Vec<Arc<Session>>>,
    next_id: AtomicUsize,
}

impl LanePool {
    pub fn new(lane: Lane, capacity: usize, spec: Arc<ShellSpec>) -> Self {
        let capacity = capacity.max(1);
        Self {
            lane,
            capacity,
            spec,
            gate: Arc::new(Semaphore::new(capacity)),
            shared: Arc::new(PoolShared::default()),
            all: Mutex::new(Vec::with_capacity(capacity)),
            next_id: AtomicUsize::new(0),
        }
    }

    /// General 通道的默认容量：max(2, 逻辑 CPU 数)
    pub fn general_capacity() -> usize {
        num_cpus::get().max(2)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前空闲的许可数
    pub fn available(&self) -> usize {
        self.gate.available_permits()
    }

    pub fn idle_count(&self) -> usize {
        self.shared.lock_idle().len()
    }

    pub fn session_count(&self) -> usize {
        self.lock_all().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// 等待许可后借出一个会话；空闲列表为空时新建
    pub async fn acquire(&self) -> Result<LeasedSession, ExecError> {
        if self.is_closed() {
            return Err(ExecError::LaneClosed(self.lane));
        }

        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExecError::LaneClosed(self.lane))?;

        let reused = self.shared.lock_idle().pop();
        let session = match reused {
            Some(session) => session,
            None => self.create_session(),
        };

        log::debug!("[{}] 借出会话 {}", self.lane, session.id());

        Ok(LeasedSession {
            session,
            shared: self.shared.clone(),
            lane: self.lane,
            _permit: permit,
        })
    }

    /// 预先创建并启动全部会话
    pub async fn warm_up(&self) {
        if self.is_closed() {
            return;
        }

        let missing = self.capacity.saturating_sub(self.session_count());
        let mut tasks = JoinSet::new();
        for _ in 0..missing {
            let session = Arc::new(self.create_session_detached());
            tasks.spawn(async move {
                if let Err(e) = session.start().await {
                    log::warn!("预热会话 {} 失败: {}", session.id(), e);
                }
                session
            });
        }

        let mut started = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(session) => {
                    self.lock_all().push(session.clone());
                    self.shared.lock_idle().push(session);
                    started += 1;
                }
                Err(e) => log::warn!("预热任务异常: {}", e),
            }
        }

        // 预热与关闭并发时，刚启动的会话也要释放
        if self.is_closed() {
            self.dispose_all();
        }

        log::info!("[{}] 预热完成，{} 个会话", self.lane, started);
    }

    /// 关闭通道：拒绝新的借出请求，终止全部会话（含正在执行命令的会话）
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.gate.close();
        self.dispose_all();
        log::info!("[{}] 通道已关闭", self.lane);
    }

    fn dispose_all(&self) {
        let sessions: Vec<Arc<Session>> = self.lock_all().clone();
        for session in sessions {
            session.dispose();
        }
        self.shared.lock_idle().clear();
    }

    fn create_session(&self) -> Arc<Session> {
        let session = Arc::new(self.create_session_detached());
        self.lock_all().push(session.clone());
        session
    }

    fn create_session_detached(&self) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Session::new(id, self.spec.clone())
    }

    fn lock_all(&self) -> MutexGuard<'_, Vec<Arc<Session>>> {
        self.all.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 借出的会话，离开作用域时自动归还并释放许可
#[derive(Debug)]
pub struct LeasedSession {
    session: Arc<Session>,
    shared: Arc<PoolShared>,
    lane: Lane,
    _permit: OwnedSemaphorePermit,
}

impl Deref for LeasedSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for LeasedSession {
    fn drop(&mut self) {
        // 已崩溃的会话同样归还，下次借出时自行重启
        if self.shared.closed.load(Ordering::SeqCst) {
            self.session.dispose();
        } else {
            log::debug!("[{}] 归还会话 {}", self.lane, self.session.id());
            self.shared.lock_idle().push(self.session.clone());
        }
        // 许可在此之后随字段一起释放
    }
}
