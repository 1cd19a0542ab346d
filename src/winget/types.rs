//! 安装队列相关数据类型定义

use chrono::{DateTime, Local};
use std::fmt;

/// 一次安装 / 卸载请求，只会被队列消费一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WingetTask {
    pub package_id: String,
    pub install: bool,
    pub display_name: String,
}

impl WingetTask {
    pub fn new(package_id: impl Into<String>, install: bool, display_name: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            install,
            display_name: display_name.into(),
        }
    }

    pub fn status(&self) -> TaskStatus {
        if self.install {
            TaskStatus::Installing
        } else {
            TaskStatus::Uninstalling
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Installing,
    Uninstalling,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Installing => write!(f, "Installing..."),
            TaskStatus::Uninstalling => write!(f, "Uninstalling..."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WingetProgress {
    pub package_id: String,
    pub display_name: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WingetCompleted {
    pub package_id: String,
    pub display_name: String,
    pub success: bool,
    pub was_install: bool,
    pub finished_at: DateTime<Local>,
}

/// 推送给界面层的队列事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Progress(WingetProgress),
    Completed(WingetCompleted),
}

impl QueueEvent {
    pub fn package_id(&self) -> &str {
        match self {
            QueueEvent::Progress(p) => &p.package_id,
            QueueEvent::Completed(c) => &c.package_id,
        }
    }
}
