//! winget 安装 / 卸载队列

pub mod queue;
pub mod types;

pub use queue::{InstallQueue, TaskTicket};
pub use types::{QueueEvent, TaskStatus, WingetCompleted, WingetProgress, WingetTask};
