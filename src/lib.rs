//! Windows 调优工具的命令执行核心
//!
//! - `executor`：常驻 shell 会话池，General / Installer 两个通道
//! - `winget`：串行的安装 / 卸载队列
//! - `tweak`：目录条目的检查与切换
//! - `config`：执行器配置

pub mod config;
pub mod executor;
pub mod tweak;
pub mod winget;

pub use config::Config;
pub use executor::{ExecutionOutcome, Executor, Lane, ShellCommand};
pub use winget::{InstallQueue, QueueEvent};
