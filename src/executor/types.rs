//! 执行子系统相关数据类型定义

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// 单条命令的执行结果
///
/// `success` 当且仅当没有任何一行被归类为错误输出时为 true。
/// `output` / `error` 均已去除首尾空白，缺省为空字符串。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub output: String,
    pub error: String,
}

impl ExecutionOutcome {
    pub fn new(output: String, error: String) -> Self {
        Self {
            success: error.is_empty(),
            output,
            error,
        }
    }

    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into().trim().to_string(),
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "未知错误".to_string()
        } else {
            error.trim().to_string()
        };
        Self {
            success: false,
            output: String::new(),
            error,
        }
    }
}

/// 并发通道
///
/// General 用于快速、频繁的状态检查与切换；
/// Installer 专供耗时的包管理器操作，容量固定为 1。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    General,
    Installer,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::General => write!(f, "general"),
            Lane::Installer => write!(f, "installer"),
        }
    }
}

/// 带通道标记的命令，通道由调用方决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub text: String,
    pub lane: Lane,
}

impl ShellCommand {
    pub fn general(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lane: Lane::General,
        }
    }

    pub fn installer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lane: Lane::Installer,
        }
    }
}

/// 子系统内部错误，在公共接口边界转换为失败的 `ExecutionOutcome`
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("无法启动 shell 进程 '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("shell 进程标准输入不可用")]
    StdinUnavailable,
    #[error("与 shell 进程通信失败: {0}")]
    Io(#[from] io::Error),
    #[error("shell 进程在命令执行期间被终止")]
    Killed,
    #[error("命令执行超时 ({0:?})，已终止 shell 进程")]
    Timeout(Duration),
    #[error("会话已释放")]
    Disposed,
    #[error("{0} 通道已关闭")]
    LaneClosed(Lane),
    #[error("非法的包 ID: '{0}'")]
    InvalidPackageId(String),
}

impl From<ExecError> for ExecutionOutcome {
    fn from(err: ExecError) -> Self {
        ExecutionOutcome::failure(err.to_string())
    }
}
