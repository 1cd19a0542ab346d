//! 目录条目（开关 / 按钮 / 应用包）的状态检查与执行
//!
//! 目录文档的读写属于配置层，这里只负责把条目上的命令交给执行器。

use crate::executor::{parse_bool_output, ExecutionOutcome, Executor, Lane};
use crate::winget::InstallQueue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tweak {
    pub name: String,
    pub purpose: String,
    /// 输出 True / False 的检查命令
    pub check: String,
    #[serde(rename = "true")]
    pub enable: String,
    #[serde(rename = "false")]
    pub disable: String,
    pub button: Option<String>,
    pub package_id: Option<String>,
    pub is_user_tweak: bool,
}

impl Tweak {
    pub fn is_package(&self) -> bool {
        self.package_id.is_some()
    }
}

/// 查询条目当前状态；无法判断时返回 None，调用方保持原状态
pub async fn check_state(executor: &Executor, tweak: &Tweak) -> Option<bool> {
    if let Some(package_id) = &tweak.package_id {
        return Some(executor.is_package_installed(package_id).await);
    }
    if tweak.check.trim().is_empty() {
        return None;
    }

    let outcome = executor.execute(&tweak.check, Lane::General).await;
    if !outcome.success {
        log::debug!("检查 '{}' 失败: {}", tweak.name, outcome.error);
        return None;
    }
    parse_bool_output(&outcome.output)
}

/// 切换条目。应用包走安装队列，其余命令走 General 通道。
pub async fn apply(
    executor: &Executor,
    queue: &InstallQueue,
    tweak: &Tweak,
    on: bool,
) -> ExecutionOutcome {
    if let Some(package_id) = &tweak.package_id {
        let success = queue.submit(package_id.as_str(), on, tweak.name.as_str()).await;
        return if success {
            ExecutionOutcome::ok(format!("{} 操作完成", package_id))
        } else {
            ExecutionOutcome::failure(format!("{} 操作失败", package_id))
        };
    }

    let command = if on { &tweak.enable } else { &tweak.disable };
    if command.trim().is_empty() {
        return ExecutionOutcome::failure(format!("'{}' 没有对应的命令", tweak.name));
    }
    executor.execute(command, Lane::General).await
}

/// 执行按钮命令
pub async fn run_button(executor: &Executor, tweak: &Tweak) -> ExecutionOutcome {
    match tweak.button.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(command) => executor.execute(command, Lane::General).await,
        None => ExecutionOutcome::failure(format!("'{}' 没有按钮命令", tweak.name)),
    }
}
