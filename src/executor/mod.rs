//! 命令执行子系统：常驻 shell 会话池
//!
//! 调用方给出命令文本和通道，`Executor` 把命令派发到 General 会话池或
//! Installer 专用通道，借出会话执行后总是归还。

pub mod parser;
pub mod pool;
pub mod session;
pub mod shell;
pub mod types;

// 重新导出常用类型和函数
pub use parser::{is_error_line, parse_bool_output, OutcomeCollector};
pub use pool::{LanePool, LeasedSession};
pub use session::Session;
pub use shell::{ShellFlavor, ShellSpec};
pub use types::{ExecError, ExecutionOutcome, Lane, ShellCommand};

use crate::config::{CommandTemplates, Config, TimeoutConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 执行路由：对外的唯一入口
#[derive(Debug)]
pub struct Executor {
    general: LanePool,
    installer: LanePool,
    flavor: ShellFlavor,
    templates: CommandTemplates,
    timeouts: TimeoutConfig,
    warm_up: bool,
    closed: AtomicBool,
}

impl Executor {
    pub fn new(config: &Config) -> Self {
        let spec = Arc::new(config.shell.to_spec());
        let general_capacity = match config.lanes.general {
            0 => LanePool::general_capacity(),
            n => n,
        };

        log::debug!(
            "创建执行器: shell={} general={} installer=1",
            spec.program,
            general_capacity
        );

        Self {
            general: LanePool::new(Lane::General, general_capacity, spec.clone()),
            installer: LanePool::new(Lane::Installer, 1, spec.clone()),
            flavor: spec.flavor,
            templates: config.templates.clone(),
            timeouts: config.timeouts.clone(),
            warm_up: config.lanes.warm_up,
            closed: AtomicBool::new(false),
        }
    }

    pub fn pool(&self, lane: Lane) -> &LanePool {
        match lane {
            Lane::General => &self.general,
            Lane::Installer => &self.installer,
        }
    }

    pub fn templates(&self) -> &CommandTemplates {
        &self.templates
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 按配置预热 General 通道；Installer 通道始终在首次使用时才启动
    pub async fn warm_up(&self) {
        if self.warm_up && !self.is_closed() {
            self.general.warm_up().await;
        }
    }

    pub async fn execute(&self, command: &str, lane: Lane) -> ExecutionOutcome {
        self.execute_with_timeout(command, lane, None).await
    }

    pub async fn run(&self, command: &ShellCommand) -> ExecutionOutcome {
        self.execute(&command.text, command.lane).await
    }

    /// 借出会话执行命令；会话随 lease 离开作用域归还，无论成功、失败还是 panic
    pub async fn execute_with_timeout(
        &self,
        command: &str,
        lane: Lane,
        timeout: Option<Duration>,
    ) -> ExecutionOutcome {
        if self.is_closed() {
            return ExecError::LaneClosed(lane).into();
        }

        let lease = match self.pool(lane).acquire().await {
            Ok(lease) => lease,
            Err(e) => return e.into(),
        };

        let outcome = lease.run_with_timeout(command, timeout).await;
        if !outcome.success && lane == Lane::Installer {
            log::warn!("[{}] 命令失败: {}", lane, outcome.error);
        }
        outcome
    }

    /// 创建系统还原点（Installer 通道）
    pub async fn create_restore_point(&self, description: &str) -> bool {
        let command = self
            .templates
            .restore_point_create
            .replace("{description}", &self.flavor.quote(description));
        self.execute(&command, Lane::Installer).await.success
    }

    /// 查询还原点是否存在：命令成功且输出非空
    pub async fn restore_point_exists(&self, description: &str) -> bool {
        let command = self
            .templates
            .restore_point_query
            .replace("{description}", &self.flavor.quote(description));
        let outcome = self.execute(&command, Lane::General).await;
        outcome.success && !outcome.output.is_empty()
    }

    /// 查询包是否已安装（General 通道，带短超时）
    pub async fn is_package_installed(&self, package_id: &str) -> bool {
        let command = match render_package_template(&self.templates.installed, package_id) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("{}", e);
                return false;
            }
        };

        let outcome = self
            .execute_with_timeout(&command, Lane::General, Some(self.timeouts.query()))
            .await;
        outcome.success && parse_bool_output(&outcome.output).unwrap_or(false)
    }

    /// 关闭执行器：终止两个通道内的全部进程，正在执行的命令得到失败结果
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("关闭执行器");
        self.general.shutdown();
        self.installer.shutdown();
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 包 ID 只允许字母数字与 `._+-`，防止拼接进 shell 命令时被解释
pub fn validate_package_id(package_id: &str) -> Result<(), ExecError> {
    let valid = !package_id.is_empty()
        && package_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ExecError::InvalidPackageId(package_id.to_string()))
    }
}

pub fn render_package_template(template: &str, package_id: &str) -> Result<String, ExecError> {
    validate_package_id(package_id)?;
    Ok(template.replace("{id}", package_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_id_validation() {
        assert!(validate_package_id("Mozilla.Firefox").is_ok());
        assert!(validate_package_id("7zip.7zip").is_ok());
        assert!(validate_package_id("Notepad++.Notepad++").is_ok());
        assert!(validate_package_id("").is_err());
        assert!(validate_package_id("foo; rm -rf /").is_err());
        assert!(validate_package_id("a$(b)").is_err());
    }

    #[test]
    fn template_substitutes_every_placeholder() {
        let rendered = render_package_template("winget list --id {id} && echo {id}", "Git.Git")
            .expect("valid id");
        assert_eq!(rendered, "winget list --id Git.Git && echo Git.Git");
    }

    #[test]
    fn explicit_general_size_overrides_cpu_count() {
        let mut config = Config::for_flavor(ShellFlavor::Posix);
        config.lanes.general = 3;
        let executor = Executor::new(&config);
        assert_eq!(executor.pool(Lane::General).capacity(), 3);
        assert_eq!(executor.pool(Lane::Installer).capacity(), 1);
    }

    #[tokio::test]
    async fn closed_executor_fails_fast() {
        let executor = Executor::new(&Config::for_flavor(ShellFlavor::Posix));
        executor.shutdown();
        let outcome = executor.execute("echo hi", Lane::General).await;
        assert!(!outcome.success);
        assert!(executor.pool(Lane::Installer).is_closed());
    }
}
