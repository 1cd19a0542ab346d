#![allow(dead_code)]

use std::path::Path;
use tweak_runner::config::Config;
use tweak_runner::executor::ShellFlavor;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 使用 /bin/sh 的配置，不预热
pub fn posix_config(general: usize) -> Config {
    let mut config = Config::for_flavor(ShellFlavor::Posix);
    config.shell.program = Some("/bin/sh".to_string());
    config.lanes.general = general;
    config.lanes.warm_up = false;
    config
}

/// 安装 / 卸载 / 查询模板都落到临时目录里的标记文件上
pub fn package_config(dir: &Path, install_delay: &str) -> Config {
    let mut config = posix_config(2);
    let dir = dir.display();
    config.templates.install = format!("sleep {install_delay}; touch {dir}/{{id}}; echo installed {{id}}");
    config.templates.uninstall = format!("rm {dir}/{{id}} && echo removed {{id}}");
    config.templates.installed = format!("test -e {dir}/{{id}} && echo True || echo False");
    config
}
