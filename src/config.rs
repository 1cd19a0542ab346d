use crate::executor::{ShellFlavor, ShellSpec};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub shell: ShellConfig,
    pub lanes: LaneConfig,
    pub timeouts: TimeoutConfig,
    pub templates: CommandTemplates,
}

/// shell 进程设置；program / args 为空时使用方言默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub flavor: ShellFlavor,
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            flavor: ShellFlavor::native(),
            program: None,
            args: None,
        }
    }
}

impl ShellConfig {
    pub fn to_spec(&self) -> ShellSpec {
        let mut spec = ShellSpec::new(self.flavor);
        if let Some(program) = &self.program {
            spec.program = program.clone();
        }
        if let Some(args) = &self.args {
            spec.args = args.clone();
        }
        spec
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// General 通道会话数，0 表示自动（max(2, CPU 数)）
    pub general: usize,
    pub warm_up: bool,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            general: 0,
            warm_up: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub install_secs: u64,
    pub query_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            install_secs: 15 * 60,
            query_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install_secs)
    }

    pub fn query(&self) -> Duration {
        Duration::from_secs(self.query_secs)
    }
}

/// 命令模板，占位符：`{id}`、`{description}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub install: String,
    pub uninstall: String,
    /// 必须输出 True / False
    pub installed: String,
    pub restore_point_create: String,
    /// 存在时输出非空内容
    pub restore_point_query: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self::for_flavor(ShellFlavor::native())
    }
}

impl CommandTemplates {
    pub fn for_flavor(flavor: ShellFlavor) -> Self {
        match flavor {
            ShellFlavor::PowerShell => Self {
                install: "winget install --id {id} -e --accept-source-agreements --accept-package-agreements --silent --force; \
                          if ($LASTEXITCODE -ne 0) { throw \"winget exited with code $LASTEXITCODE\" }"
                    .to_string(),
                uninstall: "winget uninstall --id {id} -e --accept-source-agreements --silent; \
                            if ($LASTEXITCODE -ne 0) { throw \"winget exited with code $LASTEXITCODE\" }"
                    .to_string(),
                installed: "winget list --id {id} --exact --accept-source-agreements | Out-Null; $LASTEXITCODE -eq 0"
                    .to_string(),
                restore_point_create:
                    "Checkpoint-Computer -Description {description} -RestorePointType 'MODIFY_SETTINGS'"
                        .to_string(),
                restore_point_query: "Get-ComputerRestorePoint | Where-Object { $_.Description -eq {description} } | \
                                      Select-Object -First 1 -ExpandProperty Description"
                    .to_string(),
            },
            // 非 Windows 环境没有 winget，默认模板直接报告失败
            ShellFlavor::Posix => Self {
                install: "echo 'Error : no package manager configured for {id}'".to_string(),
                uninstall: "echo 'Error : no package manager configured for {id}'".to_string(),
                installed: "echo False".to_string(),
                restore_point_create: "echo 'Error : restore points are not supported'".to_string(),
                restore_point_query: "true".to_string(),
            },
        }
    }
}

impl Config {
    /// 默认配置文件路径：<config_dir>/tweak-runner/config.toml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tweak-runner/config.toml")
    }

    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件 {} 失败", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("解析配置文件 {} 失败", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 以指定方言构造配置，模板随方言切换
    pub fn for_flavor(flavor: ShellFlavor) -> Self {
        Self {
            shell: ShellConfig {
                flavor,
                program: None,
                args: None,
            },
            templates: CommandTemplates::for_flavor(flavor),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.lanes.general, 0);
        assert!(config.lanes.warm_up);
        assert_eq!(config.timeouts.install(), Duration::from_secs(900));
        assert_eq!(config.timeouts.query(), Duration::from_secs(5));
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [shell]
            flavor = "posix"
            program = "/bin/sh"

            [timeouts]
            install_secs = 30
            "#,
        )
        .expect("parse");

        assert_eq!(config.shell.flavor, ShellFlavor::Posix);
        let spec = config.shell.to_spec();
        assert_eq!(spec.program, "/bin/sh");
        assert!(spec.args.is_empty());
        assert_eq!(config.timeouts.install_secs, 30);
        assert_eq!(config.timeouts.query_secs, 5);
    }

    #[test]
    fn save_and_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::for_flavor(ShellFlavor::PowerShell);
        config.lanes.general = 3;
        config.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded, config);
        assert!(loaded.templates.install.contains("winget install --id {id}"));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[lanes\ngeneral = ").expect("write");

        let err = Config::load_from(&path).expect_err("should fail");
        assert!(format!("{:#}", err).contains("config.toml"));
    }
}
