//! shell 方言与命令封装协议

use serde::{Deserialize, Serialize};

/// 会话所使用的 shell 方言，决定命令如何被包装
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellFlavor {
    #[serde(alias = "pwsh")]
    PowerShell,
    #[serde(alias = "sh")]
    Posix,
}

impl ShellFlavor {
    pub fn native() -> Self {
        if cfg!(windows) {
            ShellFlavor::PowerShell
        } else {
            ShellFlavor::Posix
        }
    }

    pub fn default_program(&self) -> &'static str {
        match self {
            ShellFlavor::PowerShell => "powershell.exe",
            ShellFlavor::Posix => "sh",
        }
    }

    /// `-Command -` 让 PowerShell 从标准输入读取命令
    pub fn default_args(&self) -> Vec<String> {
        match self {
            ShellFlavor::PowerShell => [
                "-NoExit",
                "-NoProfile",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                "-",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ShellFlavor::Posix => Vec::new(),
        }
    }

    /// 包装命令：清空错误状态、在内层作用域执行、捕获异常并输出为单行错误、
    /// 最后输出结束标记行。
    ///
    /// 命令以引号字面量的形式交给 shell 再解析，引号不配对等语法错误只会
    /// 让这一条命令失败，不会吞掉后面的结束标记。
    pub fn frame(&self, command: &str, sentinel: &str) -> String {
        match self {
            // `-Command -` 遇到空行就结束一段输入，所以逐行引用后在 PowerShell 里拼回
            ShellFlavor::PowerShell => {
                let lines: Vec<String> = command.lines().map(|line| self.quote(line)).collect();
                let script = if lines.is_empty() {
                    "''".to_string()
                } else {
                    lines.join(", ")
                };
                format!(
                    "$OutputEncoding = [System.Console]::OutputEncoding = [System.Text.Encoding]::UTF8\n\
                     $Error.Clear()\n\
                     try {{ & ([ScriptBlock]::Create((@({script}) -join \"`n\"))) 2>&1 }} \
                     catch {{ Write-Output (\"Error : \" + ($_.Exception.Message -replace \"`r?`n\", ' ')) }}\n\
                     Write-Output '{sentinel}'\n\n"
                )
            }
            // 子 shell 隔离变量；stdin 重定向防止命令吞掉后续输入
            ShellFlavor::Posix => format!(
                "( eval {} ) 2>&1 </dev/null || echo \"Error : exit status $?\"\n\
                 echo '{sentinel}'\n",
                self.quote(command)
            ),
        }
    }

    /// 把文本包成单引号字面量
    pub fn quote(&self, value: &str) -> String {
        match self {
            ShellFlavor::PowerShell => format!("'{}'", value.replace('\'', "''")),
            ShellFlavor::Posix => format!("'{}'", value.replace('\'', "'\\''")),
        }
    }
}

/// 启动会话进程所需的全部信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpec {
    pub flavor: ShellFlavor,
    pub program: String,
    pub args: Vec<String>,
}

impl ShellSpec {
    pub fn new(flavor: ShellFlavor) -> Self {
        Self {
            flavor,
            program: flavor.default_program().to_string(),
            args: flavor.default_args(),
        }
    }
}

impl Default for ShellSpec {
    fn default() -> Self {
        Self::new(ShellFlavor::native())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_frame_ends_with_sentinel() {
        let framed = ShellFlavor::Posix.frame("echo hi", "---END-1---");
        assert!(framed.starts_with("( eval 'echo hi' )"));
        assert!(framed.contains("</dev/null"));
        assert!(framed.trim_end().ends_with("echo '---END-1---'"));
    }

    #[test]
    fn posix_frame_keeps_unbalanced_quote_inside_literal() {
        let framed = ShellFlavor::Posix.frame("echo 'oops", "---END-3---");
        assert!(framed.starts_with("( eval 'echo '\\''oops' )"));
        assert!(framed.trim_end().ends_with("echo '---END-3---'"));
    }

    #[test]
    fn powershell_frame_isolates_scope_and_catches() {
        let framed = ShellFlavor::PowerShell.frame("Get-Date\n\nGet-Location", "---END-2---");
        assert!(framed.contains("$Error.Clear()"));
        assert!(framed.contains("[ScriptBlock]::Create((@('Get-Date', '', 'Get-Location') -join"));
        assert!(framed.contains("catch {"));
        assert!(framed.contains("Write-Output '---END-2---'"));
        // 命令里的空行不能提前结束输入
        assert_eq!(framed.matches("\n\n").count(), 1);
        assert!(framed.ends_with("\n\n"));
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(ShellFlavor::PowerShell.quote("it's"), "'it''s'");
        assert_eq!(ShellFlavor::Posix.quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn default_spec_matches_flavor() {
        let spec = ShellSpec::new(ShellFlavor::Posix);
        assert_eq!(spec.program, "sh");
        assert!(spec.args.is_empty());

        let spec = ShellSpec::new(ShellFlavor::PowerShell);
        assert_eq!(spec.args.last().map(String::as_str), Some("-"));
    }
}
