//! 输出解析函数

use super::types::ExecutionOutcome;

/// 清理终端输出中的 ANSI 转义序列和控制字符（单行）
pub fn clean_terminal_line(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            c if c.is_control() && c != '\t' => {}
            _ => result.push(c),
        }
    }

    result
}

/// 判断一行是否属于错误输出
///
/// 启发式规则：同时包含 " : " 与 "Error" 或 "Exception"。
/// 这不是结构化解析，普通输出里恰好出现这些字样时会被误判。
pub fn is_error_line(line: &str) -> bool {
    line.contains(" : ") && (line.contains("Error") || line.contains("Exception"))
}

/// 按行累积命令输出，最终生成 `ExecutionOutcome`
#[derive(Debug, Default)]
pub struct OutcomeCollector {
    output: Vec<String>,
    error: Vec<String>,
}

impl OutcomeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: &str) {
        let line = clean_terminal_line(raw);
        if is_error_line(&line) {
            self.error.push(line);
        } else if !line.trim().is_empty() {
            self.output.push(line);
        }
    }

    /// 追加一条来自执行器本身的错误说明（不经过启发式分类）
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.error.push(message.into());
    }

    pub fn finish(self) -> ExecutionOutcome {
        let output = self.output.join("\n").trim().to_string();
        let error = self.error.join("\n").trim().to_string();
        ExecutionOutcome::new(output, error)
    }
}

/// 解析形如 "True" / "False" 的布尔输出，取最后一个非空行
pub fn parse_bool_output(output: &str) -> Option<bool> {
    let last = output.lines().rev().find(|l| !l.trim().is_empty())?;
    match last.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ansi_sequences() {
        assert_eq!(clean_terminal_line("\x1b[32mok\x1b[0m\r"), "ok");
        assert_eq!(clean_terminal_line("a\tb"), "a\tb");
    }

    #[test]
    fn error_heuristic_needs_separator_and_keyword() {
        assert!(is_error_line("Get-Item : Cannot find path. ItemNotFoundException"));
        assert!(is_error_line("Error : exit status 3"));
        assert!(!is_error_line("Error without separator"));
        assert!(!is_error_line("key : value"));
    }

    #[test]
    fn plain_lines_are_preserved_in_order() {
        let mut collector = OutcomeCollector::new();
        for line in ["", "  first", "second", "   ", "third  "] {
            collector.push(line);
        }
        let outcome = collector.finish();
        assert!(outcome.success);
        assert_eq!(outcome.output, "first\nsecond\nthird");
        assert!(outcome.error.is_empty());
    }

    #[test]
    fn error_line_marks_failure() {
        let mut collector = OutcomeCollector::new();
        collector.push("working");
        collector.push("Set-ItemProperty : Access Error");
        let outcome = collector.finish();
        assert!(!outcome.success);
        assert_eq!(outcome.output, "working");
        assert_eq!(outcome.error, "Set-ItemProperty : Access Error");
    }

    #[test]
    fn bool_output_uses_last_line() {
        assert_eq!(parse_bool_output("noise\nTrue\n"), Some(true));
        assert_eq!(parse_bool_output("False"), Some(false));
        assert_eq!(parse_bool_output("maybe"), None);
        assert_eq!(parse_bool_output(""), None);
    }
}
