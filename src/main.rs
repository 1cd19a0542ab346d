use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinSet;
use tweak_runner::{Config, Executor, ShellCommand};

/// 用法: tweak-runner <命令>...
/// 每个参数作为一条命令在 General 通道并发执行
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 加载配置
    let config = Config::load_or_default()?;

    let commands: Vec<String> = std::env::args().skip(1).collect();
    if commands.is_empty() {
        eprintln!("用法: tweak-runner <命令>...");
        eprintln!("配置文件: {}", Config::default_path().display());
        std::process::exit(2);
    }

    let executor = Arc::new(Executor::new(&config));
    executor.warm_up().await;

    let mut tasks = JoinSet::new();
    for (index, command) in commands.into_iter().enumerate() {
        let executor = executor.clone();
        tasks.spawn(async move {
            let command = ShellCommand::general(command);
            let outcome = executor.run(&command).await;
            (index, command.text, outcome)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, _, _)| *index);

    let mut failed = false;
    for (_, command, outcome) in &results {
        println!("$ {}", command);
        if !outcome.output.is_empty() {
            println!("{}", outcome.output);
        }
        if !outcome.success {
            failed = true;
            eprintln!("⚠ {}", outcome.error);
        }
    }

    executor.shutdown();

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
