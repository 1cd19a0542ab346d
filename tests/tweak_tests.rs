#![cfg(unix)]

mod common;

use std::sync::Arc;
use tweak_runner::tweak::{self, Tweak};
use tweak_runner::winget::InstallQueue;
use tweak_runner::Executor;

fn toggle(dir: &std::path::Path) -> Tweak {
    let flag = dir.join("flag");
    Tweak {
        name: "Flag".to_string(),
        check: format!("test -e {} && echo True || echo False", flag.display()),
        enable: format!("touch {}", flag.display()),
        disable: format!("rm -f {}", flag.display()),
        button: Some("echo pressed".to_string()),
        ..Tweak::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn toggle_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(Executor::new(&common::posix_config(2)));
    let (queue, _events) = InstallQueue::new(executor.clone());
    let item = toggle(dir.path());

    assert_eq!(tweak::check_state(&executor, &item).await, Some(false));
    assert!(tweak::apply(&executor, &queue, &item, true).await.success);
    assert_eq!(tweak::check_state(&executor, &item).await, Some(true));
    assert!(tweak::apply(&executor, &queue, &item, false).await.success);
    assert_eq!(tweak::check_state(&executor, &item).await, Some(false));

    assert_eq!(tweak::run_button(&executor, &item).await.output, "pressed");
}

#[tokio::test]
async fn unknown_state_is_none() {
    let executor = Executor::new(&common::posix_config(2));

    let mut item = Tweak {
        name: "Odd".to_string(),
        check: "echo maybe".to_string(),
        ..Tweak::default()
    };
    assert_eq!(tweak::check_state(&executor, &item).await, None);

    item.check = "exit 1".to_string();
    assert_eq!(tweak::check_state(&executor, &item).await, None);

    item.check.clear();
    assert_eq!(tweak::check_state(&executor, &item).await, None);
    assert!(!tweak::run_button(&executor, &item).await.success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn package_items_go_through_the_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(Executor::new(&common::package_config(dir.path(), "0")));
    let (queue, _events) = InstallQueue::new(executor.clone());
    let item = Tweak {
        name: "Editor".to_string(),
        package_id: Some("Some.Editor".to_string()),
        ..Tweak::default()
    };

    assert_eq!(tweak::check_state(&executor, &item).await, Some(false));
    assert!(tweak::apply(&executor, &queue, &item, true).await.success);
    assert_eq!(tweak::check_state(&executor, &item).await, Some(true));
    assert!(tweak::apply(&executor, &queue, &item, false).await.success);
    assert_eq!(tweak::check_state(&executor, &item).await, Some(false));
}
