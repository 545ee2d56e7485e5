use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{builtin_runner, count, policy, test_runner, TEST_LANGS};
use crate::{
    sandbox::DEFAULT_PATH, Error, LangSpec, LimitOverrides, Registry, Runner, StageStatus,
    Submission,
};

#[tokio::test]
async fn interpreted_hello() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let result = runner
        .run(&Submission::new("echo hi", "shell"))
        .await
        .unwrap();

    assert_eq!(result.build_output.status, StageStatus::Succeeded);
    assert!(result.build_output.stdout.is_empty());
    let execute = result.execute_output.unwrap();
    assert_eq!(execute.status, StageStatus::Succeeded);
    assert_eq!(execute.stdout, "hi\n");
    assert_eq!(execute.exit_code, Some(0));
    assert!(!result.truncated);
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn stdin_is_forwarded() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let result = runner
        .run_source("tr a-z A-Z", "shell", Some("shout\n"), LimitOverrides::default())
        .await
        .unwrap();

    assert_eq!(result.execute_output.unwrap().stdout, "SHOUT\n");
}

#[tokio::test]
async fn runtime_error_is_data() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let result = runner
        .run(&Submission::new("echo oops >&2; exit 7", "shell"))
        .await
        .unwrap();

    let execute = result.execute_output.unwrap();
    assert_eq!(execute.status, StageStatus::Failed);
    assert_eq!(execute.exit_code, Some(7));
    assert_eq!(execute.stderr, "oops\n");
}

#[tokio::test]
async fn compile_then_run() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let result = runner
        .run(&Submission::new("# ok;\necho compiled", "fakec"))
        .await
        .unwrap();

    assert_eq!(result.build_output.status, StageStatus::Succeeded);
    assert_eq!(result.execute_output.unwrap().stdout, "compiled\n");
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn compile_failure_skips_execute() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let result = runner
        .run(&Submission::new("echo missing semicolon", "fakec"))
        .await
        .unwrap();

    assert_eq!(result.build_output.status, StageStatus::Failed);
    assert!(!result.build_output.stderr.is_empty());
    assert!(result.execute_output.is_none());
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn timeout() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let submission = Submission::new("sleep 10", "shell")
        .execute_limits(LimitOverrides::default().timeout_millis(300));
    let result = runner.run(&submission).await.unwrap();

    let execute = result.execute_output.unwrap();
    assert_eq!(execute.status, StageStatus::TimedOut);
    assert!(execute.elapsed_millis < 2000, "{}", execute.elapsed_millis);
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn memory_exceeded() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let submission = Submission::new(
        "a=$(head -c 300000000 /dev/zero | tr '\\0' a)\necho ${#a}",
        "shell",
    )
    .limits(
        LimitOverrides::default()
            .memory_bytes(32 * 1024 * 1024)
            .timeout_millis(20_000)
            .cpu_millis(20_000),
    );
    let result = runner.run(&submission).await.unwrap();

    assert_eq!(
        result.execute_output.unwrap().status,
        StageStatus::MemoryExceeded
    );
}

#[tokio::test]
async fn output_truncated_at_cap() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let submission = Submission::new("yes | head -c 100000", "shell")
        .limits(LimitOverrides::default().max_output_bytes(1000));
    let result = runner.run(&submission).await.unwrap();

    assert!(result.truncated);
    let execute = result.execute_output.unwrap();
    assert!(execute.truncated);
    assert_eq!(execute.stdout.len(), 1000);
    assert_eq!(execute.status, StageStatus::Succeeded);
}

#[tokio::test]
async fn ceiling_clamps_overrides() {
    let root = tempfile::tempdir().unwrap();
    let registry = Registry::new(LangSpec::parse(TEST_LANGS).unwrap(), DEFAULT_PATH);
    let runner = Runner::builder(registry)
        .temp(root.path())
        .policy(policy())
        .ceiling(crate::Limits {
            timeout_millis: 300,
            ..crate::Limits::ceiling()
        })
        .build();

    let submission = Submission::new("sleep 10", "shell")
        .limits(LimitOverrides::default().timeout_millis(60_000));
    let result = runner.run(&submission).await.unwrap();

    assert_eq!(
        result.execute_output.unwrap().status,
        StageStatus::TimedOut
    );
}

#[tokio::test]
async fn concurrent_submissions_are_isolated() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let a = Submission::new("echo a > mine; ls", "shell");
    let b = Submission::new("echo b > mine; sleep 0.2; cat mine", "shell");
    let (a, b) = tokio::join!(runner.run(&a), runner.run(&b));

    assert_eq!(a.unwrap().execute_output.unwrap().stdout, "main.sh\nmine\n");
    assert_eq!(b.unwrap().execute_output.unwrap().stdout, "b\n");
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn sibling_workspaces_are_invisible() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let owner = Submission::new("echo SECRET > secret; sleep 1", "shell");
    let snoop = Submission::new(
        "sleep 0.3; cat ../coderun-*/secret \"$HOME\"/../coderun-*/secret; echo x > ../leak; ls .. | wc -l",
        "shell",
    );
    let (owner, snoop) = tokio::join!(runner.run(&owner), runner.run(&snoop));

    assert_eq!(
        owner.unwrap().execute_output.unwrap().status,
        StageStatus::Succeeded
    );
    let snoop = snoop.unwrap().execute_output.unwrap();
    assert!(!snoop.stdout.contains("SECRET"), "{}", snoop.stdout);
    assert_eq!(snoop.stdout.trim(), "1");
    assert!(!root.path().join("leak").exists());
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn relative_temp_root() {
    let name = format!(".temp-{}", uuid::Uuid::new_v4().simple());
    std::fs::create_dir(&name).unwrap();
    let registry = Registry::new(LangSpec::parse(TEST_LANGS).unwrap(), DEFAULT_PATH);
    let runner = Runner::builder(registry)
        .temp(&name)
        .policy(policy())
        .build();

    let result = runner
        .run(&Submission::new("#!/bin/sh\necho native", "native"))
        .await;
    std::fs::remove_dir_all(&name).unwrap();

    let result = result.unwrap();
    assert_eq!(result.build_output.status, StageStatus::Succeeded);
    let execute = result.execute_output.unwrap();
    assert_eq!(execute.status, StageStatus::Succeeded);
    assert_eq!(execute.stdout, "native\n");
}

#[tokio::test]
async fn looping_compiler_times_out() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let submission = Submission::new("sleep 10", "scriptc")
        .build_limits(LimitOverrides::default().timeout_millis(300));
    let result = runner.run(&submission).await.unwrap();

    assert_eq!(result.build_output.status, StageStatus::TimedOut);
    assert!(
        result.build_output.elapsed_millis < 2000,
        "{}",
        result.build_output.elapsed_millis
    );
    assert!(result.execute_output.is_none());
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn hungry_compiler_exceeds_memory() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let submission = Submission::new(
        "a=$(head -c 300000000 /dev/zero | tr '\\0' a)",
        "scriptc",
    )
    .build_limits(
        LimitOverrides::default()
            .memory_bytes(32 * 1024 * 1024)
            .timeout_millis(20_000)
            .cpu_millis(20_000),
    );
    let result = runner.run(&submission).await.unwrap();

    assert_eq!(result.build_output.status, StageStatus::MemoryExceeded);
    assert!(result.execute_output.is_none());
}

#[tokio::test]
async fn execute_limits_leave_build_alone() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let submission = Submission::new("sleep 0.5", "scriptc")
        .execute_limits(LimitOverrides::default().timeout_millis(100));
    let result = runner.run(&submission).await.unwrap();

    assert_eq!(result.build_output.status, StageStatus::Succeeded);
    assert_eq!(result.execute_output.unwrap().stdout, "ran\n");
}

#[tokio::test]
async fn cancellation_kills_stage() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });
    let result = runner
        .run_with_cancel(&Submission::new("sleep 10", "shell"), &cancel)
        .await
        .unwrap();

    let execute = result.execute_output.unwrap();
    assert_eq!(execute.status, StageStatus::Killed);
    assert!(execute.elapsed_millis < 3000, "{}", execute.elapsed_millis);
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn cancelled_before_start() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = runner
        .run_with_cancel(&Submission::new("# ok;\necho x", "fakec"), &cancel)
        .await
        .unwrap();

    assert_eq!(result.build_output.status, StageStatus::Killed);
    assert!(result.execute_output.is_none());
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn cancelled_while_acquiring() {
    let root = tempfile::tempdir().unwrap();
    // acquiring would fail, cancellation has to be seen first
    let runner = test_runner(&root.path().join("missing"));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = runner
        .run_with_cancel(&Submission::new("echo x", "shell"), &cancel)
        .await
        .unwrap();

    assert_eq!(result.build_output.status, StageStatus::Killed);
    assert!(result.execute_output.is_none());
    assert!(!root.path().join("missing").exists());
}

#[tokio::test]
async fn dropped_future_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let submission = Submission::new("sleep 10", "shell");
    let run = runner.run(&submission);
    assert!(tokio::time::timeout(Duration::from_millis(300), run)
        .await
        .is_err());
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn unknown_language() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let result = runner.run(&Submission::new("", "brainfuck")).await;

    assert!(matches!(result, Err(Error::ToolchainUnavailable(_))));
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn closed_runner() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    runner.close();
    let result = runner.run(&Submission::new("echo hi", "shell")).await;

    assert!(matches!(result, Err(Error::Closed)));
}

#[tokio::test]
async fn python_hello() {
    let root = tempfile::tempdir().unwrap();
    let runner = builtin_runner(root.path());
    if runner.registry().get("python").is_err() {
        log::warn!("python3 not installed, skipping");
        return;
    }

    let result = runner
        .run(&Submission::new("print(\"hi\")", "python"))
        .await
        .unwrap();

    assert_eq!(result.build_output.status, StageStatus::Succeeded);
    let execute = result.execute_output.unwrap();
    assert_eq!(execute.stdout, "hi\n");
    assert_eq!(execute.exit_code, Some(0));
    assert_eq!(execute.status, StageStatus::Succeeded);
    assert_eq!(count(root.path()), 0);
}

#[tokio::test]
async fn c_missing_semicolon() {
    let root = tempfile::tempdir().unwrap();
    let runner = builtin_runner(root.path());
    if runner.registry().get("c").is_err() {
        log::warn!("gcc not installed, skipping");
        return;
    }

    let result = runner
        .run(&Submission::new("int main() { return 0 }", "c"))
        .await
        .unwrap();

    assert_eq!(result.build_output.status, StageStatus::Failed);
    assert!(!result.build_output.stderr.is_empty());
    assert!(result.execute_output.is_none());
    assert_eq!(count(root.path()), 0);
}
