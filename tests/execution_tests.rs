use std::fs;
use std::process::Command;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use coderunner::config::SandboxConfig;
use coderunner::sandbox::{ExecuteError, ExecutionRequest, Sandbox};

// Helper to check whether a runtime binary is installed on this host.
// Interpreter-dependent tests skip themselves when it is not.
fn command_available(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn create_test_sandbox() -> (Sandbox, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let config = SandboxConfig {
        root_dir: Some(root.path().to_str().unwrap().to_string()),
        default_timeout: 10,
        max_timeout: 30,
    };
    let sandbox = Sandbox::new(&config).unwrap();
    (sandbox, root)
}

fn request(language: &str, code: &str, timeout: Option<u64>) -> ExecutionRequest {
    ExecutionRequest {
        language: language.to_string(),
        code: code.to_string(),
        timeout_secs: timeout,
    }
}

// Number of execution directories currently present under the sandbox root.
fn leftover_directories(root: &tempfile::TempDir) -> usize {
    fs::read_dir(root.path()).unwrap().count()
}

#[tokio::test]
async fn python_hello_world() {
    if !command_available("python3") {
        eprintln!("Skipping: python3 not installed");
        return;
    }
    let (sandbox, root) = create_test_sandbox();

    let result = sandbox
        .execute(&request("python", "print('Hello, world!')", Some(10)))
        .await
        .unwrap();

    assert_eq!(result.output, "Hello, world!\n");
    assert_eq!(result.exit_code, 0);
    assert!(!result.timed_out);
    assert_eq!(leftover_directories(&root), 0);
}

#[tokio::test]
async fn language_name_is_case_insensitive() {
    if !command_available("python3") {
        eprintln!("Skipping: python3 not installed");
        return;
    }
    let (sandbox, _root) = create_test_sandbox();

    let result = sandbox
        .execute(&request("PyThOn", "print('ok')", Some(10)))
        .await
        .unwrap();

    assert_eq!(result.output, "ok\n");
}

#[tokio::test]
async fn hello_world_for_available_runtimes() {
    let cases: &[(&str, &[&str], &str, &str)] = &[
        ("javascript", &["node"], "console.log('hello');", "hello\n"),
        (
            "go",
            &["go"],
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hello\")\n}\n",
            "hello\n",
        ),
        (
            "java",
            &["javac", "java"],
            "public class Solution {\n    public static void main(String[] args) {\n        System.out.println(\"hello\");\n    }\n}\n",
            "hello\n",
        ),
        (
            "typescript",
            &["tsc", "node"],
            "console.log('hello');",
            "hello\n",
        ),
    ];

    for (language, binaries, code, expected) in cases {
        if binaries.iter().any(|b| !command_available(b)) {
            eprintln!("Skipping {language}: runtime not installed");
            continue;
        }
        let (sandbox, root) = create_test_sandbox();

        // Compile-then-run pipelines can be slow on a cold host.
        let result = sandbox
            .execute(&request(language, code, Some(30)))
            .await
            .unwrap();

        assert_eq!(&result.output, expected, "wrong output for {language}");
        assert_eq!(result.exit_code, 0, "non-zero exit for {language}");
        assert_eq!(leftover_directories(&root), 0, "leaked dir for {language}");
    }
}

#[tokio::test]
async fn timeout_kills_the_process_and_reports_it() {
    if !command_available("python3") {
        eprintln!("Skipping: python3 not installed");
        return;
    }
    let (sandbox, root) = create_test_sandbox();

    let started = Instant::now();
    let result = sandbox
        .execute(&request(
            "python",
            "import time\nprint('started', flush=True)\ntime.sleep(30)\n",
            Some(2),
        ))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(result.timed_out);
    assert_eq!(result.exit_code, -1);
    assert!(
        result.output.contains("timed out after 2 seconds"),
        "missing timeout notice in: {}",
        result.output
    );
    // Partial output produced before the kill is preserved.
    assert!(result.output.contains("started"));
    // Returns within a bounded grace period after the 2s budget.
    assert!(
        elapsed < Duration::from_secs(10),
        "took {elapsed:?} to return"
    );
    assert_eq!(leftover_directories(&root), 0);
}

#[tokio::test]
async fn unsupported_language_fails_before_any_setup() {
    let (sandbox, root) = create_test_sandbox();

    let err = sandbox
        .execute(&request("cobol", "DISPLAY 'HELLO'.", None))
        .await
        .unwrap_err();

    match &err {
        ExecuteError::UnsupportedLanguage { language, supported } => {
            assert_eq!(language, "cobol");
            assert!(supported.contains("python"));
            assert!(supported.contains("java"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_caller_fault());
    // No execution directory was ever created.
    assert_eq!(leftover_directories(&root), 0);
}

#[tokio::test]
async fn identical_concurrent_requests_do_not_interfere() {
    if !command_available("python3") {
        eprintln!("Skipping: python3 not installed");
        return;
    }
    let (sandbox, root) = create_test_sandbox();
    let req_a = request("python", "print('same snippet')", Some(10));
    let req_b = request("python", "print('same snippet')", Some(10));

    let (a, b) = tokio::join!(sandbox.execute(&req_a), sandbox.execute(&req_b));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.output, "same snippet\n");
    assert_eq!(b.output, "same snippet\n");
    assert_eq!(a.exit_code, 0);
    assert_eq!(b.exit_code, 0);
    assert_eq!(leftover_directories(&root), 0);
}

#[tokio::test]
async fn both_output_channels_are_captured() {
    if !command_available("python3") {
        eprintln!("Skipping: python3 not installed");
        return;
    }
    let (sandbox, _root) = create_test_sandbox();

    let result = sandbox
        .execute(&request(
            "python",
            "import sys\nprint('to stdout')\nprint('to stderr', file=sys.stderr)\n",
            Some(10),
        ))
        .await
        .unwrap();

    assert_eq!(result.output, "to stdout\n\n\nto stderr\n");
}

#[tokio::test]
async fn stderr_alone_becomes_the_output() {
    if !command_available("python3") {
        eprintln!("Skipping: python3 not installed");
        return;
    }
    let (sandbox, _root) = create_test_sandbox();

    let result = sandbox
        .execute(&request(
            "python",
            "import sys\nprint('only stderr', file=sys.stderr)\n",
            Some(10),
        ))
        .await
        .unwrap();

    assert_eq!(result.output, "only stderr\n");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn silent_nonzero_exit_reports_the_code() {
    if !command_available("python3") {
        eprintln!("Skipping: python3 not installed");
        return;
    }
    let (sandbox, root) = create_test_sandbox();

    let result = sandbox
        .execute(&request("python", "import sys\nsys.exit(3)\n", Some(10)))
        .await
        .unwrap();

    assert_eq!(result.output, "Process exited with code 3");
    assert_eq!(result.exit_code, 3);
    assert!(!result.timed_out);
    assert_eq!(leftover_directories(&root), 0);
}

#[tokio::test]
async fn process_ceiling_bounds_fork_abuse() {
    if !command_available("python3") {
        eprintln!("Skipping: python3 not installed");
        return;
    }
    // RLIMIT_NPROC is not enforced for privileged users.
    if unsafe { libc::geteuid() } == 0 {
        eprintln!("Skipping: running as root, RLIMIT_NPROC is not enforced");
        return;
    }
    let (sandbox, root) = create_test_sandbox();

    let code = r#"
import os, sys, time
count = 0
try:
    while True:
        pid = os.fork()
        if pid == 0:
            time.sleep(1)
            os._exit(0)
        count += 1
except OSError:
    print(f"fork failed after {count} spawns")
    sys.exit(0)
"#;

    let result = sandbox
        .execute(&request("python", code, Some(10)))
        .await
        .unwrap();

    assert!(!result.timed_out, "fork loop was not bounded by the limit");
    assert!(
        result.output.contains("fork failed after"),
        "unexpected output: {}",
        result.output
    );
    assert_eq!(leftover_directories(&root), 0);
}

#[tokio::test]
async fn zero_timeout_is_clamped_to_one_second() {
    if !command_available("python3") {
        eprintln!("Skipping: python3 not installed");
        return;
    }
    let (sandbox, _root) = create_test_sandbox();

    let result = sandbox
        .execute(&request("python", "import time\ntime.sleep(30)\n", Some(0)))
        .await
        .unwrap();

    assert!(result.timed_out);
    assert!(result.output.contains("timed out after 1 seconds"));
}
