use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run_with_stdin(args: &[&str], stdin: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_prom2json"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("failed to start prom2json: {e:?}"));

    {
        let mut input = child.stdin.take().unwrap_or_else(|| panic!("stdin is not piped"));
        input.write_all(stdin).unwrap_or_else(|e| panic!("failed to write stdin: {e:?}"));
    }

    child.wait_with_output().unwrap_or_else(|e| panic!("failed to wait for prom2json: {e:?}"))
}

#[test]
fn test_empty_stdin() {
    let output = run_with_stdin(&[], b"");

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(output.stdout, b"[]\n");
}

#[test]
fn test_stdin_conversion() {
    let output = run_with_stdin(&["--stdin"], b"# TYPE up gauge\nup{job=\"node\"} 1\n");

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "[{\"name\":\"up\",\"help\":\"\",\"type\":\"GAUGE\",\"metrics\":[{\"labels\":{\"job\":\"node\"},\"value\":\"1\"}]}]\n"
    );
}

#[test]
fn test_malformed_stdin_writes_nothing() {
    let output = run_with_stdin(&[], b"good 1\nbad{");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty(), "stdout: {:?}", String::from_utf8_lossy(&output.stdout));
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_missing_file_exit_code() {
    let output = run_with_stdin(&["/nonexistent/prom2json/metrics.prom"], b"");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_usage_errors_exit_code() {
    let test_cases = vec![
        vec!["a.prom", "b.prom"],
        vec!["--url", "http://localhost/metrics", "--stdin"],
        vec!["--url", "http://localhost/metrics", "--cert", "client.pem"],
        vec!["--bogus"],
        vec!["--timeout", "never"],
    ];

    for args in test_cases {
        let output = run_with_stdin(&args, b"");
        assert_eq!(output.status.code(), Some(2), "args {args:?}");
        assert!(output.stdout.is_empty(), "args {args:?}");
        assert!(String::from_utf8_lossy(&output.stderr).contains("Usage: "), "args {args:?}");
    }
}

#[test]
fn test_help_exit_code() {
    let output = run_with_stdin(&["--help"], b"");

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--accept-invalid-cert"));
}
