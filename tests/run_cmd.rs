//! Integration tests for the `baton` binary: exit codes, report output, and
//! the check subcommand's dry-run behavior.

use std::fs;
use std::path::Path;
use std::process::Command;

fn create_demo_project(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("go.mod"), "module demo\n").unwrap();
    fs::write(
        dir.join("main.go"),
        r#"package main

import "net/http"

func index(w http.ResponseWriter, r *http.Request) {
	_, err := http.Get("http://example.com")
	if err != nil {
		panic(err)
	}
	w.Write([]byte("hello world"))
}

func main() {
	http.HandleFunc("/", index)
	http.ListenAndServe(":8080", nil)
}
"#,
    )
    .unwrap();
}

#[test]
fn instrument_writes_output_and_reports() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("demo");
    create_demo_project(&project);
    let output = tmp.path().join("out");

    let baton = env!("CARGO_BIN_EXE_baton");
    let result = Command::new(baton)
        .args(["instrument", "--app-name", "demo", "--project"])
        .arg(&project)
        .arg("--output")
        .arg(&output)
        .output()
        .expect("failed to run baton");

    let stdout = String::from_utf8_lossy(&result.stdout);
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        result.status.success(),
        "baton instrument failed:\nstdout: {stdout}\nstderr: {stderr}"
    );
    assert!(
        stderr.contains("instrumented application \"demo\""),
        "report table goes to stderr: {stderr}"
    );
    assert!(
        stdout.is_empty(),
        "stdout is reserved for --json output: {stdout}"
    );
    assert!(
        stderr.contains("instrumented project written to"),
        "destination on stderr: {stderr}"
    );

    let main_text = fs::read_to_string(output.join("main.go")).unwrap();
    assert!(main_text.contains("newrelic.NewApplication"));
    assert!(main_text.contains("nrTxn := newrelic.FromContext(r.Context())"));
}

#[test]
fn check_is_a_dry_run_with_json_output() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("demo");
    create_demo_project(&project);

    let baton = env!("CARGO_BIN_EXE_baton");
    let result = Command::new(baton)
        .args(["check", "--json", "--project"])
        .arg(&project)
        .output()
        .expect("failed to run baton");

    assert!(result.status.success());
    let stdout = String::from_utf8_lossy(&result.stdout);
    let report: serde_json::Value =
        serde_json::from_str(&stdout).expect("check --json must emit valid JSON");
    assert_eq!(report["handlers"][0], "index");
    assert_eq!(report["files_rewritten"][0], "main.go");

    assert!(
        !tmp.path().join("demo-instrumented").exists(),
        "check must not write an output directory"
    );
}

#[test]
fn missing_main_exits_nonzero() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("lib");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("go.mod"), "module lib\n").unwrap();
    fs::write(
        project.join("lib.go"),
        "package lib\n\nfunc Helper() {\n}\n",
    )
    .unwrap();

    let baton = env!("CARGO_BIN_EXE_baton");
    let result = Command::new(baton)
        .args(["instrument", "--project"])
        .arg(&project)
        .output()
        .expect("failed to run baton");

    assert!(!result.status.success(), "missing main must fail");
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("no main function"),
        "stderr should explain the failure: {stderr}"
    );
}

#[test]
fn parse_errors_exit_nonzero_and_name_the_file() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("demo");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("go.mod"), "module demo\n").unwrap();
    fs::write(
        project.join("main.go"),
        "package main\n\nfunc main() {\n\tx := ,\n}\n",
    )
    .unwrap();

    let baton = env!("CARGO_BIN_EXE_baton");
    let result = Command::new(baton)
        .args(["instrument", "--project"])
        .arg(&project)
        .output()
        .expect("failed to run baton");

    assert!(!result.status.success(), "parse error must fail");
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("main.go"),
        "stderr should name the file: {stderr}"
    );
}
