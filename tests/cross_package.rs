//! Transaction threading across package boundaries: a call into another
//! loaded package switches the package focus, rewrites the callee there, and
//! threads the transaction argument at the call site.

use std::fs;

use baton::output::instrument_project;

#[test]
fn tracing_crosses_package_boundaries() {
    let parent = tempfile::tempdir().unwrap();
    let project = parent.path().join("demo");
    fs::create_dir_all(project.join("helpers")).unwrap();
    fs::write(project.join("go.mod"), "module example.com/demo\n").unwrap();
    fs::write(
        project.join("main.go"),
        r#"package main

import "example.com/demo/helpers"

func main() {
	helpers.Fetch("http://example.com")
}
"#,
    )
    .unwrap();
    fs::write(
        project.join("helpers").join("fetch.go"),
        r#"package helpers

import "net/http"

func Fetch(url string) error {
	_, err := http.Get(url)
	return err
}
"#,
    )
    .unwrap();

    let output = parent.path().join("out");
    let (report, _) =
        instrument_project(&project, Some(&output), "demo", "agent", false).unwrap();

    let main_text = fs::read_to_string(output.join("main.go")).unwrap();
    assert!(
        main_text.contains("txn := agent.StartTransaction(\"Fetch\")"),
        "call into the helper package is bookended:\n{main_text}"
    );
    assert!(main_text.contains("helpers.Fetch(\"http://example.com\", txn)"));
    assert!(main_text.contains("txn.End()"));

    let fetch_text = fs::read_to_string(output.join("helpers").join("fetch.go")).unwrap();
    assert!(
        fetch_text.contains("func Fetch(url string, txn *newrelic.Transaction) error {"),
        "callee declaration gains the parameter in its own package:\n{fetch_text}"
    );
    assert!(fetch_text.contains("defer txn.StartSegment(\"Fetch\").End()"));
    assert!(fetch_text.contains("txn.NoticeError(err)"));
    assert!(
        fetch_text.contains("github.com/newrelic/go-agent/v3/newrelic"),
        "agent import lands in the helper file:\n{fetch_text}"
    );

    assert_eq!(
        report.files_rewritten,
        vec!["helpers/fetch.go".to_string(), "main.go".to_string()]
    );
    assert_eq!(report.traced_functions.len(), 1);
    assert_eq!(report.traced_functions[0].package, "example.com/demo/helpers");
    assert_eq!(
        report.packages_instrumented,
        vec![
            "example.com/demo".to_string(),
            "example.com/demo/helpers".to_string()
        ]
    );
}
