//! End-to-end coverage of transaction threading: helpers reached from a
//! handler gain a transaction parameter and a segment timer, goroutine
//! launches get their own `NewGoroutine()` handle, and anonymous literals are
//! given transaction plumbing of their own.

use std::fs;

use baton::output::instrument_project;
use baton::report::InstrumentationReport;

fn instrument_app(source: &str) -> (String, InstrumentationReport) {
    let parent = tempfile::tempdir().unwrap();
    let project = parent.path().join("demo");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("go.mod"), "module demo\n").unwrap();
    fs::write(project.join("main.go"), source).unwrap();

    let output = parent.path().join("out");
    let (report, _) = instrument_project(&project, Some(&output), "", "agent", false).unwrap();
    (fs::read_to_string(output.join("main.go")).unwrap(), report)
}

#[test]
fn tracing_propagates_to_downstream_calls() {
    let source = r#"package main

import "net/http"

func myHelperFunction(url string) error {
	_, err := http.Get(url)
	if err != nil {
		return err
	}
	return nil
}

func myHandler(w http.ResponseWriter, r *http.Request) {
	err := myHelperFunction("http://example.com")
	if err != nil {
		panic(err)
	}
	w.Write([]byte("hello world"))
}

func main() {
	http.HandleFunc("/", myHandler)
	http.ListenAndServe(":8080", nil)
}
"#;

    let expect = r#"package main

import (
	"net/http"
	"time"

	"github.com/newrelic/go-agent/v3/newrelic"
)

func myHelperFunction(url string, nrTxn *newrelic.Transaction) error {
	defer nrTxn.StartSegment("myHelperFunction").End()
	// the "http.Get()" net/http method can not be instrumented and its outbound traffic can not be traced
	// please see these examples of code patterns for external http calls that can be instrumented:
	// https://docs.newrelic.com/docs/apm/agents/go-agent/configuration/distributed-tracing-go-agent/#make-http-requests
	_, err := http.Get(url)
	nrTxn.NoticeError(err)
	if err != nil {
		return err
	}
	return nil
}

func myHandler(w http.ResponseWriter, r *http.Request) {
	nrTxn := newrelic.FromContext(r.Context())

	err := myHelperFunction("http://example.com", nrTxn)
	if err != nil {
		panic(err)
	}
	w.Write([]byte("hello world"))
}

func main() {
	agent, err := newrelic.NewApplication(newrelic.ConfigFromEnvironment())
	if err != nil {
		panic(err)
	}

	http.HandleFunc(newrelic.WrapHandleFunc(agent, "/", myHandler))
	http.ListenAndServe(":8080", nil)

	agent.Shutdown(5 * time.Second)
}
"#;

    let (got, report) = instrument_app(source);
    assert_eq!(got, expect);
    assert_eq!(report.handlers, vec!["myHandler".to_string()]);
    assert_eq!(report.traced_functions.len(), 1);
    assert_eq!(report.traced_functions[0].name, "myHelperFunction");
    assert_eq!(report.traced_functions[0].segment, "myHelperFunction");
}

#[test]
fn tracing_propagates_to_async_downstream_calls() {
    let source = r#"package main

import (
	"net/http"
	"sync"
)

func myHelperFunction(url string, wg *sync.WaitGroup) {
	defer wg.Done()
	_, err := http.Get(url)
	if err != nil {
		panic(err)
	}
}

func myHandler(w http.ResponseWriter, r *http.Request) {
	var wg sync.WaitGroup
	for i := 0; i < 5; i++ {
		wg.Add(1)
		go myHelperFunction("http://example.com", &wg)
	}
	wg.Wait()

	w.Write([]byte("hello world"))
}

func main() {
	http.HandleFunc("/", myHandler)
	http.ListenAndServe(":8080", nil)
}
"#;

    let expect = r#"package main

import (
	"net/http"
	"sync"
	"time"

	"github.com/newrelic/go-agent/v3/newrelic"
)

func myHelperFunction(url string, wg *sync.WaitGroup, nrTxn *newrelic.Transaction) {
	defer nrTxn.StartSegment("async myHelperFunction").End()
	defer wg.Done()
	// the "http.Get()" net/http method can not be instrumented and its outbound traffic can not be traced
	// please see these examples of code patterns for external http calls that can be instrumented:
	// https://docs.newrelic.com/docs/apm/agents/go-agent/configuration/distributed-tracing-go-agent/#make-http-requests
	_, err := http.Get(url)
	nrTxn.NoticeError(err)
	if err != nil {
		panic(err)
	}
}

func myHandler(w http.ResponseWriter, r *http.Request) {
	nrTxn := newrelic.FromContext(r.Context())

	var wg sync.WaitGroup
	for i := 0; i < 5; i++ {
		wg.Add(1)
		go myHelperFunction("http://example.com", &wg, nrTxn.NewGoroutine())
	}
	wg.Wait()

	w.Write([]byte("hello world"))
}

func main() {
	agent, err := newrelic.NewApplication(newrelic.ConfigFromEnvironment())
	if err != nil {
		panic(err)
	}

	http.HandleFunc(newrelic.WrapHandleFunc(agent, "/", myHandler))
	http.ListenAndServe(":8080", nil)

	agent.Shutdown(5 * time.Second)
}
"#;

    let (got, report) = instrument_app(source);
    assert_eq!(got, expect);
    assert_eq!(
        report.traced_functions[0].segment, "async myHelperFunction",
        "goroutine targets are timed under the async segment name"
    );
}

#[test]
fn tracing_propagates_through_goroutine_literals() {
    let source = r#"package main

import (
	"net/http"
	"sync"
)

func myHelperFunction(url string) {
	_, err := http.Get(url)
	if err != nil {
		panic(err)
	}
}

func myHandler(w http.ResponseWriter, r *http.Request) {
	var wg sync.WaitGroup
	for i := 0; i < 5; i++ {
		wg.Add(1)
		go func() {
			defer wg.Done()
			myHelperFunction("http://example.com")
		}()
	}
	wg.Wait()

	w.Write([]byte("hello world"))
}

func main() {
	http.HandleFunc("/", myHandler)
	http.ListenAndServe(":8080", nil)
}
"#;

    let expect = r#"package main

import (
	"net/http"
	"sync"
	"time"

	"github.com/newrelic/go-agent/v3/newrelic"
)

func myHelperFunction(url string, nrTxn *newrelic.Transaction) {
	defer nrTxn.StartSegment("myHelperFunction").End()
	// the "http.Get()" net/http method can not be instrumented and its outbound traffic can not be traced
	// please see these examples of code patterns for external http calls that can be instrumented:
	// https://docs.newrelic.com/docs/apm/agents/go-agent/configuration/distributed-tracing-go-agent/#make-http-requests
	_, err := http.Get(url)
	nrTxn.NoticeError(err)
	if err != nil {
		panic(err)
	}
}

func myHandler(w http.ResponseWriter, r *http.Request) {
	nrTxn := newrelic.FromContext(r.Context())

	var wg sync.WaitGroup
	for i := 0; i < 5; i++ {
		wg.Add(1)
		go func(nrTxn *newrelic.Transaction) {
			defer nrTxn.StartSegment("async literal").End()
			defer wg.Done()
			myHelperFunction("http://example.com", nrTxn)
		}(nrTxn.NewGoroutine())
	}
	wg.Wait()

	w.Write([]byte("hello world"))
}

func main() {
	agent, err := newrelic.NewApplication(newrelic.ConfigFromEnvironment())
	if err != nil {
		panic(err)
	}

	http.HandleFunc(newrelic.WrapHandleFunc(agent, "/", myHandler))
	http.ListenAndServe(":8080", nil)

	agent.Shutdown(5 * time.Second)
}
"#;

    let (got, _) = instrument_app(source);
    assert_eq!(got, expect);
}

#[test]
fn errors_from_untraced_user_functions_are_noticed() {
    let source = r#"package main

import (
	"errors"
	"io"
	"net/http"
	"time"
)

func DoAThing(willError bool) (string, bool, error) {
	time.Sleep(200 * time.Millisecond)
	if willError {
		return "thing not done", false, errors.New("this is an error")
	}

	return "thing complete", true, nil
}

func noticeError(w http.ResponseWriter, r *http.Request) {
	str, _, err := DoAThing(true)
	if err != nil {
		io.WriteString(w, err.Error())
	} else {
		io.WriteString(w, str)
	}
}

func main() {
	http.HandleFunc("/error", noticeError)
	http.ListenAndServe(":8080", nil)
}
"#;

    let (got, report) = instrument_app(source);
    assert!(
        got.contains("\tstr, _, err := DoAThing(true)\n\tnrTxn.NoticeError(err)\n"),
        "error from the untraced helper must be noticed:\n{got}"
    );
    assert!(
        !got.contains("DoAThing(willError bool, nrTxn"),
        "helper with nothing to instrument must not gain a parameter:\n{got}"
    );
    assert_eq!(report.handlers, vec!["noticeError".to_string()]);
    assert!(report.traced_functions.is_empty());
}
