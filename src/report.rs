/// Something the transformer could not instrument: a non-instrumentable
/// outbound call it annotated with a comment, or a handler it had to skip.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Warning {
    pub file: String,
    /// The `net/http` method involved, when the warning is about an outbound
    /// call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub detail: String,
}

/// One user function that gained a transaction parameter.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TracedFunction {
    pub package: String,
    pub name: String,
    /// The name of the segment timing this function (`async `-prefixed for
    /// goroutine targets).
    pub segment: String,
}

/// Summary of one instrumentation run, printed as a table or as JSON.
#[derive(Debug, serde::Serialize)]
pub struct InstrumentationReport {
    pub app_name: String,
    pub packages: Vec<String>,
    /// Packages that now import the agent.
    pub packages_instrumented: Vec<String>,
    pub handlers: Vec<String>,
    pub traced_functions: Vec<TracedFunction>,
    pub warnings: Vec<Warning>,
    pub files_rewritten: Vec<String>,
}

/// Format a report as readable text, one section per category.
pub fn format_table(report: &InstrumentationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "instrumented application {:?}: {} of {} package(s), {} file(s) rewritten\n",
        report.app_name,
        report.packages_instrumented.len(),
        report.packages.len(),
        report.files_rewritten.len()
    ));

    if !report.handlers.is_empty() {
        out.push_str("\nhttp handlers:\n");
        for h in &report.handlers {
            out.push_str(&format!("  {h}\n"));
        }
    }

    if !report.traced_functions.is_empty() {
        out.push_str("\ntraced functions:\n");
        for f in &report.traced_functions {
            out.push_str(&format!(
                "  {}.{} (segment {:?})\n",
                f.package, f.name, f.segment
            ));
        }
    }

    if !report.warnings.is_empty() {
        out.push_str("\nwarnings:\n");
        for w in &report.warnings {
            out.push_str(&format!("  {}: {}\n", w.file, w.detail));
        }
    }

    if !report.files_rewritten.is_empty() {
        out.push_str("\nrewritten files:\n");
        for f in &report.files_rewritten {
            out.push_str(&format!("  {f}\n"));
        }
    }
    out
}
