use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use baton::error::Error;
use baton::manager::DEFAULT_AGENT_VARIABLE;
use baton::output::instrument_project;
use baton::report::format_table;

#[derive(Parser)]
#[command(
    name = "baton",
    about = "Automated New Relic instrumentation for Go applications"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a Go project to report telemetry through the agent.
    Instrument {
        /// Application name reported to the agent.
        #[arg(long = "app-name", value_name = "NAME", default_value = "")]
        app_name: String,

        /// Project root (defaults to current directory).
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Where to write the rewritten project (defaults to
        /// <project>-instrumented next to the original).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Name of the agent variable injected into main.
        #[arg(long = "agent-var", default_value = DEFAULT_AGENT_VARIABLE)]
        agent_var: String,

        /// Emit the instrumentation report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Analyze a project and report what would be instrumented, without
    /// writing anything.
    Check {
        /// Project root (defaults to current directory).
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Emit the report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Instrument {
            app_name,
            project,
            output,
            agent_var,
            json,
        } => cmd_instrument(app_name, project, output, agent_var, json),
        Commands::Check { project, json } => cmd_check(project, json),
    }
}

fn cmd_instrument(
    app_name: String,
    project: PathBuf,
    output: Option<PathBuf>,
    agent_var: String,
    json: bool,
) -> Result<(), Error> {
    let project = std::fs::canonicalize(&project)?;
    let (report, written) =
        instrument_project(&project, output.as_deref(), &app_name, &agent_var, false)?;

    print_report(&report, json)?;
    if let Some(dir) = written {
        eprintln!("instrumented project written to {}", dir.display());
    }
    Ok(())
}

fn cmd_check(project: PathBuf, json: bool) -> Result<(), Error> {
    let project = std::fs::canonicalize(&project)?;
    let (report, _) = instrument_project(&project, None, "", DEFAULT_AGENT_VARIABLE, true)?;
    print_report(&report, json)
}

fn print_report(report: &baton::report::InstrumentationReport, json: bool) -> Result<(), Error> {
    if json {
        let text = serde_json::to_string_pretty(report)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        println!("{text}");
    } else {
        // The table is commentary; stdout stays reserved for machine output.
        eprint!("{}", format_table(report));
    }
    Ok(())
}
