//! alm-cli - run REST workflows against a Helix ALM server.

use std::io::{self, Write};
use std::path::PathBuf;

use alm_cli::workflows::{self, FoundByRecord, GenerateTestRuns, TestRunSet, Variant, WorkflowEvent};
use alm_core::{ClientConfig, Field, RequestExecutor, UreqTransport};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Drive the Helix ALM REST API from the command line.
#[derive(Parser)]
#[command(name = "alm-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file; ALM_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the projects the configured user can access
    Projects,

    /// List issues as "<tag> - <Summary>"
    Issues,

    /// Change the Priority of an issue
    SetPriority {
        /// Issue ID
        #[arg(long)]
        issue: u64,

        /// Priority menu label, e.g. "Before Beta"
        #[arg(long)]
        priority: String,
    },

    /// Add a "Found by" record to an issue
    AddFoundBy {
        /// Issue ID
        #[arg(long)]
        issue: u64,

        /// Reporter username
        #[arg(long, default_value = "Administrator")]
        user: String,

        /// Date found (ISO 8601)
        #[arg(long)]
        date: Option<String>,

        /// Version found
        #[arg(long, default_value = "1.0")]
        version: String,

        /// Description text
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Enter a workflow event on an issue
    AddEvent {
        /// Issue ID
        #[arg(long)]
        issue: u64,

        /// Event name, e.g. "Comment"
        #[arg(long, default_value = "Comment")]
        name: String,

        /// Notes for the event
        #[arg(long)]
        notes: String,

        /// Event date (ISO 8601)
        #[arg(long)]
        date: Option<String>,
    },

    /// Generate test runs from test cases
    GenerateTestRuns {
        /// Test case ID, repeatable
        #[arg(long = "test-case", required = true)]
        test_cases: Vec<u64>,

        /// Test run set label
        #[arg(long = "set")]
        run_set: String,

        /// Variant as Label=Value, repeatable
        #[arg(long = "variant")]
        variants: Vec<String>,

        /// Event to enter on each generated run
        #[arg(long)]
        event: Option<String>,

        /// Notes for that event
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Run the whole sample sequence: projects, token, issues
    Demo,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = ClientConfig::load(cli.config.as_deref()).context("loading configuration")?;
    tracing::debug!(base_url = %config.base_url, project = %config.project, "configuration loaded");
    let exec = RequestExecutor::from_config(config);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(&exec, cli.command, &mut out)?;
    out.flush()?;
    Ok(())
}

fn run(exec: &RequestExecutor<UreqTransport>, command: Commands, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Projects => workflows::list_projects(exec, out),
        Commands::Issues => {
            let token = workflows::access_token(exec)?;
            workflows::list_issues(exec, &token, out)
        }
        Commands::SetPriority { issue, priority } => {
            let token = workflows::access_token(exec)?;
            workflows::set_priority(exec, &token, issue, &priority, out)
        }
        Commands::AddFoundBy {
            issue,
            user,
            date,
            version,
            description,
        } => {
            let token = workflows::access_token(exec)?;
            let record = FoundByRecord::new(date.as_deref(), &description, &user, &version);
            workflows::add_found_by(exec, &token, issue, &record, out)
        }
        Commands::AddEvent {
            issue,
            name,
            notes,
            date,
        } => {
            let token = workflows::access_token(exec)?;
            let mut fields = vec![Field::string("Notes", notes)];
            if let Some(date) = date {
                fields.push(Field::date_time("Date", date));
            }
            workflows::add_event(exec, &token, issue, WorkflowEvent { name, fields }, out)
        }
        Commands::GenerateTestRuns {
            test_cases,
            run_set,
            variants,
            event,
            notes,
        } => {
            let token = workflows::access_token(exec)?;
            let request = GenerateTestRuns {
                test_case_ids: test_cases,
                test_run_set: TestRunSet { label: run_set },
                variants: variants.iter().map(|v| Variant::parse(v)).collect::<Result<_>>()?,
                events_data: event
                    .map(|name| WorkflowEvent {
                        name,
                        fields: vec![Field::string("Notes", notes)],
                    })
                    .into_iter()
                    .collect(),
            };
            workflows::generate_test_runs(exec, &token, &request, out)
        }
        Commands::Demo => {
            workflows::list_projects(exec, out)?;
            let token = workflows::access_token(exec)?;
            writeln!(out, "Access token acquired")?;
            workflows::list_issues(exec, &token, out)
        }
    }
}
