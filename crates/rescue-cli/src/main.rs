#![forbid(unsafe_code)]

mod cmd;
mod context;
mod identity;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "rescue: deduplicate animal-rescue sightings into cases",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Case database path (default: .rescue/cases.sqlite3).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Contributor identity (skips env resolution).
    #[arg(long = "as", global = true, value_name = "CONTRIBUTOR")]
    contributor: Option<String>,

    /// Caller role: reporter or admin.
    #[arg(long, global = true)]
    role: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Pretty
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Reporting",
        about = "List nearby cases that may match a sighting",
        after_help = "EXAMPLES:\n    rescue nearby dog --lat 12.9716 --lng 77.5946"
    )]
    Nearby(cmd::nearby::NearbyArgs),

    #[command(
        next_help_heading = "Reporting",
        about = "Report a sighting as a new case",
        long_about = "Report a sighting as a new case. Refuses when nearby cases of the \
                      same category exist, unless --new is given.",
        after_help = "EXAMPLES:\n    \
                      rescue report dog --lat 12.9716 --lng 77.5946 -d \"limping, brown\"\n\n    \
                      rescue report other --custom-category goat --lat 12.97 --lng 77.59 --new"
    )]
    Report(cmd::report::ReportArgs),

    #[command(
        next_help_heading = "Reporting",
        about = "Add a sighting to an existing case"
    )]
    Merge(cmd::merge::MergeArgs),

    #[command(next_help_heading = "Reporting", about = "Show one case in full")]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Reporting",
        about = "List cases you have contributed to"
    )]
    Mine,

    #[command(
        next_help_heading = "Administration",
        about = "Change a case's rescue status",
        after_help = "EXAMPLES:\n    rescue --role admin status case-ab12cd34 Collected"
    )]
    Status(cmd::status::StatusArgs),

    #[command(
        next_help_heading = "Administration",
        about = "Dashboard listing of all cases"
    )]
    List(cmd::list::ListArgs),

    #[command(next_help_heading = "Administration", about = "Purge a case")]
    Delete(cmd::delete::DeleteArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RESCUE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "rescue=debug,info"
        } else {
            "rescue=info,warn"
        })
    });

    let format = env::var("RESCUE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let output = cli.output_mode();

    let caller = match identity::require_caller(cli.contributor.as_deref(), cli.role.as_deref()) {
        Ok(caller) => caller,
        Err(err) => {
            let suggestion = match err.code {
                "invalid_role" => "pass --role reporter or --role admin",
                _ => "pass --as <name> or export RESCUE_CONTRIBUTOR",
            };
            render_error(
                output,
                &CliError::with_details(err.message.clone(), suggestion, err.code),
            )?;
            return Err(err.into());
        }
    };

    let engine = context::open_engine(cli.db.as_deref(), &project_root)?;

    match cli.command {
        Commands::Nearby(ref args) => cmd::nearby::run_nearby(args, &caller, &engine, output),
        Commands::Report(ref args) => cmd::report::run_report(args, &caller, &engine, output),
        Commands::Merge(ref args) => cmd::merge::run_merge(args, &caller, &engine, output),
        Commands::Show(ref args) => cmd::show::run_show(args, &caller, &engine, output),
        Commands::Mine => cmd::mine::run_mine(&caller, &engine, output),
        Commands::Status(ref args) => cmd::status::run_status(args, &caller, &engine, output),
        Commands::List(ref args) => cmd::list::run_list(args, &caller, &engine, output),
        Commands::Delete(ref args) => cmd::delete::run_delete(args, &caller, &engine, output),
    }
}
