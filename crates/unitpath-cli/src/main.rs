//! unitpath CLI: serve the learning engine and inspect catalogs and progress.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "unitpath",
    version,
    about = "Exercise evaluation and unit progression engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address, overrides [server].bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Validate catalog TOML files
    Validate {
        /// Path to catalog file or directory
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Grade a single answer against a catalog
    Check {
        /// Path to catalog file or directory
        #[arg(long)]
        catalog: PathBuf,

        /// Exercise ID
        #[arg(long)]
        exercise: String,

        /// Answer as JSON, e.g. '{"type":"choice","selected":1}'
        #[arg(long)]
        answer: String,
    },

    /// Show a student's progress through a track
    Progress {
        #[arg(long)]
        student: String,

        /// Subject code of the track
        #[arg(long)]
        subject: String,

        /// Grade of the track
        #[arg(long)]
        grade: Option<u8>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show whether a student may enter a unit
    Access {
        #[arg(long)]
        student: String,

        #[arg(long)]
        unit: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Delete every answer, progress row and placement plan of a student
    Forget {
        #[arg(long)]
        student: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example catalog
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("unitpath=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, bind } => commands::serve::execute(config, bind).await,
        Commands::Validate { catalog } => commands::validate::execute(catalog),
        Commands::Check {
            catalog,
            exercise,
            answer,
        } => commands::check::execute(catalog, exercise, answer),
        Commands::Progress {
            student,
            subject,
            grade,
            format,
            config,
        } => commands::progress::execute(student, subject, grade, format, config).await,
        Commands::Access {
            student,
            unit,
            config,
        } => commands::access::execute(student, unit, config).await,
        Commands::Forget { student, config } => commands::forget::execute(student, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
