use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod core;
mod daemon;
mod providers;

use crate::core::settings::Settings;

#[derive(Parser)]
#[command(name = "paced-poller")]
#[command(author, version, about = "Poll an HTTP endpoint without ever exceeding its rate limit")]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the target until interrupted
    Run {
        /// Endpoint to poll, overrides the config file
        #[arg(long)]
        target: Option<String>,

        /// Do not show desktop notifications
        #[arg(long)]
        no_desktop: bool,
    },

    /// Show persisted timestamps and when the next query may be sent
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { target, no_desktop } => {
            init_logging(cli.log_format);
            let mut settings = Settings::load(cli.config.as_deref())?;
            if target.is_some() {
                settings.target = target;
            }
            daemon::run(settings, !no_desktop).await
        }
        Commands::Status { json } => {
            init_logging(cli.log_format);
            let settings = Settings::load(cli.config.as_deref())?;
            cli::status::run(settings, json).await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}
