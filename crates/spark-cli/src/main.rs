//! `spark`: chat with the local PrivateSpark assistant from a terminal.

mod commands;
mod config;
mod observability;
mod terminal;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use spark_client::api::DEFAULT_TEMPERATURE;
use spark_client::{ClientConfig, SparkClient};

#[derive(Debug, Parser)]
#[command(name = "spark", version, about = "Streaming client for the local PrivateSpark assistant")]
struct Cli {
    /// Base URL of the service (defaults to PRIVATESPARK_URL or http://localhost:4173).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a message and stream the reply.
    Chat {
        #[arg(short, long, env = "SPARK_PROJECT")]
        project: i64,
        /// Model name; the service default is used when omitted.
        #[arg(short, long, env = "SPARK_MODEL")]
        model: Option<String>,
        #[arg(short, long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
        /// Optional system prompt.
        #[arg(long)]
        system: Option<String>,
        /// Message text.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Show whether the service and its model backend are up.
    Status,
    /// List locally installed models, optionally downloading one first.
    Models {
        #[arg(long, value_name = "NAME")]
        pull: Option<String>,
    },
    /// List projects, optionally creating one first.
    Projects {
        #[arg(long, value_name = "NAME")]
        create: Option<String>,
    },
    /// List a project's capsules.
    Capsules {
        #[arg(short, long, env = "SPARK_PROJECT")]
        project: i64,
    },
    /// Search a project's capsules.
    Search {
        #[arg(short, long, env = "SPARK_PROJECT")]
        project: i64,
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
}

fn build_client(url: Option<String>) -> anyhow::Result<SparkClient> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = url {
        config = config.base_url(url);
    }
    Ok(SparkClient::new(config)?)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let client = build_client(cli.url)?;
    match cli.command {
        Command::Chat {
            project,
            model,
            temperature,
            system,
            text,
        } => {
            let args = commands::ChatArgs {
                project,
                model,
                temperature,
                system,
                text: text.join(" "),
            };
            commands::chat(&client, args).await
        }
        Command::Status => commands::status(&client).await,
        Command::Models { pull } => commands::models(&client, pull).await,
        Command::Projects { create } => commands::projects(&client, create).await,
        Command::Capsules { project } => commands::capsules(&client, project, None).await,
        Command::Search { project, query } => {
            commands::capsules(&client, project, Some(query.join(" "))).await
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    config::init();
    let cli = Cli::parse();
    observability::init_observability(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
