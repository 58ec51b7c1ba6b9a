mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ghantt::chart::HtmlFile;
use ghantt::config::{Config, WatermarkField, DEFAULT_API_URL};
use ghantt::tracker::{Chain, GitHubClient};

use commands::export::Format;
use commands::list::{Kind, Status};

#[derive(Parser)]
#[command(name = "ghantt")]
#[command(about = "Gantt chart of a GitHub repository's issue history")]
#[command(version)]
struct Cli {
    /// Repository owner or organization
    #[arg(short, long, global = true, env = "GHANTT_OWNER")]
    owner: Option<String>,

    /// Repository name
    #[arg(short, long, global = true, env = "GHANTT_REPO")]
    repo: Option<String>,

    /// Log in as this user (prompts for a password or token)
    #[arg(short, long, global = true, env = "GHANTT_LOGIN")]
    login: Option<String>,

    /// Directory for the cache and chart files
    #[arg(long, global = true, env = "GHANTT_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// GitHub API base URL
    #[arg(long, global = true, env = "GHANTT_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new and updated issues into the local cache
    Fetch {
        /// Timestamp used to decide what is new since the last fetch
        #[arg(long, value_enum, default_value = "created")]
        since: WatermarkField,
    },

    /// Render the cached issues as an HTML chart
    Graph,

    /// Fetch, then graph (the default)
    Run {
        /// Timestamp used to decide what is new since the last fetch
        #[arg(long, value_enum, default_value = "created")]
        since: WatermarkField,
    },

    /// List cached issues
    List {
        /// Filter by status
        #[arg(short, long, value_enum, default_value = "all")]
        status: Status,
        /// Issues, pull requests, or both
        #[arg(short, long, value_enum, default_value = "all")]
        kind: Kind,
    },

    /// Export the cache
    Export {
        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: Format,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },
}

fn init_logging(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    let owner = cli
        .owner
        .as_deref()
        .context("Missing repository owner. Pass --owner or set GHANTT_OWNER.")?;
    let repo = cli
        .repo
        .as_deref()
        .context("Missing repository name. Pass --repo or set GHANTT_REPO.")?;

    let mut config = Config::new(owner, repo);
    config.login_user = cli.login.clone();
    config.data_dir = cli.data_dir.clone();
    config.api_url = cli.api_url.clone();
    config.validate()?;
    Ok(config)
}

fn github_client(config: &Config) -> Result<GitHubClient> {
    let credentials = Chain::for_config(config).resolve()?;
    GitHubClient::new(config, credentials)
}

fn chart_backend(config: &Config) -> HtmlFile {
    HtmlFile {
        path: config.chart_path(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let mut config = build_config(&cli)?;
    tracing::debug!(repository = %config.repository(), data_dir = %config.data_dir.display(), "starting");

    match cli.command.unwrap_or(Commands::Run {
        since: WatermarkField::default(),
    }) {
        Commands::Fetch { since } => {
            config.watermark_field = since;
            let client = github_client(&config)?;
            commands::fetch::run(&config, &client)?;
            Ok(())
        }

        Commands::Graph => {
            commands::graph::run(&config, &chart_backend(&config))?;
            println!("Wrote {}", config.chart_path().display());
            Ok(())
        }

        Commands::Run { since } => {
            config.watermark_field = since;
            let client = github_client(&config)?;
            commands::run::run(&config, &client, &chart_backend(&config))?;
            println!("Wrote {}", config.chart_path().display());
            Ok(())
        }

        Commands::List { status, kind } => commands::list::run(&config, status, kind),

        Commands::Export { format, output } => {
            commands::export::run(&config, format, output.as_deref())
        }
    }
}
