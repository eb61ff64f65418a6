use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grove_core::{Grove, GroveConfig};
use grove_store::GroveStore;

mod commands;
mod ui;

#[derive(Parser)]
#[command(name = "grove")]
#[command(about = "Operate a Grove deployment from the terminal.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a profile (or show the existing one)
    Profile {
        #[arg(value_name = "USER")]
        user: String,
    },

    /// Show a user's garden
    Garden {
        #[arg(value_name = "USER")]
        user: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Plant a new plant for a metric
    Plant {
        #[arg(value_name = "USER")]
        user: String,

        #[arg(value_name = "METRIC")]
        metric: String,

        /// career, health, relationships, learning or mindfulness
        #[arg(long, short, default_value = "career")]
        category: String,

        /// Daily goal; falls back to the metric's default
        #[arg(long, short)]
        goal: Option<f64>,

        #[arg(long)]
        name: Option<String>,
    },

    /// Record a metric value by hand
    Log {
        #[arg(value_name = "USER")]
        user: String,

        #[arg(value_name = "METRIC")]
        metric: String,

        #[arg(value_name = "VALUE")]
        value: f64,

        /// YYYY-MM-DD, defaults to today
        #[arg(long, short)]
        date: Option<String>,
    },

    /// Log activities described in plain language
    Chat {
        #[arg(value_name = "USER")]
        user: String,

        #[arg(value_name = "MESSAGE", num_args = 1.., trailing_var_arg = true)]
        message: Vec<String>,
    },

    /// Apply today's growth rules to every plant
    Evaluate {
        #[arg(value_name = "USER")]
        user: String,
    },

    /// Sync one integration now
    Sync {
        #[arg(value_name = "USER")]
        user: String,

        /// gmail, google_fit or github
        #[arg(value_name = "PROVIDER")]
        provider: String,
    },

    /// Sync every active integration once
    Sweep,

    /// List the providers this deployment can sync
    Providers,

    /// Print the consent URL for connecting a provider
    Connect {
        #[arg(value_name = "USER")]
        user: String,

        #[arg(value_name = "PROVIDER")]
        provider: String,
    },

    /// Show recent sync attempts
    Logs {
        #[arg(value_name = "USER")]
        user: String,

        /// Number of entries to show
        #[arg(short = 'n', default_value = "20")]
        limit: usize,
    },
}

async fn open() -> Result<Grove> {
    let config = GroveConfig::from_env().context("loading configuration")?;
    let store = GroveStore::connect(&config.database_path)
        .await
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    Ok(Grove::new(config, store)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Debug logs stay hidden unless RUST_LOG asks for them.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let grove = open().await?;

    match cli.command {
        Commands::Profile { user } => commands::garden::profile(&grove, &user).await,
        Commands::Garden { user, json } => commands::garden::show(&grove, &user, json).await,
        Commands::Plant {
            user,
            metric,
            category,
            goal,
            name,
        } => commands::garden::plant(&grove, &user, metric, category, goal, name).await,
        Commands::Log {
            user,
            metric,
            value,
            date,
        } => commands::log::manual(&grove, &user, &metric, value, date.as_deref()).await,
        Commands::Chat { user, message } => {
            commands::log::chat(&grove, &user, &message.join(" ")).await
        }
        Commands::Evaluate { user } => commands::garden::evaluate(&grove, &user).await,
        Commands::Sync { user, provider } => commands::sync::one(&grove, &user, &provider).await,
        Commands::Sweep => commands::sync::sweep(&grove).await,
        Commands::Providers => {
            commands::sync::providers(&grove);
            Ok(())
        }
        Commands::Connect { user, provider } => {
            commands::sync::connect(&grove, &user, &provider)
        }
        Commands::Logs { user, limit } => commands::sync::logs(&grove, &user, limit).await,
    }
}
