//! CLI for plantwatch: live plant telemetry and history browsing.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "plantwatch")]
#[command(about = "plantwatch: near-real-time plant telemetry from the terminal")]
#[command(version = plantwatch_core::VERSION)]
struct Cli {
    /// JSON config file; fields not listed keep their defaults
    #[arg(long, global = true)]
    config: Option<String>,

    /// Backend base URL (overrides the config file)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token. Falls back to PLANTWATCH_TOKEN, then the token file.
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the live feed and print the latest plant reading
    Live {
        /// Refresh rate in seconds
        #[arg(long, default_value = "2.0")]
        refresh: f64,

        /// Also seed the window with this many trailing minutes of history
        #[arg(long)]
        history_minutes: Option<u64>,

        /// Live window bound (records)
        #[arg(long)]
        window: Option<usize>,
    },

    /// Fetch historical readings and print per-metric display ranges
    History {
        /// First day, YYYY-MM-DD (default: yesterday)
        #[arg(long)]
        from: Option<String>,

        /// Last day, YYYY-MM-DD (default: today)
        #[arg(long)]
        to: Option<String>,

        /// Maximum number of records
        #[arg(long, default_value = "5000")]
        limit: usize,

        /// Write records and ranges as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Log in and store the issued token
    Login {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Forget the stored token
    Logout,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = commands::load_config(cli.config.as_deref(), cli.base_url.as_deref());

    match cli.command {
        Commands::Live {
            refresh,
            history_minutes,
            window,
        } => {
            if history_minutes.is_some() {
                config.history_seed_minutes = history_minutes;
            }
            if let Some(capacity) = window {
                config.window_capacity = capacity.max(1);
            }
            let token = commands::resolve_token(&config, cli.token.as_deref());
            commands::live::run(&config, token, refresh);
        }
        Commands::History {
            from,
            to,
            limit,
            output,
        } => {
            let token = commands::resolve_token(&config, cli.token.as_deref());
            commands::history::run(
                &config,
                token,
                from.as_deref(),
                to.as_deref(),
                limit,
                output.as_deref(),
            );
        }
        Commands::Login { email, password } => commands::login::run(&config, &email, &password),
        Commands::Logout => commands::login::logout(&config),
    }
}
