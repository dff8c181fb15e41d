//! `prwatch`: open pull requests across several GitHub accounts, grouped by
//! how they involve you, with a cached view and a badge count.

mod aggregate;
mod app;
mod auth;
mod config;
mod domain;
mod github;
mod storage;

use std::{
    io::{self, BufRead, Write as _},
    num::NonZeroU32,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{debug, warn};

use aggregate::{AggregationEngine, GitHubConnector, PassMode};
use app::{APP_NAME, ConsoleReporter, WatchOptions, render_badge};
use auth::{AuthError, AuthorizationSession};
use config::{AppConfig, ConfigError};
use domain::{Category, UserId};
use github::{FetchError, GitHubClient};
use storage::{JsonFileStore, KeyValueStore, StoreError};

#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about = "Track open GitHub pull requests across accounts")]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage stored accounts.
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },

    /// Sign in through the browser authorization flow.
    Login,

    /// Sign the active account out and drop its cached data.
    Logout,

    /// Show or change which categories are tracked and how often.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Print pull requests for the active account.
    Prs {
        /// Ignore cache freshness and fetch every enabled category.
        #[arg(long)]
        refresh: bool,
        /// Only show rows whose repo, title, author, or URL contains this text.
        #[arg(long, default_value = "")]
        filter: String,
    },

    /// Print the count of open pull requests you authored.
    Badge,

    /// Keep the view current, re-running on the refresh interval.
    Watch {
        /// Stop after this many polls.
        #[arg(long)]
        ticks: Option<u64>,
        /// Seconds between checks for due refreshes or stored changes.
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
        poll_secs: u64,
    },
}

#[derive(Subcommand, Debug)]
enum AccountsAction {
    /// List accounts; the active one is starred.
    List,
    /// Add an account from a personal access token.
    Add {
        #[arg(long)]
        token: String,
    },
    /// Make another stored account active.
    Switch { id: UserId },
    /// Forget an account and its cached data.
    Remove { id: UserId },
    /// Forget every account and all cached data.
    Clear,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Enable {
        #[arg(value_parser = parse_category)]
        category: Category,
    },
    Disable {
        #[arg(value_parser = parse_category)]
        category: Category,
    },
    /// Minutes before cached data is considered stale.
    Interval { minutes: NonZeroU32 },
}

fn parse_category(raw: &str) -> Result<Category, String> {
    Category::from_id(raw).ok_or_else(|| {
        let known: Vec<&str> = Category::ALL.iter().map(|category| category.id()).collect();
        format!("unknown category {raw:?}; expected one of {}", known.join(", "))
    })
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
    #[error("no stored account with id {0}")]
    UnknownAccount(UserId),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Auth(err)) => {
            warn!(error = %err, "sign-in failed");
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
        Err(AppError::Fetch(err)) => {
            warn!(error = %err, "request failed");
            eprintln!("error: {}", err.display_message());
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(command: Commands) -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let store = JsonFileStore::open(config.storage_dir.clone())?;
    debug!(dir = %store.dir().display(), api_base = %config.api_base, "state store opened");

    let kv: Arc<dyn KeyValueStore> = Arc::new(store);
    let engine = AggregationEngine::new(kv.clone(), GitHubConnector::new(&config.api_base));

    match command {
        Commands::Accounts { action } => accounts(&engine, &config, action),
        Commands::Login => login(&engine, &config),
        Commands::Logout => {
            match engine.logout()? {
                Some(account) => println!("Signed out {}.", account.user.login),
                None => println!("No account is signed in."),
            }
            Ok(())
        }
        Commands::Settings { action } => settings(&engine, action),
        Commands::Prs { refresh, filter } => {
            if engine.settings().get_enabled_categories().is_empty() {
                eprintln!("No categories are enabled. Try `{APP_NAME} settings enable created`.");
            }
            let mode = if refresh {
                PassMode::Refresh
            } else {
                PassMode::Initial
            };
            engine.run(mode, &mut ConsoleReporter::new(&filter, false));
            Ok(())
        }
        Commands::Badge => {
            println!("{}", render_badge(&engine.quick_badge()?));
            Ok(())
        }
        Commands::Watch { ticks, poll_secs } => {
            app::watch(
                &engine,
                kv.as_ref(),
                WatchOptions {
                    poll: Duration::from_secs(poll_secs),
                    ticks,
                },
                &mut ConsoleReporter::new("", true),
            );
            Ok(())
        }
    }
}

fn accounts(
    engine: &AggregationEngine<GitHubConnector>,
    config: &AppConfig,
    action: AccountsAction,
) -> Result<(), AppError> {
    match action {
        AccountsAction::List => {
            let state = engine.accounts().get_auth_state();
            if state.accounts.is_empty() {
                println!("No accounts. Run `{APP_NAME} login` to add one.");
            }
            let active = state.active_account().map(|account| account.id());
            for account in &state.accounts {
                let marker = if Some(account.id()) == active { "*" } else { " " };
                let name = account.user.name.as_deref().unwrap_or_default();
                println!("{marker} {:<12} {} {name}", account.id(), account.user.login);
            }
        }
        AccountsAction::Add { token } => {
            let token = token.trim();
            let client = GitHubClient::connect(&config.api_base, token)?;
            let user = auth::register_account(&client, token, engine.accounts())?;
            println!("Added {} ({}).", user.login, user.id);
        }
        AccountsAction::Switch { id } => {
            if !engine.accounts().set_active_account(id)? {
                return Err(AppError::UnknownAccount(id));
            }
            println!("Switched to account {id}.");
        }
        AccountsAction::Remove { id } => {
            if !engine.remove_account(id)? {
                return Err(AppError::UnknownAccount(id));
            }
            println!("Removed account {id}.");
        }
        AccountsAction::Clear => {
            let removed = engine.clear_accounts()?;
            println!("Removed {removed} account(s).");
        }
    }
    Ok(())
}

fn login(engine: &AggregationEngine<GitHubConnector>, config: &AppConfig) -> Result<(), AppError> {
    let relay_url = config.relay_url()?;
    let session = AuthorizationSession::begin(config.client_id()?, &config.redirect_uri)?;

    println!("Open this URL in a browser and approve access:\n\n  {}\n", session.authorize_url());
    print!("Paste the URL you were redirected to: ");
    io::stdout().flush()?;
    let mut callback = String::new();
    io::stdin().lock().read_line(&mut callback)?;

    let code = session.complete(&callback)?;
    let http = github::build_client()?;
    let token = auth::exchange_code(&http, relay_url, &code)?;
    let client = GitHubClient::connect(&config.api_base, &token).map_err(AuthError::Identity)?;
    let user = auth::register_account(&client, &token, engine.accounts())?;

    println!("Signed in as {}.", user.login);
    Ok(())
}

fn settings(
    engine: &AggregationEngine<GitHubConnector>,
    action: SettingsAction,
) -> Result<(), AppError> {
    let store = engine.settings();
    match action {
        SettingsAction::Show => {}
        SettingsAction::Enable { category } => store.set_category_enabled(category, true)?,
        SettingsAction::Disable { category } => store.set_category_enabled(category, false)?,
        SettingsAction::Interval { minutes } => store.set_refresh_interval(minutes)?,
    }

    let settings = store.get_settings();
    println!("Refresh interval: {} min", settings.refresh_interval_minutes);
    for config in &settings.categories {
        let mark = if config.enabled { "x" } else { " " };
        println!("[{mark}] {:<16} {}", config.id.id(), config.label);
    }
    Ok(())
}
