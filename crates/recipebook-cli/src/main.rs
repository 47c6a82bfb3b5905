//! recipebook - command-line client for the recipe book.
//!
//! Signs in against the identity provider, keeps the session on disk until
//! its token expires and syncs the recipe list with the document store.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use recipebook_core::api::IdentityClient;
use recipebook_core::auth::Navigator;
use recipebook_core::recipes::{Recipe, RecipeStorage, RECIPES_CACHE_KEY};
use recipebook_core::storage::{CachedData, FileStorage};
use recipebook_core::{Config, SessionManager};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Log file name inside the cache directory
const LOG_FILE: &str = "recipebook.log";

/// Environment variable checked before prompting for a password
const ENV_PASSWORD: &str = "RECIPEBOOK_PASSWORD";

#[derive(Parser)]
#[command(name = "recipebook", version, about = "Sign in and sync your recipe book")]
struct Cli {
    /// Also write logs to a file in the cache directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign in with an existing account
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show who is signed in
    Status,
    /// Stay running until the saved session expires
    Watch,
    /// Download the recipe list
    FetchRecipes {
        /// Show the last downloaded copy instead of contacting the server
        #[arg(long)]
        offline: bool,
    },
    /// Upload a recipe list from a JSON file, replacing what is stored
    StoreRecipes { file: PathBuf },
}

/// There are no views to route between; logging out just tells the user how
/// to get back in.
struct CliNavigator;

impl Navigator for CliNavigator {
    fn navigate(&self, route: &str) {
        info!(route, "Navigation requested");
        eprintln!("Signed out. Run `recipebook login` to sign in again.");
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
    let storage = Arc::new(FileStorage::new(cache_dir.clone())?);
    let _log_guard = init_tracing(cli.log_file.then_some(cache_dir.as_path()));
    debug!(?cache_dir, "Cache directory configured");

    let identity = IdentityClient::with_base_url(
        config.identity_base_url(),
        config.api_key.clone().unwrap_or_default(),
    )?;
    let manager = SessionManager::new(Arc::new(identity), storage.clone(), Arc::new(CliNavigator));

    let restored = manager.auto_login();
    debug!(restored, "Startup session check");

    match cli.command {
        Command::Signup { email } => {
            config.require_api_key()?;
            let email = resolve_email(email, &config)?;
            let password = prompt_password()?;
            let record = manager.sign_up(&email, &password).await?;
            remember_email(&mut config, &email);
            println!("Account created for {}. {}", record.email(), expiry_line(&manager));
        }
        Command::Login { email } => {
            config.require_api_key()?;
            let email = resolve_email(email, &config)?;
            let password = prompt_password()?;
            let record = manager.login(&email, &password).await?;
            remember_email(&mut config, &email);
            println!("Signed in as {}. {}", record.email(), expiry_line(&manager));
        }
        Command::Logout => manager.logout(),
        Command::Status => match manager.current() {
            Some(record) if manager.is_authenticated() => {
                println!("Signed in as {} ({}). {}", record.email(), record.user_id(), expiry_line(&manager));
            }
            _ => println!("Not signed in."),
        },
        Command::Watch => watch_session(&manager).await?,
        Command::FetchRecipes { offline: true } => {
            match CachedData::<Vec<Recipe>>::load(&*storage, RECIPES_CACHE_KEY)? {
                Some(cached) => {
                    println!("Offline copy from {}:", cached.age_display());
                    print_recipes(&cached.data);
                }
                None => println!("No offline copy yet. Run `recipebook fetch-recipes` first."),
            }
        }
        Command::FetchRecipes { offline: false } => {
            let client = recipe_client(&config, &manager)?;
            let recipes = client.fetch_recipes().await?;
            if let Err(e) = CachedData::new(recipes.clone()).save(&*storage, RECIPES_CACHE_KEY) {
                warn!(error = %e, "Failed to cache recipes");
            }
            print_recipes(&recipes);
        }
        Command::StoreRecipes { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let recipes: Vec<Recipe> = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not a recipe list", file.display()))?;
            let client = recipe_client(&config, &manager)?;
            client.store_recipes(&recipes).await?;
            println!("Stored {} recipes.", recipes.len());
        }
    }

    Ok(())
}

fn resolve_email(email: Option<String>, config: &Config) -> Result<String> {
    if let Some(email) = email {
        return Ok(email);
    }

    match config.last_email {
        Some(ref last) => {
            print!("Email [{}]: ", last);
            io::stdout().flush()?;
            let input = read_line()?;
            Ok(if input.is_empty() { last.clone() } else { input })
        }
        None => {
            print!("Email: ");
            io::stdout().flush()?;
            read_line()
        }
    }
}

fn read_line() -> Result<String> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_password() -> Result<String> {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        return Ok(password);
    }
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}

fn remember_email(config: &mut Config, email: &str) {
    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

fn expiry_line(manager: &SessionManager) -> String {
    match manager.current() {
        Some(record) => format!(
            "Session expires at {}.",
            record.expires_at().with_timezone(&Local).format("%H:%M:%S")
        ),
        None => String::new(),
    }
}

fn recipe_client(config: &Config, manager: &SessionManager) -> Result<RecipeStorage> {
    let database_url = config.require_database_url()?;
    if !manager.is_authenticated() {
        warn!("Not signed in; sending recipe request without a token");
    }
    Ok(RecipeStorage::new(database_url, Arc::new(manager.clone()))?)
}

async fn watch_session(manager: &SessionManager) -> Result<()> {
    let mut rx = manager.subscribe();
    if rx.borrow_and_update().is_none() {
        anyhow::bail!("Not signed in.");
    }

    println!("Watching session. {}", expiry_line(manager));
    while rx.changed().await.is_ok() {
        if rx.borrow_and_update().is_none() {
            break;
        }
    }
    Ok(())
}

fn print_recipes(recipes: &[Recipe]) {
    if recipes.is_empty() {
        println!("No recipes.");
        return;
    }
    for recipe in recipes {
        println!("{} ({} ingredients)", recipe.name, recipe.ingredient_count());
        if !recipe.description.is_empty() {
            println!("    {}", recipe.description);
        }
    }
}
