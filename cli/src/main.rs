use std::path::PathBuf;
use std::sync::Arc;

use authsession::config::normalize_base_url;
use authsession::{
    AuthConfig, AuthError, FilePersistence, HttpAuthApi, LoginCredentials, Navigator, RegistrationDetails,
    SessionPersistence, SessionStore, User, redirect_if_unauthenticated,
};
use clap::{Parser, Subcommand};
use tracing::Level;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("not logged in; run `authsession-cli login` first")]
    NotLoggedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "authsession-cli", about = "Sign in to the auth API and manage the stored session")]
struct Cli {
    /// API root, e.g. `http://localhost:5001/api`.
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// File the session is kept in between runs.
    #[arg(long, env = "AUTH_SESSION_PATH")]
    session_path: Option<PathBuf>,

    /// Log request and session activity to stderr.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and store the session.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        address: String,
        #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Re-fetch the signed-in user's profile and print it.
    Profile,
    /// Forget the stored session.
    Logout,
    /// Report whether a session is stored.
    Status,
}

/// Stands in for a router: the CLI just reports where the user would be sent.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate_to(&self, path: &str) {
        tracing::debug!(path, "navigate");
        eprintln!("-> {path}");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let config = resolve_config(cli.base_url, cli.session_path)?;
    tracing::debug!(base_url = %config.base_url, session_path = %config.session_path.display(), "config loaded");

    let persistence: Arc<dyn SessionPersistence> = Arc::new(FilePersistence::new(config.session_path.clone()));
    let api = Arc::new(HttpAuthApi::new(&config, persistence.clone())?);
    let navigator = Arc::new(TerminalNavigator);
    let store = SessionStore::new(persistence, api, navigator.clone());

    match cli.command {
        Command::Login { email, password } => {
            let session = store.login(&LoginCredentials { email, password }).await?;
            println!("logged in as {}", label(session.user.as_ref()));
        }
        Command::Register { name, email, phone, address, password, confirm_password } => {
            let details =
                RegistrationDetails { name, email, phone, address, password, confirm_password, terms: "agree".to_owned() };
            let session = store.register(&details).await?;
            println!("registered and logged in as {}", label(session.user.as_ref()));
        }
        Command::Profile => {
            if redirect_if_unauthenticated(&store, navigator.as_ref()) {
                return Err(CliError::NotLoggedIn);
            }
            let user = store.refresh_profile().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::Logout => {
            store.logout();
            println!("logged out");
        }
        Command::Status => {
            if store.is_logged_in() {
                println!("logged in as {}", label(store.user().as_ref()));
            } else {
                println!("not logged in");
            }
        }
    }
    Ok(())
}

/// Flags win over the environment, which wins over defaults.
fn resolve_config(base_url: Option<String>, session_path: Option<PathBuf>) -> Result<AuthConfig, CliError> {
    let mut config = AuthConfig::from_env()?;
    if let Some(raw) = base_url {
        config.base_url = normalize_base_url(&raw)?;
    }
    if let Some(path) = session_path {
        config.session_path = path;
    }
    Ok(config)
}

fn label(user: Option<&User>) -> String {
    user.and_then(User::display_name).unwrap_or_else(|| "unknown user".to_owned())
}
