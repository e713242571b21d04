use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use cli_oauth::{
    AuthorizationConfig, AuthorizationFlow, AuthorizedClient, ConsentMode,
    DEFAULT_CALLBACK_PORT, ExchangeError, FlowError, FlowOptions, FlowStage, NoBrowser,
    TokenStore, TokenStoreError, scopes,
};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status after Ctrl+C, as a shell reports SIGINT
const EXIT_INTERRUPTED: u8 = 130;

/// YouTube OAuth 2.0 login helper - obtains, caches and refreshes access tokens
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the OAuth client credentials JSON file
    #[arg(
        long,
        env = "YT_AUTH_CREDENTIALS",
        default_value = "client_credentials.json"
    )]
    credentials: PathBuf,

    /// OAuth client ID (use instead of a credentials file)
    #[arg(long, requires = "client_secret")]
    client_id: Option<String>,

    /// OAuth client secret (use instead of a credentials file)
    #[arg(long, requires = "client_id")]
    client_secret: Option<String>,

    /// Scope to request: readonly, upload, manage or a full scope URL (repeatable)
    #[arg(long = "scope", default_value = "readonly")]
    scopes: Vec<String>,

    /// Application name; the token is cached at ~/.<app>/<app>-token.json
    #[arg(long, default_value = "youtube")]
    app_name: String,

    /// Path of the token cache file (overrides --app-name location)
    #[arg(long)]
    token_path: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize (unless a usable token is cached) and cache the token
    Login {
        /// Paste the authorization code instead of using the local redirect
        #[arg(long)]
        manual: bool,

        /// Do not try to open a browser, only print the URL
        #[arg(long)]
        no_browser: bool,

        /// Port for the local redirect listener
        #[arg(long, default_value_t = DEFAULT_CALLBACK_PORT)]
        port: u16,

        /// Fail instead of switching to manual entry when the port is busy
        #[arg(long)]
        no_fallback: bool,

        /// Give up waiting for the redirect after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Show the cached token's status
    Status,
    /// Print a valid access token, refreshing it if needed
    Token,
    /// Delete the cached token
    Logout,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Reported on stderr as `error: <stage>: <cause>`
#[derive(Debug, Error)]
enum CliError {
    #[error("{stage}: {0}", stage = .0.stage())]
    Flow(#[from] FlowError),
    #[error("{stage}: {0}", stage = FlowStage::CheckingCache)]
    Cache(#[from] TokenStoreError),
    #[error("{stage}: {0}", stage = FlowStage::Authenticated)]
    Refresh(#[from] ExchangeError),
}

impl CliError {
    fn is_interrupted(&self) -> bool {
        matches!(self, Self::Flow(FlowError::Interrupted(_)))
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(args: &Args) -> Result<AuthorizationConfig, FlowError> {
    let scopes: Vec<String> = args.scopes.iter().map(|s| scopes::resolve(s)).collect();
    let config = match (&args.client_id, &args.client_secret) {
        (Some(id), Some(secret)) => {
            AuthorizationConfig::new(id.clone(), secret.clone()).with_scopes(scopes)
        }
        _ => {
            eprintln!("Reading client credentials from: {}", args.credentials.display());
            AuthorizationConfig::from_credentials_file(&args.credentials, scopes)?
        }
    };
    config.validate()?;
    Ok(config)
}

fn token_store(args: &Args) -> Result<TokenStore, TokenStoreError> {
    match &args.token_path {
        Some(path) => Ok(TokenStore::new(path)),
        None => TokenStore::for_app(&args.app_name),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    // Ctrl+C ends the process in every phase, including after the flow returns
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted");
            std::process::exit(EXIT_INTERRUPTED.into());
        }
    });

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_interrupted() {
                // skip runtime shutdown, it waits on a pending stdin read
                std::process::exit(EXIT_INTERRUPTED.into());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let store = token_store(&args)?;
    debug!(path = %store.path().display(), "token cache location");

    match &args.command {
        Command::Login {
            manual,
            no_browser,
            port,
            no_fallback,
            timeout_secs,
        } => {
            let options = FlowOptions {
                mode: if *manual {
                    ConsentMode::Manual
                } else {
                    ConsentMode::LocalRedirect
                },
                callback_port: *port,
                manual_fallback: !no_fallback,
                callback_timeout: timeout_secs.map(Duration::from_secs),
            };
            let client = authorize(&args, store.clone(), options, *no_browser).await?;
            let token = client.token().await;

            match store.load() {
                Ok(cached) if cached == token => {
                    eprintln!("\nOAuth token cached at: {}", store.path().display());
                }
                _ => eprintln!(
                    "\nOAuth token could not be cached at: {}",
                    store.path().display()
                ),
            }
            if let Some(remaining) = token.expires_in() {
                eprintln!("Access token expires in {} seconds", remaining.as_secs());
            }
            Ok(())
        }
        Command::Token => {
            let client = authorize(&args, store, FlowOptions::default(), false).await?;
            let access_token = client.access_token().await?;
            println!("{}", access_token);
            Ok(())
        }
        Command::Status => {
            match store.load() {
                Ok(token) => {
                    println!("Token cache: {}", store.path().display());
                    println!("Token type: {}", token.token_type);
                    println!(
                        "Refresh token: {}",
                        if token.refresh_token.is_some() { "present" } else { "absent" }
                    );
                    match token.expires_in() {
                        Some(_) if token.is_expired() => println!("Status: expired"),
                        Some(remaining) => {
                            println!("Status: valid ({} seconds remaining)", remaining.as_secs())
                        }
                        None => println!("Status: valid (no expiry)"),
                    }
                }
                Err(e) if e.is_not_found() => {
                    println!("Not logged in (no token at {})", store.path().display());
                }
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        Command::Logout => {
            let removed = store.clear()?;
            if removed {
                println!("Removed cached token at {}", store.path().display());
            } else {
                println!("No cached token at {}", store.path().display());
            }
            Ok(())
        }
    }
}

async fn authorize(
    args: &Args,
    store: TokenStore,
    options: FlowOptions,
    no_browser: bool,
) -> Result<AuthorizedClient, FlowError> {
    let config = load_config(args)?;
    let mut flow = AuthorizationFlow::new(config, store).with_options(options);
    if no_browser {
        flow = flow.with_browser(NoBrowser);
    }
    flow.run().await
}
