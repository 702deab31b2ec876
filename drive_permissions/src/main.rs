//! drive_permissions CLI - report how the files of a Google Drive account are shared.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use drive_permissions::oauth::{self, FlowOptions};
use drive_permissions::report::{self, ReportOptions};
use drive_permissions::{
    Authenticator, CredentialStore, DriveClient, EnricherConfig, EnumeratorConfig, RetryPolicy,
};

/// List every file of a Google Drive account and who it is shared with.
#[derive(Parser)]
#[command(name = "drive_permissions")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// OAuth client secrets downloaded from the Google Cloud console.
    #[arg(
        long,
        alias = "client_secret",
        env = "DRIVE_CLIENT_SECRET",
        default_value = "client_secret.json"
    )]
    client_secret: PathBuf,

    /// Where the user credential is cached
    /// (default: ~/.credentials/drive-file-permissions.json).
    #[arg(long, env = "DRIVE_CREDENTIAL_CACHE")]
    credential_cache: Option<PathBuf>,

    /// Authenticate as a service account instead of the interactive user flow.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    service_account: Option<PathBuf>,

    /// Directory receiving AllFiles.csv and FilePermissions.csv.
    #[arg(long, short = 'o', default_value = ".")]
    output_dir: PathBuf,

    /// Pause between per-file permission lookups, in milliseconds.
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Retries for rate-limited requests (0 aborts on the first one).
    #[arg(long, default_value_t = 0)]
    max_retries: u32,

    /// Only report files whose sharing flag is set.
    #[arg(long)]
    shared_only: bool,

    /// Trace every listing page token.
    #[arg(long)]
    debug: bool,

    /// Log level when RUST_LOG is not set.
    #[arg(long, alias = "logging_level", value_enum, default_value_t = LogLevel::Warn)]
    logging_level: LogLevel,

    /// Hostname for the local web server receiving the OAuth redirect.
    #[arg(long, alias = "auth_host_name", default_value = "localhost")]
    auth_host_name: String,

    /// Ports tried for the local web server.
    #[arg(
        long,
        alias = "auth_host_port",
        num_args = 1..,
        default_values_t = [8080u16, 8090]
    )]
    auth_host_port: Vec<u16>,

    /// Paste the redirect URL (or just its code) instead of running a local
    /// web server.
    #[arg(long, alias = "noauth_local_webserver")]
    noauth_local_webserver: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug { "debug" } else { cli.logging_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn authenticate(cli: &Cli) -> Result<Authenticator> {
    if let Some(path) = &cli.service_account {
        return Authenticator::from_service_account_file(path)
            .with_context(|| format!("Failed to load service account from {:?}", path));
    }

    let cache_path = match &cli.credential_cache {
        Some(path) => path.clone(),
        None => CredentialStore::default_path()?,
    };
    let options = FlowOptions {
        host: cli.auth_host_name.clone(),
        ports: cli.auth_host_port.clone(),
        local_webserver: !cli.noauth_local_webserver,
    };

    oauth::authorize_user(&cli.client_secret, CredentialStore::new(cache_path), options)
        .await
        .context("Authorization failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let auth = authenticate(&cli).await?;

    let client = DriveClient::new(auth).with_retry_policy(RetryPolicy {
        max_retries: cli.max_retries,
        ..RetryPolicy::default()
    });

    let options = ReportOptions {
        output_dir: cli.output_dir.clone(),
        enumerator: EnumeratorConfig { debug: cli.debug },
        enricher: EnricherConfig {
            delay: Duration::from_millis(cli.delay_ms),
            shared_only: cli.shared_only,
        },
    };

    let outcome = report::run(&client, &options)
        .await
        .context("Permission report failed")?;

    println!(
        "Done. {} files listed in {:?}, {} rows in {:?}",
        outcome.files_listed, outcome.all_files_path, outcome.rows_written, outcome.permissions_path
    );

    Ok(())
}
