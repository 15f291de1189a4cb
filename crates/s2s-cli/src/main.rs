//! # s2s CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Serve a directory, snapshotting registrations to ./state
//! S2S_SECRET=s3cret s2s directory -b 0.0.0.0:8080 --snapshot-dir ./state --api-key admin
//!
//! # Register a provider
//! S2S_SECRET=s3cret s2s register http://127.0.0.1:8080 exec 10.0.0.7:9090 --tag rack-a
//!
//! # Print a token for use elsewhere
//! S2S_SECRET=s3cret s2s sign exec 10.0.0.7:9090
//!
//! # Inspect and administer
//! s2s overview http://127.0.0.1:8080 --api-key admin | jq .
//! s2s set-status http://127.0.0.1:8080 exec 10.0.0.7:9090 pause --api-key admin
//! ```

use anyhow::Result;
use argh::FromArgs;
use s2s_cli::config::{probe_config, resolve_api_key, resolve_secret, validate_http_url};
use s2s_client::{DirectoryClient, Registrar};
use s2s_common::auth::{sign, AuthConfig};
use s2s_common::liveness::HttpLiveness;
use s2s_common::NodeAction;
use s2s_directory::{
    Directory, DirectoryConfig, FileStore, HttpServer, SnapshotConfig, SnapshotStore, SnapshotTask,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(FromArgs)]
/// s2s - self-registering service directory
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Directory(DirectoryArgs),
    Sign(SignArgs),
    Register(RegisterArgs),
    Unregister(UnregisterArgs),
    Overview(OverviewArgs),
    SetStatus(SetStatusArgs),
}

/// Arguments for serving a directory.
///
/// Providers are liveness-checked with `GET {addr}{ping-path}` when they
/// register and while they are quarantined.
#[derive(FromArgs)]
#[argh(subcommand, name = "directory")]
/// serve a service directory over HTTP
struct DirectoryArgs {
    /// address to bind the HTTP server to
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// registration secret (falls back to S2S_SECRET)
    #[argh(option, long = "secret")]
    secret: Option<String>,

    /// admin API key for overview and node-status (falls back to S2S_ADMIN_KEY)
    #[argh(option, long = "api-key")]
    api_key: Option<String>,

    /// directory to keep the registration snapshot in
    ///
    /// Without it, registrations are lost on restart.
    #[argh(option, long = "snapshot-dir")]
    snapshot_dir: Option<String>,

    /// seconds between snapshot saves
    #[argh(option, long = "snapshot-interval", default = "600")]
    snapshot_interval_secs: u64,

    /// liveness checks before a quarantined node is evicted
    #[argh(option, long = "probe-attempts", default = "5")]
    probe_attempts: u32,

    /// delay between two failed liveness checks in milliseconds
    #[argh(option, long = "probe-delay-ms", default = "2000")]
    probe_delay_ms: u64,

    /// deadline for one liveness check in milliseconds
    #[argh(option, long = "probe-timeout-ms", default = "2000")]
    probe_timeout_ms: u64,

    /// path providers answer liveness checks on
    #[argh(option, long = "ping-path", default = "\"/ping\".into()")]
    ping_path: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "sign")]
/// print the registration token for a service name and address
struct SignArgs {
    /// service name
    #[argh(positional)]
    name: String,

    /// provider address
    #[argh(positional)]
    url: String,

    /// registration secret (falls back to S2S_SECRET)
    #[argh(option, long = "secret")]
    secret: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "register")]
/// register a provider with a directory
struct RegisterArgs {
    /// directory URL, e.g. http://127.0.0.1:8080
    #[argh(positional)]
    directory: String,

    /// service name
    #[argh(positional)]
    name: String,

    /// provider address
    #[argh(positional)]
    url: String,

    /// free-text tag shown in the overview
    #[argh(option, long = "tag", default = "String::new()")]
    tag: String,

    /// registration secret (falls back to S2S_SECRET)
    #[argh(option, long = "secret")]
    secret: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "unregister")]
/// remove a provider from a directory
struct UnregisterArgs {
    /// directory URL
    #[argh(positional)]
    directory: String,

    /// service name
    #[argh(positional)]
    name: String,

    /// provider address
    #[argh(positional)]
    url: String,

    /// registration secret (falls back to S2S_SECRET)
    #[argh(option, long = "secret")]
    secret: Option<String>,
}

/// Prints the overview as raw JSON on stdout, for piping into `jq`.
#[derive(FromArgs)]
#[argh(subcommand, name = "overview")]
/// print every service and node of a directory as JSON
struct OverviewArgs {
    /// directory URL
    #[argh(positional)]
    directory: String,

    /// admin API key (falls back to S2S_ADMIN_KEY)
    #[argh(option, long = "api-key")]
    api_key: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "set-status")]
/// pause, restore or remove a node
struct SetStatusArgs {
    /// directory URL
    #[argh(positional)]
    directory: String,

    /// service name
    #[argh(positional)]
    service: String,

    /// node address
    #[argh(positional)]
    addr: String,

    /// one of pause, restore, remove
    #[argh(positional)]
    action: String,

    /// admin API key (falls back to S2S_ADMIN_KEY)
    #[argh(option, long = "api-key")]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // sign and overview print machine-readable output on stdout
    if !matches!(cli.command, Commands::Sign(_) | Commands::Overview(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Directory(args) => run_directory(args).await,
        Commands::Sign(args) => {
            let secret = resolve_secret(args.secret)?;
            println!("{}", sign(&secret, &args.name, &args.url));
            Ok(())
        }
        Commands::Register(args) => {
            validate_http_url(&args.directory, "directory URL")?;
            let registrar = Registrar::new(
                DirectoryClient::new(&args.directory),
                resolve_secret(args.secret)?,
            );
            registrar.register(&args.name, &args.url, &args.tag).await?;
            Ok(())
        }
        Commands::Unregister(args) => {
            validate_http_url(&args.directory, "directory URL")?;
            let registrar = Registrar::new(
                DirectoryClient::new(&args.directory),
                resolve_secret(args.secret)?,
            );
            registrar.unregister(&args.name, &args.url).await?;
            Ok(())
        }
        Commands::Overview(args) => {
            validate_http_url(&args.directory, "directory URL")?;
            let overview = admin_client(&args.directory, args.api_key).overview().await?;
            println!("{}", serde_json::to_string(&overview)?);
            Ok(())
        }
        Commands::SetStatus(args) => {
            validate_http_url(&args.directory, "directory URL")?;
            let action: NodeAction = args.action.parse()?;
            admin_client(&args.directory, args.api_key)
                .set_node_status(&args.service, &args.addr, action)
                .await?;
            tracing::info!("{} {} of service {}", action, args.addr, args.service);
            Ok(())
        }
    }
}

fn admin_client(directory: &str, api_key: Option<String>) -> DirectoryClient {
    let client = DirectoryClient::new(directory);
    match resolve_api_key(api_key) {
        Some(key) => client.with_api_key(key),
        None => client,
    }
}

/// Executes the `directory` subcommand.
///
/// With `--snapshot-dir`, the previous snapshot is replayed in the
/// background (so the HTTP surface is up immediately), a save runs every
/// `--snapshot-interval` seconds once the replay is done, and a final save
/// runs on Ctrl-C unless the replay was still going.
async fn run_directory(args: DirectoryArgs) -> Result<()> {
    let secret = resolve_secret(args.secret)?;
    let probe = probe_config(args.probe_attempts, args.probe_delay_ms, args.probe_timeout_ms)?;
    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind, e))?;

    let liveness = HttpLiveness::new()
        .with_path(args.ping_path)
        .with_timeout(probe.timeout);
    tracing::info!(
        "Liveness checks: GET {} ({} attempts, {:?} apart)",
        liveness.path(),
        probe.attempts,
        probe.delay
    );

    let config = DirectoryConfig {
        probe,
        ..DirectoryConfig::default()
    };
    let directory = Arc::new(Directory::with_config(secret, Arc::new(liveness), config));

    let mut snapshot = None;
    if let Some(dir) = &args.snapshot_dir {
        let store: Arc<dyn SnapshotStore> = Arc::new(FileStore::new(dir));
        let snapshot_config = SnapshotConfig {
            interval: Duration::from_secs(args.snapshot_interval_secs.max(1)),
            ..SnapshotConfig::default()
        };
        tracing::info!(
            "Snapshots in {} every {:?}",
            dir,
            snapshot_config.interval
        );

        snapshot = Some(SnapshotTask::new(Arc::clone(&directory), store, snapshot_config).spawn());
    } else {
        tracing::warn!("No --snapshot-dir given; registrations will not survive a restart");
    }

    let auth = match resolve_api_key(args.api_key) {
        Some(api_key) => {
            tracing::info!("API key authentication enabled");
            AuthConfig::with_api_key(api_key)
        }
        None => AuthConfig::disabled(),
    };
    let server = HttpServer::with_auth(Arc::clone(&directory), auth);

    tokio::select! {
        result = server.run(addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            if let Some(handle) = snapshot {
                if let Some(saved) = handle.shutdown().await? {
                    tracing::info!("Saved {} node(s) before exit", saved);
                }
            }
        }
    }
    Ok(())
}
