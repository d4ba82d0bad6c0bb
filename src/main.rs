use anyhow::Result;
use clap::Parser;
use proxyauth::auth::{
    Authorizer, CachedRemoteAuthorizer, HttpAuthSource, SnapshotAuthorizer, Synchronizer,
    VerdictCache,
};
use proxyauth::config::{
    CliOverrides, ConfigResolution, ConfigResolver, DecisionMode, EndpointFlavour, LogFormat,
    PayloadFormat,
};
use proxyauth::server::{ProtocolMode, QueryServer};
use proxyauth::startup::StartupLogger;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = "Authorization helper for forward proxies")]
#[command(version)]
struct Cli {
    /// Management API base address
    #[arg(long)]
    api_addr: Option<String>,

    /// Management API key
    #[arg(long)]
    api_key: Option<String>,

    /// Server identifier on the management API
    #[arg(long)]
    server_id: Option<String>,

    /// File with api address, api key and server id on three lines
    #[arg(long)]
    api_info_file: Option<PathBuf>,

    /// Number of concurrent auth workers
    #[arg(long)]
    auth_threads: Option<usize>,

    /// Settings file path (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Input lines carry no channel token
    #[arg(long)]
    non_concurrent: bool,

    /// How decisions are obtained (snapshot, per-request)
    #[arg(long)]
    decision_mode: Option<DecisionMode>,

    /// Hash and data endpoint naming (data, config)
    #[arg(long)]
    endpoint_flavour: Option<EndpointFlavour>,

    /// Data endpoint encoding (json, legacy)
    #[arg(long)]
    payload_format: Option<PayloadFormat>,

    /// Also poll master_password/get; its value overrides the payload's
    #[arg(long)]
    master_password_endpoint: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api_addr: self.api_addr.clone(),
            api_key: self.api_key.clone(),
            server_id: self.server_id.clone(),
            api_info_file: self.api_info_file.clone(),
            config_path: self.config.clone(),
            auth_threads: self.auth_threads,
            non_concurrent: self.non_concurrent,
            decision_mode: self.decision_mode,
            endpoint_flavour: self.endpoint_flavour,
            payload_format: self.payload_format,
            master_password_endpoint: self.master_password_endpoint,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolution = match ConfigResolver::new().and_then(|r| r.resolve(&cli.overrides())) {
        Ok(resolution) => resolution,
        Err(e) => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), LogFormat::Text)?;
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let logging = &resolution.config.settings.logging;
    init_logging(&logging.level, logging.format)?;

    StartupLogger::display_startup_info(&resolution, proxyauth::VERSION);

    run(resolution).await
}

async fn run(resolution: ConfigResolution) -> Result<()> {
    let config = resolution.config;
    let settings = &config.settings;

    let source = Arc::new(HttpAuthSource::new(config.remote.clone(), &settings.sync)?);

    let mut synchronizer = None;
    let authorizer: Arc<dyn Authorizer> = match settings.helper.decision_mode {
        DecisionMode::Snapshot => {
            let sync = Synchronizer::new(source, settings.sync.interval());
            // A failed first cycle is logged inside; the poller keeps retrying
            let _ = sync.initial_sync().await;
            sync.start();
            let authorizer = Arc::new(SnapshotAuthorizer::new(sync.handle()));
            synchronizer = Some(sync);
            authorizer
        }
        DecisionMode::PerRequest => Arc::new(CachedRemoteAuthorizer::new(
            source,
            VerdictCache::from_config(&settings.cache),
        )),
    };

    let server = QueryServer::new(
        authorizer,
        settings.helper.auth_threads,
        ProtocolMode::from_concurrent(settings.helper.concurrent),
    )?;

    info!("Waiting for queries on stdin");
    let served = server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await;

    if let Some(sync) = synchronizer {
        sync.stop().await;
        let status = sync.status();
        info!(
            "Last auth snapshot {} ({} updates, {} consecutive failures, {} master password failures)",
            status.version.as_deref().unwrap_or("<none>"),
            status.updates,
            status.consecutive_failures,
            status.master_password_failures
        );
    }

    if let Err(e) = served {
        error!("Query server stopped with error ({}): {}", e.category(), e);
        return Err(e.into());
    }

    info!("proxyauth exiting");
    Ok(())
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries protocol answers, so logs go to stderr
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}
