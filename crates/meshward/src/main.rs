use clap::{Parser, Subcommand, ValueEnum};
use meshward_cloud::{CallTimeouts, Throttler};
use meshward_controller::{
    normalize_account_id, ClusterClient, ControllerConfig, HttpClusterClient, MeshController,
    RemoteBackends,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "meshward", about = "Meshward service-mesh control-plane controller")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true, env = "MESHWARD_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller and the discovery instance reconciler
    Run {
        /// Base URL of the cluster API server
        #[arg(long, env = "MESHWARD_API_SERVER_URL", default_value = "http://127.0.0.1:6443")]
        api_server_url: String,
        /// Account the controller acts as
        #[arg(long, env = "AWS_ACCOUNT_ID")]
        account_id: Option<String>,
        /// Region used in remote ARNs
        #[arg(long, env = "AWS_REGION")]
        region: Option<String>,
        /// Path to a YAML controller config
        #[arg(long)]
        config: Option<PathBuf>,
        /// Throttle overrides, `service:operationRegex=rate:burst[,...]`
        #[arg(long)]
        aws_api_throttle: Option<String>,
    },
    /// Check a controller config file and exit
    ValidateConfig {
        /// Path to a YAML controller config
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    match cli.command {
        Commands::Run {
            api_server_url,
            account_id,
            region,
            config,
            aws_api_throttle,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(account_id) = account_id {
                config.account_id = account_id;
            }
            if let Some(region) = region {
                config.region = region;
            }
            if aws_api_throttle.is_some() {
                config.throttle = aws_api_throttle;
            }
            run_controller(&api_server_url, config).await
        }
        Commands::ValidateConfig { config } => validate_config(&config),
    }
}

/// Load the config file, or defaults when none is given
fn load_config(path: Option<&Path>) -> miette::Result<ControllerConfig> {
    match path {
        Some(path) => Ok(ControllerConfig::load(path)?),
        None => Ok(ControllerConfig::default()),
    }
}

/// Normalize and check a config, returning the throttler it describes
fn prepare_config(config: &mut ControllerConfig) -> miette::Result<Throttler> {
    if !config.account_id.is_empty() {
        config.account_id = normalize_account_id(&config.account_id);
    }
    config.validate()?;
    Ok(Throttler::from_config(config.throttle.as_deref())?)
}

fn validate_config(path: &Path) -> miette::Result<()> {
    let mut config = ControllerConfig::load(path)?;
    prepare_config(&mut config)?;
    info!(
        "Config {} is valid (account: {}, resync interval: {:?}, workers: {})",
        path.display(),
        config.account_id,
        config.resync_interval,
        config.max_concurrent_reconciles
    );
    Ok(())
}

/// Run the mesh controller and the instance reconciler until ctrl-c
async fn run_controller(api_server_url: &str, mut config: ControllerConfig) -> miette::Result<()> {
    let throttler = prepare_config(&mut config)?;
    info!(
        "Starting meshward for account {} in {}",
        config.account_id, config.region
    );

    let timeouts = CallTimeouts {
        read: config.remote.read_timeout,
        write: config.remote.write_timeout,
    };
    let backends = RemoteBackends::in_memory(&config.account_id, &config.region)
        .throttled(&throttler, timeouts);
    let client: Arc<dyn ClusterClient> = Arc::new(HttpClusterClient::new(api_server_url));

    let controller = Arc::new(MeshController::new(config, client, backends));
    let reconciler = controller.instance_reconciler();

    let token = CancellationToken::new();

    // 1. Spawn mesh controller
    let controller_token = token.clone();
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run(controller_token).await {
            error!("Mesh controller error: {}", e);
        }
    });

    // 2. Spawn discovery instance reconciler
    let reconciler_token = token.clone();
    let reconciler_handle = tokio::spawn(async move {
        if let Err(e) = reconciler.run(reconciler_token).await {
            error!("Cloud map instance reconciler error: {}", e);
        }
    });

    info!("All components started. API server: {}", api_server_url);

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    // Wait for all tasks to finish with a timeout
    let shutdown_timeout = std::time::Duration::from_secs(5);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(controller_handle, reconciler_handle);
    })
    .await;

    info!("Shutdown complete");

    Ok(())
}
