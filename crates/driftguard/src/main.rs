//! DriftGuard daemon entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use driftguard::cluster::{ClusterClient, KubectlClient};
use driftguard::config::load_config;
use driftguard::controller::DriftController;
use driftguard::db::Database;
use driftguard::gitops::{GitDesiredState, GitRepository};
use driftguard::server::{self, AppState};
use driftguard::Result;

#[derive(Parser)]
#[command(
    name = "driftguard",
    version,
    about = "Detects configuration drift between a Kubernetes cluster and Git"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "driftguard.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("driftguard: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    init_logging(&config.logging.level);

    log::info!("Starting DriftGuard v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::open(&config.database.path)?;

    // A configured working tree is reused across runs; an unset one is a
    // per-process temp directory the controller removes on shutdown.
    let (work_tree, owns_work_tree) = match &config.git.local_path {
        Some(path) => (PathBuf::from(path), false),
        None => (
            std::env::temp_dir().join(format!("driftguard-{}", std::process::id())),
            true,
        ),
    };
    let repo = GitRepository::new(&work_tree, &config.git.url, &config.git.branch);
    let desired = GitDesiredState::new(repo, owns_work_tree);

    let cluster: Arc<dyn ClusterClient> = Arc::new(KubectlClient::new(
        config.kubernetes.kubeconfig.clone(),
        config.kubernetes.context.clone(),
    ));

    let controller = DriftController::new(&config, db.clone(), cluster, desired);
    controller.clone().start().await?;

    let state = AppState {
        db,
        trigger_tx: controller.trigger_sender(),
    };
    let result = server::serve(state, config.server.port, shutdown_signal()).await;

    controller.stop().await;
    result
}

/// Bridges `log::` macros into tracing and installs a stderr subscriber.
/// `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) {
    if tracing_log::LogTracer::init().is_err() {
        return;
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_target(true));

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("driftguard: logging subscriber was already installed");
    }
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    log::info!("Shutdown signal received");
}
