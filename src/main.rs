mod auth;
mod config;
mod error;
mod normalize;
mod protocol;
mod provider;
mod registry;
mod server;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use auth::devmode::DevMode;
use auth::{Gatekeeper, InMemoryStore};
use config::{normalize_addr, Config, StartupError};
use registry::ProviderRegistry;
use server::handlers::AppState;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Configure logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    // HTTP client for vendor calls; per-call timeouts come from the call policy.
    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(10)
        .build()
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to build HTTP client");
            std::process::exit(1);
        });

    let registry = match build_registry(&config, &http_client) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!(error = %e, "failed to configure providers");
            std::process::exit(1);
        }
    };
    info!(
        mode = config.provider_mode.as_str(),
        models = registry.models().count(),
        "provider registry ready"
    );

    // Credential store
    let store = match &config.api_keys_file {
        Some(path) => match InMemoryStore::from_json_file(path) {
            Ok(s) => s,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load API keys");
                std::process::exit(1);
            }
        },
        None => InMemoryStore::new(),
    };

    // Dev mode
    if config.dev_mode {
        warn!("DEV MODE ENABLED - do not use in production");

        let dev = DevMode::generate();
        dev.install(&store).await;

        let addr = normalize_addr(&config.addr);
        let key = dev.key();
        println!();
        println!("========================================");
        println!("DEV MODE - API key (all scopes, 24h):");
        println!("========================================");
        println!("{key}");
        println!("========================================");
        println!();
        println!("Example usage:");
        println!(
            "  curl -H \"Authorization: Bearer {key}\" -H \"Content-Type: application/json\" \\\n    -d '{{\"model\":\"claude_3_5_sonnet\",\"messages\":[{{\"role\":\"user\",\"content\":\"Hello\"}}]}}' \\\n    http://localhost:{}/chat/completions",
            addr.split(':').next_back().unwrap_or("8080")
        );
        println!();
    }

    let key_count = store.key_count().await;
    if key_count == 0 {
        warn!("credential store is empty - every request will be rejected (set API_KEYS_FILE or --dev-mode)");
    } else {
        info!(keys = key_count, "credential store loaded");
    }

    let state = Arc::new(AppState {
        registry,
        gatekeeper: Gatekeeper::new(Arc::new(store), config.store_timeout()),
        call_policy: config.call_policy(),
        mode: config.provider_mode.as_str().to_string(),
    });

    let app = server::build_router(state);

    let addr = normalize_addr(&config.addr);
    let listener = TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        error!(addr = addr, error = %e, "failed to bind");
        std::process::exit(1);
    });

    info!(addr = addr, "server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "server error");
            std::process::exit(1);
        });

    info!("server stopped");
}

fn build_registry(
    config: &Config,
    client: &reqwest::Client,
) -> Result<ProviderRegistry, StartupError> {
    let adapters = config.adapters(client)?;
    Ok(ProviderRegistry::new(adapters)?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
