use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ri_adapters::{AdapterRegistry, DiscordAdapter, GenericAdapter, SlackAdapter};
use ri_bus::EventBus;
use ri_config::ConfigOverrides;
use ri_gateway::{build_router, AppState};
use ri_observability::{LogFormat, TracingConfig};
use ri_registry::{Registry, RegistryConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug, Clone)]
#[command(name = "ri-gateway", about = "Remote Instance broker gateway")]
struct Cli {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    addr: Option<String>,
    #[arg(long = "log-level")]
    log_level: Option<String>,
    #[arg(long = "log-format")]
    log_format: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            addr: self.addr.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ri_config::load(cli.overrides()).context("failed to load gateway configuration")?;

    let tracing_config = TracingConfig {
        service_name: "ri-gateway".into(),
        log_format: LogFormat::from_str(&config.log_format).context("invalid log format")?,
        log_level: config.log_level.clone(),
        otlp_endpoint: config.otlp_endpoint.clone(),
    };
    let (_tracing_guard, metrics_exporter) =
        ri_observability::init(&tracing_config).context("failed to initialise observability")?;

    let registry = Registry::new(RegistryConfig {
        queue_capacity: config.queue_capacity,
        sweep_interval: config.heartbeat_interval,
        heartbeat_timeout: config.heartbeat_timeout,
        stale_timeout: config.stale_timeout,
    });
    let bus = EventBus::new(registry.clone(), config.response_timeout);

    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(GenericAdapter::new()));
    if let Some(secret) = &config.slack_signing_secret {
        adapters.register(Arc::new(SlackAdapter::new(secret.clone())));
    } else {
        warn!("SLACK_SIGNING_SECRET not set; /webhook/slack will reject every request");
    }
    if let Some(public_key) = &config.discord_public_key {
        match DiscordAdapter::new(public_key) {
            Ok(adapter) => adapters.register(Arc::new(adapter)),
            Err(err) => warn!(error = %err, "invalid DISCORD_PUBLIC_KEY; discord adapter disabled"),
        }
    } else {
        warn!("DISCORD_PUBLIC_KEY not set; /webhook/discord will reject every request");
    }

    let sweep_handle = tokio::spawn(registry.clone().run_health_sweep(registry.sweep_cancellation()));

    let state = AppState {
        registry: registry.clone(),
        bus,
        adapters: Arc::new(adapters),
        poll_timeout: config.poll_timeout,
        sync_webhook_timeout: std::cmp::min(config.response_timeout, std::time::Duration::from_secs(25)),
        max_body_bytes: config.max_body_bytes,
        metrics: Some(metrics_exporter),
    };

    let router = build_router(state);
    let addr = parse_addr(&config.addr).context("invalid GATEWAY_ADDR")?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;

    info!(?addr, "ri-gateway listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    registry.stop_sweep();
    tokio::time::sleep(config.shutdown_grace).await;
    sweep_handle.abort();

    Ok(())
}

/// Accepts `:8080` (bind-all-interfaces shorthand) or a full `host:port`.
fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let full = if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    };
    full.parse().with_context(|| format!("cannot parse address: {addr}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            info!("received SIGTERM, starting graceful shutdown");
        },
    }
}
