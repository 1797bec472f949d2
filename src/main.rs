use clap::Parser;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

use pulseserver::config::{normalize_context_path, Config, StoreBackend};
use pulseserver::engine::{AckSender, Engine, SocketClient};
use pulseserver::namespace::{EventListener, ListenerTable};
use pulseserver::store::{ClusterBus, MemoryPubSubStore, PubSubStore};
use pulseserver::state::AppState;

/// Real-time messaging server speaking the polling and websocket transports.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Path the engine endpoint is mounted under (overrides PULSE_CONTEXT_PATH)
    #[arg(long)]
    context_path: Option<String>,

    /// Register an `echo` event handler on the root namespace
    #[arg(long)]
    echo: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulseserver=debug,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(path) = cli.context_path.as_deref() {
        config.context_path = normalize_context_path(path);
    }
    print_banner(&config);

    let store: Arc<dyn PubSubStore> = match config.store {
        StoreBackend::Memory => Arc::new(MemoryPubSubStore::new(config.node_id.clone())),
        // No external broker is wired in yet; a single node on a private bus
        // behaves like a one-member cluster.
        StoreBackend::Cluster => Arc::new(ClusterBus::new().attach(config.node_id.clone())),
    };

    let listeners = if cli.echo {
        let echo: Arc<dyn EventListener> = Arc::new(Echo);
        ListenerTable::builder()
            .on_connect("/", Arc::clone(&echo))
            .on_event("/", "echo", echo)
            .build()
    } else {
        ListenerTable::default()
    };

    let port = config.port;
    let engine = Engine::new(config, listeners, store);
    let app = pulseserver::routes::router(AppState::new(Arc::clone(&engine)));

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("failed to bind");

    let actual_port = listener
        .local_addr()
        .expect("failed to get local address")
        .port();
    eprintln!("  \x1b[32m→ listening on 0.0.0.0:{actual_port}\x1b[0m");
    eprintln!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    engine.shutdown().await;
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let store = match config.store {
        StoreBackend::Memory => "memory",
        StoreBackend::Cluster => "cluster",
    };
    let path = if config.context_path.is_empty() {
        "/"
    } else {
        config.context_path.as_str()
    };

    eprintln!();
    eprintln!("  \x1b[1;36mpulse\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!("  \x1b[2mpath\x1b[0m         {path}");
    eprintln!("  \x1b[2mstore\x1b[0m        {store}");
    eprintln!("  \x1b[2mnode\x1b[0m         {}", config.node_id);
    eprintln!(
        "  \x1b[2mping\x1b[0m         {}ms / {}ms",
        config.ping_interval.as_millis(),
        config.ping_timeout.as_millis()
    );
    if !config.allow_upgrades {
        eprintln!();
        eprintln!("  \x1b[33m! websocket upgrades disabled\x1b[0m");
    }
    eprintln!();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// Replies to `echo` with its own arguments, as an ack when one was asked for.
struct Echo;

impl EventListener for Echo {
    fn on_connect(&self, client: &SocketClient) {
        tracing::debug!(session = %client.session_id(), "echo client connected");
    }

    fn on_event(&self, client: &SocketClient, event: &str, args: Vec<Value>, ack: Option<AckSender>) {
        match ack {
            Some(ack) => {
                ack.send(args);
            }
            None => {
                client.send_event(event, args);
            }
        }
    }
}
