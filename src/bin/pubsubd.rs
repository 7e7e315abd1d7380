/// pubsubd — HTTP-fronted publish/subscribe server.
///
/// Usage:
///   pubsubd serve --config <path>   - Run the server with a TOML config file
///   pubsubd check --config <path>   - Validate a config file and exit
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pubsubd::config_file;
use pubsubd::connection::{self, ConnectionTimeouts};
use pubsubd::json::Value;
use pubsubd::node::NodeName;
use pubsubd::pubsub::adapter::Adapter;
use pubsubd::pubsub::callback::{AuthorizeCallback, NodeInitCallback, ValidNodeCallback};
use pubsubd::pubsub::{Root, Subscriber};
use pubsubd::request::Request;
use pubsubd::response::{FixedResponse, Response, ResponseFactory};
use pubsubd::subscription_response::SubscriptionResponse;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "pubsubd", about = "HTTP-fronted publish/subscribe server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server.
    Serve {
        #[arg(long, default_value = "pubsubd.toml")]
        config: PathBuf,
    },
    /// Validate a config file and exit without binding a socket.
    Check {
        #[arg(long, default_value = "pubsubd.toml")]
        config: PathBuf,
    },
}

/// Treats every node name as valid, requires no extra authorization
/// beyond what the resolved configuration demands, and initializes every
/// new node to an empty JSON object. A deployment with real validation or
/// authorization rules supplies its own [`Adapter`] instead.
struct PermissiveAdapter;

impl Adapter for PermissiveAdapter {
    fn valid_node(&self, _name: &NodeName, cb: ValidNodeCallback) {
        cb.succeed(());
    }

    fn authorize(&self, _subscriber: &Arc<dyn Subscriber>, _name: &NodeName, cb: AuthorizeCallback) {
        cb.succeed(());
    }

    fn node_init(&self, _name: &NodeName, cb: NodeInitCallback) {
        cb.succeed(Value::object(Vec::<(&str, Value)>::new()));
    }

    fn invalid_node_subscription(&self, name: &NodeName, _subscriber: &Arc<dyn Subscriber>) {
        tracing::info!(%name, "subscription rejected: invalid node");
    }

    fn unauthorized_subscription(&self, name: &NodeName, _subscriber: &Arc<dyn Subscriber>) {
        tracing::info!(%name, "subscription rejected: unauthorized");
    }

    fn initialization_failed(&self, name: &NodeName, _subscriber: &Arc<dyn Subscriber>) {
        tracing::warn!(%name, "subscription rejected: initialization failed");
    }
}

struct PubsubResponseFactory {
    root: Arc<Root>,
}

impl ResponseFactory for PubsubResponseFactory {
    fn create_response(&self, request: &Request) -> Box<dyn Response> {
        let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();
        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["nodes", id]) => {
                let name = NodeName::new().with("id", *id);
                Box::new(SubscriptionResponse::new(Arc::clone(&self.root), name))
            }
            _ => Box::new(FixedResponse::status(404, "Not Found")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    pubsubd::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Check { config } => {
            let parsed = config_file::load(&config).with_context(|| {
                format!("failed to load configuration from {}", config.display())
            })?;
            println!("configuration OK: listening address {}", parsed.bind_address);
            Ok(())
        }
        Command::Serve { config } => serve(&config).await,
    }
}

async fn serve(config_path: &PathBuf) -> Result<()> {
    let config = config_file::load(config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;

    let adapter = Arc::new(PermissiveAdapter);
    let timeouts = ConnectionTimeouts {
        keep_alive_timeout: config.default_configuration.keep_alive_timeout,
        io_timeout: config.default_configuration.io_timeout,
    };
    let root = Arc::new(Root::new(
        adapter,
        config.default_configuration.clone(),
        config.history_budget_bytes,
    ));
    let factory: Arc<dyn ResponseFactory> = Arc::new(PubsubResponseFactory { root: Arc::clone(&root) });

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    tracing::info!(address = %config.bind_address, "pubsubd listening");

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                return Ok(());
            }
        };
        tracing::debug!(%peer, "accepted connection");

        let factory = Arc::clone(&factory);
        let timeouts = ConnectionTimeouts {
            keep_alive_timeout: timeouts.keep_alive_timeout,
            io_timeout: timeouts.io_timeout,
        };
        tokio::spawn(async move {
            let outcome = connection::run(socket, factory, timeouts).await;
            tracing::debug!(%peer, ?outcome, "connection closed");
        });
    }
}
