//! Portico server binary
//!
//! Boots the transport core over a Unix socket (default) or stdio. The
//! built-in router only carries a `ping` probe; applications embed the
//! library and register their own routes.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portico::config::ServerConfig;
use portico::server::{Router, Server};

#[derive(Debug, Parser)]
#[command(name = "portico", version, about = "Transport and session core for LSP-style tooling servers")]
struct Cli {
    /// Serve a single connection over stdin/stdout instead of listening
    #[arg(long)]
    stdio: bool,

    /// Unix socket path override
    #[arg(long)]
    socket: Option<PathBuf>,
}

fn main() {
    // Quiet by default; RUST_LOG=portico=debug for verbose output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portico=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main()) {
        eprintln!("{}", e);
        std::process::exit(2);
    }
}

async fn async_main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load();
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }

    let router =
        Router::new().route("ping", |_| async { Ok(serde_json::json!({ "pong": true })) });
    let server = Arc::new(Server::new(config, router));

    if cli.stdio {
        let stream = tokio::io::join(tokio::io::stdin(), tokio::io::stdout());
        server.serve_stream(stream).await??;
        return Ok(());
    }

    let signal_target = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_target.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
