use std::sync::Arc;

use clap::Parser;
use shared_context_server::app::App;
use shared_context_server::cli::{Cli, Command};
use shared_context_server::config::ServerConfig;
use shared_context_server::{http, logging, stdio};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {}", err.message);
            std::process::exit(1);
        }
    };
    logging::init(config.log_format, &config.log_level);

    let bind_addr = config.bind_addr.clone();
    let app = Arc::new(App::bootstrap(config).await?);

    match cli.command {
        Command::Serve => {
            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            info!(addr = %bind_addr, "listening");
            let router = http::router(app.clone());
            let shutdown = shutdown_signal();
            axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
        }
        Command::Stdio => {
            if let Err(err) = stdio::run(app.clone()).await {
                error!(error = %err, "stdio transport terminated");
            }
        }
    }

    Arc::try_unwrap(app).map(App::shutdown).unwrap_or_else(|_| info!("app still has outstanding references at shutdown"));
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
