//! REPUBLIC relay server.

use std::process::ExitCode;

use republic_relay::prelude::*;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();

    let server = match RelayServer::builder().config(config).build().await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay");
            return ExitCode::FAILURE;
        }
    };

    match server.local_addr() {
        Ok(addr) => tracing::info!(
            host = %addr.ip(),
            port = addr.port(),
            "REPUBLIC relay listening, clients connect to ws://<this-host>:{}",
            addr.port()
        ),
        Err(e) => tracing::warn!(error = %e, "relay listening on unknown address"),
    }

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "relay stopped");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
