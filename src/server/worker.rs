// A single territory server process
// Builds storage, schema and listeners, then serves until told to stop

use std::io::Write;
use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::graphql::create_schema;
use crate::server::config::ServerSettings;
use crate::server::graphql::GraphQLServer;
use crate::Result;

/// First word of the line a supervised worker prints once it listens
pub const READY_PREFIX: &str = "territory-worker-ready";

/// Environment variable carrying the worker's slot number
pub const WORKER_SLOT_ENV: &str = "TERRITORY_WORKER_SLOT";

/// Serve the territory API from this process
///
/// With `supervised` set the HTTP port is shared with sibling workers and
/// readiness is reported to the master on stdout.
pub async fn run_worker(
    settings: &ServerSettings,
    supervised: bool,
    shutdown: CancellationToken,
) -> Result<()> {
    let storage = settings.build_storage()?;
    let schema = create_schema(storage, settings.schema_options());

    let server = GraphQLServer::new(schema).with_config(settings.server_config(supervised)?);
    let bound = server.bind().await?;
    let addr = bound.http_addr()?;

    if supervised {
        announce_ready(addr)?;
    } else {
        info!("🚀 Server ready at http://localhost:{}/graphql", addr.port());
    }

    bound.serve(shutdown).await?;
    info!("Worker stopped");
    Ok(())
}

fn announce_ready(addr: SocketAddr) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{} {}", READY_PREFIX, addr)?;
    out.flush()?;
    Ok(())
}

/// The listening address from a readiness line, if it is one
pub fn parse_ready_line(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix(READY_PREFIX)?;
    let addr = rest.trim();
    if rest.starts_with(char::is_whitespace) && !addr.is_empty() {
        Some(addr)
    } else {
        None
    }
}

/// A token that is cancelled on Ctrl-C or SIGTERM
pub fn shutdown_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });
    token
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
