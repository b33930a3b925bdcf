//! Thin HTTP listener wrapper: bind, log the bound address, serve with
//! graceful shutdown.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

/// A bound listener waiting to serve a router.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Binds to the given port on all interfaces. Port 0 picks an ephemeral
    /// port, retrievable through [`Server::local_addr`].
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(address = %listener.local_addr()?, "listener bound");
        Ok(Self { listener })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves `router` until a shutdown signal arrives.
    pub async fn run(self, router: Router) -> std::io::Result<()> {
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            error!(error = %err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
