//! HTTP server for the artifact router.
//!
//! A plain hyper accept loop: one task per connection, HTTP/1.1, watch
//! channel shutdown. The peer address flows into the handler so the
//! client IP is available for analytics.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::proxy::ArtifactRouter;

/// Serves tenant artifacts over HTTP.
pub struct RouterServer {
    bind_addr: SocketAddr,
    router: Arc<ArtifactRouter>,
}

impl RouterServer {
    pub fn new(bind_addr: SocketAddr, router: Arc<ArtifactRouter>) -> Self {
        Self { bind_addr, router }
    }

    /// Run until the shutdown signal is received.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .context("failed to bind artifact router")?;

        info!(addr = %self.bind_addr, "artifact router listening");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, peer_addr) = accept_result.context("accept failed")?;
                    let router = self.router.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let svc = service_fn(move |req| {
                            let router = router.clone();
                            async move {
                                Ok::<_, hyper::Error>(router.handle(req, peer_addr.ip()).await)
                            }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                            error!(%peer_addr, error = %e, "connection error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("artifact router shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
