/* crates/herald-server-axum/src/lib.rs */

mod error;
mod handler;

use herald_server::{HeraldParts, HeraldServer};

/// Re-export herald-server core for convenience
pub use herald_server;

/// Extension trait that converts a `HeraldServer` (or its parts) into an Axum router.
pub trait IntoAxumRouter {
  fn into_axum_router(self) -> axum::Router;
  fn serve(
    self,
    addr: &str,
  ) -> impl std::future::Future<Output = Result<(), Box<dyn std::error::Error>>> + Send;
}

impl IntoAxumRouter for HeraldParts {
  fn into_axum_router(self) -> axum::Router {
    handler::build_router(self)
  }

  async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let router = self.into_axum_router();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Herald server running on http://localhost:{}", local_addr.port());
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
  }
}

impl IntoAxumRouter for HeraldServer {
  fn into_axum_router(self) -> axum::Router {
    self.into_parts().into_axum_router()
  }

  async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    self.into_parts().serve(addr).await
  }
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_err() {
    // No signal handler available; serve until the process is killed.
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
