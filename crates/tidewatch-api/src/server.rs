//! HTTP server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tidewatch_config::ServerConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::http::routes::create_router;
use crate::state::AppContext;

/// Serves the router for one [`AppContext`].
pub struct ApiServer {
    host: String,
    port: u16,
    ctx: Arc<AppContext>,
}

impl ApiServer {
    pub fn new(config: &ServerConfig, ctx: Arc<AppContext>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            ctx,
        }
    }

    /// Get the server address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_router(self.ctx.clone());

        let addr: SocketAddr = self.addr().parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!("API server listening on {}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::MemoryJobStore;
    use tidewatch_config::Config;
    use tidewatch_extract::ModCache;
    use tidewatch_runtime::testing::FakeRuntime;

    #[tokio::test]
    async fn test_server_addr() {
        let cache = Arc::new(ModCache::in_memory().await.unwrap());
        let ctx = Arc::new(AppContext::build(
            Config::default(),
            Arc::new(FakeRuntime::new()),
            Arc::new(MemoryJobStore::new()),
            cache,
        ));
        let config = ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
        };
        let server = ApiServer::new(&config, ctx);
        assert_eq!(server.addr(), "0.0.0.0:3000");
    }
}
