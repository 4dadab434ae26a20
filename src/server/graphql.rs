// GraphQL HTTP server for the territory service
// One axum router served over plain HTTP and, in production, over HTTPS too

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Router, Server,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpSocket;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::engine::graphql::TerritorySchema;
use crate::{Result, TerritoryError};

/// How long in-flight HTTPS requests may run after shutdown starts
const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// HTTPS listener settings
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub port: u16,
    pub private_key_file: PathBuf,
    pub certificate_file: PathBuf,
}

/// GraphQL server configuration
#[derive(Debug, Clone)]
pub struct GraphQLServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub cors_enabled: bool,
    /// Let several processes bind the same port (`SO_REUSEPORT`)
    pub reuse_port: bool,
    /// Serve HTTPS on a second port as well
    pub tls: Option<TlsConfig>,
}

impl Default for GraphQLServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 4000,
            cors_enabled: true,
            reuse_port: false,
            tls: None,
        }
    }
}

/// GraphQL server
pub struct GraphQLServer {
    config: GraphQLServerConfig,
    schema: TerritorySchema,
}

impl GraphQLServer {
    pub fn new(schema: TerritorySchema) -> Self {
        Self {
            config: GraphQLServerConfig::default(),
            schema,
        }
    }

    pub fn with_config(mut self, config: GraphQLServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &GraphQLServerConfig {
        &self.config
    }

    /// The axum application shared by the HTTP and HTTPS listeners
    pub fn router(&self) -> Router {
        let mut app = Router::new()
            .route("/graphql", post(graphql_handler))
            .route("/graphiql", get(graphiql))
            .route("/health", get(health_check))
            .with_state(self.schema.clone());

        if self.config.cors_enabled {
            app = app.layer(CorsLayer::permissive());
        }
        app
    }

    /// Load TLS material and bind every listener without serving yet
    ///
    /// Splitting bind from serve lets a worker report readiness only once
    /// its ports are really open.
    pub async fn bind(self) -> Result<BoundServer> {
        let app = self.router();

        let tls = match &self.config.tls {
            Some(tls) => {
                let rustls = RustlsConfig::from_pem_file(&tls.certificate_file, &tls.private_key_file)
                    .await
                    .map_err(|e| {
                        TerritoryError::Config(format!(
                            "cannot load TLS key {} / certificate {}: {}",
                            tls.private_key_file.display(),
                            tls.certificate_file.display(),
                            e
                        ))
                    })?;
                let addr = SocketAddr::new(self.config.host, tls.port);
                Some((bind_listener(addr, self.config.reuse_port)?, rustls))
            }
            None => None,
        };

        let http_addr = SocketAddr::new(self.config.host, self.config.port);
        let http = bind_listener(http_addr, self.config.reuse_port)?;

        Ok(BoundServer { app, http, tls })
    }

    /// Bind and serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.bind().await?.serve(shutdown).await
    }
}

/// A server whose listeners are open but not yet accepting requests
pub struct BoundServer {
    app: Router,
    http: std::net::TcpListener,
    tls: Option<(std::net::TcpListener, RustlsConfig)>,
}

impl BoundServer {
    pub fn http_addr(&self) -> Result<SocketAddr> {
        Ok(self.http.local_addr()?)
    }

    pub fn https_addr(&self) -> Result<Option<SocketAddr>> {
        match &self.tls {
            Some((listener, _)) => Ok(Some(listener.local_addr()?)),
            None => Ok(None),
        }
    }

    /// Serve HTTP (and HTTPS when configured) until `shutdown` is cancelled
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let http_addr = self.http_addr()?;
        let BoundServer { app, http, tls } = self;

        let plain = {
            let app = app.clone();
            let shutdown = shutdown.clone();
            async move {
                info!("🚀 GraphQL server running on http://{}/graphql", http_addr);
                info!("📊 GraphiQL interface: http://{}/graphiql", http_addr);
                Server::from_tcp(http)
                    .map_err(|e| TerritoryError::Internal(e.to_string()))?
                    .serve(app.into_make_service())
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
                    .map_err(|e| TerritoryError::Internal(e.to_string()))
            }
        };

        let Some((listener, rustls)) = tls else {
            return plain.await;
        };

        let https_addr = listener.local_addr()?;
        let handle = axum_server::Handle::new();
        let stopper = handle.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            stopper.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
        });

        let secure = async move {
            info!("🔒 GraphQL server running on https://{}/graphql", https_addr);
            axum_server::from_tcp_rustls(listener, rustls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .map_err(TerritoryError::from)
        };

        tokio::try_join!(plain, secure)?;
        Ok(())
    }
}

/// Bind a TCP listener, optionally sharing the port with other processes
pub fn bind_listener(addr: SocketAddr, reuse_port: bool) -> Result<std::net::TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;

    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    if reuse_port {
        socket.set_reuseport(true)?;
    }
    #[cfg(not(all(unix, not(any(target_os = "solaris", target_os = "illumos")))))]
    if reuse_port {
        tracing::warn!("SO_REUSEPORT is not available on this platform; run a single worker");
    }

    socket
        .bind(addr)
        .map_err(|e| TerritoryError::Config(format!("cannot bind {}: {}", addr, e)))?;
    let listener = socket.listen(1024)?;
    Ok(listener.into_std()?)
}

// GraphQL handler
async fn graphql_handler(
    State(schema): State<TerritorySchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

// GraphiQL interface pointed at the GraphQL endpoint
async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

// Health check endpoint
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "Territory GraphQL Server is running!")
}
