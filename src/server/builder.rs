//! ServerBuilder for fluent API to build HTTP servers

use super::host::ServerHost;
use super::registry::ResourceRegistry;
use super::rest::RestExposure;
use crate::auth::identity_store::{IdentityStore, InMemoryIdentityStore};
use crate::auth::token_store::{InMemoryTokenStore, TokenStore};
use crate::config::SecurityConfig;
use crate::core::repository::ResourceRepository;
use crate::core::resource::ResourcePayload;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating HTTP servers over registered resources
///
/// Identity and token backends default to the in-memory implementations.
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(SecurityConfig::from_yaml_file("gatehouse.yaml")?)
///     .register_resource(InMemoryResourceRepository::<Note>::new())
///     .build()?;
/// ```
#[derive(Default)]
pub struct ServerBuilder {
    config: Option<SecurityConfig>,
    identities: Option<Arc<dyn IdentityStore>>,
    token_store: Option<Arc<dyn TokenStore>>,
    registry: ResourceRegistry,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the security configuration (required)
    pub fn with_config(mut self, config: SecurityConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_identity_store(mut self, store: impl IdentityStore + 'static) -> Self {
        self.identities = Some(Arc::new(store));
        self
    }

    pub fn with_token_store(mut self, store: impl TokenStore + 'static) -> Self {
        self.token_store = Some(Arc::new(store));
        self
    }

    /// Expose a resource collection through the pipeline
    pub fn register_resource<P, R>(mut self, repository: R) -> Self
    where
        P: ResourcePayload,
        R: ResourceRepository<P> + 'static,
    {
        self.registry.register_repository(repository);
        self
    }

    /// Add custom routes to the server
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    pub fn build_host(self) -> Result<ServerHost> {
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("SecurityConfig is required. Call .with_config()"))?;
        let identities = self
            .identities
            .unwrap_or_else(|| Arc::new(InMemoryIdentityStore::new()));
        let token_store = self
            .token_store
            .unwrap_or_else(|| Arc::new(InMemoryTokenStore::new()));

        ServerHost::from_components(config, identities, token_store, self.registry)
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        Ok(RestExposure::build_router(host, custom_routes))
    }

    /// Build and serve on `addr` until the listener fails
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "gatehouse listening");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
