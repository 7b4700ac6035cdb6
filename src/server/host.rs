//! Server host: the wired services shared by every exposure
//!
//! The host is transport-agnostic. The REST exposure is built from it, and
//! embedders can drive the pipeline or the credential store directly.

use crate::auth::credentials::CredentialStore;
use crate::auth::identity_store::IdentityStore;
use crate::auth::token_store::TokenStore;
use crate::auth::tokens::TokenService;
use crate::config::SecurityConfig;
use crate::server::contract::ApiContract;
use crate::server::pipeline::RequestPipeline;
use crate::server::registry::ResourceRegistry;
use anyhow::Result;
use std::sync::Arc;

/// Host context containing all service state
pub struct ServerHost {
    pub config: Arc<SecurityConfig>,
    pub tokens: Arc<TokenService>,
    pub credentials: Arc<CredentialStore>,
    pub pipeline: Arc<RequestPipeline>,
    pub contract: Arc<ApiContract>,
}

impl ServerHost {
    /// Wire the services from their backends
    ///
    /// The configuration is validated here so that a host never runs with an
    /// unusable key or grant table.
    pub fn from_components(
        config: SecurityConfig,
        identities: Arc<dyn IdentityStore>,
        token_store: Arc<dyn TokenStore>,
        registry: ResourceRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let registry = Arc::new(registry);

        let tokens = Arc::new(TokenService::new(&config, token_store, identities.clone()));
        let credentials = Arc::new(CredentialStore::new(
            &config,
            identities.clone(),
            tokens.clone(),
        )?);
        let pipeline = Arc::new(RequestPipeline::new(
            config.clone(),
            tokens.clone(),
            identities,
            registry.clone(),
        ));
        let contract = Arc::new(ApiContract::from_registry(&registry).with_title(&config.issuer));

        tracing::info!(
            resource_types = ?registry.resource_types(),
            "server host initialized"
        );

        Ok(Self {
            config,
            tokens,
            credentials,
            pipeline,
            contract,
        })
    }
}
