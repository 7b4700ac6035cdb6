//! Server module: the request pipeline and its REST exposure
//!
//! - `pipeline` runs operation envelopes (authenticate, authorize, validate, execute)
//! - `registry` maps resource type names to their repositories
//! - `contract` publishes static metadata about every operation
//! - `rest` binds all of it to axum routes

pub mod builder;
pub mod contract;
pub mod envelope;
pub mod host;
pub mod pipeline;
pub mod registry;
pub mod rest;

pub use builder::ServerBuilder;
pub use contract::{ApiContract, OperationDescriptor};
pub use envelope::{OperationRequest, OperationResponse, ResponseStatus};
pub use host::ServerHost;
pub use pipeline::RequestPipeline;
pub use registry::{ResourceHandler, ResourceRegistry, TypedResourceHandler};
pub use rest::{AppState, RestExposure};
