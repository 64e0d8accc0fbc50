//! Provider abstraction - adapters, auth strategies, and the registry

pub mod adapter;
pub mod auth;
pub mod classify;
pub mod model;
pub mod registry;
pub mod sync_http;
pub mod task_http;

pub use adapter::{HealthReport, HealthState, Provider, RetryPolicy, TaskInfo, TaskState};
pub use auth::{ApiKeyHeaderAuth, AuthStrategy, BearerAuth, HmacAuth, SigV4Auth, SignContext};
pub use classify::ErrorKind;
pub use model::{
    AuthKind, Capability, ExecutionMode, GenerationRequest, GenerationResult, MediaPayload,
    MediaType, ProviderModel, Region,
};
pub use registry::{ProviderFactory, ProviderInfo, ProviderRegistry};
pub use sync_http::SyncHttpProvider;
pub use task_http::{TaskHttpProvider, TaskPollConfig};
