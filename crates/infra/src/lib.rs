//! Infrastructure facade: one client interface the orchestration layer
//! depends on, implemented against real infrastructure (Kubernetes API,
//! DNS provider, reverse proxy, PostgreSQL server) or as a no-op stub
//! for non-clustered environments.

pub mod chart;
pub mod client;
pub mod database;
pub mod dns_provider;
pub mod error;
pub mod orchestrator;
pub mod proxy;

pub use chart::{render_release, ChartValues, Manifest, RenderedRelease};
pub use client::{InfrastructureClient, NoopBehavior, NoopInfrastructure, RealInfrastructure};
pub use database::DatabaseProvisioner;
pub use dns_provider::DnsProviderApi;
pub use error::InfraError;
pub use orchestrator::OrchestratorApi;
pub use proxy::ProxyApi;
