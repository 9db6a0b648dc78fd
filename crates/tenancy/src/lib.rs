//! Tenant routing: request-to-tenant resolution, the per-tenant session
//! factory cache, and the in-memory tenant directory.

pub mod directory;
pub mod resolver;
pub mod session;

pub use directory::TenantDirectory;
pub use resolver::{resolve_tenant, TenantResolution};
pub use session::{db_name, SessionFactory, SessionFactoryCache, DEFAULT_FACTORY_KEY};
