use thiserror::Error;

pub type ForgeResult<T> = Result<T, ForgeError>;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tenant '{tenant_id}' already exists")]
    DuplicateTenant { tenant_id: String },

    #[error("Owner email '{email}' is already attached to tenant '{tenant_id}'")]
    DuplicateOwnerEmail { email: String, tenant_id: String },

    #[error("Tenant '{tenant_id}' not found")]
    TenantNotFound { tenant_id: String },

    #[error("No tenant could be resolved from the request")]
    TenantNotResolvable,

    #[error("Invalid tenant id: {0}")]
    InvalidTenantId(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Domain '{domain}' is already verified by another tenant")]
    DomainAlreadyClaimed { domain: String },

    #[error("Tenant '{tenant_id}' is in status '{status}', expected '{expected}'")]
    InvalidStatus {
        tenant_id: String,
        status: String,
        expected: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    #[error("Session factory error: {0}")]
    SessionFactory(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
