//! Tenant data model: identity, subscription tier, and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier a tenant is billed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Demo,
    Free,
    Professional,
    Enterprise,
    Team,
    Lifetime,
}

impl SubscriptionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Free => "free",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
            Self::Team => "team",
            Self::Lifetime => "lifetime",
        }
    }

    /// The tier suspended tenants are downgraded to so quota is released.
    pub fn lowest() -> Self {
        Self::Free
    }

    /// Whether new tenants on this tier start on a time-limited trial.
    pub fn has_trial(self) -> bool {
        matches!(self, Self::Demo | Self::Professional | Self::Team)
    }
}

/// Tenant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Provisioning,
    Active,
    Suspended,
    Deleted,
}

impl TenantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }
}

/// Named step within the create-tenant provisioning pipeline.
///
/// Persisted on the tenant record as `last_completed_step` so an
/// interrupted pipeline can resume at the step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    ValidateUniqueness,
    ResolveTierLimits,
    ProvisionDatabase,
    ApplyChart,
    WaitForReady,
    ConfigureDns,
    Activate,
}

impl ProvisionStep {
    /// Pipeline order, first to last.
    pub fn all() -> [ProvisionStep; 7] {
        [
            Self::ValidateUniqueness,
            Self::ResolveTierLimits,
            Self::ProvisionDatabase,
            Self::ApplyChart,
            Self::WaitForReady,
            Self::ConfigureDns,
            Self::Activate,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidateUniqueness => "validate_uniqueness",
            Self::ResolveTierLimits => "resolve_tier_limits",
            Self::ProvisionDatabase => "provision_database",
            Self::ApplyChart => "apply_chart",
            Self::WaitForReady => "wait_for_ready",
            Self::ConfigureDns => "configure_dns",
            Self::Activate => "activate",
        }
    }
}

/// A single tenant: one repair-shop business with an isolated stack.
///
/// `tenant_id` is the slug used as subdomain, namespace suffix, and
/// database-name suffix. It is immutable once created and is the only
/// join key across the database server, the cluster, and DNS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub company_name: String,
    pub tier: SubscriptionTier,
    pub status: TenantStatus,
    pub owner_email: String,
    pub custom_domain: Option<String>,
    pub domain_verified: bool,
    pub created_at: DateTime<Utc>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub k8s_namespace: String,
    pub db_connection_string: Option<String>,
    pub api_url: String,
    pub metadata: serde_json::Value,
    /// Furthest create-pipeline step that completed successfully.
    pub last_completed_step: Option<ProvisionStep>,
    /// Reason the pipeline stopped, when it did not reach `active`.
    pub provisioning_error: Option<String>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// Whether the tenant's trial has already ended at `now`.
    pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.trial_ends_at, Some(ends) if ends <= now)
    }
}

/// Input for creating a new tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    pub tenant_id: String,
    pub company_name: String,
    pub tier: SubscriptionTier,
    pub owner_email: String,
}
