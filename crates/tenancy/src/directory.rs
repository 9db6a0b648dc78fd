//! In-memory tenant directory backed by DashMap. The provisioning
//! pipeline reserves a record here before any infrastructure exists, so
//! uniqueness is enforced at one point and a second concurrent create of
//! the same tenant id fails validation instead of racing.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shopforge_core::{
    CreateTenantRequest, ForgeError, ForgeResult, ProvisionStep, Tenant, TenantStatus,
};
use tracing::info;

/// Labels that can never be tenant ids because the platform routes them
/// specially.
const RESERVED_TENANT_IDS: [&str; 2] = ["www", "api"];

/// Registry of every tenant the platform knows about, keyed by slug.
pub struct TenantDirectory {
    tenants: DashMap<String, Tenant>,
}

impl Default for TenantDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
        }
    }

    /// Atomically reserve a tenant id and insert the record in
    /// `provisioning` status. This is the create-pipeline's uniqueness
    /// gate: tenant id, subdomain, and owner email are all checked here
    /// before any infrastructure action runs.
    pub fn reserve(
        &self,
        request: &CreateTenantRequest,
        namespace: String,
        api_url: String,
        trial_ends_at: Option<DateTime<Utc>>,
    ) -> ForgeResult<Tenant> {
        validate_tenant_id(&request.tenant_id)?;

        let email = request.owner_email.to_lowercase();
        if let Some(existing) = self
            .tenants
            .iter()
            .find(|t| t.value().owner_email.eq_ignore_ascii_case(&email))
        {
            return Err(ForgeError::DuplicateOwnerEmail {
                email: request.owner_email.clone(),
                tenant_id: existing.key().clone(),
            });
        }

        let tenant = Tenant {
            tenant_id: request.tenant_id.clone(),
            company_name: request.company_name.clone(),
            tier: request.tier,
            status: TenantStatus::Provisioning,
            owner_email: email,
            custom_domain: None,
            domain_verified: false,
            created_at: Utc::now(),
            trial_ends_at,
            subscription_ends_at: None,
            k8s_namespace: namespace,
            db_connection_string: None,
            api_url,
            metadata: serde_json::json!({}),
            last_completed_step: None,
            provisioning_error: None,
        };

        match self.tenants.entry(request.tenant_id.clone()) {
            Entry::Occupied(_) => Err(ForgeError::DuplicateTenant {
                tenant_id: request.tenant_id.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(tenant.clone());
                info!(tenant_id = %tenant.tenant_id, tier = %tenant.tier.as_str(), "Tenant reserved");
                Ok(tenant)
            }
        }
    }

    pub fn get(&self, tenant_id: &str) -> ForgeResult<Tenant> {
        self.tenants
            .get(tenant_id)
            .map(|t| t.clone())
            .ok_or_else(|| ForgeError::TenantNotFound {
                tenant_id: tenant_id.to_string(),
            })
    }

    pub fn exists(&self, tenant_id: &str) -> bool {
        self.tenants.contains_key(tenant_id)
    }

    /// Apply a mutation to a tenant record and return the updated copy.
    pub fn update<F>(&self, tenant_id: &str, mutate: F) -> ForgeResult<Tenant>
    where
        F: FnOnce(&mut Tenant),
    {
        let mut entry =
            self.tenants
                .get_mut(tenant_id)
                .ok_or_else(|| ForgeError::TenantNotFound {
                    tenant_id: tenant_id.to_string(),
                })?;
        mutate(&mut entry);
        Ok(entry.clone())
    }

    /// Record a completed pipeline step and clear any stale failure.
    pub fn record_step(&self, tenant_id: &str, step: ProvisionStep) -> ForgeResult<Tenant> {
        self.update(tenant_id, |t| {
            t.last_completed_step = Some(step);
            t.provisioning_error = None;
        })
    }

    /// Record why the pipeline halted. The tenant stays in its current
    /// non-terminal status so partial state is never reported as success.
    pub fn record_failure(&self, tenant_id: &str, step: ProvisionStep, reason: &str) -> ForgeResult<Tenant> {
        self.update(tenant_id, |t| {
            t.provisioning_error = Some(format!("{}: {}", step.as_str(), reason));
        })
    }

    pub fn set_status(&self, tenant_id: &str, status: TenantStatus) -> ForgeResult<Tenant> {
        let tenant = self.update(tenant_id, |t| t.status = status)?;
        info!(tenant_id = %tenant_id, status = %status.as_str(), "Tenant status updated");
        Ok(tenant)
    }

    pub fn list(&self) -> Vec<Tenant> {
        self.tenants.iter().map(|t| t.clone()).collect()
    }

    pub fn list_active(&self) -> Vec<Tenant> {
        self.tenants
            .iter()
            .filter(|t| t.status == TenantStatus::Active)
            .map(|t| t.clone())
            .collect()
    }

    /// Remove the tenant row entirely (delete pipeline, final step).
    pub fn remove(&self, tenant_id: &str) -> ForgeResult<Tenant> {
        self.tenants
            .remove(tenant_id)
            .map(|(_, t)| t)
            .ok_or_else(|| ForgeError::TenantNotFound {
                tenant_id: tenant_id.to_string(),
            })
    }

    pub fn count(&self) -> usize {
        self.tenants.len()
    }
}

/// Validate a tenant slug: lowercase alphanumeric plus inner dashes,
/// 2 to 63 chars, not a reserved routing label. The slug becomes a DNS
/// label, a namespace suffix, and a database-name suffix, so the rules
/// are the intersection of all three.
pub fn validate_tenant_id(tenant_id: &str) -> ForgeResult<()> {
    if tenant_id.len() < 2 || tenant_id.len() > 63 {
        return Err(ForgeError::InvalidTenantId(format!(
            "'{tenant_id}' must be 2-63 characters"
        )));
    }
    if RESERVED_TENANT_IDS.contains(&tenant_id) {
        return Err(ForgeError::InvalidTenantId(format!(
            "'{tenant_id}' is a reserved label"
        )));
    }
    let valid_chars = tenant_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || tenant_id.starts_with('-') || tenant_id.ends_with('-') {
        return Err(ForgeError::InvalidTenantId(format!(
            "'{tenant_id}' must be lowercase alphanumeric with inner dashes"
        )));
    }
    Ok(())
}
