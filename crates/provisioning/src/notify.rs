//! Collaborator seams for systems outside this core: owner email
//! notifications and tenant user administration. The default
//! implementations log and succeed.

use shopforge_core::{ForgeResult, Tenant};
use tracing::info;

/// Outbound tenant notifications. Delivery is an external collaborator;
/// this trait is the boundary.
pub trait TenantNotifier: Send + Sync {
    fn send_welcome(&self, tenant: &Tenant);
    fn send_trial_warning(&self, tenant: &Tenant, days_left: i64);
    fn send_suspension_notice(&self, tenant: &Tenant);
}

/// Tenant user management, delegated during suspension.
pub trait UserAdmin: Send + Sync {
    /// Disable every non-owner user; returns how many were disabled.
    fn disable_non_owner_users(&self, tenant_id: &str) -> ForgeResult<u32>;
}

/// Notifier that only writes structured logs.
pub struct LogNotifier;

impl TenantNotifier for LogNotifier {
    fn send_welcome(&self, tenant: &Tenant) {
        info!(
            tenant_id = %tenant.tenant_id,
            owner = %tenant.owner_email,
            api_url = %tenant.api_url,
            "Welcome notification"
        );
    }

    fn send_trial_warning(&self, tenant: &Tenant, days_left: i64) {
        info!(
            tenant_id = %tenant.tenant_id,
            owner = %tenant.owner_email,
            days_left,
            "Trial expiry warning"
        );
    }

    fn send_suspension_notice(&self, tenant: &Tenant) {
        info!(
            tenant_id = %tenant.tenant_id,
            owner = %tenant.owner_email,
            "Suspension notice"
        );
    }
}

/// User admin that records the request and reports zero users touched.
pub struct LogUserAdmin;

impl UserAdmin for LogUserAdmin {
    fn disable_non_owner_users(&self, tenant_id: &str) -> ForgeResult<u32> {
        info!(tenant_id = %tenant_id, "Disable non-owner users requested");
        Ok(0)
    }
}
