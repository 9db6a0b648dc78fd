//! Bulk operations fanned out across all active tenants. Each tenant
//! succeeds or fails on its own; one failure never aborts the rest.

use shopforge_core::BulkOperationReport;
use tracing::{info, warn};

use crate::orchestrator::ProvisioningOrchestrator;

impl ProvisioningOrchestrator {
    /// Rolling-restart every active tenant's workloads.
    pub async fn restart_all(&self) -> BulkOperationReport {
        let tenants = self.directory().list_active();
        let mut report = BulkOperationReport::new("Restarted workloads for all active tenants");

        for tenant in tenants {
            match self.infra().restart_workloads(&tenant.k8s_namespace).await {
                Ok(()) => report.record_success(),
                Err(e) => {
                    warn!(tenant_id = %tenant.tenant_id, error = %e, "Restart failed");
                    report.record_error(&tenant.tenant_id, e.to_string());
                }
            }
        }

        info!(
            total = report.total_tenants,
            errors = report.error_count,
            "Bulk restart finished"
        );
        report
    }

    /// Re-apply the baseline migration to every active tenant database.
    /// Statements are idempotent, so this is the schema-rollout path.
    pub async fn migrate_all(&self) -> BulkOperationReport {
        let tenants = self.directory().list_active();
        let mut report = BulkOperationReport::new("Migrated all active tenant databases");

        for tenant in tenants {
            let Some(connection_string) = tenant.db_connection_string.as_deref() else {
                report.record_error(&tenant.tenant_id, "tenant has no database connection string");
                continue;
            };
            match self.infra().migrate_database(connection_string).await {
                Ok(()) => report.record_success(),
                Err(e) => {
                    warn!(tenant_id = %tenant.tenant_id, error = %e, "Migration failed");
                    report.record_error(&tenant.tenant_id, e.to_string());
                }
            }
        }

        info!(
            total = report.total_tenants,
            errors = report.error_count,
            "Bulk migration finished"
        );
        report
    }
}
