//! Aggregate result shapes returned by admin-facing bulk operations.

use serde::{Deserialize, Serialize};

/// One tenant's failure within a bulk operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperationError {
    pub tenant_id: String,
    pub error: String,
}

/// Aggregate outcome of an operation fanned out across all tenants.
///
/// One tenant's failure never aborts the others; every tenant is
/// accounted for in exactly one of the two counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperationReport {
    pub message: String,
    pub total_tenants: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<BulkOperationError>,
}

impl BulkOperationReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            total_tenants: 0,
            success_count: 0,
            error_count: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_success(&mut self) {
        self.total_tenants += 1;
        self.success_count += 1;
    }

    pub fn record_error(&mut self, tenant_id: impl Into<String>, error: impl Into<String>) {
        self.total_tenants += 1;
        self.error_count += 1;
        self.errors.push(BulkOperationError {
            tenant_id: tenant_id.into(),
            error: error.into(),
        });
    }
}
