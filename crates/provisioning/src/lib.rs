//! Tenant lifecycle orchestration: the create/suspend/delete pipelines,
//! bulk operations across tenants, and the trial-expiry sweeper.

pub mod bulk;
pub mod notify;
pub mod orchestrator;
pub mod sweeper;

pub use notify::{LogNotifier, LogUserAdmin, TenantNotifier, UserAdmin};
pub use orchestrator::{
    ProvisionReport, ProvisioningOrchestrator, StepOutcome, StepResult, TeardownReport,
};
pub use sweeper::{SweepSummary, TrialSweeper};
