//! Trial-expiry sweep: a periodic background task, decoupled from
//! request handling, that warns tenants nearing trial expiry and
//! suspends the ones past it. Safe to run alongside manual admin
//! actions; status writes are last-write-wins.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shopforge_tenancy::TenantDirectory;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::notify::TenantNotifier;
use crate::orchestrator::ProvisioningOrchestrator;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepSummary {
    pub checked: usize,
    pub warned: usize,
    pub suspended: usize,
    pub errors: usize,
}

pub struct TrialSweeper {
    orchestrator: Arc<ProvisioningOrchestrator>,
    directory: Arc<TenantDirectory>,
    notifier: Arc<dyn TenantNotifier>,
    interval: Duration,
    warning_window: ChronoDuration,
    /// Last warning per tenant, so one sweep cadence change does not
    /// spam owners more than once a day.
    last_warned: DashMap<String, DateTime<Utc>>,
}

impl TrialSweeper {
    pub fn new(
        orchestrator: Arc<ProvisioningOrchestrator>,
        directory: Arc<TenantDirectory>,
        notifier: Arc<dyn TenantNotifier>,
        interval_secs: u64,
        warning_days: i64,
    ) -> Self {
        Self {
            orchestrator,
            directory,
            notifier,
            interval: Duration::from_secs(interval_secs),
            warning_window: ChronoDuration::days(warning_days),
            last_warned: DashMap::new(),
        }
    }

    /// One sweep over all active tenants.
    pub async fn run_once(&self) -> SweepSummary {
        let now = Utc::now();
        let mut summary = SweepSummary::default();

        for tenant in self.directory.list_active() {
            let Some(ends_at) = tenant.trial_ends_at else {
                continue;
            };
            summary.checked += 1;

            if ends_at <= now {
                match self.orchestrator.suspend_tenant(&tenant.tenant_id).await {
                    Ok(report) => {
                        self.notifier.send_suspension_notice(&tenant);
                        info!(
                            tenant_id = %tenant.tenant_id,
                            warnings = report.warnings.len(),
                            "Expired trial suspended"
                        );
                        summary.suspended += 1;
                    }
                    Err(e) => {
                        warn!(tenant_id = %tenant.tenant_id, error = %e, "Trial suspension failed");
                        summary.errors += 1;
                    }
                }
            } else if ends_at - now <= self.warning_window {
                if self.recently_warned(&tenant.tenant_id, now) {
                    continue;
                }
                let days_left = (ends_at - now).num_days().max(0) + 1;
                self.notifier.send_trial_warning(&tenant, days_left);
                self.last_warned.insert(tenant.tenant_id.clone(), now);
                summary.warned += 1;
            }
        }

        summary
    }

    fn recently_warned(&self, tenant_id: &str, now: DateTime<Utc>) -> bool {
        self.last_warned
            .get(tenant_id)
            .map(|at| now - *at < ChronoDuration::days(1))
            .unwrap_or(false)
    }

    /// Run the sweep on its own schedule until the process exits.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "Trial sweeper started");
            loop {
                ticker.tick().await;
                let summary = self.run_once().await;
                if summary.checked > 0 {
                    info!(
                        checked = summary.checked,
                        warned = summary.warned,
                        suspended = summary.suspended,
                        errors = summary.errors,
                        "Trial sweep finished"
                    );
                }
            }
        })
    }
}
