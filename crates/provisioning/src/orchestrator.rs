//! The provisioning orchestrator: a sequential pipeline of named,
//! independently retryable steps per lifecycle operation. A failed step
//! halts forward progress; completed steps are never rolled back
//! automatically, and the tenant record always reflects the furthest
//! completed step.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use shopforge_core::{
    AppConfig, CreateTenantRequest, ForgeError, ForgeResult, ProvisionStep, Tenant, TenantStatus,
    TierResourceLimits,
};
use shopforge_domains::{DomainVerifier, VerificationChallenge, VerificationOutcome};
use shopforge_infra::chart::{render_release, ChartValues};
use shopforge_infra::{InfraError, InfrastructureClient};
use shopforge_tenancy::{db_name, SessionFactoryCache, TenantDirectory};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::notify::{TenantNotifier, UserAdmin};

/// Outcome of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Failed { reason: String, retryable: bool },
    /// Completed on a previous attempt; not re-run during resume.
    Skipped,
}

/// Structured progress for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: ProvisionStep,
    pub outcome: StepOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Admin-facing result of a create or resume operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub tenant_id: String,
    pub status: TenantStatus,
    pub steps: Vec<StepResult>,
    pub warnings: Vec<String>,
}

impl ProvisionReport {
    fn new(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            status: TenantStatus::Provisioning,
            steps: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == TenantStatus::Active
            && self
                .steps
                .iter()
                .all(|s| !matches!(s.outcome, StepOutcome::Failed { .. }))
    }

    fn push(&mut self, step: ProvisionStep, outcome: StepOutcome, started_at: DateTime<Utc>) {
        self.steps.push(StepResult {
            step,
            outcome,
            started_at,
            finished_at: Utc::now(),
        });
    }
}

/// Admin-facing result of a suspend or delete operation. Teardown steps
/// that find nothing to clean are collected here as warnings, never as
/// failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownReport {
    pub tenant_id: String,
    pub status: TenantStatus,
    pub warnings: Vec<String>,
}

/// A halted step, classified for the operator.
struct StepFailure {
    reason: String,
    retryable: bool,
}

impl From<InfraError> for StepFailure {
    fn from(e: InfraError) -> Self {
        Self {
            retryable: e.is_retryable(),
            reason: e.to_string(),
        }
    }
}

impl From<ForgeError> for StepFailure {
    fn from(e: ForgeError) -> Self {
        Self {
            retryable: false,
            reason: e.to_string(),
        }
    }
}

pub struct ProvisioningOrchestrator {
    config: Arc<AppConfig>,
    directory: Arc<TenantDirectory>,
    infra: Arc<InfrastructureClient>,
    verifier: Arc<DomainVerifier>,
    sessions: Arc<SessionFactoryCache>,
    notifier: Arc<dyn TenantNotifier>,
    users: Arc<dyn UserAdmin>,
}

impl ProvisioningOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        directory: Arc<TenantDirectory>,
        infra: Arc<InfrastructureClient>,
        verifier: Arc<DomainVerifier>,
        sessions: Arc<SessionFactoryCache>,
        notifier: Arc<dyn TenantNotifier>,
        users: Arc<dyn UserAdmin>,
    ) -> Self {
        Self {
            config,
            directory,
            infra,
            verifier,
            sessions,
            notifier,
            users,
        }
    }

    pub fn directory(&self) -> &TenantDirectory {
        &self.directory
    }

    pub fn infra(&self) -> &InfrastructureClient {
        &self.infra
    }

    /// Run the create-tenant pipeline end to end. Validation failures
    /// are returned as errors before any infrastructure action; later
    /// step failures are reported in the `ProvisionReport` with the
    /// tenant left in `provisioning` and the failure recorded.
    pub async fn create_tenant(&self, request: CreateTenantRequest) -> ForgeResult<ProvisionReport> {
        let started = Utc::now();
        let limits = TierResourceLimits::for_tier(request.tier);
        let trial_ends_at = (request.tier.has_trial() && limits.trial_days > 0)
            .then(|| Utc::now() + Duration::days(limits.trial_days));

        // Step 1: uniqueness of tenant id, subdomain, and owner email,
        // enforced atomically by the directory before anything external
        // is touched. A concurrent create of the same id fails here.
        let tenant = self.directory.reserve(
            &request,
            self.config.tenant_namespace(&request.tenant_id),
            self.config.tenant_api_url(&request.tenant_id),
            trial_ends_at,
        )?;
        self.directory
            .record_step(&tenant.tenant_id, ProvisionStep::ValidateUniqueness)?;

        let mut report = ProvisionReport::new(&tenant.tenant_id);
        report.push(ProvisionStep::ValidateUniqueness, StepOutcome::Completed, started);

        self.run_from(&tenant.tenant_id, ProvisionStep::ResolveTierLimits, &mut report)
            .await?;
        report.status = self.directory.get(&tenant.tenant_id)?.status;
        Ok(report)
    }

    /// Re-run a halted create pipeline from the step after the last
    /// completed one. Every step is idempotent, so retrying the failed
    /// step does not duplicate work that partially succeeded.
    pub async fn resume_provisioning(&self, tenant_id: &str) -> ForgeResult<ProvisionReport> {
        let tenant = self.directory.get(tenant_id)?;
        if tenant.status != TenantStatus::Provisioning {
            return Err(ForgeError::InvalidStatus {
                tenant_id: tenant_id.to_string(),
                status: tenant.status.as_str().to_string(),
                expected: TenantStatus::Provisioning.as_str().to_string(),
            });
        }

        let start = tenant
            .last_completed_step
            .and_then(next_step)
            .unwrap_or(ProvisionStep::ResolveTierLimits);
        info!(tenant_id = %tenant_id, start = %start.as_str(), "Resuming provisioning");

        let mut report = ProvisionReport::new(tenant_id);
        let now = Utc::now();
        for step in ProvisionStep::all() {
            if step < start {
                report.push(step, StepOutcome::Skipped, now);
            }
        }

        self.run_from(tenant_id, start, &mut report).await?;
        report.status = self.directory.get(tenant_id)?.status;
        Ok(report)
    }

    async fn run_from(
        &self,
        tenant_id: &str,
        start: ProvisionStep,
        report: &mut ProvisionReport,
    ) -> ForgeResult<()> {
        for step in ProvisionStep::all() {
            if step < start {
                continue;
            }
            let started_at = Utc::now();
            match self.execute_step(tenant_id, step).await {
                Ok(()) => {
                    self.directory.record_step(tenant_id, step)?;
                    report.push(step, StepOutcome::Completed, started_at);
                }
                Err(failure) => {
                    error!(
                        tenant_id = %tenant_id,
                        step = %step.as_str(),
                        retryable = failure.retryable,
                        reason = %failure.reason,
                        "Provisioning step failed, halting pipeline"
                    );
                    self.directory
                        .record_failure(tenant_id, step, &failure.reason)?;
                    report.push(
                        step,
                        StepOutcome::Failed {
                            reason: failure.reason,
                            retryable: failure.retryable,
                        },
                        started_at,
                    );
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn execute_step(&self, tenant_id: &str, step: ProvisionStep) -> Result<(), StepFailure> {
        let tenant = self.directory.get(tenant_id)?;
        match step {
            // Enforced at reserve time; nothing to re-run here.
            ProvisionStep::ValidateUniqueness => Ok(()),

            ProvisionStep::ResolveTierLimits => {
                let limits = TierResourceLimits::for_tier(tenant.tier);
                self.directory.update(tenant_id, |t| {
                    t.metadata["tier_limits"] =
                        serde_json::to_value(&limits).unwrap_or_default();
                })?;
                Ok(())
            }

            ProvisionStep::ProvisionDatabase => {
                let database = db_name(&self.config.database.base_name, tenant_id);
                let password = random_secret();
                let connection_string = self
                    .infra
                    .provision_database(&database, &database, &password)
                    .await?;
                self.infra.migrate_database(&connection_string).await?;
                self.directory.update(tenant_id, |t| {
                    t.db_connection_string = Some(connection_string.clone());
                })?;
                Ok(())
            }

            ProvisionStep::ApplyChart => {
                let database_url = tenant.db_connection_string.clone().ok_or(StepFailure {
                    reason: "database step recorded no connection string".into(),
                    retryable: false,
                })?;
                let limits = TierResourceLimits::for_tier(tenant.tier);
                let mut values = ChartValues {
                    tenant_id: tenant_id.to_string(),
                    namespace: tenant.k8s_namespace.clone(),
                    host: format!("{tenant_id}.{}", self.config.platform.base_domain),
                    image_repository: self.config.images.repository.clone(),
                    app_tag: self.config.images.app_tag.clone(),
                    worker_tag: self.config.images.worker_tag.clone(),
                    replicas: limits.replicas,
                    cpu_request: String::new(),
                    cpu_limit: String::new(),
                    memory_request: String::new(),
                    memory_limit: String::new(),
                    storage_size: String::new(),
                    storage_class: String::new(),
                    tls_issuer: self.config.tls.issuer.clone(),
                    admin_username: self.config.platform.admin_username.clone(),
                    admin_password: random_secret(),
                    database_url,
                };
                values.apply_limits(&limits);

                self.infra.ensure_namespace(&tenant.k8s_namespace).await?;
                let release = render_release(&values)?;
                self.infra.apply_release(&release).await?;
                Ok(())
            }

            ProvisionStep::WaitForReady => {
                self.infra.wait_for_ready(&tenant.k8s_namespace).await?;
                Ok(())
            }

            ProvisionStep::ConfigureDns => {
                let fqdn = format!("{tenant_id}.{}", self.config.platform.base_domain);
                self.infra.ensure_dns_record(&fqdn).await?;
                self.infra
                    .ensure_proxy_route(&fqdn, &service_upstream(&tenant.k8s_namespace))
                    .await?;
                Ok(())
            }

            ProvisionStep::Activate => {
                let tenant = self.directory.update(tenant_id, |t| {
                    t.status = TenantStatus::Active;
                    t.provisioning_error = None;
                })?;
                info!(tenant_id = %tenant_id, "Tenant active");
                self.notifier.send_welcome(&tenant);
                Ok(())
            }
        }
    }

    /// Suspend a tenant: release quota, disable users, tear down the
    /// stack, keep the row. Already-gone resources become warnings.
    pub async fn suspend_tenant(&self, tenant_id: &str) -> ForgeResult<TeardownReport> {
        let tenant = self.directory.get(tenant_id)?;
        let mut warnings = Vec::new();

        self.directory.update(tenant_id, |t| {
            t.tier = shopforge_core::SubscriptionTier::lowest();
        })?;
        self.users.disable_non_owner_users(tenant_id)?;

        self.teardown_stack(&tenant, &mut warnings).await?;

        self.sessions.invalidate(tenant_id);
        self.directory.set_status(tenant_id, TenantStatus::Suspended)?;
        info!(tenant_id = %tenant_id, warnings = warnings.len(), "Tenant suspended");
        Ok(TeardownReport {
            tenant_id: tenant_id.to_string(),
            status: TenantStatus::Suspended,
            warnings,
        })
    }

    /// Delete a tenant permanently: suspend-style teardown plus dropping
    /// the database, verification records, and the tenant row itself.
    /// Idempotent cleanup steps that find nothing are warnings; the
    /// record is never left in limbo because of them.
    pub async fn delete_tenant(&self, tenant_id: &str) -> ForgeResult<TeardownReport> {
        let tenant = self.directory.get(tenant_id)?;
        let mut warnings = Vec::new();

        self.teardown_stack(&tenant, &mut warnings).await?;

        let database = db_name(&self.config.database.base_name, tenant_id);
        if let Err(e) = self.infra.drop_database(&database, &database).await {
            if e.is_not_found() {
                warnings.push(e.to_string());
            } else {
                return Err(e.into());
            }
        }

        let removed = self.verifier.remove_for_tenant(tenant_id);
        if removed > 0 {
            info!(tenant_id = %tenant_id, removed, "Dropped domain verification records");
        }
        self.sessions.invalidate(tenant_id);
        self.directory.remove(tenant_id)?;
        info!(tenant_id = %tenant_id, warnings = warnings.len(), "Tenant deleted");
        Ok(TeardownReport {
            tenant_id: tenant_id.to_string(),
            status: TenantStatus::Deleted,
            warnings,
        })
    }

    /// Shared infrastructure teardown: namespace, DNS, proxy route.
    /// `NotFound` is collected as a warning; anything else aborts so the
    /// operation can be retried.
    async fn teardown_stack(
        &self,
        tenant: &Tenant,
        warnings: &mut Vec<String>,
    ) -> ForgeResult<()> {
        let fqdn = format!("{}.{}", tenant.tenant_id, self.config.platform.base_domain);

        let steps: [(&str, Result<(), InfraError>); 3] = [
            (
                "namespace",
                self.infra.delete_namespace(&tenant.k8s_namespace).await,
            ),
            ("dns", self.infra.delete_dns_record(&fqdn).await),
            ("proxy", self.infra.remove_proxy_route(&fqdn).await),
        ];
        for (what, result) in steps {
            match result {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(tenant_id = %tenant.tenant_id, step = what, "Teardown found nothing to clean");
                    warnings.push(e.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Validate and register a custom domain, issuing the DNS TXT
    /// challenge the owner must publish.
    pub fn add_custom_domain(
        &self,
        tenant_id: &str,
        domain: &str,
    ) -> ForgeResult<VerificationChallenge> {
        self.directory.get(tenant_id)?;
        let challenge = self.verifier.initiate(tenant_id, domain)?;
        self.directory.update(tenant_id, |t| {
            t.custom_domain = Some(domain.trim().trim_end_matches('.').to_lowercase());
            t.domain_verified = false;
        })?;
        Ok(challenge)
    }

    /// Check a pending custom-domain verification. On success the
    /// tenant record is marked verified and certificate issuance plus
    /// proxy routing are (re-)applied; both are idempotent, so a
    /// re-check after success converges instead of erroring.
    pub async fn verify_custom_domain(
        &self,
        tenant_id: &str,
        domain: &str,
    ) -> ForgeResult<VerificationOutcome> {
        let tenant = self.directory.get(tenant_id)?;
        let outcome = self.verifier.check(tenant_id, domain).await?;

        if let VerificationOutcome::Verified { .. } = outcome {
            self.directory.update(tenant_id, |t| {
                t.domain_verified = true;
            })?;
            self.infra
                .request_certificate(&tenant.k8s_namespace, domain, &self.config.tls.issuer)
                .await?;
            self.infra
                .ensure_proxy_route(domain, &service_upstream(&tenant.k8s_namespace))
                .await?;
        }
        Ok(outcome)
    }
}

fn next_step(step: ProvisionStep) -> Option<ProvisionStep> {
    let all = ProvisionStep::all();
    all.iter().position(|s| *s == step).and_then(|i| all.get(i + 1)).copied()
}

fn service_upstream(namespace: &str) -> String {
    format!("shopforge-app.{namespace}.svc")
}

/// 24 random bytes, hex encoded: safe for URLs and SQL literals.
fn random_secret() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
