//! End-to-end lifecycle pipeline tests against the no-op
//! infrastructure client.

use shopforge_core::{
    AppConfig, CreateTenantRequest, ForgeError, ProvisionStep, SubscriptionTier, TenantStatus,
};
use shopforge_domains::{DnsResolver, DomainVerifier, StaticDnsTable, VerificationOutcome};
use shopforge_infra::{InfrastructureClient, NoopBehavior, NoopInfrastructure};
use shopforge_provisioning::{
    LogNotifier, LogUserAdmin, ProvisioningOrchestrator, StepOutcome, TrialSweeper,
};
use shopforge_tenancy::{SessionFactoryCache, TenantDirectory};
use std::sync::Arc;

struct Stack {
    config: Arc<AppConfig>,
    directory: Arc<TenantDirectory>,
    sessions: Arc<SessionFactoryCache>,
    verifier: Arc<DomainVerifier>,
    dns_table: StaticDnsTable,
}

impl Stack {
    fn new() -> Self {
        let config = Arc::new(AppConfig::default());
        let dns_table = StaticDnsTable::new();
        Self {
            config: config.clone(),
            directory: Arc::new(TenantDirectory::new()),
            sessions: Arc::new(SessionFactoryCache::new()),
            verifier: Arc::new(DomainVerifier::new(
                DnsResolver::Static(dns_table.clone()),
                config.platform.base_domain.clone(),
                config.domains.verification_ttl_hours,
            )),
            dns_table,
        }
    }

    /// Build an orchestrator over the shared state with the given no-op
    /// behavior, so tests can fail one attempt and resume with another.
    fn orchestrator(&self, behavior: NoopBehavior) -> ProvisioningOrchestrator {
        let infra = Arc::new(InfrastructureClient::Noop(NoopInfrastructure::with_behavior(
            self.config.database.clone(),
            self.config.orchestrator.clone(),
            behavior,
        )));
        ProvisioningOrchestrator::new(
            self.config.clone(),
            self.directory.clone(),
            infra,
            self.verifier.clone(),
            self.sessions.clone(),
            Arc::new(LogNotifier),
            Arc::new(LogUserAdmin),
        )
    }

    fn healthy(&self) -> ProvisioningOrchestrator {
        self.orchestrator(NoopBehavior::default())
    }
}

fn request(tenant_id: &str) -> CreateTenantRequest {
    CreateTenantRequest {
        tenant_id: tenant_id.to_string(),
        company_name: format!("{tenant_id} Auto Repair"),
        tier: SubscriptionTier::Professional,
        owner_email: format!("owner@{tenant_id}.test"),
    }
}

#[tokio::test]
async fn create_pipeline_runs_every_step() {
    let stack = Stack::new();
    let orch = stack.healthy();

    let report = orch.create_tenant(request("acme")).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.status, TenantStatus::Active);
    assert_eq!(report.steps.len(), 7);
    assert!(report
        .steps
        .iter()
        .all(|s| s.outcome == StepOutcome::Completed));

    let tenant = stack.directory.get("acme").unwrap();
    assert_eq!(tenant.status, TenantStatus::Active);
    assert_eq!(tenant.last_completed_step, Some(ProvisionStep::Activate));
    assert!(tenant.provisioning_error.is_none());
    assert_eq!(tenant.api_url, "https://acme.shopforge.app");
    assert_eq!(tenant.k8s_namespace, "shopforge-acme");
    assert!(tenant
        .db_connection_string
        .as_deref()
        .unwrap()
        .ends_with("/shopforge_acme"));
    // Professional starts on a trial.
    assert!(tenant.trial_ends_at.is_some());
}

#[tokio::test]
async fn concurrent_duplicate_create_fails_validation() {
    let stack = Stack::new();
    let orch = stack.healthy();

    orch.create_tenant(request("acme")).await.unwrap();
    let err = orch
        .create_tenant(CreateTenantRequest {
            owner_email: "second@acme.test".into(),
            ..request("acme")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::DuplicateTenant { .. }));
    assert_eq!(stack.directory.count(), 1);
}

#[tokio::test]
async fn readiness_timeout_leaves_tenant_provisioning_with_reason() {
    let stack = Stack::new();
    let orch = stack.orchestrator(NoopBehavior {
        fail_readiness: true,
        ..NoopBehavior::default()
    });

    let report = orch.create_tenant(request("acme")).await.unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.status, TenantStatus::Provisioning);

    let failed = report.steps.last().unwrap();
    assert_eq!(failed.step, ProvisionStep::WaitForReady);
    match &failed.outcome {
        StepOutcome::Failed { retryable, reason } => {
            assert!(*retryable);
            assert!(reason.contains("readiness"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    // Steps after the failure never ran.
    assert!(!report
        .steps
        .iter()
        .any(|s| s.step == ProvisionStep::ConfigureDns));

    let tenant = stack.directory.get("acme").unwrap();
    assert_eq!(tenant.status, TenantStatus::Provisioning);
    assert_eq!(tenant.last_completed_step, Some(ProvisionStep::ApplyChart));
    assert!(tenant
        .provisioning_error
        .as_deref()
        .unwrap()
        .starts_with("wait_for_ready:"));
}

#[tokio::test]
async fn resume_reruns_only_the_failed_step() {
    let stack = Stack::new();
    let failing = stack.orchestrator(NoopBehavior {
        fail_readiness: true,
        ..NoopBehavior::default()
    });
    failing.create_tenant(request("acme")).await.unwrap();

    let report = stack.healthy().resume_provisioning("acme").await.unwrap();
    assert_eq!(report.status, TenantStatus::Active);

    // Everything up to and including the already-applied chart is
    // skipped, not re-run; the retry picks up at the failed step.
    let skipped: Vec<ProvisionStep> = report
        .steps
        .iter()
        .filter(|s| s.outcome == StepOutcome::Skipped)
        .map(|s| s.step)
        .collect();
    assert_eq!(
        skipped,
        vec![
            ProvisionStep::ValidateUniqueness,
            ProvisionStep::ResolveTierLimits,
            ProvisionStep::ProvisionDatabase,
            ProvisionStep::ApplyChart,
        ]
    );
    assert!(report
        .steps
        .iter()
        .filter(|s| s.step >= ProvisionStep::WaitForReady)
        .all(|s| s.outcome == StepOutcome::Completed));

    assert_eq!(
        stack.directory.get("acme").unwrap().status,
        TenantStatus::Active
    );
}

#[tokio::test]
async fn resume_rejects_non_provisioning_tenant() {
    let stack = Stack::new();
    let orch = stack.healthy();
    orch.create_tenant(request("acme")).await.unwrap();

    let err = orch.resume_provisioning("acme").await.unwrap_err();
    assert!(matches!(err, ForgeError::InvalidStatus { .. }));
}

#[tokio::test]
async fn delete_with_already_removed_resources_warns_and_deletes() {
    let stack = Stack::new();
    let orch = stack.healthy();
    orch.create_tenant(request("acme")).await.unwrap();

    // The default no-op behavior reports every teardown target as
    // already absent, the same shape as a manually cleaned DNS record.
    let report = orch.delete_tenant("acme").await.unwrap();
    assert_eq!(report.status, TenantStatus::Deleted);
    assert!(!report.warnings.is_empty());
    assert!(report.warnings.iter().any(|w| w.contains("record")));

    assert!(matches!(
        stack.directory.get("acme").unwrap_err(),
        ForgeError::TenantNotFound { .. }
    ));
}

#[tokio::test]
async fn suspend_keeps_the_row_and_downgrades_tier() {
    let stack = Stack::new();
    let orch = stack.healthy();
    orch.create_tenant(request("acme")).await.unwrap();

    let report = orch.suspend_tenant("acme").await.unwrap();
    assert_eq!(report.status, TenantStatus::Suspended);

    let tenant = stack.directory.get("acme").unwrap();
    assert_eq!(tenant.status, TenantStatus::Suspended);
    assert_eq!(tenant.tier, SubscriptionTier::Free);
}

#[tokio::test]
async fn bulk_migrate_isolates_per_tenant_failures() {
    let stack = Stack::new();
    let orch = stack.healthy();
    for id in ["acme", "globex", "initech", "stark", "wayne"] {
        orch.create_tenant(request(id)).await.unwrap();
    }
    // Break exactly one tenant.
    stack
        .directory
        .update("initech", |t| t.db_connection_string = None)
        .unwrap();

    let report = orch.migrate_all().await;
    assert_eq!(report.total_tenants, 5);
    assert_eq!(report.success_count, 4);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.errors[0].tenant_id, "initech");

    // The failure did not disturb the other tenants.
    for id in ["acme", "globex", "stark", "wayne"] {
        assert_eq!(stack.directory.get(id).unwrap().status, TenantStatus::Active);
    }
}

#[tokio::test]
async fn bulk_restart_covers_all_active_tenants() {
    let stack = Stack::new();
    let orch = stack.healthy();
    for id in ["acme", "globex", "initech"] {
        orch.create_tenant(request(id)).await.unwrap();
    }
    orch.suspend_tenant("initech").await.unwrap();

    let report = orch.restart_all().await;
    assert_eq!(report.total_tenants, 2);
    assert_eq!(report.success_count, 2);
    assert_eq!(report.error_count, 0);
}

#[tokio::test]
async fn custom_domain_verification_flow() {
    let stack = Stack::new();
    let orch = stack.healthy();
    orch.create_tenant(request("acme")).await.unwrap();

    let challenge = orch.add_custom_domain("acme", "Acme-Repairs.com").unwrap();
    assert_eq!(challenge.txt_host, "_shopforge-verify.acme-repairs.com");

    let tenant = stack.directory.get("acme").unwrap();
    assert_eq!(tenant.custom_domain.as_deref(), Some("acme-repairs.com"));
    assert!(!tenant.domain_verified);

    // Nothing published yet.
    assert_eq!(
        orch.verify_custom_domain("acme", "acme-repairs.com")
            .await
            .unwrap(),
        VerificationOutcome::DnsRecordNotFound
    );

    stack.dns_table.insert_txt(&challenge.txt_host, &challenge.token);
    match orch
        .verify_custom_domain("acme", "acme-repairs.com")
        .await
        .unwrap()
    {
        VerificationOutcome::Verified { newly_verified, .. } => assert!(newly_verified),
        other => panic!("expected Verified, got {other:?}"),
    }
    assert!(stack.directory.get("acme").unwrap().domain_verified);

    // Re-checking stays verified and is not a fresh transition.
    match orch
        .verify_custom_domain("acme", "acme-repairs.com")
        .await
        .unwrap()
    {
        VerificationOutcome::Verified { newly_verified, .. } => assert!(!newly_verified),
        other => panic!("expected Verified, got {other:?}"),
    }
}

#[tokio::test]
async fn custom_domain_under_platform_is_rejected() {
    let stack = Stack::new();
    let orch = stack.healthy();
    orch.create_tenant(request("acme")).await.unwrap();

    let err = orch
        .add_custom_domain("acme", "acme.shopforge.app")
        .unwrap_err();
    assert!(matches!(err, ForgeError::InvalidDomain(_)));
}

#[tokio::test]
async fn sweeper_suspends_expired_and_warns_expiring() {
    let stack = Stack::new();
    let orch = Arc::new(stack.healthy());
    orch.create_tenant(request("expired")).await.unwrap();
    orch.create_tenant(request("expiring")).await.unwrap();
    orch.create_tenant(request("healthy")).await.unwrap();

    let now = chrono::Utc::now();
    stack
        .directory
        .update("expired", |t| t.trial_ends_at = Some(now - chrono::Duration::hours(1)))
        .unwrap();
    stack
        .directory
        .update("expiring", |t| t.trial_ends_at = Some(now + chrono::Duration::days(2)))
        .unwrap();
    stack
        .directory
        .update("healthy", |t| t.trial_ends_at = None)
        .unwrap();

    let sweeper = TrialSweeper::new(
        orch.clone(),
        stack.directory.clone(),
        Arc::new(LogNotifier),
        3600,
        3,
    );

    let summary = sweeper.run_once().await;
    assert_eq!(summary.suspended, 1);
    assert_eq!(summary.warned, 1);
    assert_eq!(summary.errors, 0);

    assert_eq!(
        stack.directory.get("expired").unwrap().status,
        TenantStatus::Suspended
    );
    assert_eq!(
        stack.directory.get("expiring").unwrap().status,
        TenantStatus::Active
    );

    // A second sweep within a day does not warn the same tenant again.
    let summary = sweeper.run_once().await;
    assert_eq!(summary.warned, 0);
    assert_eq!(summary.suspended, 0);
}
