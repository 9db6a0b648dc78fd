//! ShopForge control plane: tenant provisioning, lifecycle admin
//! operations, and the trial sweeper.
//!
//! Runs as a daemon (`serve`) or as a one-shot admin tool; both paths
//! share the same orchestrator wiring.

use anyhow::Context;
use clap::{Parser, Subcommand};
use shopforge_core::{AppConfig, CreateTenantRequest, SubscriptionTier};
use shopforge_domains::{DnsResolver, DohClient, DomainVerifier};
use shopforge_infra::InfrastructureClient;
use shopforge_provisioning::{LogNotifier, LogUserAdmin, ProvisioningOrchestrator, TrialSweeper};
use shopforge_tenancy::{
    db_name, SessionFactory, SessionFactoryCache, TenantDirectory, DEFAULT_FACTORY_KEY,
};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

#[derive(Parser)]
#[command(name = "shopforge")]
#[command(about = "Multi-tenant SaaS platform for repair shops")]
#[command(version)]
struct Cli {
    /// Force the no-op infrastructure client (local development)
    #[arg(long, env = "SHOPFORGE__ORCHESTRATOR__FORCE_NOOP")]
    noop_infra: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane daemon (trial sweeper, session routing)
    Serve {
        /// Provision a few demo tenants on startup
        #[arg(long, default_value_t = false)]
        seed_demo: bool,
    },

    /// Provision a new tenant end to end
    CreateTenant {
        /// Tenant slug, used as subdomain, namespace, and database name
        #[arg(long)]
        tenant_id: String,

        /// Company display name
        #[arg(long)]
        company: String,

        /// Tier: demo, free, professional, enterprise, team, lifetime
        #[arg(long, default_value = "professional")]
        tier: String,

        /// Owner email address
        #[arg(long)]
        owner_email: String,
    },

    /// Resume a halted provisioning pipeline at its failed step
    ResumeTenant {
        #[arg(long)]
        tenant_id: String,
    },

    /// Tear down a tenant's stack but keep the record
    SuspendTenant {
        #[arg(long)]
        tenant_id: String,
    },

    /// Tear down and permanently remove a tenant
    DeleteTenant {
        #[arg(long)]
        tenant_id: String,
    },

    /// Register a custom domain and print the DNS TXT challenge
    AddDomain {
        #[arg(long)]
        tenant_id: String,

        #[arg(long)]
        domain: String,
    },

    /// Check a pending custom-domain verification
    VerifyDomain {
        #[arg(long)]
        tenant_id: String,

        #[arg(long)]
        domain: String,
    },

    /// Rolling-restart every active tenant's workloads
    RestartAll,

    /// Apply the baseline migration to every active tenant database
    MigrateAll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopforge=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if cli.noop_infra {
        config.orchestrator.force_noop = true;
    }

    let platform = Platform::bootstrap(config)?;

    match cli.command {
        Commands::Serve { seed_demo } => platform.serve(seed_demo).await,
        Commands::CreateTenant {
            tenant_id,
            company,
            tier,
            owner_email,
        } => {
            let request = CreateTenantRequest {
                tenant_id,
                company_name: company,
                tier: parse_tier(&tier)?,
                owner_email,
            };
            let report = platform.orchestrator.create_tenant(request).await?;
            print_json(&report)
        }
        Commands::ResumeTenant { tenant_id } => {
            let report = platform.orchestrator.resume_provisioning(&tenant_id).await?;
            print_json(&report)
        }
        Commands::SuspendTenant { tenant_id } => {
            let report = platform.orchestrator.suspend_tenant(&tenant_id).await?;
            print_json(&report)
        }
        Commands::DeleteTenant { tenant_id } => {
            let report = platform.orchestrator.delete_tenant(&tenant_id).await?;
            print_json(&report)
        }
        Commands::AddDomain { tenant_id, domain } => {
            let challenge = platform.orchestrator.add_custom_domain(&tenant_id, &domain)?;
            print_json(&challenge)
        }
        Commands::VerifyDomain { tenant_id, domain } => {
            let outcome = platform
                .orchestrator
                .verify_custom_domain(&tenant_id, &domain)
                .await?;
            print_json(&outcome)
        }
        Commands::RestartAll => {
            let report = platform.orchestrator.restart_all().await;
            print_json(&report)
        }
        Commands::MigrateAll => {
            let report = platform.orchestrator.migrate_all().await;
            print_json(&report)
        }
    }
}

/// The wired-up control plane.
struct Platform {
    config: Arc<AppConfig>,
    directory: Arc<TenantDirectory>,
    sessions: Arc<SessionFactoryCache>,
    orchestrator: Arc<ProvisioningOrchestrator>,
}

impl Platform {
    fn bootstrap(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let directory = Arc::new(TenantDirectory::new());
        let sessions = Arc::new(SessionFactoryCache::new());

        let infra = Arc::new(
            InfrastructureClient::from_config(&config)
                .context("building infrastructure client")?,
        );
        info!(noop = infra.is_noop(), "Infrastructure client selected");

        let doh_endpoint =
            Url::parse(&config.dns.doh_url).context("parsing DNS-over-HTTPS endpoint")?;
        let verifier = Arc::new(DomainVerifier::new(
            DnsResolver::Doh(DohClient::new(doh_endpoint, reqwest::Client::new())),
            config.platform.base_domain.clone(),
            config.domains.verification_ttl_hours,
        ));

        let orchestrator = Arc::new(ProvisioningOrchestrator::new(
            config.clone(),
            directory.clone(),
            infra,
            verifier,
            sessions.clone(),
            Arc::new(LogNotifier),
            Arc::new(LogUserAdmin),
        ));

        let platform = Self {
            config,
            directory,
            sessions,
            orchestrator,
        };
        platform.install_default_factory()?;
        platform.install_anonymous_factory()?;
        Ok(platform)
    }

    /// Dedicated single-tenant deployments route every request through
    /// one constant factory key instead of per-request resolution.
    fn install_default_factory(&self) -> anyhow::Result<()> {
        let Some(tenant_id) = self.config.platform.explicit_tenant_id.as_deref() else {
            return Ok(());
        };
        let database = db_name(&self.config.database.base_name, tenant_id);
        let connection_string = database_url(&self.config.database.admin_url, &database);
        let max_connections = self.config.database.max_connections;
        self.sessions.get_or_create(DEFAULT_FACTORY_KEY, || {
            SessionFactory::connect_lazy(
                DEFAULT_FACTORY_KEY,
                database.as_str(),
                &connection_string,
                max_connections,
            )
        })?;
        info!(tenant_id = %tenant_id, "Dedicated-deployment session factory installed");
        Ok(())
    }

    /// Pre-build the factory that serves unauthenticated public
    /// submissions, when one is configured.
    fn install_anonymous_factory(&self) -> anyhow::Result<()> {
        let Some(anonymous) = self.config.platform.anonymous_tenant.as_deref() else {
            return Ok(());
        };
        let database = db_name(&self.config.database.base_name, anonymous);
        let connection_string =
            database_url(&self.config.database.admin_url, &database);
        let factory = SessionFactory::connect_lazy(
            anonymous,
            database.as_str(),
            &connection_string,
            self.config.database.max_connections,
        )?;
        self.sessions.set_anonymous(Arc::new(factory));
        info!(tenant_id = %anonymous, "Anonymous session factory installed");
        Ok(())
    }

    async fn serve(&self, seed_demo: bool) -> anyhow::Result<()> {
        info!(
            base_domain = %self.config.platform.base_domain,
            "ShopForge control plane starting"
        );

        if seed_demo {
            self.seed_demo_tenants().await;
        }

        let sweeper_handle = if self.config.sweeper.enabled {
            let sweeper = Arc::new(TrialSweeper::new(
                self.orchestrator.clone(),
                self.directory.clone(),
                Arc::new(LogNotifier),
                self.config.sweeper.interval_secs,
                self.config.sweeper.warning_days,
            ));
            Some(sweeper.spawn())
        } else {
            None
        };

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        if let Some(handle) = sweeper_handle {
            handle.abort();
        }
        Ok(())
    }

    async fn seed_demo_tenants(&self) {
        let demos = [
            ("acme-demo", "Acme Auto Repair", "owner@acme-demo.test"),
            ("globex-demo", "Globex Garage", "owner@globex-demo.test"),
        ];
        for (tenant_id, company, email) in demos {
            let request = CreateTenantRequest {
                tenant_id: tenant_id.into(),
                company_name: company.into(),
                tier: SubscriptionTier::Demo,
                owner_email: email.into(),
            };
            match self.orchestrator.create_tenant(request).await {
                Ok(report) => info!(tenant_id, status = %report.status.as_str(), "Demo tenant seeded"),
                Err(e) => warn!(tenant_id, error = %e, "Demo tenant seeding failed"),
            }
        }
    }
}

fn parse_tier(raw: &str) -> anyhow::Result<SubscriptionTier> {
    match raw.to_lowercase().as_str() {
        "demo" => Ok(SubscriptionTier::Demo),
        "free" => Ok(SubscriptionTier::Free),
        "professional" => Ok(SubscriptionTier::Professional),
        "enterprise" => Ok(SubscriptionTier::Enterprise),
        "team" => Ok(SubscriptionTier::Team),
        "lifetime" => Ok(SubscriptionTier::Lifetime),
        other => anyhow::bail!("unknown tier '{other}'"),
    }
}

/// Swap the database path of the admin URL, keeping its credentials.
fn database_url(admin_url: &str, database: &str) -> String {
    match admin_url.rsplit_once('/') {
        Some((base, _)) => format!("{base}/{database}"),
        None => admin_url.to_string(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
