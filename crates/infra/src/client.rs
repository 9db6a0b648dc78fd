//! The single infrastructure interface the orchestration layer depends
//! on. Selected once at startup: `Real` talks to the cluster, the DNS
//! provider, the proxy, and the database server; `Noop` logs and
//! succeeds so the rest of the platform runs unchanged outside a
//! cluster. Lifecycle code never branches on the environment itself.

use reqwest::Client;
use serde_json::json;
use shopforge_core::config::{AppConfig, DatabaseConfig, OrchestratorConfig};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::chart::{Manifest, RenderedRelease, APP_WORKLOAD, WORKER_WORKLOAD};
use crate::database::DatabaseProvisioner;
use crate::dns_provider::DnsProviderApi;
use crate::error::InfraError;
use crate::orchestrator::OrchestratorApi;
use crate::proxy::ProxyApi;

/// In-cluster API server address used when no explicit URL is set.
const IN_CLUSTER_API: &str = "https://kubernetes.default.svc/";

pub enum InfrastructureClient {
    Real(Box<RealInfrastructure>),
    Noop(NoopInfrastructure),
}

impl InfrastructureClient {
    /// Probe the environment once and pick the implementation. Real
    /// infrastructure requires either an explicit API URL or the
    /// in-cluster service environment; anything else gets the no-op
    /// client so local development works without a cluster.
    pub fn from_config(config: &AppConfig) -> Result<Self, InfraError> {
        let in_cluster = std::env::var("KUBERNETES_SERVICE_HOST").is_ok();
        if config.orchestrator.force_noop
            || (config.orchestrator.api_url.is_empty() && !in_cluster)
        {
            warn!("No cluster access configured, using no-op infrastructure client");
            return Ok(Self::Noop(NoopInfrastructure::new(
                config.database.clone(),
                config.orchestrator.clone(),
            )));
        }
        Ok(Self::Real(Box::new(RealInfrastructure::from_config(config)?)))
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop(_))
    }

    pub async fn ensure_namespace(&self, namespace: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => real.orchestrator.ensure_namespace(namespace).await,
            Self::Noop(noop) => noop.succeed("ensure_namespace", namespace),
        }
    }

    pub async fn delete_namespace(&self, namespace: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => real.orchestrator.delete_namespace(namespace).await,
            Self::Noop(noop) => noop.teardown("delete_namespace", "namespace", namespace),
        }
    }

    pub async fn apply_release(&self, release: &RenderedRelease) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => real.orchestrator.apply_release(release).await,
            Self::Noop(noop) => noop.succeed("apply_release", &release.name),
        }
    }

    /// Block until both tenant workloads are ready, bounded by the
    /// configured timeout.
    pub async fn wait_for_ready(&self, namespace: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => real.wait_for_ready(namespace).await,
            Self::Noop(noop) => noop.wait_for_ready(namespace),
        }
    }

    pub async fn restart_workloads(&self, namespace: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => {
                real.orchestrator
                    .restart_deployment(namespace, APP_WORKLOAD)
                    .await?;
                real.orchestrator
                    .restart_deployment(namespace, WORKER_WORKLOAD)
                    .await
            }
            Self::Noop(noop) => noop.succeed("restart_workloads", namespace),
        }
    }

    /// Create the tenant database and role; returns the connection
    /// string the tenant stack (and session factory) will use.
    pub async fn provision_database(
        &self,
        database: &str,
        role: &str,
        password: &str,
    ) -> Result<String, InfraError> {
        match self {
            Self::Real(real) => {
                real.db.create_database(database, role, password).await?;
                Ok(real.db.connection_string(database, role, password))
            }
            Self::Noop(noop) => {
                noop.succeed("provision_database", database)?;
                Ok(format!(
                    "postgres://{role}:{password}@{}:{}/{database}",
                    noop.database.host, noop.database.port
                ))
            }
        }
    }

    pub async fn migrate_database(&self, connection_string: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => real.db.migrate(connection_string).await,
            Self::Noop(noop) => noop.succeed("migrate_database", "baseline"),
        }
    }

    pub async fn drop_database(&self, database: &str, role: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => real.db.drop_database(database, role).await,
            Self::Noop(noop) => noop.teardown("drop_database", "database", database),
        }
    }

    /// Point `fqdn` at the platform ingress.
    pub async fn ensure_dns_record(&self, fqdn: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => {
                real.dns
                    .upsert_record(fqdn, "CNAME", &real.ingress_target)
                    .await
            }
            Self::Noop(noop) => noop.succeed("ensure_dns_record", fqdn),
        }
    }

    pub async fn delete_dns_record(&self, fqdn: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => real.dns.delete_record(fqdn, "CNAME").await,
            Self::Noop(noop) => noop.teardown("delete_dns_record", "record", fqdn),
        }
    }

    pub async fn ensure_proxy_route(&self, host: &str, upstream: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => match &real.proxy {
                Some(proxy) => proxy.upsert_route(host, upstream).await,
                None => {
                    debug!(host = %host, "Proxy disabled, skipping route");
                    Ok(())
                }
            },
            Self::Noop(noop) => noop.succeed("ensure_proxy_route", host),
        }
    }

    pub async fn remove_proxy_route(&self, host: &str) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => match &real.proxy {
                Some(proxy) => proxy.remove_route(host).await,
                None => {
                    debug!(host = %host, "Proxy disabled, skipping route removal");
                    Ok(())
                }
            },
            Self::Noop(noop) => noop.teardown("remove_proxy_route", "route", host),
        }
    }

    /// Ask cert-manager for a certificate covering a verified custom
    /// domain, served from the tenant's namespace.
    pub async fn request_certificate(
        &self,
        namespace: &str,
        domain: &str,
        issuer: &str,
    ) -> Result<(), InfraError> {
        match self {
            Self::Real(real) => real.request_certificate(namespace, domain, issuer).await,
            Self::Noop(noop) => noop.succeed("request_certificate", domain),
        }
    }
}

pub struct RealInfrastructure {
    orchestrator: OrchestratorApi,
    dns: DnsProviderApi,
    proxy: Option<ProxyApi>,
    db: DatabaseProvisioner,
    ingress_target: String,
    readiness_timeout: Duration,
    readiness_poll: Duration,
}

impl RealInfrastructure {
    pub fn from_config(config: &AppConfig) -> Result<Self, InfraError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.orchestrator.request_timeout_secs))
            .build()?;

        let api_url = if config.orchestrator.api_url.is_empty() {
            IN_CLUSTER_API.to_string()
        } else {
            config.orchestrator.api_url.clone()
        };

        let orchestrator = OrchestratorApi::new(
            parse_base_url(&api_url)?,
            config.orchestrator.api_token.clone(),
            http.clone(),
        );
        let dns = DnsProviderApi::new(
            parse_base_url(&config.dns.api_url)?,
            config.dns.api_token.clone(),
            config.dns.zone.clone(),
            config.dns.record_ttl,
            http.clone(),
        );
        let proxy = if config.proxy.enabled {
            Some(ProxyApi::new(
                parse_base_url(&config.proxy.api_url)?,
                config.proxy.api_token.clone(),
                http,
            ))
        } else {
            None
        };
        let db = DatabaseProvisioner::connect_lazy(&config.database)?;

        Ok(Self {
            orchestrator,
            dns,
            proxy,
            db,
            ingress_target: config.dns.ingress_target.clone(),
            readiness_timeout: Duration::from_secs(config.orchestrator.readiness_timeout_secs),
            readiness_poll: Duration::from_secs(config.orchestrator.readiness_poll_secs),
        })
    }

    async fn wait_for_ready(&self, namespace: &str) -> Result<(), InfraError> {
        let poll = async {
            loop {
                let app = self
                    .orchestrator
                    .deployment_ready(namespace, APP_WORKLOAD)
                    .await?;
                let worker = self
                    .orchestrator
                    .deployment_ready(namespace, WORKER_WORKLOAD)
                    .await?;
                if app && worker {
                    return Ok::<(), InfraError>(());
                }
                tokio::time::sleep(self.readiness_poll).await;
            }
        };

        match tokio::time::timeout(self.readiness_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(InfraError::Timeout {
                operation: format!("workload readiness in {namespace}"),
                waited_secs: self.readiness_timeout.as_secs(),
            }),
        }
    }

    async fn request_certificate(
        &self,
        namespace: &str,
        domain: &str,
        issuer: &str,
    ) -> Result<(), InfraError> {
        let name = format!("custom-domain-{}", domain.replace('.', "-"));
        let manifest = Manifest {
            kind: "Certificate".into(),
            name: name.clone(),
            body: json!({
                "apiVersion": "cert-manager.io/v1",
                "kind": "Certificate",
                "metadata": { "name": name, "namespace": namespace },
                "spec": {
                    "secretName": format!("{name}-tls"),
                    "issuerRef": { "kind": "ClusterIssuer", "name": issuer },
                    "dnsNames": [domain]
                }
            }),
        };
        self.orchestrator.apply_manifest(namespace, &manifest).await
    }
}

/// Behavior knobs for the no-op client, used to rehearse failure paths
/// locally and in tests (readiness timeouts, already-gone teardowns).
#[derive(Debug, Clone)]
pub struct NoopBehavior {
    /// Make `wait_for_ready` report a timeout.
    pub fail_readiness: bool,
    /// Make teardown lookups report the resource as already absent,
    /// which is what a fresh local environment actually looks like.
    pub missing_teardown_records: bool,
}

impl Default for NoopBehavior {
    fn default() -> Self {
        Self {
            fail_readiness: false,
            missing_teardown_records: true,
        }
    }
}

pub struct NoopInfrastructure {
    database: DatabaseConfig,
    orchestrator: OrchestratorConfig,
    behavior: NoopBehavior,
}

impl NoopInfrastructure {
    pub fn new(database: DatabaseConfig, orchestrator: OrchestratorConfig) -> Self {
        Self {
            database,
            orchestrator,
            behavior: NoopBehavior::default(),
        }
    }

    pub fn with_behavior(
        database: DatabaseConfig,
        orchestrator: OrchestratorConfig,
        behavior: NoopBehavior,
    ) -> Self {
        Self {
            database,
            orchestrator,
            behavior,
        }
    }

    fn succeed(&self, operation: &str, subject: &str) -> Result<(), InfraError> {
        debug!(operation = %operation, subject = %subject, "No-op infrastructure call");
        Ok(())
    }

    fn teardown(
        &self,
        operation: &str,
        kind: &'static str,
        subject: &str,
    ) -> Result<(), InfraError> {
        if self.behavior.missing_teardown_records {
            debug!(operation = %operation, subject = %subject, "No-op teardown found nothing");
            return Err(InfraError::NotFound {
                system: "noop",
                resource: format!("{kind}/{subject}"),
            });
        }
        self.succeed(operation, subject)
    }

    fn wait_for_ready(&self, namespace: &str) -> Result<(), InfraError> {
        if self.behavior.fail_readiness {
            return Err(InfraError::Timeout {
                operation: format!("workload readiness in {namespace}"),
                waited_secs: self.orchestrator.readiness_timeout_secs,
            });
        }
        self.succeed("wait_for_ready", namespace)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, InfraError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Ok(Url::parse(&normalized)?)
}
