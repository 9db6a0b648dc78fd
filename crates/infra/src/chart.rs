//! Release rendering: the per-tenant workload chart as `{{var}}` JSON
//! templates, parameterized by tier limits, image tags, and generated
//! credentials.

use serde::{Deserialize, Serialize};
use shopforge_core::TierResourceLimits;

use crate::error::InfraError;

/// Name of the tenant web app deployment.
pub const APP_WORKLOAD: &str = "shopforge-app";
/// Name of the tenant background worker deployment.
pub const WORKER_WORKLOAD: &str = "shopforge-worker";

/// All parameters a tenant release is rendered from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartValues {
    pub tenant_id: String,
    pub namespace: String,
    /// Host the tenant stack serves, e.g. `acme.shopforge.app`.
    pub host: String,
    pub image_repository: String,
    pub app_tag: String,
    pub worker_tag: String,
    pub replicas: u32,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
    pub storage_size: String,
    pub storage_class: String,
    pub tls_issuer: String,
    pub admin_username: String,
    pub admin_password: String,
    pub database_url: String,
}

impl ChartValues {
    pub fn apply_limits(&mut self, limits: &TierResourceLimits) {
        self.replicas = limits.replicas;
        self.cpu_request = limits.cpu_request.clone();
        self.cpu_limit = limits.cpu_limit.clone();
        self.memory_request = limits.memory_request.clone();
        self.memory_limit = limits.memory_limit.clone();
        self.storage_size = limits.storage_size.clone();
        self.storage_class = limits.storage_class.clone();
    }

    fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("tenant_id", self.tenant_id.clone()),
            ("namespace", self.namespace.clone()),
            ("host", self.host.clone()),
            ("image_repository", self.image_repository.clone()),
            ("app_tag", self.app_tag.clone()),
            ("worker_tag", self.worker_tag.clone()),
            ("replicas", self.replicas.to_string()),
            ("cpu_request", self.cpu_request.clone()),
            ("cpu_limit", self.cpu_limit.clone()),
            ("memory_request", self.memory_request.clone()),
            ("memory_limit", self.memory_limit.clone()),
            ("storage_size", self.storage_size.clone()),
            ("storage_class", self.storage_class.clone()),
            ("tls_issuer", self.tls_issuer.clone()),
            ("admin_username", self.admin_username.clone()),
            ("admin_password", self.admin_password.clone()),
            ("database_url", self.database_url.clone()),
        ]
    }
}

/// One rendered Kubernetes object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub kind: String,
    pub name: String,
    pub body: serde_json::Value,
}

/// The full set of objects that make up one tenant's stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedRelease {
    pub name: String,
    pub namespace: String,
    pub manifests: Vec<Manifest>,
}

/// Render the tenant release from its values.
pub fn render_release(values: &ChartValues) -> Result<RenderedRelease, InfraError> {
    let vars = values.vars();
    let manifests = [
        SECRET_TEMPLATE,
        PVC_TEMPLATE,
        APP_DEPLOYMENT_TEMPLATE,
        WORKER_DEPLOYMENT_TEMPLATE,
        SERVICE_TEMPLATE,
        INGRESS_TEMPLATE,
    ]
    .iter()
    .map(|template| render_manifest(template, &vars))
    .collect::<Result<Vec<_>, _>>()?;

    Ok(RenderedRelease {
        name: format!("shopforge-{}", values.tenant_id),
        namespace: values.namespace.clone(),
        manifests,
    })
}

fn render_manifest(template: &str, vars: &[(&'static str, String)]) -> Result<Manifest, InfraError> {
    let mut rendered = template.to_string();
    for (name, value) in vars {
        let placeholder = format!("{{{{{name}}}}}");
        rendered = rendered.replace(&placeholder, value);
    }
    if let Some(start) = rendered.find("{{") {
        let tail: String = rendered[start..].chars().take(40).collect();
        return Err(InfraError::Template(format!(
            "unsubstituted placeholder near '{tail}'"
        )));
    }

    let body: serde_json::Value = serde_json::from_str(&rendered)
        .map_err(|e| InfraError::Template(format!("rendered manifest is not valid JSON: {e}")))?;
    let kind = body["kind"]
        .as_str()
        .ok_or_else(|| InfraError::Template("manifest missing kind".into()))?
        .to_string();
    let name = body["metadata"]["name"]
        .as_str()
        .ok_or_else(|| InfraError::Template("manifest missing metadata.name".into()))?
        .to_string();

    Ok(Manifest { kind, name, body })
}

const SECRET_TEMPLATE: &str = r#"{
  "apiVersion": "v1",
  "kind": "Secret",
  "metadata": {
    "name": "shopforge-app-secrets",
    "namespace": "{{namespace}}",
    "labels": { "app.kubernetes.io/managed-by": "shopforge", "shopforge.app/tenant": "{{tenant_id}}" }
  },
  "type": "Opaque",
  "stringData": {
    "database-url": "{{database_url}}",
    "admin-username": "{{admin_username}}",
    "admin-password": "{{admin_password}}"
  }
}"#;

const PVC_TEMPLATE: &str = r#"{
  "apiVersion": "v1",
  "kind": "PersistentVolumeClaim",
  "metadata": {
    "name": "shopforge-uploads",
    "namespace": "{{namespace}}",
    "labels": { "app.kubernetes.io/managed-by": "shopforge", "shopforge.app/tenant": "{{tenant_id}}" }
  },
  "spec": {
    "accessModes": ["ReadWriteOnce"],
    "storageClassName": "{{storage_class}}",
    "resources": { "requests": { "storage": "{{storage_size}}" } }
  }
}"#;

const APP_DEPLOYMENT_TEMPLATE: &str = r#"{
  "apiVersion": "apps/v1",
  "kind": "Deployment",
  "metadata": {
    "name": "shopforge-app",
    "namespace": "{{namespace}}",
    "labels": { "app.kubernetes.io/managed-by": "shopforge", "shopforge.app/tenant": "{{tenant_id}}" }
  },
  "spec": {
    "replicas": {{replicas}},
    "selector": { "matchLabels": { "app": "shopforge-app" } },
    "template": {
      "metadata": { "labels": { "app": "shopforge-app", "shopforge.app/tenant": "{{tenant_id}}" } },
      "spec": {
        "containers": [
          {
            "name": "app",
            "image": "{{image_repository}}/app:{{app_tag}}",
            "ports": [{ "containerPort": 8080 }],
            "env": [
              { "name": "DATABASE_URL", "valueFrom": { "secretKeyRef": { "name": "shopforge-app-secrets", "key": "database-url" } } },
              { "name": "TENANT_ID", "value": "{{tenant_id}}" }
            ],
            "resources": {
              "requests": { "cpu": "{{cpu_request}}", "memory": "{{memory_request}}" },
              "limits": { "cpu": "{{cpu_limit}}", "memory": "{{memory_limit}}" }
            },
            "volumeMounts": [{ "name": "uploads", "mountPath": "/var/lib/shopforge/uploads" }]
          }
        ],
        "volumes": [{ "name": "uploads", "persistentVolumeClaim": { "claimName": "shopforge-uploads" } }]
      }
    }
  }
}"#;

const WORKER_DEPLOYMENT_TEMPLATE: &str = r#"{
  "apiVersion": "apps/v1",
  "kind": "Deployment",
  "metadata": {
    "name": "shopforge-worker",
    "namespace": "{{namespace}}",
    "labels": { "app.kubernetes.io/managed-by": "shopforge", "shopforge.app/tenant": "{{tenant_id}}" }
  },
  "spec": {
    "replicas": 1,
    "selector": { "matchLabels": { "app": "shopforge-worker" } },
    "template": {
      "metadata": { "labels": { "app": "shopforge-worker", "shopforge.app/tenant": "{{tenant_id}}" } },
      "spec": {
        "containers": [
          {
            "name": "worker",
            "image": "{{image_repository}}/worker:{{worker_tag}}",
            "env": [
              { "name": "DATABASE_URL", "valueFrom": { "secretKeyRef": { "name": "shopforge-app-secrets", "key": "database-url" } } },
              { "name": "TENANT_ID", "value": "{{tenant_id}}" }
            ],
            "resources": {
              "requests": { "cpu": "{{cpu_request}}", "memory": "{{memory_request}}" },
              "limits": { "cpu": "{{cpu_limit}}", "memory": "{{memory_limit}}" }
            }
          }
        ]
      }
    }
  }
}"#;

const SERVICE_TEMPLATE: &str = r#"{
  "apiVersion": "v1",
  "kind": "Service",
  "metadata": {
    "name": "shopforge-app",
    "namespace": "{{namespace}}",
    "labels": { "app.kubernetes.io/managed-by": "shopforge", "shopforge.app/tenant": "{{tenant_id}}" }
  },
  "spec": {
    "selector": { "app": "shopforge-app" },
    "ports": [{ "port": 80, "targetPort": 8080 }]
  }
}"#;

const INGRESS_TEMPLATE: &str = r#"{
  "apiVersion": "networking.k8s.io/v1",
  "kind": "Ingress",
  "metadata": {
    "name": "shopforge-app",
    "namespace": "{{namespace}}",
    "labels": { "app.kubernetes.io/managed-by": "shopforge", "shopforge.app/tenant": "{{tenant_id}}" },
    "annotations": { "cert-manager.io/cluster-issuer": "{{tls_issuer}}" }
  },
  "spec": {
    "tls": [{ "hosts": ["{{host}}"], "secretName": "shopforge-tls" }],
    "rules": [
      {
        "host": "{{host}}",
        "http": {
          "paths": [
            {
              "path": "/",
              "pathType": "Prefix",
              "backend": { "service": { "name": "shopforge-app", "port": { "number": 80 } } }
            }
          ]
        }
      }
    ]
  }
}"#;
