//! Kubernetes API client covering the handful of operations the tenant
//! lifecycle needs: namespaces, server-side apply of rendered objects,
//! readiness polling, and rollout restarts.

use chrono::Utc;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::chart::{Manifest, RenderedRelease};
use crate::error::InfraError;

const SYSTEM: &str = "orchestrator";
const FIELD_MANAGER: &str = "shopforge";

pub struct OrchestratorApi {
    http: Client,
    base_url: Url,
    token: String,
}

impl OrchestratorApi {
    pub fn new(base_url: Url, token: impl Into<String>, http: Client) -> Self {
        Self {
            http,
            base_url,
            token: token.into(),
        }
    }

    /// Create the namespace if it does not already exist.
    pub async fn ensure_namespace(&self, namespace: &str) -> Result<(), InfraError> {
        let url = self.base_url.join("api/v1/namespaces")?;
        let body = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {
                "name": namespace,
                "labels": { "app.kubernetes.io/managed-by": FIELD_MANAGER }
            }
        });

        let response = self
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await?;
        // 409 means a previous attempt already created it.
        if response.status() == StatusCode::CONFLICT {
            debug!(namespace = %namespace, "Namespace already exists");
            return Ok(());
        }
        ensure_success(response).await
    }

    pub async fn delete_namespace(&self, namespace: &str) -> Result<(), InfraError> {
        let url = self
            .base_url
            .join(&format!("api/v1/namespaces/{namespace}"))?;
        let response = self.request(Method::DELETE, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(InfraError::NotFound {
                system: SYSTEM,
                resource: format!("namespace/{namespace}"),
            });
        }
        ensure_success(response).await
    }

    /// Server-side apply of every object in a rendered release. Apply is
    /// create-or-update, which is what makes re-running a failed
    /// pipeline step safe.
    pub async fn apply_release(&self, release: &RenderedRelease) -> Result<(), InfraError> {
        for manifest in &release.manifests {
            self.apply_manifest(&release.namespace, manifest).await?;
        }
        Ok(())
    }

    /// Server-side apply of a single object.
    pub async fn apply_manifest(&self, namespace: &str, manifest: &Manifest) -> Result<(), InfraError> {
        let mut url = self
            .base_url
            .join(&resource_path(&manifest.kind, namespace, &manifest.name)?)?;
        url.query_pairs_mut()
            .append_pair("fieldManager", FIELD_MANAGER)
            .append_pair("force", "true");

        debug!(namespace = %namespace, kind = %manifest.kind, name = %manifest.name, "Applying manifest");
        let response = self
            .request(Method::PATCH, url)
            .header("Content-Type", "application/apply-patch+yaml")
            .body(manifest.body.to_string())
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Whether a deployment has all desired replicas ready.
    pub async fn deployment_ready(&self, namespace: &str, name: &str) -> Result<bool, InfraError> {
        let url = self
            .base_url
            .join(&resource_path("Deployment", namespace, name)?)?;
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(InfraError::NotFound {
                system: SYSTEM,
                resource: format!("deployment/{namespace}/{name}"),
            });
        }
        let deployment: serde_json::Value = parse_json(response).await?;

        let desired = deployment["spec"]["replicas"].as_u64().unwrap_or(1);
        let ready = deployment["status"]["readyReplicas"].as_u64().unwrap_or(0);
        Ok(ready >= desired)
    }

    /// Trigger a rolling restart by stamping the pod template, the same
    /// mechanism `kubectl rollout restart` uses.
    pub async fn restart_deployment(&self, namespace: &str, name: &str) -> Result<(), InfraError> {
        let url = self
            .base_url
            .join(&resource_path("Deployment", namespace, name)?)?;
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            "shopforge.app/restarted-at": Utc::now().to_rfc3339()
                        }
                    }
                }
            }
        });

        let response = self
            .request(Method::PATCH, url)
            .header("Content-Type", "application/strategic-merge-patch+json")
            .body(patch.to_string())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(InfraError::NotFound {
                system: SYSTEM,
                resource: format!("deployment/{namespace}/{name}"),
            });
        }
        ensure_success(response).await
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        if self.token.is_empty() {
            builder
        } else {
            builder.header("Authorization", format!("Bearer {}", self.token))
        }
    }
}

/// API path for the namespaced resources the chart can contain.
fn resource_path(kind: &str, namespace: &str, name: &str) -> Result<String, InfraError> {
    let (prefix, plural) = match kind {
        "Deployment" => ("apis/apps/v1", "deployments"),
        "Service" => ("api/v1", "services"),
        "Secret" => ("api/v1", "secrets"),
        "ConfigMap" => ("api/v1", "configmaps"),
        "PersistentVolumeClaim" => ("api/v1", "persistentvolumeclaims"),
        "Ingress" => ("apis/networking.k8s.io/v1", "ingresses"),
        "Certificate" => ("apis/cert-manager.io/v1", "certificates"),
        other => {
            return Err(InfraError::Template(format!(
                "unsupported manifest kind '{other}'"
            )))
        }
    };
    Ok(format!("{prefix}/namespaces/{namespace}/{plural}/{name}"))
}

async fn ensure_success(response: Response) -> Result<(), InfraError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(InfraError::Api {
            system: SYSTEM,
            status,
            body,
        });
    }
    Ok(())
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, InfraError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(InfraError::Api {
            system: SYSTEM,
            status,
            body,
        });
    }
    Ok(response.json().await?)
}
