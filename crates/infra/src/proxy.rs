//! Reverse-proxy admin client. Only used by deployments that front
//! tenant stacks with an edge proxy instead of (or in addition to) the
//! cluster ingress.

use reqwest::{Client, Method, Response, StatusCode};
use serde_json::json;
use tracing::info;
use url::Url;

use crate::error::InfraError;

const SYSTEM: &str = "proxy";

pub struct ProxyApi {
    http: Client,
    base_url: Url,
    token: String,
}

impl ProxyApi {
    pub fn new(base_url: Url, token: impl Into<String>, http: Client) -> Self {
        Self {
            http,
            base_url,
            token: token.into(),
        }
    }

    /// Route `host` to `upstream`, creating or replacing the route.
    pub async fn upsert_route(&self, host: &str, upstream: &str) -> Result<(), InfraError> {
        let url = self.base_url.join(&format!("routes/{host}"))?;
        let response = self
            .request(Method::PUT, url)
            .json(&json!({ "host": host, "upstream": upstream }))
            .send()
            .await?;
        ensure_success(response).await?;
        info!(host = %host, upstream = %upstream, "Proxy route ensured");
        Ok(())
    }

    pub async fn remove_route(&self, host: &str) -> Result<(), InfraError> {
        let url = self.base_url.join(&format!("routes/{host}"))?;
        let response = self.request(Method::DELETE, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(InfraError::NotFound {
                system: SYSTEM,
                resource: format!("route/{host}"),
            });
        }
        ensure_success(response).await?;
        info!(host = %host, "Proxy route removed");
        Ok(())
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
