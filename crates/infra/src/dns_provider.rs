//! DNS provider management client: zone-record upserts and deletes for
//! tenant subdomains. Deleting a record that is already gone surfaces
//! `NotFound` so teardown can downgrade it to a warning.

use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::InfraError;

const SYSTEM: &str = "dns";

/// A record as the provider API represents it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    pub ttl: u32,
}

#[derive(Debug, Deserialize)]
struct RecordList {
    records: Vec<ZoneRecord>,
}

pub struct DnsProviderApi {
    http: Client,
    base_url: Url,
    token: String,
    zone: String,
    ttl: u32,
}

impl DnsProviderApi {
    pub fn new(base_url: Url, token: impl Into<String>, zone: impl Into<String>, ttl: u32, http: Client) -> Self {
        Self {
            http,
            base_url,
            token: token.into(),
            zone: zone.into(),
            ttl,
        }
    }

    /// Create or update a record. Idempotent: re-running after a partial
    /// provisioning attempt updates in place.
    pub async fn upsert_record(
        &self,
        name: &str,
        record_type: &str,
        content: &str,
    ) -> Result<(), InfraError> {
        let record = ZoneRecord {
            id: String::new(),
            name: name.to_string(),
            record_type: record_type.to_string(),
            content: content.to_string(),
            ttl: self.ttl,
        };

        let response = match self.find_record(name, record_type).await? {
            Some(existing) => {
                debug!(name = %name, id = %existing.id, "Updating existing record");
                let url = self.records_url(Some(&existing.id))?;
                self.request(Method::PUT, url).json(&record).send().await?
            }
            None => {
                let url = self.records_url(None)?;
                self.request(Method::POST, url).json(&record).send().await?
            }
        };
        ensure_success(response).await?;
        info!(name = %name, record_type = %record_type, content = %content, "DNS record ensured");
        Ok(())
    }

    /// Delete a record; `NotFound` when nothing is published.
    pub async fn delete_record(&self, name: &str, record_type: &str) -> Result<(), InfraError> {
        let existing = self.find_record(name, record_type).await?.ok_or_else(|| {
            InfraError::NotFound {
                system: SYSTEM,
                resource: format!("{record_type} {name}"),
            }
        })?;

        let url = self.records_url(Some(&existing.id))?;
        let response = self.request(Method::DELETE, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(InfraError::NotFound {
                system: SYSTEM,
                resource: format!("{record_type} {name}"),
            });
        }
        ensure_success(response).await?;
        info!(name = %name, record_type = %record_type, "DNS record deleted");
        Ok(())
    }

    async fn find_record(
        &self,
        name: &str,
        record_type: &str,
    ) -> Result<Option<ZoneRecord>, InfraError> {
        let mut url = self.records_url(None)?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("type", record_type);

        let response = self.request(Method::GET, url).send().await?;
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
        let list: RecordList = response.json().await?;
        Ok(list.records.into_iter().next())
    }

    fn records_url(&self, id: Option<&str>) -> Result<Url, InfraError> {
        let path = match id {
            Some(id) => format!("zones/{}/records/{id}", self.zone),
            None => format!("zones/{}/records", self.zone),
        };
        Ok(self.base_url.join(&path)?)
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
