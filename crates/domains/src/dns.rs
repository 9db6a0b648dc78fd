//! TXT record lookup clients. Production uses DNS-over-HTTPS against a
//! public resolver; tests and non-clustered environments use an
//! in-memory table.

use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Errors produced while querying TXT records.
#[derive(Debug, Error)]
pub enum DnsLookupError {
    #[error("failed to build query url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("resolver returned rcode {rcode}")]
    ServerFailure { rcode: u16 },
    #[error("simulated transport failure: {0}")]
    Simulated(String),
}

/// Resolver selected once at startup. A tagged variant keeps the
/// verifier free of any knowledge of which backend is in play.
pub enum DnsResolver {
    Doh(DohClient),
    Static(StaticDnsTable),
}

impl DnsResolver {
    /// Look up the TXT records published at `host`.
    ///
    /// `Ok(vec![])` means the query succeeded and found nothing (including
    /// NXDOMAIN); `Err` means the query itself failed and is retryable.
    pub async fn lookup_txt(&self, host: &str) -> Result<Vec<String>, DnsLookupError> {
        match self {
            Self::Doh(client) => client.lookup_txt(host).await,
            Self::Static(table) => table.lookup_txt(host),
        }
    }
}

/// DNS-over-HTTPS client speaking the JSON wire format
/// (`application/dns-json`, as served by public resolvers).
pub struct DohClient {
    http: Client,
    endpoint: Url,
}

const RCODE_NOERROR: u16 = 0;
const RCODE_NXDOMAIN: u16 = 3;
const RRTYPE_TXT: u16 = 16;

impl DohClient {
    pub fn new(endpoint: Url, http: Client) -> Self {
        Self { http, endpoint }
    }

    pub async fn lookup_txt(&self, host: &str) -> Result<Vec<String>, DnsLookupError> {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("name", host);
            query.append_pair("type", "TXT");
        }

        let response = self
            .http
            .get(url)
            .header("Accept", "application/dns-json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unavailable>"));
            return Err(DnsLookupError::Status { status, body });
        }

        let answer: DohResponse = response.json().await?;
        match answer.status {
            RCODE_NOERROR => Ok(answer
                .answer
                .unwrap_or_default()
                .into_iter()
                .filter(|a| a.rr_type == RRTYPE_TXT)
                .map(|a| unquote_txt(&a.data))
                .collect()),
            RCODE_NXDOMAIN => Ok(Vec::new()),
            rcode => Err(DnsLookupError::ServerFailure { rcode }),
        }
    }
}

/// Resolvers return TXT payloads wrapped in quotes; strip one layer.
fn unquote_txt(data: &str) -> String {
    data.trim()
        .trim_start_matches('"')
        .trim_end_matches('"')
        .to_string()
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u16,
    #[serde(rename = "Answer")]
    answer: Option<Vec<DohAnswer>>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    rr_type: u16,
    data: String,
}

/// In-memory TXT table for tests and non-clustered deployments.
/// Clones share the same underlying table, so a handle kept outside the
/// resolver can publish records after verification was initiated.
#[derive(Clone)]
pub struct StaticDnsTable {
    records: Arc<DashMap<String, Vec<String>>>,
    failures: Arc<DashMap<String, String>>,
}

impl Default for StaticDnsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticDnsTable {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            failures: Arc::new(DashMap::new()),
        }
    }

    pub fn insert_txt(&self, host: impl Into<String>, value: impl Into<String>) {
        self.records.entry(host.into()).or_default().push(value.into());
    }

    pub fn clear(&self, host: &str) {
        self.records.remove(host);
    }

    /// Make lookups for `host` fail as if the resolver were unreachable.
    pub fn set_failure(&self, host: impl Into<String>, detail: impl Into<String>) {
        self.failures.insert(host.into(), detail.into());
    }

    fn lookup_txt(&self, host: &str) -> Result<Vec<String>, DnsLookupError> {
        if let Some(detail) = self.failures.get(host) {
            return Err(DnsLookupError::Simulated(detail.clone()));
        }
        Ok(self.records.get(host).map(|r| r.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn doh_client(server: &MockServer) -> DohClient {
        let endpoint = Url::parse(&server.url("/dns-query")).expect("url");
        DohClient::new(endpoint, Client::new())
    }

    #[tokio::test]
    async fn test_doh_parses_txt_answers() {
        let server = MockServer::start_async().await;
        let client = doh_client(&server);

        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/dns-query")
                    .query_param("name", "_shopforge-verify.acme-repairs.com")
                    .query_param("type", "TXT")
                    .header("Accept", "application/dns-json");
                then.status(200).json_body(json!({
                    "Status": 0,
                    "Answer": [
                        { "name": "_shopforge-verify.acme-repairs.com", "type": 16, "TTL": 300, "data": "\"abc123\"" },
                        { "name": "_shopforge-verify.acme-repairs.com", "type": 46, "TTL": 300, "data": "sig" }
                    ]
                }));
            })
            .await;

        let records = client
            .lookup_txt("_shopforge-verify.acme-repairs.com")
            .await
            .expect("lookup");
        mock.assert_async().await;

        // Non-TXT rrtypes are dropped, quotes are stripped.
        assert_eq!(records, vec!["abc123".to_string()]);
    }

    #[tokio::test]
    async fn test_doh_nxdomain_is_empty_not_error() {
        let server = MockServer::start_async().await;
        let client = doh_client(&server);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/dns-query");
                then.status(200).json_body(json!({ "Status": 3 }));
            })
            .await;

        let records = client.lookup_txt("missing.example.com").await.expect("lookup");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_doh_servfail_is_error() {
        let server = MockServer::start_async().await;
        let client = doh_client(&server);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/dns-query");
                then.status(200).json_body(json!({ "Status": 2 }));
            })
            .await;

        let err = client
            .lookup_txt("broken.example.com")
            .await
            .expect_err("should fail");
        assert!(matches!(err, DnsLookupError::ServerFailure { rcode: 2 }));
    }

    #[tokio::test]
    async fn test_doh_http_error_status() {
        let server = MockServer::start_async().await;
        let client = doh_client(&server);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/dns-query");
                then.status(502).body("bad gateway");
            })
            .await;

        let err = client.lookup_txt("x.example.com").await.expect_err("should fail");
        match err {
            DnsLookupError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_static_table() {
        let table = StaticDnsTable::new();
        table.insert_txt("host.example.com", "v1");
        table.insert_txt("host.example.com", "v2");
        let resolver = DnsResolver::Static(table);

        let records = resolver.lookup_txt("host.example.com").await.unwrap();
        assert_eq!(records.len(), 2);

        let empty = resolver.lookup_txt("other.example.com").await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_static_table_failure_injection() {
        let table = StaticDnsTable::new();
        table.set_failure("host.example.com", "network unreachable");
        let err = table.lookup_txt("host.example.com").expect_err("should fail");
        assert!(matches!(err, DnsLookupError::Simulated(_)));
    }
}
