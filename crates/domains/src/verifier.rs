//! Custom-domain ownership verification. Per (tenant, domain) pair the
//! state machine is: none -> pending (token issued) -> verified, with
//! pending -> expired on TTL. A verified record is never mutated back.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use shopforge_core::{ForgeError, ForgeResult};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dns::DnsResolver;

/// Subdomain the challenge TXT record must be published at.
const TXT_HOST_PREFIX: &str = "_shopforge-verify";

/// How the domain owner proves control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMethod {
    DnsTxt,
}

/// One verification attempt for a (tenant, domain) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainVerification {
    pub id: Uuid,
    pub tenant_id: String,
    pub domain: String,
    pub verification_token: String,
    pub verification_method: VerificationMethod,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// What the caller must publish to complete verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationChallenge {
    /// DNS host to publish the TXT record at.
    pub txt_host: String,
    /// Expected TXT value, matched by exact string equality.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Typed outcome of a verification check. Every case is distinct so
/// callers can show the right guidance instead of a bare boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Exact token match. `newly_verified` is the signal to trigger
    /// certificate issuance; it is false on idempotent re-checks.
    Verified {
        verified_at: DateTime<Utc>,
        newly_verified: bool,
    },
    /// No pending or verified record exists for this (tenant, domain).
    DomainNotFound,
    /// The pending record's expiry passed; the caller must restart.
    VerificationExpired,
    /// Transient resolver or network error; safe to retry.
    DnsQueryFailed { detail: String },
    /// Query succeeded but no TXT records exist at the host.
    DnsRecordNotFound,
    /// TXT records exist but none match; includes everything found so
    /// the operator can see what is actually published.
    DnsValueMismatch { found: Vec<String> },
}

/// Issues and checks DNS TXT ownership challenges.
pub struct DomainVerifier {
    records: DashMap<(String, String), DomainVerification>,
    resolver: DnsResolver,
    base_domain: String,
    pending_ttl: Duration,
}

impl DomainVerifier {
    pub fn new(resolver: DnsResolver, base_domain: impl Into<String>, ttl_hours: u64) -> Self {
        Self {
            records: DashMap::new(),
            resolver,
            base_domain: base_domain.into().to_lowercase(),
            pending_ttl: Duration::hours(ttl_hours as i64),
        }
    }

    /// The DNS host a challenge for `domain` must be published at.
    pub fn txt_host(domain: &str) -> String {
        format!("{TXT_HOST_PREFIX}.{domain}")
    }

    /// Start (or resume) verification for a domain. Re-initiating an
    /// unexpired pending pair returns the existing challenge so a TXT
    /// record the owner already published stays valid while DNS
    /// propagates; an expired one gets a fresh token.
    pub fn initiate(&self, tenant_id: &str, domain: &str) -> ForgeResult<VerificationChallenge> {
        let domain = self.validate_domain(domain)?;

        if let Some(claimed) = self.verified_by_other_tenant(tenant_id, &domain) {
            warn!(tenant_id = %tenant_id, domain = %domain, claimed_by = %claimed, "Domain already claimed");
            return Err(ForgeError::DomainAlreadyClaimed { domain });
        }

        let key = (tenant_id.to_string(), domain.clone());
        let now = Utc::now();

        if let Some(existing) = self.records.get(&key) {
            if existing.is_verified || existing.expires_at > now {
                return Ok(VerificationChallenge {
                    txt_host: Self::txt_host(&domain),
                    token: existing.verification_token.clone(),
                    expires_at: existing.expires_at,
                });
            }
        }

        let record = DomainVerification {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            domain: domain.clone(),
            verification_token: random_token(),
            verification_method: VerificationMethod::DnsTxt,
            is_verified: false,
            created_at: now,
            verified_at: None,
            expires_at: now + self.pending_ttl,
        };
        let challenge = VerificationChallenge {
            txt_host: Self::txt_host(&domain),
            token: record.verification_token.clone(),
            expires_at: record.expires_at,
        };

        info!(tenant_id = %tenant_id, domain = %domain, expires_at = %record.expires_at, "Domain verification initiated");
        self.records.insert(key, record);
        Ok(challenge)
    }

    /// Check the published TXT records against the issued token.
    ///
    /// Idempotent and side-effect-free except for the single pending ->
    /// verified transition; a check after success returns `Verified`
    /// again without touching DNS or `verified_at`.
    pub async fn check(&self, tenant_id: &str, domain: &str) -> ForgeResult<VerificationOutcome> {
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        let key = (tenant_id.to_string(), domain.clone());

        let (token, expires_at) = match self.records.get(&key) {
            None => return Ok(VerificationOutcome::DomainNotFound),
            Some(record) if record.is_verified => {
                return Ok(VerificationOutcome::Verified {
                    verified_at: record.verified_at.unwrap_or(record.created_at),
                    newly_verified: false,
                });
            }
            Some(record) => (record.verification_token.clone(), record.expires_at),
        };

        let now = Utc::now();
        if expires_at <= now {
            return Ok(VerificationOutcome::VerificationExpired);
        }

        let found = match self.resolver.lookup_txt(&Self::txt_host(&domain)).await {
            Ok(records) => records,
            Err(e) => {
                warn!(tenant_id = %tenant_id, domain = %domain, error = %e, "DNS query failed");
                return Ok(VerificationOutcome::DnsQueryFailed {
                    detail: e.to_string(),
                });
            }
        };

        if found.is_empty() {
            return Ok(VerificationOutcome::DnsRecordNotFound);
        }
        if !found.iter().any(|r| *r == token) {
            return Ok(VerificationOutcome::DnsValueMismatch { found });
        }

        let verified_at = Utc::now();
        if let Some(mut record) = self.records.get_mut(&key) {
            record.is_verified = true;
            record.verified_at = Some(verified_at);
        }
        info!(tenant_id = %tenant_id, domain = %domain, "Domain verified");
        Ok(VerificationOutcome::Verified {
            verified_at,
            newly_verified: true,
        })
    }

    pub fn get(&self, tenant_id: &str, domain: &str) -> Option<DomainVerification> {
        self.records
            .get(&(tenant_id.to_string(), domain.to_lowercase()))
            .map(|r| r.clone())
    }

    /// Drop every verification record for a tenant (delete pipeline).
    pub fn remove_for_tenant(&self, tenant_id: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|(t, _), _| t != tenant_id);
        before - self.records.len()
    }

    fn verified_by_other_tenant(&self, tenant_id: &str, domain: &str) -> Option<String> {
        self.records
            .iter()
            .find(|r| {
                let (owner, d) = r.key();
                d == domain && owner != tenant_id && r.value().is_verified
            })
            .map(|r| r.key().0.clone())
    }

    /// Normalize and validate a candidate custom domain. Domains under
    /// the platform's own base domain are rejected outright.
    fn validate_domain(&self, domain: &str) -> ForgeResult<String> {
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
            return Err(ForgeError::InvalidDomain(format!(
                "'{domain}' is not a fully qualified domain name"
            )));
        }
        let labels_ok = domain.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        });
        if !labels_ok {
            return Err(ForgeError::InvalidDomain(format!(
                "'{domain}' contains an invalid label"
            )));
        }
        if domain == self.base_domain || domain.ends_with(&format!(".{}", self.base_domain)) {
            return Err(ForgeError::InvalidDomain(format!(
                "'{domain}' is under the platform domain {}",
                self.base_domain
            )));
        }
        Ok(domain)
    }
}

/// 32 random bytes from the thread CSPRNG, hex encoded.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::StaticDnsTable;

    fn verifier(table: StaticDnsTable) -> DomainVerifier {
        DomainVerifier::new(DnsResolver::Static(table), "shopforge.app", 48)
    }

    /// Publish a TXT value into the verifier's own static resolver.
    fn publish(v: &DomainVerifier, host: &str, value: &str) {
        match &v.resolver {
            DnsResolver::Static(table) => table.insert_txt(host, value),
            DnsResolver::Doh(_) => unreachable!("tests use the static resolver"),
        }
    }

    #[tokio::test]
    async fn test_round_trip_verification() {
        let v = verifier(StaticDnsTable::new());
        let challenge = v.initiate("acme", "acme-repairs.com").unwrap();
        assert_eq!(challenge.txt_host, "_shopforge-verify.acme-repairs.com");
        assert_eq!(challenge.token.len(), 64);

        publish(&v, &challenge.txt_host, &challenge.token);

        match v.check("acme", "acme-repairs.com").await.unwrap() {
            VerificationOutcome::Verified { newly_verified, .. } => assert!(newly_verified),
            other => panic!("expected Verified, got {other:?}"),
        }
        assert!(v.get("acme", "acme-repairs.com").unwrap().is_verified);
    }

    #[tokio::test]
    async fn test_single_character_mismatch_never_verifies() {
        let v = verifier(StaticDnsTable::new());
        let challenge = v.initiate("acme", "acme-repairs.com").unwrap();

        let mut wrong = challenge.token.clone();
        let last = if wrong.pop().unwrap() == 'a' { 'b' } else { 'a' };
        wrong.push(last);
        if let DnsResolver::Static(table) = &v.resolver {
            table.insert_txt(&challenge.txt_host, &wrong);
        }

        match v.check("acme", "acme-repairs.com").await.unwrap() {
            VerificationOutcome::DnsValueMismatch { found } => {
                assert_eq!(found, vec![wrong]);
            }
            other => panic!("expected DnsValueMismatch, got {other:?}"),
        }
        assert!(!v.get("acme", "acme-repairs.com").unwrap().is_verified);
    }

    #[tokio::test]
    async fn test_no_record_and_no_pending() {
        let v = verifier(StaticDnsTable::new());
        assert_eq!(
            v.check("acme", "acme-repairs.com").await.unwrap(),
            VerificationOutcome::DomainNotFound
        );

        v.initiate("acme", "acme-repairs.com").unwrap();
        assert_eq!(
            v.check("acme", "acme-repairs.com").await.unwrap(),
            VerificationOutcome::DnsRecordNotFound
        );
    }

    #[tokio::test]
    async fn test_query_failure_is_retryable_outcome() {
        let v = verifier(StaticDnsTable::new());
        let challenge = v.initiate("acme", "acme-repairs.com").unwrap();
        if let DnsResolver::Static(table) = &v.resolver {
            table.set_failure(&challenge.txt_host, "network unreachable");
        }

        match v.check("acme", "acme-repairs.com").await.unwrap() {
            VerificationOutcome::DnsQueryFailed { detail } => {
                assert!(detail.contains("network unreachable"));
            }
            other => panic!("expected DnsQueryFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_pending_must_restart() {
        let v = DomainVerifier::new(DnsResolver::Static(StaticDnsTable::new()), "shopforge.app", 0);
        v.initiate("acme", "acme-repairs.com").unwrap();
        assert_eq!(
            v.check("acme", "acme-repairs.com").await.unwrap(),
            VerificationOutcome::VerificationExpired
        );
    }

    #[tokio::test]
    async fn test_recheck_is_idempotent_and_preserves_verified_at() {
        let v = verifier(StaticDnsTable::new());
        let challenge = v.initiate("acme", "acme-repairs.com").unwrap();
        if let DnsResolver::Static(table) = &v.resolver {
            table.insert_txt(&challenge.txt_host, &challenge.token);
        }

        let first = v.check("acme", "acme-repairs.com").await.unwrap();
        let first_at = match first {
            VerificationOutcome::Verified { verified_at, newly_verified } => {
                assert!(newly_verified);
                verified_at
            }
            other => panic!("expected Verified, got {other:?}"),
        };

        // Even with the TXT record gone, a re-check stays verified and
        // does not move verified_at.
        if let DnsResolver::Static(table) = &v.resolver {
            table.clear(&challenge.txt_host);
        }
        match v.check("acme", "acme-repairs.com").await.unwrap() {
            VerificationOutcome::Verified { verified_at, newly_verified } => {
                assert!(!newly_verified);
                assert_eq!(verified_at, first_at);
            }
            other => panic!("expected Verified, got {other:?}"),
        }
    }

    #[test]
    fn test_platform_domains_rejected() {
        let v = verifier(StaticDnsTable::new());
        for bad in ["shopforge.app", "acme.shopforge.app", "deep.acme.shopforge.app"] {
            assert!(matches!(
                v.initiate("acme", bad).unwrap_err(),
                ForgeError::InvalidDomain(_)
            ));
        }
    }

    #[test]
    fn test_malformed_domains_rejected() {
        let v = verifier(StaticDnsTable::new());
        for bad in ["", "nodot", "-bad.com", "bad-.com", "exa mple.com", "caps.COM-"] {
            assert!(v.initiate("acme", bad).is_err(), "{bad} should be rejected");
        }
        // Normalization: trailing dot and case are accepted.
        assert!(v.initiate("acme", "Acme-Repairs.COM.").is_ok());
        assert!(v.get("acme", "acme-repairs.com").is_some());
    }

    #[test]
    fn test_domain_claimed_by_other_tenant_blocks_initiation() {
        let v = verifier(StaticDnsTable::new());
        v.initiate("acme", "shared.com").unwrap();
        // Pending (unverified) elsewhere does not block.
        v.initiate("globex", "shared.com").unwrap();

        // Verified elsewhere does.
        if let Some(mut record) = v.records.get_mut(&("acme".to_string(), "shared.com".to_string())) {
            record.is_verified = true;
            record.verified_at = Some(Utc::now());
        }
        assert!(matches!(
            v.initiate("initech", "shared.com").unwrap_err(),
            ForgeError::DomainAlreadyClaimed { .. }
        ));
    }

    #[test]
    fn test_reinitiate_pending_returns_same_token() {
        let v = verifier(StaticDnsTable::new());
        let first = v.initiate("acme", "acme-repairs.com").unwrap();
        let second = v.initiate("acme", "acme-repairs.com").unwrap();
        assert_eq!(first.token, second.token);
    }

    #[test]
    fn test_expired_reinitiate_rotates_token() {
        let v = DomainVerifier::new(DnsResolver::Static(StaticDnsTable::new()), "shopforge.app", 0);
        let first = v.initiate("acme", "acme-repairs.com").unwrap();
        let second = v.initiate("acme", "acme-repairs.com").unwrap();
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn test_remove_for_tenant() {
        let v = verifier(StaticDnsTable::new());
        v.initiate("acme", "one.com").unwrap();
        v.initiate("acme", "two.com").unwrap();
        v.initiate("globex", "three.com").unwrap();

        assert_eq!(v.remove_for_tenant("acme"), 2);
        assert!(v.get("acme", "one.com").is_none());
        assert!(v.get("globex", "three.com").is_some());
    }

    #[test]
    fn test_tokens_are_unguessable_length_and_unique() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
