//! Tenant identity resolution: a pure function from request identity
//! inputs to a tenant id. Request middleware and repository helpers both
//! call this one function so they agree by construction.

use shopforge_core::{ForgeError, ForgeResult};

/// Host labels that are never tenant subdomains.
const RESERVED_LABELS: [&str; 2] = ["www", "api"];

/// Resolve the tenant a request belongs to. First match wins:
///
/// 1. statically configured explicit tenant id (dedicated deployments),
/// 2. the `X-Tenant-ID` header verbatim,
/// 3. the first label of `X-Forwarded-Host`,
/// 4. the first label of `Host`,
/// 5. none.
///
/// Header values are untrusted and only ever used as opaque lookup keys.
pub fn resolve_tenant(
    explicit_tenant_id: Option<&str>,
    header_tenant_id: Option<&str>,
    forwarded_host: Option<&str>,
    host_header: Option<&str>,
) -> Option<String> {
    if let Some(explicit) = explicit_tenant_id.filter(|s| !s.is_empty()) {
        return Some(explicit.to_string());
    }
    if let Some(header) = header_tenant_id.filter(|s| !s.is_empty()) {
        return Some(header.to_string());
    }
    if let Some(label) = forwarded_host.and_then(subdomain_label) {
        return Some(label);
    }
    host_header.and_then(subdomain_label)
}

/// Extract the tenant label from a host name.
///
/// Returns the first label when the host has at least two labels and the
/// first is not reserved. Bare domains and `localhost` never yield one.
fn subdomain_label(host: &str) -> Option<String> {
    let host = host.rsplit_once(':').map_or(host, |(h, _)| h);
    let mut labels = host.split('.');
    let first = labels.next().filter(|l| !l.is_empty())?;
    // Require a second label so bare hosts are never treated as tenants.
    labels.next().filter(|l| !l.is_empty())?;
    if RESERVED_LABELS.contains(&first) {
        return None;
    }
    Some(first.to_string())
}

/// Typed resolution outcome consumed by request-path callers.
///
/// `NoTenant` is a hard failure for tenant-scoped operations; callers must
/// handle it rather than fall back to another tenant's data. Public
/// endpoints that accept unauthenticated submissions opt into `Anonymous`
/// explicitly, which routes through the pre-built anonymous factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantResolution {
    Resolved(String),
    Anonymous,
    NoTenant,
}

impl TenantResolution {
    pub fn resolve(
        explicit_tenant_id: Option<&str>,
        header_tenant_id: Option<&str>,
        forwarded_host: Option<&str>,
        host_header: Option<&str>,
        allow_anonymous: bool,
    ) -> Self {
        match resolve_tenant(
            explicit_tenant_id,
            header_tenant_id,
            forwarded_host,
            host_header,
        ) {
            Some(id) => Self::Resolved(id),
            None if allow_anonymous => Self::Anonymous,
            None => Self::NoTenant,
        }
    }

    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Self::Resolved(id) => Some(id),
            _ => None,
        }
    }

    /// Require a resolved tenant for a tenant-scoped operation. There is
    /// no fallback tenant; anything else is a hard error.
    pub fn require(self) -> ForgeResult<String> {
        match self {
            Self::Resolved(id) => Ok(id),
            Self::Anonymous | Self::NoTenant => Err(ForgeError::TenantNotResolvable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subdomain_from_host() {
        assert_eq!(
            resolve_tenant(None, None, None, Some("acme.shopforge.app")),
            Some("acme".to_string())
        );
    }

    #[test]
    fn test_reserved_labels_never_resolve() {
        assert_eq!(
            resolve_tenant(None, None, None, Some("www.shopforge.app")),
            None
        );
        assert_eq!(
            resolve_tenant(None, None, Some("api.shopforge.app"), None),
            None
        );
    }

    #[test]
    fn test_header_wins_over_hosts() {
        assert_eq!(
            resolve_tenant(None, Some("globex"), Some("other.shopforge.app"), Some("x")),
            Some("globex".to_string())
        );
    }

    #[test]
    fn test_explicit_overrides_everything() {
        assert_eq!(
            resolve_tenant(
                Some("dedicated"),
                Some("globex"),
                Some("other.shopforge.app"),
                Some("acme.shopforge.app"),
            ),
            Some("dedicated".to_string())
        );
    }

    #[test]
    fn test_forwarded_host_wins_over_host() {
        assert_eq!(
            resolve_tenant(
                None,
                None,
                Some("initech.shopforge.app"),
                Some("acme.shopforge.app"),
            ),
            Some("initech".to_string())
        );
    }

    #[test]
    fn test_short_hosts_never_resolve() {
        assert_eq!(resolve_tenant(None, None, None, Some("localhost")), None);
        assert_eq!(
            resolve_tenant(None, None, None, Some("localhost:8080")),
            None
        );
        assert_eq!(resolve_tenant(None, None, None, None), None);
        assert_eq!(resolve_tenant(None, None, None, Some("")), None);
    }

    #[test]
    fn test_port_is_stripped() {
        assert_eq!(
            resolve_tenant(None, None, None, Some("acme.shopforge.app:8443")),
            Some("acme".to_string())
        );
    }

    #[test]
    fn test_empty_header_is_skipped() {
        assert_eq!(
            resolve_tenant(None, Some(""), None, Some("acme.shopforge.app")),
            Some("acme".to_string())
        );
    }

    #[test]
    fn test_pure_same_inputs_same_output() {
        let a = resolve_tenant(None, None, Some("acme.shopforge.app"), None);
        let b = resolve_tenant(None, None, Some("acme.shopforge.app"), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_typed_resolution() {
        let resolved =
            TenantResolution::resolve(None, None, None, Some("acme.shopforge.app"), false);
        assert_eq!(resolved, TenantResolution::Resolved("acme".to_string()));
        assert_eq!(resolved.tenant_id(), Some("acme"));

        let anon = TenantResolution::resolve(None, None, None, Some("localhost"), true);
        assert_eq!(anon, TenantResolution::Anonymous);

        let none = TenantResolution::resolve(None, None, None, Some("localhost"), false);
        assert_eq!(none, TenantResolution::NoTenant);
    }

    #[test]
    fn test_require_never_falls_back() {
        assert_eq!(
            TenantResolution::Resolved("acme".into()).require().unwrap(),
            "acme"
        );
        assert!(matches!(
            TenantResolution::NoTenant.require().unwrap_err(),
            ForgeError::TenantNotResolvable
        ));
        assert!(TenantResolution::Anonymous.require().is_err());
    }
}
