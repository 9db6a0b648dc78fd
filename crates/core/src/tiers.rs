//! Static per-tier resource quotas consumed by chart rendering and the
//! provisioning pipeline. Read-only; tenants reference these by tier name.

use serde::{Deserialize, Serialize};

use crate::tenant::SubscriptionTier;

/// Resource quotas for one subscription tier.
///
/// Quantity strings use Kubernetes notation ("512Mi", "500m").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierResourceLimits {
    pub replicas: u32,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
    pub storage_size: String,
    pub storage_class: String,
    pub max_mechanics: u32,
    pub trial_days: i64,
}

impl TierResourceLimits {
    /// Look up the limits for a tier.
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        match tier {
            SubscriptionTier::Demo => Self {
                replicas: 1,
                cpu_request: "100m".into(),
                cpu_limit: "500m".into(),
                memory_request: "256Mi".into(),
                memory_limit: "512Mi".into(),
                storage_size: "1Gi".into(),
                storage_class: "standard".into(),
                max_mechanics: 2,
                trial_days: 14,
            },
            SubscriptionTier::Free => Self {
                replicas: 1,
                cpu_request: "100m".into(),
                cpu_limit: "500m".into(),
                memory_request: "256Mi".into(),
                memory_limit: "512Mi".into(),
                storage_size: "1Gi".into(),
                storage_class: "standard".into(),
                max_mechanics: 1,
                trial_days: 0,
            },
            SubscriptionTier::Professional => Self {
                replicas: 2,
                cpu_request: "250m".into(),
                cpu_limit: "1000m".into(),
                memory_request: "512Mi".into(),
                memory_limit: "1Gi".into(),
                storage_size: "10Gi".into(),
                storage_class: "ssd".into(),
                max_mechanics: 15,
                trial_days: 30,
            },
            SubscriptionTier::Enterprise => Self {
                replicas: 3,
                cpu_request: "500m".into(),
                cpu_limit: "2000m".into(),
                memory_request: "1Gi".into(),
                memory_limit: "2Gi".into(),
                storage_size: "50Gi".into(),
                storage_class: "ssd".into(),
                max_mechanics: u32::MAX,
                trial_days: 0,
            },
            SubscriptionTier::Team => Self {
                replicas: 2,
                cpu_request: "250m".into(),
                cpu_limit: "1000m".into(),
                memory_request: "512Mi".into(),
                memory_limit: "1Gi".into(),
                storage_size: "20Gi".into(),
                storage_class: "ssd".into(),
                max_mechanics: 30,
                trial_days: 30,
            },
            SubscriptionTier::Lifetime => Self {
                replicas: 2,
                cpu_request: "250m".into(),
                cpu_limit: "1000m".into(),
                memory_request: "512Mi".into(),
                memory_limit: "1Gi".into(),
                storage_size: "10Gi".into(),
                storage_class: "ssd".into(),
                max_mechanics: 15,
                trial_days: 0,
            },
        }
    }
}
