//! Platform capability detection
//!
//! OpenShift clusters serve the `route.openshift.io` API group; everywhere else
//! only the baseline Kubernetes kinds are generated.

use crate::client::PlatformClient;
use std::fmt;
use tracing::{debug, info, warn};

/// API group whose presence marks an OpenShift cluster
pub const EXTENDED_API_GROUP: &str = "route.openshift.io";

/// What the cluster can run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Plain Kubernetes API set
    #[default]
    Baseline,
    /// OpenShift: routes, image streams, builds and deployment configs
    Extended,
}

impl Platform {
    pub fn is_extended(self) -> bool {
        self == Platform::Extended
    }

    /// Classify a cluster from the names of the API groups it serves
    pub fn from_api_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if groups
            .into_iter()
            .any(|group| group.as_ref() == EXTENDED_API_GROUP)
        {
            Platform::Extended
        } else {
            Platform::Baseline
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Baseline => f.write_str("kubernetes"),
            Platform::Extended => f.write_str("openshift"),
        }
    }
}

/// Probe the API group catalog.
///
/// Any discovery failure falls back to [`Platform::Baseline`].
pub async fn detect_platform<C>(client: &C) -> Platform
where
    C: PlatformClient + ?Sized,
{
    match client.api_groups().await {
        Ok(groups) => {
            debug!(groups = ?groups, "Discovered API groups");
            let platform = Platform::from_api_groups(&groups);
            info!(%platform, "Detected platform");
            platform
        }
        Err(e) => {
            warn!(error = %e, "API group discovery failed, assuming plain Kubernetes");
            Platform::Baseline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockPlatformClient;
    use crate::error::api_error;

    #[test]
    fn test_from_api_groups() {
        assert_eq!(
            Platform::from_api_groups(["apps", "rbac.authorization.k8s.io"]),
            Platform::Baseline
        );
        assert_eq!(
            Platform::from_api_groups(["apps", "route.openshift.io", "build.openshift.io"]),
            Platform::Extended
        );
        assert_eq!(
            Platform::from_api_groups(Vec::<String>::new()),
            Platform::Baseline
        );
    }

    #[tokio::test]
    async fn test_detect_extended() {
        let mut client = MockPlatformClient::new();
        client.expect_api_groups().times(1).returning(|| {
            Ok(vec![
                "apps".to_string(),
                "route.openshift.io".to_string(),
            ])
        });

        assert_eq!(detect_platform(&client).await, Platform::Extended);
    }

    #[tokio::test]
    async fn test_detect_failure_falls_back_to_baseline() {
        let mut client = MockPlatformClient::new();
        client
            .expect_api_groups()
            .times(1)
            .returning(|| Err(api_error(403, "Forbidden")));

        assert_eq!(detect_platform(&client).await, Platform::Baseline);
    }
}
