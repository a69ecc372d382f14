//! Pod status aggregation
//!
//! Folds the live pods of an application into the `WebServer` status and
//! decides whether another pass is needed before every pod has an address.

use crate::client::PlatformClient;
use crate::crd::{PodState, PodStatus, WebServer, WebServerStatus};
use crate::error::Result;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

/// Reduce a pod phase to the state reported on the `WebServer`
pub fn pod_state(phase: Option<&str>) -> PodState {
    match phase {
        Some("Pending") => PodState::Pending,
        Some("Running") => PodState::Active,
        _ => PodState::Failed,
    }
}

/// Per-pod status ordered by name, plus whether some pod has no IP yet.
///
/// Ordering is plain string ordering, so `app-10` sorts before `app-2`.
pub fn pod_statuses(pods: &[Pod]) -> (Vec<PodStatus>, bool) {
    let mut statuses: Vec<PodStatus> = pods
        .iter()
        .map(|pod| {
            let status = pod.status.as_ref();
            PodStatus {
                name: pod.name_any(),
                pod_ip: status
                    .and_then(|s| s.pod_ip.clone())
                    .unwrap_or_default(),
                state: pod_state(status.and_then(|s| s.phase.as_deref())),
            }
        })
        .collect();
    statuses.sort_by(|a, b| a.name.cmp(&b.name));

    let requeue = statuses.iter().any(|s| s.pod_ip.is_empty());
    if requeue {
        info!("Some pods don't have an IP address yet, requeue scheduled");
    }
    (statuses, requeue)
}

/// Status computed from the application's pods
pub fn build_status(statuses: Vec<PodStatus>) -> WebServerStatus {
    WebServerStatus {
        replicas: statuses.len() as i32,
        pods: statuses,
    }
}

/// Write `status` onto the WebServer unless it already carries it.
///
/// Returns whether a write happened.
pub async fn publish_status<C>(
    client: &C,
    web_server: &WebServer,
    status: WebServerStatus,
) -> Result<bool>
where
    C: PlatformClient + ?Sized,
{
    if web_server.status.as_ref() == Some(&status) {
        debug!(name = %web_server.name_any(), "Status unchanged, skipping update");
        return Ok(false);
    }

    let mut updated = web_server.clone();
    updated.status = Some(status);
    client.replace_status(&updated).await?;
    info!(
        name = %web_server.name_any(),
        replicas = updated.status.as_ref().map(|s| s.replicas).unwrap_or_default(),
        "Updated WebServer status"
    );
    Ok(true)
}
