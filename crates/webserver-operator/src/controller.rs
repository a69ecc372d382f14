//! WebServer Controller
//!
//! This module implements the Kubernetes controller pattern for managing
//! WebServer custom resources. Each pass re-reads the WebServer, creates
//! whatever generated objects are missing and publishes the state of the
//! application's pods.

use crate::client::{KubePlatformClient, PlatformClient};
use crate::crd::{flatten_errors, ImageSource, WebServer};
use crate::error::{OperatorError, Result};
use crate::openshift::DeploymentConfig;
use crate::resources::{GenerationOptions, ResourceBuilder};
use crate::status::{build_status, pod_statuses, publish_status};
use crate::target::TargetResource;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

/// Default requeue interval for successful reconciliations
const DEFAULT_REQUEUE_SECONDS: u64 = 300; // 5 minutes

/// Requeue interval while objects were just created or pods lack an address
const PENDING_REQUEUE_SECONDS: u64 = 5;

/// Requeue interval for error cases (base for exponential backoff)
const ERROR_REQUEUE_SECONDS: u64 = 30;

/// Maximum requeue delay for error backoff
const MAX_ERROR_REQUEUE_SECONDS: u64 = 600;

/// Context passed to the controller
pub struct ControllerContext {
    /// Cluster access
    pub client: Arc<dyn PlatformClient>,
    /// Platform and membership mode, fixed at startup
    pub options: GenerationOptions,
    /// Metrics recorder (optional)
    pub metrics: Option<ControllerMetrics>,
    /// Per-WebServer error retry counts for exponential backoff
    pub error_counts: dashmap::DashMap<String, u32>,
}

/// Metrics for the controller
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Counter for reconciliation attempts
    pub reconciliations: metrics::Counter,
    /// Counter for reconciliation errors
    pub errors: metrics::Counter,
    /// Counter for objects created
    pub created: metrics::Counter,
    /// Histogram for reconciliation duration
    pub duration: metrics::Histogram,
}

impl ControllerMetrics {
    /// Create new controller metrics
    pub fn new() -> Self {
        Self {
            reconciliations: metrics::counter!("webserver_operator_reconciliations_total"),
            errors: metrics::counter!("webserver_operator_reconciliation_errors_total"),
            created: metrics::counter!("webserver_operator_created_objects_total"),
            duration: metrics::histogram!("webserver_operator_reconciliation_duration_seconds"),
        }
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the WebServer controller
pub async fn run_controller(
    client: Client,
    namespace: Option<String>,
    options: GenerationOptions,
) -> Result<()> {
    let web_servers: Api<WebServer> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let ctx = Arc::new(ControllerContext {
        client: Arc::new(KubePlatformClient::new(client.clone())),
        options,
        metrics: Some(ControllerMetrics::new()),
        error_counts: dashmap::DashMap::new(),
    });

    info!(
        namespace = namespace.as_deref().unwrap_or("all"),
        platform = %options.platform,
        membership = ?options.membership,
        "Starting WebServer controller"
    );

    // Watch owned workloads so pod churn triggers a status refresh
    let deployments = match &namespace {
        Some(ns) => Api::<Deployment>::namespaced(client.clone(), ns),
        None => Api::<Deployment>::all(client.clone()),
    };

    let services = match &namespace {
        Some(ns) => Api::<Service>::namespaced(client.clone(), ns),
        None => Api::<Service>::all(client.clone()),
    };

    let mut controller = Controller::new(web_servers, Config::default())
        .owns(deployments, Config::default())
        .owns(services, Config::default());

    if options.platform.is_extended() {
        let deployment_configs = match &namespace {
            Some(ns) => Api::<DeploymentConfig>::namespaced(client.clone(), ns),
            None => Api::<DeploymentConfig>::all(client.clone()),
        };
        controller = controller.owns(deployment_configs, Config::default());
    }

    controller
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(
                        name = obj.name,
                        namespace = obj.namespace,
                        ?action,
                        "Reconciliation completed"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation failed");
                }
            }
        })
        .await;

    Ok(())
}

/// Main reconciliation function
#[instrument(skip(web_server, ctx), fields(name = %web_server.name_any(), namespace = web_server.namespace()))]
async fn reconcile(web_server: Arc<WebServer>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let start = std::time::Instant::now();

    if let Some(ref metrics) = ctx.metrics {
        metrics.reconciliations.increment(1);
    }

    let name = web_server.name_any();
    let namespace = web_server
        .namespace()
        .unwrap_or_else(|| "default".to_string());

    let result = reconcile_web_server(ctx.client.as_ref(), ctx.options, &namespace, &name).await;

    if let Some(ref metrics) = ctx.metrics {
        metrics.duration.record(start.elapsed().as_secs_f64());
    }

    match result {
        Ok(outcome) => {
            // Reset error backoff counter on success
            ctx.error_counts.remove(&error_key(&namespace, &name));
            if let Some(ref metrics) = ctx.metrics {
                metrics.created.increment(outcome.created as u64);
            }
            Ok(outcome.action)
        }
        Err(e) => {
            if let Some(ref metrics) = ctx.metrics {
                metrics.errors.increment(1);
            }
            Err(e)
        }
    }
}

/// What one pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Number of objects created
    pub created: usize,
    /// When to run the next pass
    pub action: Action,
}

/// One reconcile pass for the WebServer `namespace/name`.
///
/// A WebServer that no longer exists ends the pass without touching the
/// cluster. Otherwise every generated object is created if absent, the pods
/// are aggregated into the status, and the status is written when it changed.
pub async fn reconcile_web_server<C>(
    client: &C,
    options: GenerationOptions,
    namespace: &str,
    name: &str,
) -> Result<ReconcileOutcome>
where
    C: PlatformClient + ?Sized,
{
    let Some(web_server) = client.get_web_server(namespace, name).await? else {
        info!(name, namespace, "WebServer not found, ignoring since it must have been deleted");
        return Ok(ReconcileOutcome {
            created: 0,
            action: Action::await_change(),
        });
    };

    // Validate the WebServer before generating anything
    if let Err(errors) = web_server.spec.validate() {
        let error_msg = flatten_errors(&errors);
        warn!(name, errors = %error_msg, "WebServer spec validation failed");
        return Err(OperatorError::InvalidConfig(error_msg));
    }

    if matches!(web_server.spec.image_source, ImageSource::WebImageStream(_))
        && !options.platform.is_extended()
    {
        warn!(
            name,
            "webImageStream needs OpenShift build APIs, no workload is created on this cluster"
        );
    }

    let targets = ResourceBuilder::new(&web_server, options)?.build_all();
    let created = ensure_resources(client, &targets).await?;

    let pods = client
        .list_pods(namespace, &web_server.pod_list_labels())
        .await?;
    let (statuses, missing_ip) = pod_statuses(&pods);
    publish_status(client, &web_server, build_status(statuses)).await?;

    let action = if created > 0 || missing_ip {
        Action::requeue(Duration::from_secs(PENDING_REQUEUE_SECONDS))
    } else {
        Action::requeue(Duration::from_secs(DEFAULT_REQUEUE_SECONDS))
    };

    info!(name, created, pods = pods.len(), "Reconciliation complete");
    Ok(ReconcileOutcome { created, action })
}

/// Create every target that does not exist yet.
///
/// Returns the number of objects created, counting creates that lost a race
/// with another writer. Any other failure aborts the walk.
pub async fn ensure_resources<C>(client: &C, targets: &[TargetResource]) -> Result<usize>
where
    C: PlatformClient + ?Sized,
{
    let mut created = 0;
    for target in targets {
        if client.exists(target).await? {
            debug!(target_resource = %target, "Already exists");
            continue;
        }

        info!(target_resource = %target, "Creating a new {}", target.kind());
        match client.create(target).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                debug!(target_resource = %target, "Created concurrently by another writer");
            }
            Err(e) => {
                error!(target_resource = %target, error = %e, "Failed to create {}", target.kind());
                return Err(e);
            }
        }
        created += 1;
    }
    Ok(created)
}

fn error_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Delay before retry number `retries` (1-based): 30s, 60s, 120s ... capped at 600s
fn backoff_delay(base: Duration, retries: u32) -> Duration {
    let backoff = base * 2u32.saturating_pow(retries.saturating_sub(1).min(5));
    backoff.min(Duration::from_secs(MAX_ERROR_REQUEUE_SECONDS))
}

/// Error policy for the controller
fn error_policy(
    web_server: Arc<WebServer>,
    error: &OperatorError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let key = error_key(
        &web_server
            .namespace()
            .unwrap_or_else(|| "default".to_string()),
        &web_server.name_any(),
    );
    let retries = {
        let mut entry = ctx.error_counts.entry(key.clone()).or_insert(0);
        *entry += 1;
        *entry
    };

    let base = error
        .requeue_delay()
        .unwrap_or(Duration::from_secs(ERROR_REQUEUE_SECONDS));
    let delay = backoff_delay(base, retries);

    warn!(
        error = %error,
        retry = retries,
        delay_secs = delay.as_secs(),
        "Reconciliation error for '{}', will retry",
        key
    );

    Action::requeue(delay)
}
