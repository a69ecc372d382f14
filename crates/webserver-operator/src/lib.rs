//! # WebServer Kubernetes Operator
//!
//! Kubernetes operator for deploying and exposing Java web server
//! applications (Apache Tomcat / JBoss Web Server images), with optional
//! OpenShift source-to-image pipelines.
//!
//! This crate provides the core functionality of the operator: the
//! `WebServer` Custom Resource Definition, derivation of the objects needed
//! to run an application, create-if-absent reconciliation, and reporting of
//! pod state back onto the resource.
//!
//! ## Features
//!
//! - **Custom Resource Definition**: `WebServer` (`web.servers.org/v1alpha1`)
//! - **Pre-built images**: a Deployment running the image, optionally with a
//!   web archive compiled from git by a builder pod into a volume
//! - **OpenShift pipelines**: ImageStream, BuildConfig with webhook triggers
//!   and a DeploymentConfig following the built image
//! - **Session clustering**: Tomcat cluster membership through the Kubernetes
//!   API or DNS
//! - **Platform detection**: OpenShift kinds are only generated when the
//!   cluster serves `route.openshift.io`
//! - **Observability**: Prometheus-compatible operator metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use webserver_operator::prelude::*;
//! use kube::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::try_default().await?;
//!     let platform = detect_platform(&KubePlatformClient::new(client.clone())).await;
//!
//!     let options = GenerationOptions {
//!         platform,
//!         membership: MembershipDiscovery::Kubernetes,
//!     };
//!     run_controller(client, None, options).await
//! }
//! ```
//!
//! ## Architecture
//!
//! Each reconcile pass:
//!
//! 1. **Read**: re-fetch the WebServer; a deleted one ends the pass
//! 2. **Generate**: derive every object the WebServer needs (pure)
//! 3. **Create**: create whatever is missing; existing objects are left alone
//! 4. **Status**: list the application's pods and publish their state
//!
//! A pass requeues quickly while objects were just created or a pod has no
//! IP yet.
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types with validation
//! - [`controller`] - Reconciliation logic and controller setup
//! - [`resources`] - Object builders (Services, Deployment, build objects)
//! - [`build_script`] - Default web archive build script
//! - [`status`] - Pod state aggregation and status publishing
//! - [`platform`] - Kubernetes / OpenShift detection
//! - [`client`] - Cluster access trait and its `kube` implementation
//! - [`openshift`] - Typed OpenShift API objects
//! - [`target`] - The generated object enum
//! - [`error`] - Error types for operator operations
//!
//! ## Custom Resource Definition
//!
//! ### Pre-built image with a web archive built from source
//!
//! ```yaml
//! apiVersion: web.servers.org/v1alpha1
//! kind: WebServer
//! metadata:
//!   name: example
//! spec:
//!   applicationName: demo
//!   useSessionClustering: true
//!   webImage:
//!     applicationImage: quay.io/jws/tomcat:latest
//!     webApp:
//!       sourceRepositoryURL: https://github.com/jfclere/demo-webapp.git
//!       builder:
//!         image: quay.io/jws/builder:latest
//!     webServerHealthCheck:
//!       serverReadinessScript: /bin/bash -c "curl -s localhost:8080/health"
//! ```
//!
//! ### OpenShift source-to-image
//!
//! ```yaml
//! apiVersion: web.servers.org/v1alpha1
//! kind: WebServer
//! metadata:
//!   name: chat
//! spec:
//!   applicationName: websocket-chat
//!   webImageStream:
//!     imageStreamName: jboss-webserver57-openjdk11-tomcat9-openshift-ubi8
//!     imageStreamNamespace: openshift
//!     webSources:
//!       sourceRepositoryURL: https://github.com/jboss-openshift/openshift-quickstarts.git
//!       contextDir: tomcat-websocket-chat
//!       webSourcesParams:
//!         githubWebhookSecret: s3cr3t
//! ```
//!
//! ## Metrics
//!
//! - `webserver_operator_reconciliations_total` - Total reconciliation attempts
//! - `webserver_operator_reconciliation_errors_total` - Reconciliation errors
//! - `webserver_operator_created_objects_total` - Objects created
//! - `webserver_operator_reconciliation_duration_seconds` - Reconciliation latency

pub mod build_script;
pub mod client;
pub mod controller;
pub mod crd;
pub mod error;
pub mod openshift;
pub mod platform;
pub mod resources;
pub mod status;
pub mod target;

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::client::{KubePlatformClient, PlatformClient};
    pub use crate::controller::{
        ensure_resources, reconcile_web_server, run_controller, ControllerContext,
        ControllerMetrics, ReconcileOutcome,
    };
    pub use crate::crd::{
        HealthCheckSpec, ImageSource, PodState, PodStatus, WebAppBuilderSpec, WebAppSpec,
        WebImageSpec, WebImageStreamSpec, WebServer, WebServerSpec, WebServerStatus,
        WebSourcesParams, WebSourcesSpec,
    };
    pub use crate::error::{OperatorError, Result};
    pub use crate::platform::{detect_platform, Platform};
    pub use crate::resources::{GenerationOptions, MembershipDiscovery, ResourceBuilder};
    pub use crate::target::TargetResource;
}
