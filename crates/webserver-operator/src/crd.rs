//! Custom Resource Definitions for the WebServer operator
//!
//! This module defines the `WebServer` CRD describing a Java web application
//! and how its image is obtained: either a pre-built image (optionally with a
//! web archive built from source into a volume) or an OpenShift source-to-image
//! pipeline.

use kube::{CustomResource, ResourceExt};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use validator::{Validate, ValidationError, ValidationErrors};

/// Label carried by every generated object
pub const LABEL_APPLICATION: &str = "application";

/// Label selecting the application's workload pods
pub const LABEL_DEPLOYMENT_CONFIG: &str = "deploymentConfig";

/// Label tying workload pods to the owning `WebServer` instance
pub const LABEL_IDENTITY: &str = "WebServer";

/// Regex for validating Kubernetes resource quantities (e.g., "1Gi", "512Mi")
static QUANTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E)?$").unwrap());

/// Regex for validating Service names (RFC 1035 label)
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// Longest `WebServer` name whose `webserver-<name>` objects still fit a label
pub const MAX_INSTANCE_NAME_LENGTH: usize = 53;

/// Validate a Kubernetes resource quantity string
fn validate_quantity(value: &str) -> Result<(), ValidationError> {
    if QUANTITY_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_quantity")
            .with_message(format!("'{}' is not a valid Kubernetes quantity", value).into()))
    }
}

/// Validate a container image reference
fn validate_image(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new("missing_image")
            .with_message("image reference must not be empty".into()));
    }
    if value.len() > 255 {
        return Err(ValidationError::new("image_too_long")
            .with_message("image reference exceeds 255 characters".into()));
    }
    // Basic format check - not overly strict to allow various registries
    if value.contains("..") || value.starts_with('/') || value.starts_with('-') {
        return Err(ValidationError::new("invalid_image")
            .with_message(format!("'{}' is not a valid container image", value).into()));
    }
    Ok(())
}

/// Validate a name that ends up as a Service name (RFC 1035 label)
fn validate_service_name(value: &str) -> Result<(), ValidationError> {
    if value.len() > 63 {
        return Err(
            ValidationError::new("name_too_long").with_message("name exceeds 63 characters".into())
        );
    }
    if !NAME_REGEX.is_match(value) {
        return Err(ValidationError::new("invalid_name").with_message(
            format!("'{}' is not a valid Service name (RFC 1035)", value).into(),
        ));
    }
    Ok(())
}

/// Validate whichever image source variant is populated
fn validate_image_source(source: &ImageSource) -> Result<(), ValidationError> {
    let result = match source {
        ImageSource::WebImage(image) => image.validate(),
        ImageSource::WebImageStream(stream) => stream.validate(),
    };
    result.map_err(|errors| {
        ValidationError::new("invalid_image_source")
            .with_message(flatten_errors(&errors).into())
    })
}

/// Render nested validation errors as `field: message` pairs
pub fn flatten_errors(errors: &ValidationErrors) -> String {
    errors
        .errors()
        .iter()
        .flat_map(|(field, kind)| match kind {
            validator::ValidationErrorsKind::Field(errs) => errs
                .iter()
                .map(|e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: {}", field, e.code),
                })
                .collect::<Vec<_>>(),
            validator::ValidationErrorsKind::Struct(inner) => {
                vec![format!("{}.{}", field, flatten_errors(inner))]
            }
            validator::ValidationErrorsKind::List(items) => items
                .iter()
                .map(|(idx, inner)| format!("{}[{}].{}", field, idx, flatten_errors(inner)))
                .collect(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// WebServer custom resource definition
///
/// Describes one managed Java web server application. The operator derives
/// the Services, workload and (on OpenShift) build objects needed to run it
/// and reports per-pod state back onto the status subresource.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, Validate, PartialEq)]
#[kube(
    group = "web.servers.org",
    version = "v1alpha1",
    kind = "WebServer",
    plural = "webservers",
    shortname = "ws",
    namespaced,
    status = "WebServerStatus",
    printcolumn = r#"{"name":"Application", "type":"string", "jsonPath":".spec.applicationName"}"#,
    printcolumn = r#"{"name":"Pods", "type":"integer", "jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WebServerSpec {
    /// Name of the application; used for the Service, workload and volume names
    #[validate(custom(function = "validate_service_name"))]
    pub application_name: String,

    /// Where the application image comes from
    #[serde(flatten)]
    #[validate(custom(function = "validate_image_source"))]
    pub image_source: ImageSource,

    /// Enable Tomcat session clustering between replicas
    #[serde(default)]
    pub use_session_clustering: bool,
}

/// The two mutually exclusive ways of obtaining the application image
///
/// The generated schema's `oneOf` makes the API server reject a spec setting
/// both keys. Deserializing such a spec directly takes `webImage`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ImageSource {
    /// A pre-built image, optionally with a web archive built from source
    WebImage(WebImageSpec),
    /// An OpenShift source-to-image pipeline
    WebImageStream(WebImageStreamSpec),
}

/// Pre-built application image
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebImageSpec {
    /// Image the web server container runs
    #[validate(custom(function = "validate_image"))]
    pub application_image: String,

    /// Web archive to build and deploy into the image; absent means
    /// "use the image as-is"
    #[serde(default)]
    #[validate(nested)]
    pub web_app: Option<WebAppSpec>,

    /// Probe script overrides
    #[serde(default)]
    pub web_server_health_check: Option<HealthCheckSpec>,
}

/// Web archive built from a git repository by a builder pod
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebAppSpec {
    /// Archive name, without the `.war` suffix
    #[serde(default = "default_web_app_name")]
    #[validate(length(min = 1, max = 253, message = "name must be 1-253 characters"))]
    pub name: String,

    /// Directory inside the web server image the archive is mounted into
    #[serde(default = "default_deploy_path")]
    pub deploy_path: String,

    /// Size of the volume holding the built archive
    #[serde(default = "default_application_size_limit")]
    #[validate(custom(function = "validate_quantity"))]
    pub application_size_limit: String,

    /// Git repository holding the application sources
    #[serde(default, rename = "sourceRepositoryURL")]
    pub source_repository_url: String,

    /// Branch, tag or commit to check out
    #[serde(default)]
    pub source_repository_ref: String,

    /// Sub-directory of the repository holding the build
    #[serde(default, rename = "contextDir", alias = "sourceRepositoryContextDir")]
    pub source_repository_context_dir: String,

    /// Image and script used to produce the archive
    #[validate(nested)]
    pub builder: WebAppBuilderSpec,
}

/// Builder pod configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebAppBuilderSpec {
    /// Image providing git and maven
    #[validate(custom(function = "validate_image"))]
    pub image: String,

    /// Custom build script; when empty a default maven build is generated
    #[serde(default)]
    pub application_build_script: Option<String>,
}

/// OpenShift source-to-image pipeline
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebImageStreamSpec {
    /// Image stream holding the S2I builder image
    #[validate(length(min = 1, message = "imageStreamName must not be empty"))]
    pub image_stream_name: String,

    /// Namespace of the builder image stream
    #[validate(length(min = 1, message = "imageStreamNamespace must not be empty"))]
    pub image_stream_namespace: String,

    /// Application sources
    #[serde(default)]
    pub web_sources: Option<WebSourcesSpec>,

    /// Probe script overrides
    #[serde(default)]
    pub web_server_health_check: Option<HealthCheckSpec>,
}

/// Sources fed into the S2I build
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebSourcesSpec {
    #[serde(default, rename = "sourceRepositoryURL")]
    pub source_repository_url: String,

    #[serde(default)]
    pub source_repository_ref: String,

    #[serde(default)]
    pub context_dir: String,

    /// Extra build parameters
    #[serde(default)]
    pub web_sources_params: Option<WebSourcesParams>,
}

/// Optional S2I build knobs and webhook secrets
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebSourcesParams {
    #[serde(default, rename = "mavenMirrorURL")]
    pub maven_mirror_url: String,

    #[serde(default)]
    pub artifact_dir: String,

    #[serde(default)]
    pub generic_webhook_secret: String,

    #[serde(default)]
    pub github_webhook_secret: String,
}

/// Probe overrides
///
/// Scripts must follow the `shell -c "command"` shape.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    #[serde(default)]
    pub server_readiness_script: String,

    #[serde(default)]
    pub server_liveness_script: String,
}

/// Status of a WebServer resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebServerStatus {
    /// Number of pods found for the application
    #[serde(default)]
    pub replicas: i32,

    /// Per-pod state, ordered by pod name
    #[serde(default)]
    pub pods: Vec<PodStatus>,
}

/// Observed state of one application pod
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    pub name: String,

    /// Empty until the pod is scheduled and has an address
    #[serde(default, rename = "podIP")]
    pub pod_ip: String,

    pub state: PodState,
}

/// Reduced pod lifecycle phase
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PodState {
    Pending,
    Active,
    #[default]
    Failed,
}

// Default value functions
fn default_web_app_name() -> String {
    "ROOT".to_string()
}

fn default_deploy_path() -> String {
    "/deployments/".to_string()
}

fn default_application_size_limit() -> String {
    "1Gi".to_string()
}

/// Overlay `overrides` on top of `base`, returning a new map
pub fn merge_labels(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    base.iter()
        .chain(overrides.iter())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl WebServerSpec {
    /// Probe overrides of whichever image source is configured
    pub fn health_check(&self) -> Option<&HealthCheckSpec> {
        match &self.image_source {
            ImageSource::WebImage(image) => image.web_server_health_check.as_ref(),
            ImageSource::WebImageStream(stream) => stream.web_server_health_check.as_ref(),
        }
    }

    /// The web archive to build, if the pre-built image variant carries one
    pub fn web_app(&self) -> Option<&WebAppSpec> {
        match &self.image_source {
            ImageSource::WebImage(image) => image.web_app.as_ref(),
            ImageSource::WebImageStream(_) => None,
        }
    }

    /// Labels carried by every generated object
    pub fn get_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            LABEL_APPLICATION.to_string(),
            self.application_name.clone(),
        )])
    }

    /// Labels identifying the application's workload pods
    pub fn get_selector_labels(&self, web_server_name: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                LABEL_DEPLOYMENT_CONFIG.to_string(),
                self.application_name.clone(),
            ),
            (LABEL_IDENTITY.to_string(), web_server_name.to_string()),
        ])
    }
}

impl WebServer {
    /// Selector used to list the application's pods: identity labels plus
    /// the labels set on the `WebServer` itself
    pub fn pod_list_labels(&self) -> BTreeMap<String, String> {
        merge_labels(&self.spec.get_selector_labels(&self.name_any()), self.labels())
    }
}

impl WebAppSpec {
    /// File name of the built archive
    pub fn war_file_name(&self) -> String {
        format!("{}.war", self.name)
    }
}
