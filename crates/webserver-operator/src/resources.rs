//! Kubernetes Resource Builders
//!
//! This module derives the complete set of objects a `WebServer` needs
//! (Services, RoleBinding, workload, build objects and on OpenShift the
//! image pipeline and Route). Generation is pure: the same `WebServer` and
//! [`GenerationOptions`] always yield the same objects in the same order.

use crate::build_script::{resolve_build_script, WAR_MOUNT_PATH};
use crate::crd::{
    merge_labels, ImageSource, WebAppSpec, WebImageStreamSpec, WebServer, WebServerSpec,
    LABEL_IDENTITY, MAX_INSTANCE_NAME_LENGTH,
};
use crate::error::{OperatorError, Result};
use crate::openshift::{
    BuildConfig, BuildConfigSpec, BuildOutput, BuildSource, BuildStrategy, BuildTriggerPolicy,
    DeploymentConfig, DeploymentConfigSpec, DeploymentStrategy as DcStrategy,
    DeploymentTriggerImageChangeParams, DeploymentTriggerPolicy, GitBuildSource,
    ImageChangeTrigger, ImageStream, ImageStreamSpec, Route, RouteSpec, RouteTargetReference,
    SourceBuildStrategy, WebHookTrigger,
};
use crate::platform::Platform;
use crate::target::TargetResource;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, ExecAction, HTTPGetAction,
    ObjectReference, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, PodTemplateSpec, Probe, Service, ServicePort,
    ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use std::collections::BTreeMap;

/// Application HTTP port
pub const HTTP_PORT: i32 = 8080;

/// Jolokia management port
pub const JOLOKIA_PORT: i32 = 8778;

/// Path of the default HTTP health probe
pub const HEALTH_PATH: &str = "/health";

/// Where the clustering ConfigMap is mounted in the web server container
pub const CLUSTERING_MOUNT_PATH: &str = "/test/my-files";

/// ConfigMap key holding the clustering script
pub const CLUSTERING_SCRIPT_KEY: &str = "test.sh";

const APP_VOLUME: &str = "app-volume";
const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 60;

/// How Tomcat cluster members find each other
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MembershipDiscovery {
    /// Query the Kubernetes API for peer pods
    #[default]
    Kubernetes,
    /// Resolve peers through the headless discovery Service
    Dns,
}

impl MembershipDiscovery {
    /// Tribes membership provider class implementing this mode
    pub fn provider_class(self) -> &'static str {
        match self {
            MembershipDiscovery::Kubernetes => {
                "org.apache.catalina.tribes.membership.cloud.KubernetesMembershipProvider"
            }
            MembershipDiscovery::Dns => {
                "org.apache.catalina.tribes.membership.cloud.DNSMembershipProvider"
            }
        }
    }
}

/// Operator-wide inputs to generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    pub platform: Platform,
    pub membership: MembershipDiscovery,
}

/// Builder for generating Kubernetes resources from a WebServer
pub struct ResourceBuilder<'a> {
    web_server: &'a WebServer,
    options: GenerationOptions,
    name: String,
    namespace: String,
}

impl<'a> ResourceBuilder<'a> {
    /// Create a new resource builder
    pub fn new(web_server: &'a WebServer, options: GenerationOptions) -> Result<Self> {
        let name = web_server.metadata.name.clone().ok_or_else(|| {
            OperatorError::InvalidConfig("WebServer name is required".to_string())
        })?;
        if name.len() > MAX_INSTANCE_NAME_LENGTH {
            return Err(OperatorError::InvalidConfig(format!(
                "WebServer name '{}' exceeds {} characters",
                name, MAX_INSTANCE_NAME_LENGTH
            )));
        }

        let namespace = web_server
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        Ok(Self {
            web_server,
            options,
            name,
            namespace,
        })
    }

    fn spec(&self) -> &WebServerSpec {
        &self.web_server.spec
    }

    fn app(&self) -> &str {
        &self.web_server.spec.application_name
    }

    /// Name shared by the discovery Service, RoleBinding and ConfigMap
    fn instance_name(&self) -> String {
        format!("webserver-{}", self.name)
    }

    fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: WebServer::api_version(&()).to_string(),
            kind: WebServer::kind(&()).to_string(),
            name: self.name.clone(),
            uid: self.web_server.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Metadata for a generated object: namespace, `application` label and
    /// the controller reference back to the WebServer
    fn object_meta(&self, name: String) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.spec().get_labels()),
            owner_references: Some(vec![self.owner_reference()]),
            ..Default::default()
        }
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        self.spec().get_selector_labels(&self.name)
    }

    /// Every object this WebServer needs, in creation order
    pub fn build_all(&self) -> Vec<TargetResource> {
        let extended = self.options.platform.is_extended();
        let mut targets = vec![
            TargetResource::Service(self.build_routing_service()),
            TargetResource::Service(self.build_discovery_service()),
            TargetResource::RoleBinding(self.build_role_binding()),
        ];

        if self.spec().use_session_clustering {
            targets.push(TargetResource::ConfigMap(self.build_config_map()));
        }

        match &self.spec().image_source {
            ImageSource::WebImage(image) => {
                if let Some(web_app) = &image.web_app {
                    targets.push(TargetResource::PersistentVolumeClaim(self.build_pvc(web_app)));
                    targets.push(TargetResource::Pod(self.build_build_pod(web_app)));
                }
                targets.push(TargetResource::Deployment(
                    self.build_deployment(&image.application_image),
                ));
            }
            ImageSource::WebImageStream(stream) if extended => {
                targets.push(TargetResource::ImageStream(self.build_image_stream()));
                targets.push(TargetResource::BuildConfig(self.build_build_config(stream)));
                targets.push(TargetResource::DeploymentConfig(
                    self.build_deployment_config(),
                ));
            }
            ImageSource::WebImageStream(_) => {}
        }

        if extended {
            targets.push(TargetResource::Route(self.build_route()));
        }

        targets
    }

    /// Build the Service routing traffic to the application pods
    pub fn build_routing_service(&self) -> Service {
        Service {
            metadata: self.object_meta(self.app().to_string()),
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some("ui".to_string()),
                    port: HTTP_PORT,
                    target_port: Some(IntOrString::Int(HTTP_PORT)),
                    ..Default::default()
                }]),
                selector: Some(self.selector_labels()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build the headless Service used for cluster member discovery
    pub fn build_discovery_service(&self) -> Service {
        Service {
            metadata: self.object_meta(self.instance_name()),
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: HTTP_PORT,
                    target_port: Some(IntOrString::Int(HTTP_PORT)),
                    ..Default::default()
                }]),
                selector: Some(self.spec().get_labels()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Grant the default service account read access, needed by the
    /// Kubernetes membership provider to list peer pods
    pub fn build_role_binding(&self) -> RoleBinding {
        RoleBinding {
            metadata: self.object_meta(self.instance_name()),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: "view".to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: "default".to_string(),
                ..Default::default()
            }]),
        }
    }

    /// Build the ConfigMap carrying the script that enables session clustering
    pub fn build_config_map(&self) -> ConfigMap {
        ConfigMap {
            metadata: self.object_meta(self.instance_name()),
            data: Some(BTreeMap::from([(
                CLUSTERING_SCRIPT_KEY.to_string(),
                clustering_script(self.options.membership),
            )])),
            ..Default::default()
        }
    }

    /// Build the volume the builder pod writes the web archive into
    pub fn build_pvc(&self, web_app: &WebAppSpec) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: self.object_meta(self.app().to_string()),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(web_app.application_size_limit.clone()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build the one-shot pod that compiles the web archive
    pub fn build_build_pod(&self, web_app: &WebAppSpec) -> Pod {
        let mut metadata = self.object_meta(format!("{}-build", self.app()));
        metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(LABEL_IDENTITY.to_string(), self.name.clone());

        Pod {
            metadata,
            spec: Some(PodSpec {
                termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                restart_policy: Some("OnFailure".to_string()),
                volumes: Some(vec![Volume {
                    name: APP_VOLUME.to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: self.app().to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                containers: vec![Container {
                    name: "war".to_string(),
                    image: Some(web_app.builder.image.clone()),
                    command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
                    args: Some(vec![resolve_build_script(web_app)]),
                    volume_mounts: Some(vec![VolumeMount {
                        name: APP_VOLUME.to_string(),
                        mount_path: WAR_MOUNT_PATH.to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build the Deployment running a pre-built image
    pub fn build_deployment(&self, image: &str) -> Deployment {
        Deployment {
            metadata: self.object_meta(self.app().to_string()),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                strategy: Some(DeploymentStrategy {
                    type_: Some("Recreate".to_string()),
                    ..Default::default()
                }),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels()),
                    ..Default::default()
                },
                template: self.build_pod_template(image),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build the web server pod template
    pub fn build_pod_template(&self, image: &str) -> PodTemplateSpec {
        // extra labels from the WebServer never replace the identity keys
        let identity = merge_labels(&self.spec().get_labels(), &self.selector_labels());
        let extra = self.web_server.metadata.labels.clone().unwrap_or_default();
        let labels = merge_labels(&extra, &identity);
        let health = self.spec().health_check();

        let container = Container {
            name: self.app().to_string(),
            image: Some(image.to_string()),
            image_pull_policy: Some("Always".to_string()),
            readiness_probe: Some(build_probe(
                health.map(|h| h.server_readiness_script.as_str()),
            )),
            liveness_probe: Some(build_probe(
                health.map(|h| h.server_liveness_script.as_str()),
            )),
            ports: Some(vec![
                ContainerPort {
                    name: Some("jolokia".to_string()),
                    container_port: JOLOKIA_PORT,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ContainerPort {
                    name: Some("http".to_string()),
                    container_port: HTTP_PORT,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            env: Some(self.env_vars()),
            volume_mounts: non_empty(self.volume_mounts()),
            ..Default::default()
        };

        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                name: Some(self.app().to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                containers: vec![container],
                volumes: non_empty(self.volumes()),
                ..Default::default()
            }),
        }
    }

    fn env_vars(&self) -> Vec<EnvVar> {
        let clustering = self.spec().use_session_clustering;
        let namespace = if clustering && self.options.membership == MembershipDiscovery::Kubernetes
        {
            self.namespace.clone()
        } else {
            self.instance_name()
        };

        let mut env = vec![EnvVar {
            name: "KUBERNETES_NAMESPACE".to_string(),
            value: Some(namespace),
            ..Default::default()
        }];
        if clustering {
            env.push(EnvVar {
                name: "ENV_FILES".to_string(),
                value: Some(format!("{}/{}", CLUSTERING_MOUNT_PATH, CLUSTERING_SCRIPT_KEY)),
                ..Default::default()
            });
        }
        env
    }

    fn volume_mounts(&self) -> Vec<VolumeMount> {
        let mut mounts = Vec::new();
        if self.spec().use_session_clustering {
            mounts.push(VolumeMount {
                name: self.instance_name(),
                mount_path: CLUSTERING_MOUNT_PATH.to_string(),
                ..Default::default()
            });
        }
        if let Some(web_app) = self.spec().web_app() {
            let war = web_app.war_file_name();
            mounts.push(VolumeMount {
                name: APP_VOLUME.to_string(),
                mount_path: format!("{}{}", web_app.deploy_path, war),
                sub_path: Some(war),
                ..Default::default()
            });
        }
        mounts
    }

    fn volumes(&self) -> Vec<Volume> {
        let mut volumes = Vec::new();
        if self.spec().use_session_clustering {
            volumes.push(Volume {
                name: self.instance_name(),
                config_map: Some(ConfigMapVolumeSource {
                    name: self.instance_name(),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
        if self.spec().web_app().is_some() {
            volumes.push(Volume {
                name: APP_VOLUME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: self.app().to_string(),
                    read_only: Some(true),
                }),
                ..Default::default()
            });
        }
        volumes
    }

    /// Build the ImageStream receiving the S2I output
    pub fn build_image_stream(&self) -> ImageStream {
        ImageStream {
            metadata: self.object_meta(self.app().to_string()),
            spec: ImageStreamSpec::default(),
        }
    }

    /// Build the S2I BuildConfig
    pub fn build_build_config(&self, stream: &WebImageStreamSpec) -> BuildConfig {
        let sources = stream.web_sources.clone().unwrap_or_default();
        let params = sources.web_sources_params.clone().unwrap_or_default();

        let mut env = Vec::new();
        if !params.maven_mirror_url.is_empty() {
            env.push(EnvVar {
                name: "MAVEN_MIRROR_URL".to_string(),
                value: Some(params.maven_mirror_url.clone()),
                ..Default::default()
            });
        }
        if !params.artifact_dir.is_empty() {
            env.push(EnvVar {
                name: "ARTIFACT_DIR".to_string(),
                value: Some(params.artifact_dir.clone()),
                ..Default::default()
            });
        }

        let mut triggers = vec![
            BuildTriggerPolicy {
                type_: "ImageChange".to_string(),
                image_change: Some(ImageChangeTrigger::default()),
                ..Default::default()
            },
            BuildTriggerPolicy {
                type_: "ConfigChange".to_string(),
                ..Default::default()
            },
        ];
        if !params.github_webhook_secret.is_empty() {
            triggers.push(BuildTriggerPolicy {
                type_: "GitHub".to_string(),
                github: Some(WebHookTrigger {
                    secret: params.github_webhook_secret.clone(),
                }),
                ..Default::default()
            });
        }
        if !params.generic_webhook_secret.is_empty() {
            triggers.push(BuildTriggerPolicy {
                type_: "Generic".to_string(),
                generic: Some(WebHookTrigger {
                    secret: params.generic_webhook_secret.clone(),
                }),
                ..Default::default()
            });
        }

        BuildConfig {
            metadata: self.object_meta(self.app().to_string()),
            spec: BuildConfigSpec {
                source: BuildSource {
                    type_: "Git".to_string(),
                    git: Some(GitBuildSource {
                        uri: sources.source_repository_url.clone(),
                        ref_: non_empty_str(&sources.source_repository_ref),
                    }),
                    context_dir: non_empty_str(&sources.context_dir),
                },
                strategy: BuildStrategy {
                    type_: "Source".to_string(),
                    source_strategy: Some(SourceBuildStrategy {
                        from: ObjectReference {
                            kind: Some("ImageStreamTag".to_string()),
                            name: Some(format!("{}:latest", stream.image_stream_name)),
                            namespace: Some(stream.image_stream_namespace.clone()),
                            ..Default::default()
                        },
                        env: non_empty(env),
                        force_pull: Some(true),
                    }),
                },
                output: BuildOutput {
                    to: Some(ObjectReference {
                        kind: Some("ImageStreamTag".to_string()),
                        name: Some(format!("{}:latest", self.app())),
                        ..Default::default()
                    }),
                },
                triggers,
            },
        }
    }

    /// Build the DeploymentConfig rolling out the S2I image
    pub fn build_deployment_config(&self) -> DeploymentConfig {
        DeploymentConfig {
            metadata: self.object_meta(self.app().to_string()),
            spec: DeploymentConfigSpec {
                strategy: DcStrategy {
                    type_: "Recreate".to_string(),
                },
                triggers: vec![
                    DeploymentTriggerPolicy {
                        type_: "ImageChange".to_string(),
                        image_change_params: Some(DeploymentTriggerImageChangeParams {
                            automatic: true,
                            container_names: vec![self.app().to_string()],
                            from: ObjectReference {
                                kind: Some("ImageStreamTag".to_string()),
                                name: Some(format!("{}:latest", self.app())),
                                namespace: Some(self.namespace.clone()),
                                ..Default::default()
                            },
                        }),
                    },
                    DeploymentTriggerPolicy {
                        type_: "ConfigChange".to_string(),
                        ..Default::default()
                    },
                ],
                replicas: 1,
                selector: self.selector_labels(),
                // The image change trigger fills in the real image reference
                template: Some(self.build_pod_template(self.app())),
            },
        }
    }

    /// Build the Route exposing the routing Service
    pub fn build_route(&self) -> Route {
        let mut metadata = self.object_meta(self.app().to_string());
        metadata.annotations = Some(BTreeMap::from([(
            "description".to_string(),
            "Route for application's http service.".to_string(),
        )]));

        Route {
            metadata,
            spec: RouteSpec {
                host: None,
                to: RouteTargetReference {
                    kind: "Service".to_string(),
                    name: self.app().to_string(),
                },
            },
        }
    }
}

/// Build a readiness or liveness probe from an optional custom script
pub fn build_probe(script: Option<&str>) -> Probe {
    match script.filter(|s| !s.trim().is_empty()) {
        Some(script) => Probe {
            exec: Some(ExecAction {
                command: Some(parse_probe_script(script)),
            }),
            ..Default::default()
        },
        None => Probe {
            http_get: Some(HTTPGetAction {
                path: Some(HEALTH_PATH.to_string()),
                port: IntOrString::Int(HTTP_PORT),
                ..Default::default()
            }),
            ..Default::default()
        },
    }
}

/// Tokenize a `shell -c "command"` probe script.
///
/// Everything before the first `"` is split on whitespace; the quoted rest
/// becomes one token with its enclosing quotes removed. A script without any
/// `"` is split on whitespace only.
pub fn parse_probe_script(script: &str) -> Vec<String> {
    match script.find('"') {
        Some(pos) => {
            let (head, quoted) = script.split_at(pos);
            let quoted = quoted.strip_prefix('"').unwrap_or(quoted);
            let quoted = quoted.strip_suffix('"').unwrap_or(quoted);
            head.split_whitespace()
                .map(str::to_string)
                .chain(std::iter::once(quoted.to_string()))
                .collect()
        }
        None => script.split_whitespace().map(str::to_string).collect(),
    }
}

/// Script inserting a Tomcat cluster definition into `server.xml`, unless
/// one is already configured
pub fn clustering_script(membership: MembershipDiscovery) -> String {
    format!(
        concat!(
            "FILE=`find /opt -name server.xml`\n",
            "grep -q MembershipProvider ${{FILE}}\n",
            "if [ $? -ne 0 ]; then\n",
            "  sed -i '/cluster.html/a        ",
            "<Cluster className=\"org.apache.catalina.ha.tcp.SimpleTcpCluster\" channelSendOptions=\"6\">\\n ",
            "<Channel className=\"org.apache.catalina.tribes.group.GroupChannel\">\\n ",
            "<Membership className=\"org.apache.catalina.tribes.membership.cloud.CloudMembershipService\" ",
            "membershipProviderClassName=\"{provider}\"/>\\n ",
            "</Channel>\\n ",
            "</Cluster>\\n' ${{FILE}}\n",
            "fi\n"
        ),
        provider = membership.provider_class()
    )
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn non_empty_str(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
