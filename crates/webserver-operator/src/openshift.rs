//! OpenShift API types
//!
//! Typed subsets of the `image.openshift.io`, `build.openshift.io`,
//! `apps.openshift.io` and `route.openshift.io` kinds the operator creates.
//! These CRDs are owned by the platform, so no schema is derived for them.

use k8s_openapi::api::core::v1::{EnvVar, ObjectReference, PodTemplateSpec};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ImageStream receiving the output of the application's S2I build
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "image.openshift.io",
    version = "v1",
    kind = "ImageStream",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_policy: Option<ImageLookupPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ImageLookupPolicy {
    pub local: bool,
}

/// BuildConfig running the S2I build from a git repository
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "build.openshift.io",
    version = "v1",
    kind = "BuildConfig",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfigSpec {
    pub source: BuildSource,
    pub strategy: BuildStrategy,
    pub output: BuildOutput,
    #[serde(default)]
    pub triggers: Vec<BuildTriggerPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildSource {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitBuildSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GitBuildSource {
    pub uri: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildStrategy {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_strategy: Option<SourceBuildStrategy>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceBuildStrategy {
    pub from: ObjectReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_pull: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BuildOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ObjectReference>,
}

/// One entry of `BuildConfig.spec.triggers`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildTriggerPolicy {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_change: Option<ImageChangeTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<WebHookTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic: Option<WebHookTrigger>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageChangeTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ObjectReference>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct WebHookTrigger {
    pub secret: String,
}

/// DeploymentConfig rolling out the image produced by the BuildConfig
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "apps.openshift.io",
    version = "v1",
    kind = "DeploymentConfig",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigSpec {
    pub strategy: DeploymentStrategy,
    #[serde(default)]
    pub triggers: Vec<DeploymentTriggerPolicy>,
    pub replicas: i32,
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DeploymentStrategy {
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTriggerPolicy {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_change_params: Option<DeploymentTriggerImageChangeParams>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTriggerImageChangeParams {
    pub automatic: bool,
    pub container_names: Vec<String>,
    pub from: ObjectReference,
}

/// Route exposing the application's Service outside the cluster
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub to: RouteTargetReference,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_api_versions() {
        assert_eq!(ImageStream::api_version(&()), "image.openshift.io/v1");
        assert_eq!(BuildConfig::api_version(&()), "build.openshift.io/v1");
        assert_eq!(DeploymentConfig::api_version(&()), "apps.openshift.io/v1");
        assert_eq!(Route::api_version(&()), "route.openshift.io/v1");
        assert_eq!(DeploymentConfig::plural(&()), "deploymentconfigs");
    }

    #[test]
    fn test_trigger_wire_format() {
        let trigger = BuildTriggerPolicy {
            type_: "GitHub".to_string(),
            github: Some(WebHookTrigger {
                secret: "s3cr3t".to_string(),
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "GitHub", "github": {"secret": "s3cr3t"}})
        );

        let image_change = BuildTriggerPolicy {
            type_: "ImageChange".to_string(),
            image_change: Some(ImageChangeTrigger::default()),
            ..Default::default()
        };
        let json = serde_json::to_value(&image_change).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "ImageChange", "imageChange": {}})
        );
    }

    #[test]
    fn test_deployment_config_parses_server_object() {
        let dc: DeploymentConfig = serde_json::from_value(serde_json::json!({
            "apiVersion": "apps.openshift.io/v1",
            "kind": "DeploymentConfig",
            "metadata": {"name": "demo", "namespace": "web"},
            "spec": {
                "strategy": {"type": "Recreate", "recreateParams": {"timeoutSeconds": 600}},
                "replicas": 1,
                "selector": {"deploymentConfig": "demo"},
                "triggers": [{"type": "ConfigChange"}]
            },
            "status": {"latestVersion": 3}
        }))
        .unwrap();

        assert_eq!(dc.spec.strategy.type_, "Recreate");
        assert_eq!(dc.spec.triggers.len(), 1);
        assert!(dc.spec.template.is_none());
    }
}
