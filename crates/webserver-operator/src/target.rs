//! Generated objects
//!
//! A `TargetResource` is one object of the desired resource graph. Targets are
//! rebuilt from the `WebServer` on every pass and only ever compared with live
//! state by identity (namespace and name).

use crate::openshift::{BuildConfig, DeploymentConfig, ImageStream, Route};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::fmt;

/// One object the operator makes sure exists
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TargetResource {
    Service(Service),
    ConfigMap(ConfigMap),
    PersistentVolumeClaim(PersistentVolumeClaim),
    Pod(Pod),
    RoleBinding(RoleBinding),
    Deployment(Deployment),
    ImageStream(ImageStream),
    BuildConfig(BuildConfig),
    DeploymentConfig(DeploymentConfig),
    Route(Route),
}

impl TargetResource {
    /// Kind name as used by the API server
    pub fn kind(&self) -> &'static str {
        match self {
            TargetResource::Service(_) => "Service",
            TargetResource::ConfigMap(_) => "ConfigMap",
            TargetResource::PersistentVolumeClaim(_) => "PersistentVolumeClaim",
            TargetResource::Pod(_) => "Pod",
            TargetResource::RoleBinding(_) => "RoleBinding",
            TargetResource::Deployment(_) => "Deployment",
            TargetResource::ImageStream(_) => "ImageStream",
            TargetResource::BuildConfig(_) => "BuildConfig",
            TargetResource::DeploymentConfig(_) => "DeploymentConfig",
            TargetResource::Route(_) => "Route",
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            TargetResource::Service(o) => &o.metadata,
            TargetResource::ConfigMap(o) => &o.metadata,
            TargetResource::PersistentVolumeClaim(o) => &o.metadata,
            TargetResource::Pod(o) => &o.metadata,
            TargetResource::RoleBinding(o) => &o.metadata,
            TargetResource::Deployment(o) => &o.metadata,
            TargetResource::ImageStream(o) => &o.metadata,
            TargetResource::BuildConfig(o) => &o.metadata,
            TargetResource::DeploymentConfig(o) => &o.metadata,
            TargetResource::Route(o) => &o.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for TargetResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind(), self.namespace(), self.name())
    }
}
