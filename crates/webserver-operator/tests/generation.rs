//! End-to-end generation tests
//!
//! These tests go from a WebServer manifest, as a user would apply it, to the
//! objects the operator sends to the API server.

use serde_json::{json, Value};
use webserver_operator::prelude::*;

const PREBUILT: &str = r#"
apiVersion: web.servers.org/v1alpha1
kind: WebServer
metadata:
  name: demo
  namespace: web
  uid: 6b9f6a4e-1111-2222-3333-444455556666
spec:
  applicationName: demo
  webImage:
    applicationImage: quay.io/x/demo:latest
"#;

const PIPELINE: &str = r#"
apiVersion: web.servers.org/v1alpha1
kind: WebServer
metadata:
  name: chat
  namespace: web
  labels:
    team: frontend
spec:
  applicationName: websocket-chat
  useSessionClustering: true
  webImageStream:
    imageStreamName: jboss-webserver
    imageStreamNamespace: openshift
    webSources:
      sourceRepositoryURL: https://github.com/jboss-openshift/openshift-quickstarts.git
      contextDir: tomcat-websocket-chat
      webSourcesParams:
        artifactDir: target
        genericWebhookSecret: generic-secret
"#;

fn load(manifest: &str) -> WebServer {
    serde_yaml::from_str(manifest).expect("manifest parses")
}

fn generate(web_server: &WebServer, options: GenerationOptions) -> Vec<Value> {
    ResourceBuilder::new(web_server, options)
        .expect("builder")
        .build_all()
        .iter()
        .map(|target| serde_json::to_value(target).expect("serializes"))
        .collect()
}

fn identity(object: &Value) -> (String, String) {
    (
        object["kind"].as_str().unwrap_or_default().to_string(),
        object["metadata"]["name"].as_str().unwrap_or_default().to_string(),
    )
}

#[test]
fn prebuilt_image_on_kubernetes() {
    let web_server = load(PREBUILT);
    let objects = generate(&web_server, GenerationOptions::default());

    let identities: Vec<_> = objects.iter().map(identity).collect();
    assert_eq!(
        identities,
        vec![
            ("Service".to_string(), "demo".to_string()),
            ("Service".to_string(), "webserver-demo".to_string()),
            ("RoleBinding".to_string(), "webserver-demo".to_string()),
            ("Deployment".to_string(), "demo".to_string()),
        ]
    );

    let deployment = &objects[3];
    assert_eq!(deployment["apiVersion"], "apps/v1");
    assert_eq!(
        deployment["metadata"]["ownerReferences"][0],
        json!({
            "apiVersion": "web.servers.org/v1alpha1",
            "kind": "WebServer",
            "name": "demo",
            "uid": "6b9f6a4e-1111-2222-3333-444455556666",
            "controller": true,
            "blockOwnerDeletion": true
        })
    );

    let container = &deployment["spec"]["template"]["spec"]["containers"][0];
    let health = json!({"httpGet": {"path": "/health", "port": 8080}});
    assert_eq!(container["readinessProbe"], health);
    assert_eq!(container["livenessProbe"], health);
    assert_eq!(
        container["env"],
        json!([{"name": "KUBERNETES_NAMESPACE", "value": "webserver-demo"}])
    );
}

#[test]
fn pipeline_on_openshift() {
    let web_server = load(PIPELINE);
    let options = GenerationOptions {
        platform: Platform::Extended,
        membership: MembershipDiscovery::Dns,
    };
    let objects = generate(&web_server, options);

    let kinds: Vec<_> = objects.iter().map(|o| identity(o).0).collect();
    assert_eq!(
        kinds,
        vec![
            "Service",
            "Service",
            "RoleBinding",
            "ConfigMap",
            "ImageStream",
            "BuildConfig",
            "DeploymentConfig",
            "Route"
        ]
    );

    let config_map = &objects[3];
    let script = config_map["data"]["test.sh"].as_str().unwrap();
    assert!(script.contains("DNSMembershipProvider"));

    let build_config = &objects[5];
    assert_eq!(build_config["apiVersion"], "build.openshift.io/v1");
    assert_eq!(
        build_config["spec"]["strategy"]["sourceStrategy"]["env"],
        json!([{"name": "ARTIFACT_DIR", "value": "target"}])
    );
    assert_eq!(
        build_config["spec"]["triggers"],
        json!([
            {"type": "ImageChange", "imageChange": {}},
            {"type": "ConfigChange"},
            {"type": "Generic", "generic": {"secret": "generic-secret"}}
        ])
    );

    let deployment_config = &objects[6];
    assert_eq!(deployment_config["apiVersion"], "apps.openshift.io/v1");
    let template = &deployment_config["spec"]["template"];
    assert_eq!(template["metadata"]["labels"]["team"], "frontend");
    assert_eq!(template["metadata"]["labels"]["WebServer"], "chat");
    assert_eq!(
        template["spec"]["containers"][0]["env"],
        json!([
            {"name": "KUBERNETES_NAMESPACE", "value": "webserver-chat"},
            {"name": "ENV_FILES", "value": "/test/my-files/test.sh"}
        ])
    );

    let route = &objects[7];
    assert_eq!(route["spec"]["to"], json!({"kind": "Service", "name": "websocket-chat"}));
}

#[test]
fn pipeline_without_openshift_has_no_workload() {
    let web_server = load(PIPELINE);
    let objects = generate(&web_server, GenerationOptions::default());

    let kinds: Vec<_> = objects.iter().map(|o| identity(o).0).collect();
    assert_eq!(kinds, vec!["Service", "Service", "RoleBinding", "ConfigMap"]);
}

#[test]
fn generation_is_repeatable() {
    let web_server = load(PIPELINE);
    let options = GenerationOptions {
        platform: Platform::Extended,
        membership: MembershipDiscovery::Kubernetes,
    };

    assert_eq!(generate(&web_server, options), generate(&web_server, options));
}
