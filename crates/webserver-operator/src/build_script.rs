//! Default build script for web archives built from source
//!
//! The script runs in the builder pod with the archive volume mounted at
//! [`WAR_MOUNT_PATH`]. Maven uses a settings file and local repository under
//! `/tmp/.m2`, so the pod needs no root privileges and builds never share a
//! repository cache.

use crate::crd::WebAppSpec;

/// Where the builder pod mounts the archive volume
pub const WAR_MOUNT_PATH: &str = "/mnt";

/// Wrap `value` in single quotes for safe interpolation into `sh`
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Generate the build script for a web archive.
///
/// The script exits non-zero with a message when `source_url` is empty, when
/// the clone fails, or when the maven build fails. On success the archive ends
/// up at `/mnt/<war_file_name>`.
pub fn generate_build_script(
    war_file_name: &str,
    source_url: &str,
    source_ref: &str,
    context_dir: &str,
) -> String {
    format!(
        r#"
webAppWarFileName={war_file_name};
webAppSourceRepositoryURL={source_url};
webAppSourceRepositoryRef={source_ref};
webAppSourceRepositoryContextDir={context_dir};

if [ -z "${{webAppSourceRepositoryURL}}" ]; then
  echo "Need an URL like https://github.com/jfclere/demo-webapp.git";
  exit 1;
fi;

# Build in /tmp, the pod may not run as root
cd /tmp;

# Local maven repository outside the checkout
mkdir -p /tmp/.m2/repo;

echo '<settings xmlns="http://maven.apache.org/SETTINGS/1.0.0" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"' > /tmp/.m2/settings.xml
echo 'xsi:schemaLocation="http://maven.apache.org/SETTINGS/1.0.0 https://maven.apache.org/xsd/settings-1.0.0.xsd">' >> /tmp/.m2/settings.xml
echo '<localRepository>/tmp/.m2/repo</localRepository>' >> /tmp/.m2/settings.xml
echo '</settings>' >> /tmp/.m2/settings.xml

git clone "${{webAppSourceRepositoryURL}}";
if [ $? -ne 0 ]; then
  echo "Can't clone ${{webAppSourceRepositoryURL}}";
  exit 1;
fi;

# Source directory is the last URL segment without its extension
DIR=$(echo "${{webAppSourceRepositoryURL##*/}}");
DIR=$(echo "${{DIR%%.*}}");

cd "${{DIR}}";

if [ ! -z "${{webAppSourceRepositoryRef}}" ]; then
  git checkout "${{webAppSourceRepositoryRef}}";
fi;

if [ ! -z "${{webAppSourceRepositoryContextDir}}" ]; then
  cd "${{webAppSourceRepositoryContextDir}}";
fi;

mvn clean install -gs /tmp/.m2/settings.xml;
if [ $? -ne 0 ]; then
  echo "mvn install failed please check the pom.xml in ${{webAppSourceRepositoryURL}}";
  exit 1;
fi

cp target/*.war {mount}/"${{webAppWarFileName}}";"#,
        war_file_name = shell_quote(war_file_name),
        source_url = shell_quote(source_url),
        source_ref = shell_quote(source_ref),
        context_dir = shell_quote(context_dir),
        mount = WAR_MOUNT_PATH,
    )
}

/// The script the builder pod runs: the user's own when set, otherwise the
/// generated maven build
pub fn resolve_build_script(web_app: &WebAppSpec) -> String {
    match web_app.builder.application_build_script.as_deref() {
        Some(script) if !script.is_empty() => script.to_string(),
        _ => generate_build_script(
            &web_app.war_file_name(),
            &web_app.source_repository_url,
            &web_app.source_repository_ref,
            &web_app.source_repository_context_dir,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::WebAppBuilderSpec;
    use std::process::Command;

    fn web_app(script: Option<&str>) -> WebAppSpec {
        WebAppSpec {
            name: "ROOT".to_string(),
            deploy_path: "/deployments/".to_string(),
            application_size_limit: "1Gi".to_string(),
            source_repository_url: "https://github.com/jfclere/demo-webapp.git".to_string(),
            source_repository_ref: "main".to_string(),
            source_repository_context_dir: "webapp".to_string(),
            builder: WebAppBuilderSpec {
                image: "quay.io/x/builder:latest".to_string(),
                application_build_script: script.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("abc"), "'abc'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_script_references_inputs() {
        let script = generate_build_script(
            "ROOT.war",
            "https://github.com/jfclere/demo-webapp.git",
            "v1.0",
            "sub/dir",
        );

        assert!(script.contains("webAppSourceRepositoryURL='https://github.com/jfclere/demo-webapp.git';"));
        assert!(script.contains("webAppSourceRepositoryRef='v1.0';"));
        assert!(script.contains("webAppSourceRepositoryContextDir='sub/dir';"));
        assert!(script.contains("webAppWarFileName='ROOT.war';"));
        assert!(script.contains("-gs /tmp/.m2/settings.xml"));
        assert!(script.contains("<localRepository>/tmp/.m2/repo</localRepository>"));
        assert!(script.contains("cp target/*.war /mnt/\"${webAppWarFileName}\";"));
    }

    #[test]
    fn test_script_is_deterministic() {
        let a = generate_build_script("ROOT.war", "https://example.com/app.git", "", "");
        let b = generate_build_script("ROOT.war", "https://example.com/app.git", "", "");
        assert_eq!(a, b);
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_url_fails_fast() {
        let script = generate_build_script("ROOT.war", "", "", "");
        let url_check = script.find("Need an URL").unwrap();
        assert!(url_check < script.find("cd /tmp").unwrap());
        assert!(url_check < script.find("settings.xml").unwrap());

        let output = Command::new("sh").arg("-c").arg(&script).output().unwrap();

        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("Need an URL"));
    }

    #[test]
    fn test_user_script_passes_through() {
        let custom = "echo custom build";
        assert_eq!(resolve_build_script(&web_app(Some(custom))), custom);
    }

    #[test]
    fn test_empty_user_script_is_generated() {
        let generated = resolve_build_script(&web_app(Some("")));
        assert!(generated.contains("git clone"));
        assert_eq!(generated, resolve_build_script(&web_app(None)));
        assert!(generated.contains("webAppSourceRepositoryRef='main';"));
    }
}
