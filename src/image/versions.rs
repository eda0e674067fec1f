//! Dependency version overrides
//!
//! A fixed set of rewrite rules pins the NATS server image and the client
//! library versions inside a build or compose directory. Each rule names the
//! file it expects; a missing file is skipped, but a file that exists and
//! does not contain the pattern is an error.

use crate::error::{NbeError, Result};
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Versions to pin, per ecosystem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Versions {
    pub server: Option<String>,
    pub cli: Option<String>,
    pub go: Option<String>,
    pub python: Option<String>,
    pub deno: Option<String>,
    pub node: Option<String>,
    pub rust: Option<String>,
    pub java: Option<String>,
    pub dotnet: Option<String>,
}

/// No rewrite rule exists for websocket clients
pub(crate) const NO_WEBSOCKET_RULE: &str = "websocket client versions cannot be pinned";

/// A find and replace rule
struct Rule {
    /// Version to substitute, when the rule applies
    version: fn(&Versions) -> Option<&str>,
    files: &'static [&'static str],
    pattern: &'static str,
    /// Replacement, `{}` stands for the version
    template: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        version: |v| v.server.as_deref(),
        files: &["docker-compose.yaml", "docker-compose.cluster.yaml"],
        pattern: r"image: (docker.io/)?nats:\d+\.\d+\.\d+",
        template: "image: docker.io/nats:{}",
    },
    Rule {
        version: |v| v.cli.as_deref(),
        files: &["Dockerfile"],
        pattern: r"natscli/nats@v\d+\.\d+\.\d+",
        template: "natscli/nats@v{}",
    },
    // The CLI image also bundles a server build.
    Rule {
        version: |v| v.cli.as_ref().and(v.server.as_deref()),
        files: &["Dockerfile"],
        pattern: r"nats-server/v2@v\d+\.\d+\.\d+",
        template: "nats-server/v2@v{}",
    },
    Rule {
        version: |v| v.go.as_deref(),
        files: &["go.mod"],
        pattern: r"nats.go v\d+\.\d+\.\d+",
        template: "nats.go v{}",
    },
    Rule {
        version: |v| v.python.as_deref(),
        files: &["requirements.txt"],
        pattern: r"nats-py\[nkeys\]==\d+\.\d+\.\d+",
        template: "nats-py[nkeys]=={}",
    },
    Rule {
        version: |v| v.node.as_deref(),
        files: &["package.json"],
        pattern: r#""nats": "\^\d+\.\d+\.\d+""#,
        template: r#""nats": "^{}""#,
    },
    Rule {
        version: |v| v.deno.as_deref(),
        files: &["main.ts"],
        pattern: r"x/nats@v\d+\.\d+\.\d+",
        template: "x/nats@v{}",
    },
    Rule {
        version: |v| v.rust.as_deref(),
        files: &["Cargo.toml"],
        pattern: r#"async-nats = "\d+\.\d+\.\d+""#,
        template: r#"async-nats = "{}""#,
    },
    Rule {
        version: |v| v.java.as_deref(),
        files: &["build.gradle"],
        pattern: r"io.nats:jnats:\d+\.\d+\.\d+",
        template: "io.nats:jnats:{}",
    },
    Rule {
        version: |v| v.dotnet.as_deref(),
        files: &["example.csproj"],
        pattern: r#"Version="\d+\.\d+\.\d+""#,
        template: r#"Version="{}""#,
    },
];

impl Versions {
    /// Load versions from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| NbeError::Yaml(format!("{}: {}", path.display(), e)))
    }

    /// Whether no version is set
    pub fn is_empty(&self) -> bool {
        *self == Versions::default()
    }

    /// Set the version of a client ecosystem by its client directory name
    pub fn set_client(&mut self, client: &str, version: &str) -> Result<()> {
        let slot = match client {
            "cli" => &mut self.cli,
            "go" => &mut self.go,
            "python" => &mut self.python,
            "deno" => &mut self.deno,
            "node" => &mut self.node,
            "websocket" => return Err(NbeError::UnsupportedLanguage(NO_WEBSOCKET_RULE.to_string())),
            "rust" => &mut self.rust,
            "java" => &mut self.java,
            "dotnet" => &mut self.dotnet,
            other => return Err(NbeError::UnsupportedLanguage(other.to_string())),
        };
        *slot = Some(version.to_string());
        Ok(())
    }

    /// Rewrite every applicable file in `dir`, reporting all failures together
    pub fn apply(&self, dir: &Path) -> Result<()> {
        let mut errors = Vec::new();

        for rule in RULES {
            let Some(version) = (rule.version)(self) else {
                continue;
            };
            let re = Regex::new(rule.pattern)
                .map_err(|e| NbeError::Internal(format!("invalid rewrite pattern: {}", e)))?;
            let replacement = rule.template.replace("{}", version);

            for file in rule.files {
                if let Err(e) = find_and_replace(&re, &replacement, &dir.join(file)) {
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NbeError::VersionRewrite(errors.join("\n")))
        }
    }
}

/// Rewrite all matches in a file, keeping its permissions
fn find_and_replace(re: &Regex, replacement: &str, path: &Path) -> std::result::Result<(), String> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(format!("{}: {}", path.display(), e)),
    };

    let content =
        std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    if !re.is_match(&content) {
        return Err(format!("{}: no matches found for {}", path.display(), re.as_str()));
    }

    let rewritten = re.replace_all(&content, NoExpand(replacement));
    std::fs::write(path, rewritten.as_bytes()).map_err(|e| format!("{}: {}", path.display(), e))?;
    std::fs::set_permissions(path, metadata.permissions())
        .map_err(|e| format!("{}: {}", path.display(), e))?;

    tracing::debug!("Pinned {} in {}", replacement, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_rewrites_compose_and_manifest() {
        let temp = tempdir().unwrap();
        let dir = temp.path();
        std::fs::write(
            dir.join("docker-compose.yaml"),
            "services:\n  nats:\n    image: nats:2.9.0\n  app:\n    image: ${IMAGE_TAG}\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("go.mod"),
            "module example\n\nrequire github.com/nats-io/nats.go v1.20.0\n",
        )
        .unwrap();

        let versions = Versions {
            server: Some("2.10.4".to_string()),
            go: Some("1.31.0".to_string()),
            ..Default::default()
        };
        versions.apply(dir).unwrap();

        let compose = std::fs::read_to_string(dir.join("docker-compose.yaml")).unwrap();
        assert!(compose.contains("image: docker.io/nats:2.10.4"));
        assert!(compose.contains("${IMAGE_TAG}"));

        let gomod = std::fs::read_to_string(dir.join("go.mod")).unwrap();
        assert!(gomod.contains("nats.go v1.31.0"));
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let temp = tempdir().unwrap();
        let versions = Versions {
            rust: Some("0.33.0".to_string()),
            java: Some("2.17.0".to_string()),
            ..Default::default()
        };
        assert!(versions.apply(temp.path()).is_ok());
    }

    #[test]
    fn test_zero_matches_is_error() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("requirements.txt"), "requests==2.0.0\n").unwrap();
        std::fs::write(temp.path().join("package.json"), "{}\n").unwrap();

        let versions = Versions {
            python: Some("2.6.0".to_string()),
            node: Some("2.15.0".to_string()),
            ..Default::default()
        };

        match versions.apply(temp.path()) {
            Err(NbeError::VersionRewrite(message)) => {
                assert!(message.contains("requirements.txt"));
                assert!(message.contains("package.json"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let path = temp.path().join("Dockerfile");
        std::fs::write(&path, "RUN go install github.com/nats-io/natscli/nats@v0.0.35\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o750)).unwrap();

        let versions = Versions {
            cli: Some("0.1.1".to_string()),
            ..Default::default()
        };
        versions.apply(temp.path()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("natscli/nats@v0.1.1"));
    }

    #[test]
    fn test_set_client() {
        let mut versions = Versions::default();
        assert!(versions.is_empty());
        versions.set_client("python", "2.6.0").unwrap();
        assert_eq!(versions.python.as_deref(), Some("2.6.0"));
        assert!(matches!(
            versions.set_client("cobol", "1.0.0"),
            Err(NbeError::UnsupportedLanguage(_))
        ));
        assert!(matches!(
            versions.set_client("websocket", "1.29.0"),
            Err(NbeError::UnsupportedLanguage(_))
        ));
        assert!(versions.python.is_some());
    }

    #[test]
    fn test_unknown_version_key_is_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("versions.yaml");
        std::fs::write(&path, "server: 2.10.4\nwebsocket: 1.29.0\n").unwrap();

        match Versions::from_file(&path) {
            Err(NbeError::Yaml(message)) => assert!(message.contains("websocket")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("versions.yaml");
        std::fs::write(&path, "server: 2.10.4\ngo: 1.31.0\n").unwrap();

        let versions = Versions::from_file(&path).unwrap();
        assert_eq!(versions.server.as_deref(), Some("2.10.4"));
        assert_eq!(versions.go.as_deref(), Some("1.31.0"));
        assert!(versions.cli.is_none());
    }
}
