//! Self-protection: keep the orchestrator out of its own update sweeps.

use std::collections::{BTreeSet, HashSet};

use tidewatch_config::OrchestratorConfig;
use tracing::debug;

use crate::error::RuntimeError;
use crate::reference;
use crate::runtime::ContainerRuntime;

/// Filters candidate targets down to those safe to restart.
///
/// An image reference passes when it is non-empty, its repository is not one
/// of the orchestrator's own, and it lies under the managed prefix. A
/// container name passes when it is non-empty and not the orchestrator's own.
#[derive(Debug, Clone)]
pub struct SelfProtectionFilter {
    own_repositories: BTreeSet<String>,
    own_container: String,
    managed_prefix: String,
}

impl SelfProtectionFilter {
    pub fn new<I, S>(
        own_repositories: I,
        own_container: impl Into<String>,
        managed_prefix: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            own_repositories: own_repositories
                .into_iter()
                .map(|r| reference::repository(r.as_ref()).to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            own_container: own_container.into(),
            managed_prefix: managed_prefix.into(),
        }
    }

    pub fn own_container(&self) -> &str {
        &self.own_container
    }

    pub fn managed_prefix(&self) -> &str {
        &self.managed_prefix
    }

    /// Whether a single image reference may be updated.
    pub fn allows_image(&self, image: &str) -> bool {
        if image.is_empty() {
            return false;
        }
        if self.own_repositories.contains(reference::repository(image)) {
            return false;
        }
        image.starts_with(&self.managed_prefix)
    }

    /// Keep only allowed references, preserving first-seen order.
    pub fn filter_images<I, S>(&self, references: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        references
            .into_iter()
            .filter_map(|r| {
                let r = r.as_ref();
                if !self.allows_image(r) {
                    debug!(reference = %r, "Filtered out of update set");
                    return None;
                }
                seen.insert(r.to_string()).then(|| r.to_string())
            })
            .collect()
    }

    /// Whether a container may be restarted.
    pub fn allows_container(&self, name: &str) -> bool {
        let name = name.trim_start_matches('/');
        !name.is_empty() && name != self.own_container
    }
}

/// The orchestrator's identity as observed right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfIdentity {
    pub container: String,
    /// Configured image repository plus the repositories of every tag the
    /// own container currently carries.
    pub repositories: Vec<String>,
}

impl SelfIdentity {
    /// Resolve the identity from configuration and the running container set.
    pub async fn resolve(
        runtime: &dyn ContainerRuntime,
        config: &OrchestratorConfig,
    ) -> Result<Self, RuntimeError> {
        let mut repositories = vec![reference::repository(&config.self_image).to_string()];

        let running = runtime.list_running().await?;
        if let Some(own) = running.iter().find(|c| c.name == config.self_container) {
            for tag in &own.image_tags {
                let repo = reference::repository(tag).to_string();
                if !repositories.contains(&repo) {
                    repositories.push(repo);
                }
            }
        }

        Ok(Self {
            container: config.self_container.clone(),
            repositories,
        })
    }

    /// Build the filter for a sweep under `managed_prefix`.
    pub fn filter(&self, managed_prefix: &str) -> SelfProtectionFilter {
        SelfProtectionFilter::new(&self.repositories, self.container.clone(), managed_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;

    fn filter() -> SelfProtectionFilter {
        SelfProtectionFilter::new(["myorg/self"], "self", "myorg/")
    }

    #[test]
    fn test_filter_excludes_self_and_foreign() {
        let result = filter().filter_images([
            "myorg/self:latest",
            "myorg/worker:latest",
            "other/thing:latest",
        ]);
        assert_eq!(result, vec!["myorg/worker:latest"]);
    }

    #[test]
    fn test_filter_rejects_tag_and_digest_variants() {
        let f = filter();
        assert!(!f.allows_image("myorg/self"));
        assert!(!f.allows_image("myorg/self:v2"));
        assert!(!f.allows_image("myorg/self@sha256:abcd"));
        assert!(!f.allows_image(""));
        // Shares a prefix with the own repository but is a different one.
        assert!(f.allows_image("myorg/selfie:latest"));
    }

    #[test]
    fn test_filter_preserves_order_and_dedups() {
        let result = filter().filter_images([
            "myorg/b:1",
            "myorg/a:1",
            "myorg/b:1",
            "",
        ]);
        assert_eq!(result, vec!["myorg/b:1", "myorg/a:1"]);
    }

    #[test]
    fn test_allows_container() {
        let f = filter();
        assert!(!f.allows_container("self"));
        assert!(!f.allows_container("/self"));
        assert!(!f.allows_container(""));
        assert!(f.allows_container("worker"));
    }

    #[tokio::test]
    async fn test_identity_includes_running_tags() {
        let fake = FakeRuntime::new();
        fake.add_container("self", "sha256:s", ["myorg/self:latest", "myorg/self-canary:2"]);
        fake.add_container("worker", "sha256:w", ["myorg/worker:latest"]);
        let config = OrchestratorConfig {
            self_image: "myorg/self".to_string(),
            self_container: "self".to_string(),
            managed_prefix: "myorg/".to_string(),
            ..Default::default()
        };

        let identity = SelfIdentity::resolve(&fake, &config).await.unwrap();
        assert_eq!(identity.repositories, vec!["myorg/self", "myorg/self-canary"]);

        let f = identity.filter(&config.managed_prefix);
        assert!(!f.allows_image("myorg/self-canary:3"));
        assert!(f.allows_image("myorg/worker:latest"));
    }
}
