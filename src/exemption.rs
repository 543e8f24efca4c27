use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use k8s_openapi::api::authentication::v1::UserInfo;
use serde::Deserialize;
use tracing::info;

/* ============================= TYPES ============================= */

/// An exemption record as written in YAML. Globs use `*`, `?` and `[...]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawExemption {
    pub resource_name: String,
    pub namespace: String,
    pub username: String,
    pub group: String,
    pub exempt_policies: Vec<String>,
}

/// A compiled exemption. Missing fields were defaulted to `*` at compile
/// time, so matching never has to special-case absence.
#[derive(Debug, Clone)]
pub struct CompiledExemption {
    resource_name: GlobMatcher,
    namespace: GlobMatcher,
    username: GlobMatcher,
    group: GlobMatcher,
    exempt_policies: Vec<GlobMatcher>,
}

/* ============================= COMPILATION ============================= */

fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)
        .with_context(|| format!("invalid exemption glob {pattern:?}"))?
        .compile_matcher())
}

impl RawExemption {
    /// Compile the record into glob matchers.
    ///
    /// The resource name gets a trailing `*` so an exemption written for a
    /// workload also covers the suffixed names its children grow: Deployment
    /// `test-pod`, ReplicaSet `test-pod-sdf932`, Pod `test-pod-sdf932-ew92`.
    pub fn compile(mut self) -> Result<CompiledExemption> {
        if !self.resource_name.ends_with('*') {
            self.resource_name.push('*');
        }
        if self.namespace.is_empty() {
            self.namespace = "*".to_string();
        }
        if self.username.is_empty() {
            self.username = "*".to_string();
        }
        if self.group.is_empty() {
            self.group = "*".to_string();
        }
        if self.exempt_policies.is_empty() {
            self.exempt_policies = vec!["*".to_string()];
        }

        let exempt_policies = self
            .exempt_policies
            .iter()
            .map(|p| compile_glob(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledExemption {
            resource_name: compile_glob(&self.resource_name)?,
            namespace: compile_glob(&self.namespace)?,
            username: compile_glob(&self.username)?,
            group: compile_glob(&self.group)?,
            exempt_policies,
        })
    }
}

/* ============================= LOADING ============================= */

/// Compile exemptions from a YAML document holding a list of records.
pub fn exemptions_from_yaml(contents: &str) -> Result<Vec<CompiledExemption>> {
    let raw: Vec<RawExemption> =
        serde_yaml::from_str(contents).context("failed to parse exemption yaml")?;
    raw.into_iter()
        .map(|e| {
            info!(
                resource_name = %e.resource_name,
                namespace = %e.namespace,
                "loaded exemption"
            );
            e.compile()
        })
        .collect()
}

/// Load and compile every exemption file matching a path glob.
pub fn exemptions_from_glob(pattern: &str) -> Result<Vec<CompiledExemption>> {
    let mut compiled = Vec::new();
    let paths =
        glob::glob(pattern).with_context(|| format!("invalid exemptions path glob {pattern:?}"))?;
    for entry in paths {
        let path = entry.context("failed to resolve exemptions path")?;
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read exemption file {}", path.display()))?;
        compiled.extend(exemptions_from_yaml(&contents)?);
    }
    Ok(compiled)
}

/* ============================= MATCHING ============================= */

/// Returns whether a resource is exempt from the given policy.
///
/// Every field glob must match, the policy list must contain a glob matching
/// the policy name, and the group glob must match at least one of the user's
/// groups. A user with no groups therefore matches nothing, even against a
/// `*` group glob.
pub fn is_exempt(
    resource_name: &str,
    namespace: &str,
    user_info: &UserInfo,
    policy_name: &str,
    exemptions: &[CompiledExemption],
) -> bool {
    let username = user_info.username.as_deref().unwrap_or("");
    let groups: &[String] = user_info.groups.as_deref().unwrap_or(&[]);

    for e in exemptions {
        if e.namespace.is_match(namespace)
            && e.resource_name.is_match(resource_name)
            && e.username.is_match(username)
        {
            for p in &e.exempt_policies {
                if p.is_match(policy_name) {
                    for g in groups {
                        if e.group.is_match(g) {
                            return true;
                        }
                    }
                }
            }
        }
    }

    false
}

/* ============================= TESTS ============================= */
