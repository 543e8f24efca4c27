use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/* ============================= SERVER CONFIG ============================= */

/// TLS material for the webhook listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert: String,
    pub key: String,
}

/// Per-policy enablement switches.
///
/// A policy that has no entry here runs in report-only mode. A disabled
/// policy is not registered at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySettings {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub report_only: bool,
}

/// Server-scoped configuration, loaded once at startup and immutable for the
/// lifetime of the process. Reload requires a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub cluster_name: String,
    pub blacklisted_namespaces: Vec<String>,
    pub tls: TlsConfig,
    pub global_report_only: bool,
    pub global_metrics_enabled: bool,
    pub policies: Vec<PolicySettings>,
    pub policy_config: PolicyConfig,
    /// Free-form per-plugin settings, keyed by plugin name. Passed to the
    /// plugin verbatim through ConfigurePlugin.
    pub plugin_config: HashMap<String, serde_yaml::Value>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Log filter directive for tracing-subscriber. An empty `log_level`
    /// means info.
    pub fn log_filter(&self) -> &str {
        if self.log_level.is_empty() {
            "info"
        } else {
            &self.log_level
        }
    }

    /// Lookup the settings for a policy by its stable name.
    pub fn policy_settings(&self, name: &str) -> Option<&PolicySettings> {
        self.policies.iter().find(|p| p.name == name)
    }
}

/* ============================= POLICY KNOBS ============================= */

/// Size limits applied to emptyDir volumes.
///
/// `default` is patched into volumes that carry no sizeLimit; a sizeLimit
/// above `max` is a violation. Both are Kubernetes quantity strings. Empty
/// strings leave the policy inert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmptyDirSizeLimit {
    pub default: String,
    pub max: String,
}

/// Gateway allowlist for VirtualService resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualServiceGateways {
    pub allowed_gateways: Vec<String>,
    pub allow_empty_gateways: bool,
}

/// Configuration consumed by individual policies. Every field is optional in
/// YAML; policies treat their absent knobs as "not configured" and stand
/// down where that makes the check meaningless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Ingress classes that require an exemption to use. Typically the
    /// public-facing classes.
    pub policy_require_ingress_exemption_classes: Vec<String>,
    /// Regexes matching image repositories that are allowed to run.
    pub policy_trusted_repository_regexes: Vec<String>,
    /// Seccomp profile applied to pods that do not set one.
    pub policy_default_seccomp_policy: String,
    /// Enforced imagePullPolicy keyed by policy value, each mapping to image
    /// regexes it applies to.
    pub policy_image_pull_policy: HashMap<String, Vec<String>>,
    pub policy_empty_dir_size_limit: EmptyDirSizeLimit,
    /// Allowed values of the load-balancer-type Service annotation.
    pub policy_require_service_loadbalancer_types: Vec<String>,
    pub policy_require_virtualservice_gateways: Option<VirtualServiceGateways>,
}

/* ============================= TESTS ============================= */
