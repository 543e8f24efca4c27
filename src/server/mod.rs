//! Admission server: policy registry, pipeline engine, webhook transport,
//! and the local file-check mode.

pub mod check;
pub mod metrics;
pub mod review;
pub mod webhook;

use std::sync::Arc;

use kube::Client;
use tracing::{info, warn};

use crate::config::Config;
use crate::exemption::CompiledExemption;
use crate::plugins::{Plugin, PluginPolicy};
use crate::policies::{
    Policy, custom_resource_definition, ingress, persistent_volume, pod, pod_disruption_budget,
    rbac, service, virtual_service,
};

/* ============================= SERVER ============================= */

/// Shared state of the admission pipeline: immutable config, compiled
/// exemptions, and the policy registry split by disposition. Built once at
/// startup; requests only read it.
pub struct Server {
    pub config: Config,
    pub exemptions: Vec<CompiledExemption>,
    enforced_policies: Vec<Box<dyn Policy>>,
    report_only_policies: Vec<Box<dyn Policy>>,
}

impl Server {
    pub fn new(config: Config, exemptions: Vec<CompiledExemption>) -> Self {
        Self {
            config,
            exemptions,
            enforced_policies: Vec::new(),
            report_only_policies: Vec::new(),
        }
    }

    /// Register the built-in catalog.
    ///
    /// Policies run in the order they are registered here; mutation patches
    /// merge in the same order. Cluster-querying policies receive the client
    /// and stand down when none is available (file-check mode).
    pub fn register_builtin_policies(&mut self, client: Option<Client>) {
        self.register_policy(Box::new(pod::PolicyNoExec));
        self.register_policy(Box::new(pod::PolicyBindMounts));
        self.register_policy(Box::new(pod::PolicyDockerSock));
        self.register_policy(Box::new(pod::PolicyImageImmutableReference));
        self.register_policy(Box::new(pod::PolicyNoTiller));
        self.register_policy(Box::new(pod::PolicyTrustedRepository));
        self.register_policy(Box::new(pod::PolicyNoHostNetwork));
        self.register_policy(Box::new(pod::PolicyNoPrivilegedContainer));
        self.register_policy(Box::new(pod::PolicyNoNewCapabilities));
        self.register_policy(Box::new(pod::PolicyNoHostPid));
        self.register_policy(Box::new(pod::PolicyNoShareProcessNamespace));
        self.register_policy(Box::new(pod::PolicyNoRootUser));
        self.register_policy(Box::new(pod::PolicyDenyUnconfinedApparmor));
        self.register_policy(Box::new(pod::PolicySafeToEvict));
        self.register_policy(Box::new(pod::PolicyMutateSafeToEvict));
        self.register_policy(Box::new(pod::PolicyDefaultSeccompPolicy));
        self.register_policy(Box::new(pod::PolicyImagePullPolicy));
        self.register_policy(Box::new(pod::PolicyEmptyDirSizeLimit));
        self.register_policy(Box::new(ingress::PolicyRequireIngressExemption));
        self.register_policy(Box::new(ingress::PolicyDisallowNginxSnippet));
        self.register_policy(Box::new(ingress::PolicyRequireUniqueHost::new(
            client.clone(),
        )));
        self.register_policy(Box::new(service::PolicyServiceNoExternalIp));
        self.register_policy(Box::new(
            service::PolicyRequireServiceLoadbalancerExemption,
        ));
        self.register_policy(Box::new(rbac::PolicyNoAnonymousRoleBinding));
        self.register_policy(Box::new(rbac::PolicyNoAnonymousClusterRoleBinding));
        self.register_policy(Box::new(persistent_volume::PolicyNoPersistentVolumeHost));
        self.register_policy(Box::new(
            pod_disruption_budget::PolicyInvalidPodDisruptionBudget::new(client.clone()),
        ));
        self.register_policy(Box::new(custom_resource_definition::PolicyCrdProtect::new(
            client,
        )));
        self.register_policy(Box::new(
            virtual_service::PolicyRequireVirtualServiceGateway,
        ));
    }

    /// Register the policies served by loaded plugins, after the built-ins.
    pub fn register_plugins(&mut self, plugins: &[Arc<Plugin>]) {
        for plugin in plugins {
            for policy_name in plugin.policy_names() {
                self.register_policy(Box::new(PluginPolicy::new(
                    policy_name.clone(),
                    plugin.clone(),
                )));
            }
        }
    }

    /// Sort one policy into its disposition per the configuration:
    /// absent config means report-only, disabled means not registered, and
    /// global report-only overrides enforcement.
    pub fn register_policy(&mut self, policy: Box<dyn Policy>) {
        let name = policy.name().to_string();
        let Some(settings) = self.config.policy_settings(&name) else {
            warn!(policy = %name, "configuration not present for validator, enabling REPORT ONLY mode");
            self.report_only_policies.push(policy);
            metrics::TOTAL_REGISTERED_POLICIES.inc();
            return;
        };

        if !settings.enabled {
            info!(policy = %name, "validator is NOT ENABLED");
            return;
        }

        if self.config.global_report_only {
            info!(policy = %name, "enabling validator in REPORT ONLY mode because GLOBAL REPORT ONLY MODE is on");
            self.report_only_policies.push(policy);
        } else if settings.report_only {
            info!(policy = %name, "enabling validator in REPORT ONLY mode");
            self.report_only_policies.push(policy);
        } else {
            info!(policy = %name, "enabling validator in ENFORCE mode");
            self.enforced_policies.push(policy);
        }
        metrics::TOTAL_REGISTERED_POLICIES.inc();
    }

    pub fn enforced_policy_names(&self) -> Vec<&str> {
        self.enforced_policies.iter().map(|p| p.name()).collect()
    }

    pub fn report_only_policy_names(&self) -> Vec<&str> {
        self.report_only_policies.iter().map(|p| p.name()).collect()
    }
}

/* ============================= TESTS ============================= */
