//! Policies over Ingress resources.

use std::sync::LazyLock;

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ListParams;
use kube::{Api, Client};
use regex::Regex;
use tracing::{debug, error};

use super::{Policy, Verdict, violation};
use crate::config::PolicyConfig;
use crate::resource::ReviewRequest;

const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/* ============================= REQUIRE EXEMPTION ============================= */

/// Using certain ingress classes (typically the public ones) requires an
/// exemption.
pub struct PolicyRequireIngressExemption;

#[async_trait]
impl Policy for PolicyRequireIngressExemption {
    fn name(&self) -> &str {
        "ingress_require_ingress_exemption"
    }

    async fn validate(&self, config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.ingress() else {
            return (vec![], vec![]);
        };

        let class = view
            .ingress
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(INGRESS_CLASS_ANNOTATION));

        let mut violations = vec![];
        if let Some(class) = class
            && config
                .policy_require_ingress_exemption_classes
                .iter()
                .any(|c| c == class)
        {
            violations.push(violation(
                self,
                req,
                &view.resource_name,
                view.resource_kind,
                "Require Ingress Exemption: Using certain Ingress classes requires an exemption",
            ));
        }
        (violations, vec![])
    }
}

/* ============================= NGINX SNIPPETS ============================= */

static NGINX_SNIPPET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^nginx\.ingress\.kubernetes\.io/.*-snippet$").expect("snippet regex is valid")
});

/// Configuration snippets let an Ingress author inject raw nginx config,
/// which was the vector for CVE-2021-25742.
pub struct PolicyDisallowNginxSnippet;

#[async_trait]
impl Policy for PolicyDisallowNginxSnippet {
    fn name(&self) -> &str {
        "ingress_disallow_nginx_snippet"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.ingress() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        for key in view.ingress.metadata.annotations.iter().flatten().map(|(k, _)| k) {
            if NGINX_SNIPPET_RE.is_match(key) {
                violations.push(violation(
                    self,
                    req,
                    &view.resource_name,
                    view.resource_kind,
                    format!("NGINX Snippets are not allowed, found {key:?}"),
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= UNIQUE HOST ============================= */

/// An Ingress host must not be claimed from more than one namespace.
/// Queries the cluster for existing ingresses; without a client the policy
/// stands down.
pub struct PolicyRequireUniqueHost {
    client: Option<Client>,
}

impl PolicyRequireUniqueHost {
    pub fn new(client: Option<Client>) -> Self {
        Self { client }
    }

    /// Namespaces that already serve the given host.
    async fn host_namespaces(&self, client: &Client, host: &str) -> kube::Result<Vec<String>> {
        let api: Api<Ingress> = Api::all(client.clone());
        let ingresses = api.list(&ListParams::default()).await?;

        let mut namespaces = vec![];
        for ingress in ingresses.items {
            let rules = ingress.spec.as_ref().and_then(|s| s.rules.as_ref());
            for rule in rules.iter().flat_map(|r| r.iter()) {
                if rule.host.as_deref() == Some(host)
                    && let Some(namespace) = &ingress.metadata.namespace
                {
                    namespaces.push(namespace.clone());
                }
            }
        }
        Ok(namespaces)
    }
}

#[async_trait]
impl Policy for PolicyRequireUniqueHost {
    fn name(&self) -> &str {
        "ingress_unique_ingress_host"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.ingress() else {
            return (vec![], vec![]);
        };
        let Some(client) = &self.client else {
            debug!(policy = self.name(), "no cluster client, skipping");
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        let rules = view.ingress.spec.as_ref().and_then(|s| s.rules.as_ref());
        for rule in rules.iter().flat_map(|r| r.iter()) {
            let Some(host) = rule.host.as_deref() else {
                continue;
            };
            let namespaces = match self.host_namespaces(client, host).await {
                Ok(namespaces) => namespaces,
                Err(e) => {
                    error!(policy = self.name(), error = %e, "ingress list failed");
                    return (vec![], vec![]);
                }
            };

            let own_namespace_only =
                namespaces.is_empty() || namespaces.iter().all(|ns| ns == req.namespace());
            if !own_namespace_only {
                violations.push(violation(
                    self,
                    req,
                    &view.resource_name,
                    view.resource_kind,
                    "Requires Unique Ingress Host: Ingress Host should not point to multiple namespaces",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= TESTS ============================= */
