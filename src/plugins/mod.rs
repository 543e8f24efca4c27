//! Host for out-of-process policy providers.
//!
//! Plugins are standalone executables discovered by a path glob. The host
//! launches each one with a magic-cookie environment variable set, reads a
//! go-plugin style handshake line from its stdout, connects gRPC to the
//! address it announced, and registers every policy the plugin serves as an
//! ordinary registry entry. A crashing or erroring plugin yields empty
//! verdicts; third-party code must not take the webhook down.

pub mod proto;

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, error, info};

use crate::config::{Config, PolicyConfig};
use crate::policies::{PatchOperation, Policy, Verdict, Violation};
use crate::resource::ReviewRequest;
use crate::server::metrics;
use proto::k_rail_plugin_client::KRailPluginClient;

/* ============================= HANDSHAKE ============================= */

/// Magic cookie passed to the child; a real plugin refuses to serve
/// without it.
pub const HANDSHAKE_COOKIE_KEY: &str = "K_RAIL_PLUGIN";
pub const HANDSHAKE_COOKIE_VALUE: &str = "TRUE";
/// Version byte of the plugin protocol itself.
pub const PROTOCOL_VERSION: u8 = 1;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Parse the handshake line a plugin prints on stdout:
/// `core-version|protocol-version|network|address|protocol`.
/// Returns the gRPC endpoint to dial.
fn parse_handshake(line: &str) -> Result<String> {
    let fields: Vec<&str> = line.trim().split('|').collect();
    let [_core, version, network, address, protocol] = fields[..] else {
        bail!("malformed plugin handshake {line:?}");
    };
    if version != PROTOCOL_VERSION.to_string() {
        bail!("plugin speaks protocol version {version}, expected {PROTOCOL_VERSION}");
    }
    if protocol != "grpc" {
        bail!("plugin offers transport {protocol:?}, only grpc is supported");
    }
    if network != "tcp" {
        bail!("plugin listens on {network:?}, only tcp endpoints are supported");
    }
    Ok(format!("http://{address}"))
}

/* ============================= PLUGIN ============================= */

/// A running plugin child process and its gRPC client. Lives for the
/// process lifetime; killed on shutdown.
pub struct Plugin {
    name: String,
    policy_names: Vec<String>,
    client: KRailPluginClient<Channel>,
    child: tokio::sync::Mutex<Child>,
}

impl Plugin {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy_names(&self) -> &[String] {
        &self.policy_names
    }

    /// Push the operator-provided plugin config down to the child.
    pub async fn configure(&self, config: &serde_yaml::Value) -> Result<()> {
        let json = serde_json::to_value(config).context("plugin config is not valid json")?;
        let plugin_config = match &json {
            serde_json::Value::Object(map) => json_to_prost_struct(map),
            _ => bail!("plugin config for {} must be a mapping", self.name),
        };
        self.client
            .clone()
            .configure_plugin(proto::ConfigurePluginRequest {
                plugin_config: Some(plugin_config),
            })
            .await
            .with_context(|| format!("failed to configure plugin {}", self.name))?;
        Ok(())
    }

    /// Forward one validation to the child.
    pub async fn validate(
        &self,
        policy_name: &str,
        ar: &AdmissionRequest<DynamicObject>,
    ) -> Result<Verdict> {
        let payload = serde_json::to_vec(ar).context("failed to encode admission request")?;
        let response = self
            .client
            .clone()
            .validate(proto::ValidateRequest {
                policy_name: policy_name.to_string(),
                admission_request: payload,
            })
            .await?
            .into_inner();

        let violations = response
            .resource_violations
            .into_iter()
            .map(|v| Violation {
                resource_name: v.resource_name,
                resource_kind: v.resource_kind,
                namespace: v.namespace,
                violation: v.violation,
                policy: v.policy,
                error: if v.error.is_empty() {
                    None
                } else {
                    Some(v.error)
                },
            })
            .collect();
        let patches = response
            .patch_operations
            .into_iter()
            .map(|p| PatchOperation {
                op: p.op,
                path: p.path,
                value: p.value.as_ref().map(prost_value_to_json),
            })
            .collect();
        Ok((violations, patches))
    }

    pub async fn kill(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            debug!(plugin = %self.name, error = %e, "plugin child already gone");
        }
    }
}

/* ============================= LAUNCH ============================= */

/// Launch one plugin binary and complete the handshake. A binary that does
/// not hold the cookie contract or speaks the wrong protocol version is a
/// fatal startup error.
pub async fn launch_plugin(binary: &Path) -> Result<Plugin> {
    let mut child = Command::new(binary)
        .env(HANDSHAKE_COOKIE_KEY, HANDSHAKE_COOKIE_VALUE)
        .env(
            "K_RAIL_PLUGIN_PROTOCOL_VERSION",
            PROTOCOL_VERSION.to_string(),
        )
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to launch plugin {}", binary.display()))?;

    let stdout = child
        .stdout
        .take()
        .context("plugin child has no stdout pipe")?;
    let mut lines = BufReader::new(stdout).lines();

    let line = tokio::time::timeout(HANDSHAKE_TIMEOUT, lines.next_line())
        .await
        .with_context(|| format!("plugin {} handshake timed out", binary.display()))?
        .context("failed reading plugin handshake")?
        .with_context(|| format!("plugin {} exited before handshake", binary.display()))?;
    let endpoint = parse_handshake(&line)
        .with_context(|| format!("plugin {} handshake rejected", binary.display()))?;

    // the handshake is the only stdout traffic we interpret; keep draining
    // so the child never blocks on a full pipe
    let binary_name = binary.display().to_string();
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(plugin = %binary_name, line = %line, "plugin stdout");
        }
    });

    let channel = Endpoint::from_shared(endpoint.clone())
        .with_context(|| format!("invalid plugin endpoint {endpoint}"))?
        .connect()
        .await
        .with_context(|| format!("failed to connect to plugin at {endpoint}"))?;
    let mut client = KRailPluginClient::new(channel);

    let name = client
        .plugin_name(proto::PluginNameRequest {})
        .await
        .context("PluginName call failed")?
        .into_inner()
        .plugin_name;
    let policy_names = client
        .policy_names(proto::PolicyNamesRequest {})
        .await
        .context("PolicyNames call failed")?
        .into_inner()
        .policy_names;

    Ok(Plugin {
        name,
        policy_names,
        client,
        child: tokio::sync::Mutex::new(child),
    })
}

/// Discover, launch, and configure every plugin matching the path glob.
pub async fn plugins_from_glob(pattern: &str, config: &Config) -> Result<Vec<Arc<Plugin>>> {
    let mut plugins = vec![];
    let paths =
        glob::glob(pattern).with_context(|| format!("invalid plugins path glob {pattern:?}"))?;
    for entry in paths {
        let path = entry.context("failed to resolve plugin path")?;
        let plugin = launch_plugin(&path).await?;

        if let Some(plugin_config) = config.plugin_config.get(plugin.name()) {
            plugin.configure(plugin_config).await?;
        }

        info!(
            plugin = %plugin.name(),
            policies = ?plugin.policy_names(),
            "loaded plugin"
        );
        metrics::TOTAL_LOADED_PLUGINS.inc();
        plugins.push(Arc::new(plugin));
    }
    Ok(plugins)
}

/// Kill every plugin child. Called on shutdown.
pub async fn kill_plugins(plugins: &[Arc<Plugin>]) {
    for plugin in plugins {
        plugin.kill().await;
    }
}

/* ============================= POLICY ADAPTER ============================= */

/// A registry entry backed by a plugin. Errors inside the plugin are logged
/// and read as "no violation" so third-party code fails open.
pub struct PluginPolicy {
    name: String,
    plugin: Arc<Plugin>,
}

impl PluginPolicy {
    pub fn new(name: String, plugin: Arc<Plugin>) -> Self {
        Self { name, plugin }
    }
}

#[async_trait]
impl Policy for PluginPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        match self.plugin.validate(&self.name, req.admission).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(
                    plugin = %self.plugin.name(),
                    policy = %self.name,
                    error = %e,
                    "error running Validate on plugin policy"
                );
                (vec![], vec![])
            }
        }
    }
}

/* ============================= VALUE MAPPING ============================= */

fn json_to_prost_value(value: &serde_json::Value) -> prost_types::Value {
    use prost_types::value::Kind;
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => Kind::ListValue(prost_types::ListValue {
            values: items.iter().map(json_to_prost_value).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(json_to_prost_struct(map)),
    };
    prost_types::Value { kind: Some(kind) }
}

fn json_to_prost_struct(
    map: &serde_json::Map<String, serde_json::Value>,
) -> prost_types::Struct {
    prost_types::Struct {
        fields: map
            .iter()
            .map(|(key, value)| (key.clone(), json_to_prost_value(value)))
            .collect(),
    }
}

fn prost_value_to_json(value: &prost_types::Value) -> serde_json::Value {
    use prost_types::value::Kind;
    match &value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(prost_value_to_json).collect())
        }
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields
                .iter()
                .map(|(key, value)| (key.clone(), prost_value_to_json(value)))
                .collect(),
        ),
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    // ── handshake ──

    #[test]
    fn test_parse_handshake_tcp_grpc() {
        let endpoint = parse_handshake("1|1|tcp|127.0.0.1:4321|grpc").unwrap();
        assert_eq!(endpoint, "http://127.0.0.1:4321");
    }

    #[test]
    fn test_parse_handshake_rejects_wrong_version() {
        let err = parse_handshake("1|2|tcp|127.0.0.1:4321|grpc").unwrap_err();
        assert!(err.to_string().contains("protocol version 2"));
    }

    #[test]
    fn test_parse_handshake_rejects_non_grpc() {
        let err = parse_handshake("1|1|tcp|127.0.0.1:4321|netrpc").unwrap_err();
        assert!(err.to_string().contains("only grpc"));
    }

    #[test]
    fn test_parse_handshake_rejects_unix_socket() {
        let err = parse_handshake("1|1|unix|/tmp/plugin.sock|grpc").unwrap_err();
        assert!(err.to_string().contains("only tcp"));
    }

    #[test]
    fn test_parse_handshake_rejects_garbage() {
        assert!(parse_handshake("hello world").is_err());
        assert!(parse_handshake("").is_err());
    }

    // ── value mapping ──

    #[test]
    fn test_value_round_trip() {
        let original = serde_json::json!({
            "string": "value",
            "number": 2.5,
            "bool": true,
            "null": null,
            "list": [1.0, "two", false],
            "nested": {"inner": "x"}
        });
        let serde_json::Value::Object(map) = &original else {
            unreachable!()
        };
        let st = json_to_prost_struct(map);
        let back = prost_value_to_json(&prost_types::Value {
            kind: Some(prost_types::value::Kind::StructValue(st)),
        });
        assert_eq!(back, original);
    }

    #[test]
    fn test_scalar_value_mapping() {
        let value = json_to_prost_value(&serde_json::json!("1"));
        assert_eq!(prost_value_to_json(&value), serde_json::json!("1"));
    }
}
