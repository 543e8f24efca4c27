//! k-rail enforces policies on Kubernetes workloads at admission time.
//!
//! The library tree carries the admission pipeline (resource normalizer,
//! exemptions, policy catalog, registry and webhook transport), the plugin
//! host for out-of-process policies, and the tainted-pod evicter
//! controller. The `k-rail` binary wires these into the `serve`, `check`
//! and `evicter` subcommands.

pub mod config;
pub mod evicter;
pub mod exemption;
pub mod plugins;
pub mod policies;
pub mod resource;
pub mod server;

#[cfg(test)]
pub(crate) mod testutil;
