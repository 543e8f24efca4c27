use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "k-rail")]
#[command(about = "Kubernetes workload policy enforcement")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the admission webhook server
    Serve {
        /// Path to the configuration file
        #[arg(long, default_value = "config.yml")]
        config: String,
        /// Path glob that includes exemption configs
        #[arg(long, default_value = "")]
        exemptions_path_glob: String,
        /// Path glob that includes plugin binaries
        #[arg(long, default_value = "")]
        plugins_path_glob: String,
    },

    /// Check local YAML manifests against the policy pipeline
    Check {
        #[arg(long, default_value = "config.yml")]
        config: String,
        #[arg(long, default_value = "")]
        exemptions_path_glob: String,
        #[arg(long, default_value = "")]
        plugins_path_glob: String,
        /// File, directory, or glob of manifests to check
        path: String,
    },

    /// Run the tainted-pod evicter controller
    Evicter {
        /// Absolute path to a kubeconfig file; in-cluster config when empty
        #[arg(long, default_value = "")]
        kubeconfig: String,
        /// Master URL override
        #[arg(long, default_value = "")]
        master: String,
        /// Label selector to discover tainted pods
        #[arg(long, default_value = "k-rail/tainted=true")]
        label_selector: String,
        /// Pod termination grace period in seconds
        #[arg(long, default_value_t = 30)]
        termination_grace_period: u32,
        /// Seconds a tainted pod may run before eviction
        #[arg(long, default_value_t = 24 * 60 * 60)]
        incubation_period: u64,
        #[arg(long, default_value = "k-rail-evicter")]
        lease_lock_name: String,
        #[arg(long, default_value = "k-rail")]
        lease_lock_namespace: String,
        /// Address serving healthz/readyz probes
        #[arg(long, default_value = "0.0.0.0:8080")]
        probe_listen_address: String,
        /// Identity used for the leader lease; hostname when empty
        #[arg(long, default_value = "")]
        instance: String,
    },
}
