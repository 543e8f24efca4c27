use anyhow::{Context, Result};
use tracing::info;

use k_rail::config::Config;
use k_rail::exemption;
use k_rail::plugins;
use k_rail::server::{Server, check};

/// Run the policy pipeline over local manifests instead of live admission
/// traffic. Exits non-zero when any document would be denied.
pub async fn run(
    config_path: &str,
    exemptions_glob: &str,
    plugins_glob: &str,
    path: &str,
) -> Result<()> {
    let config = Config::load(config_path)?;
    super::init_logging(config.log_filter());

    let exemptions = if exemptions_glob.is_empty() {
        vec![]
    } else {
        exemption::exemptions_from_glob(exemptions_glob)?
    };

    let plugins = if plugins_glob.is_empty() {
        vec![]
    } else {
        plugins::plugins_from_glob(plugins_glob, &config).await?
    };

    let mut server = Server::new(config, exemptions);
    server.register_builtin_policies(None);
    server.register_plugins(&plugins);

    let allowed = check::check_path(&server, path)
        .await
        .with_context(|| format!("failed to check {path}"))?;

    plugins::kill_plugins(&plugins).await;

    if !allowed {
        std::process::exit(1);
    }
    info!("no enforced violations");
    Ok(())
}
