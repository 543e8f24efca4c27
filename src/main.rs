mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            exemptions_path_glob,
            plugins_path_glob,
        } => commands::serve::run(&config, &exemptions_path_glob, &plugins_path_glob).await,
        Commands::Check {
            config,
            exemptions_path_glob,
            plugins_path_glob,
            path,
        } => commands::check::run(&config, &exemptions_path_glob, &plugins_path_glob, &path).await,
        Commands::Evicter {
            kubeconfig,
            master,
            label_selector,
            termination_grace_period,
            incubation_period,
            lease_lock_name,
            lease_lock_namespace,
            probe_listen_address,
            instance,
        } => {
            commands::evict::run(commands::evict::EvicterArgs {
                kubeconfig,
                master,
                label_selector,
                termination_grace_period,
                incubation_period,
                lease_lock_name,
                lease_lock_namespace,
                probe_listen_address,
                instance,
            })
            .await
        }
    }
}
