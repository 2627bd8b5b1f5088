//! Ingress commands

use std::path::PathBuf;
use std::sync::Arc;

use berth_service::{ClusterClient, ContainerManager, IngressRuleSet, IngressUpdateMode, ManagerConfig};
use clap::{Args, Subcommand};

use super::load_document;
use crate::Result;

#[derive(Subcommand, Debug)]
pub enum IngressCommands {
    /// Create or replace a routing rule set from a file
    Update(UpdateArgs),
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Routing rule set (YAML or JSON)
    pub file: PathBuf,
    /// replace: overwrite the live set; merge: keep live paths not in the file
    #[arg(long, env = "BERTH_INGRESS_MODE", default_value = "replace")]
    pub mode: IngressUpdateMode,
    /// Ingress class for the generated rule set
    #[arg(long)]
    pub class: Option<String>,
}

pub async fn run(
    cmd: IngressCommands,
    client: Arc<dyn ClusterClient>,
    config: ManagerConfig,
) -> Result<()> {
    match cmd {
        IngressCommands::Update(args) => update_ingress(client, config, args).await,
    }
}

async fn update_ingress(
    client: Arc<dyn ClusterClient>,
    config: ManagerConfig,
    args: UpdateArgs,
) -> Result<()> {
    let rules: IngressRuleSet = load_document(&args.file)?;
    let manager = ContainerManager::new(client, with_ingress_args(config, &args));
    let change = manager.update_ingress(&rules).await?;

    println!("Ingress '{}' {}", rules.ingress_name, change);
    Ok(())
}

fn with_ingress_args(mut config: ManagerConfig, args: &UpdateArgs) -> ManagerConfig {
    config.ingress_mode = args.mode;
    config.ingress_class = args.class.clone();
    config
}
