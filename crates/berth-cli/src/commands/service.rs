//! Service commands

use std::path::PathBuf;
use std::sync::Arc;

use berth_service::{ClusterClient, ContainerManager, ContainerService, ManagerConfig, ServiceRequest};
use clap::{Args, Subcommand};

use super::load_document;
use crate::{Error, Result};

#[derive(Subcommand, Debug)]
pub enum ServiceCommands {
    /// Create a service from a request file
    Create(CreateArgs),
    /// Destroy a service
    Destroy(DestroyArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Service request (YAML or JSON)
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Service name
    #[arg(required_unless_present = "handle")]
    pub name: Option<String>,
    /// Handle printed by `service create` (YAML or JSON)
    #[arg(long, conflicts_with = "name")]
    pub handle: Option<PathBuf>,
}

pub async fn run(
    cmd: ServiceCommands,
    client: Arc<dyn ClusterClient>,
    config: ManagerConfig,
) -> Result<()> {
    let manager = ContainerManager::new(client, config);
    match cmd {
        ServiceCommands::Create(args) => create_service(&manager, args).await,
        ServiceCommands::Destroy(args) => destroy_service(&manager, args).await,
    }
}

async fn create_service(manager: &ContainerManager, args: CreateArgs) -> Result<()> {
    let request: ServiceRequest = load_document(&args.file)?;
    let service = manager.create_service(&request).await?;

    println!("{}", serde_json::to_string_pretty(&service)?);
    Ok(())
}

async fn destroy_service(manager: &ContainerManager, args: DestroyArgs) -> Result<()> {
    let service = resolve_target(args)?;
    manager.destroy_service(&service).await?;

    println!("Destroyed service '{}'", service.id);
    Ok(())
}

fn resolve_target(args: DestroyArgs) -> Result<ContainerService> {
    match (args.name, args.handle) {
        (_, Some(path)) => load_document(&path),
        (Some(name), None) => Ok(ContainerService::named(name)),
        (None, None) => Err(Error::validation("either a service name or --handle is required")),
    }
}
