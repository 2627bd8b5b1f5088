//! berth CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use berth_common::kube_utils::{create_client, ClusterSettings};
use berth_common::telemetry::LogFormat;
use berth_common::{Operation, RetryConfig, RetryPolicy, DEFAULT_NAMESPACE};
use berth_service::workload::DEFAULT_GPU_RESOURCE;
use berth_service::{ClusterClient, KubeClusterClient, ManagerConfig};
use clap::{Parser, Subcommand};
use tracing::debug;

/// berth - run container images as long-lived cluster services
#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Namespace for every resource
    #[arg(long, global = true, env = "BERTH_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Kubeconfig to use instead of the default lookup
    #[arg(long, global = true, env = "BERTH_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Authenticate with the mounted service-account token
    #[arg(long, global = true, env = "BERTH_IN_CLUSTER", conflicts_with = "kubeconfig")]
    pub in_cluster: bool,

    /// Service-account token path (with --in-cluster)
    #[arg(long, global = true, requires = "in_cluster")]
    pub token_path: Option<PathBuf>,

    /// Skip API server certificate verification (with --in-cluster)
    #[arg(long, global = true, env = "BERTH_INSECURE_SKIP_TLS_VERIFY")]
    pub insecure_skip_tls_verify: bool,

    /// Log output format: text or json
    #[arg(long, global = true, env = "BERTH_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Retries after a failed call
    #[arg(long, global = true, default_value_t = berth_common::retry::RETRY_TIMES)]
    pub max_retries: u32,

    /// Wait between attempts, in milliseconds
    #[arg(long, global = true, default_value_t = 1000)]
    pub retry_wait_ms: u64,

    /// Retry deletes and routing-rule writes as well as creates
    #[arg(long, global = true, conflicts_with = "no_retry")]
    pub retry_all: bool,

    /// Attempt every call exactly once
    #[arg(long, global = true)]
    pub no_retry: bool,

    /// Also retry this verb (e.g. delete-workload); repeatable
    #[arg(long = "retry", global = true, value_name = "VERB")]
    pub retry_verbs: Vec<Operation>,

    /// Never retry this verb (e.g. create-network-service); repeatable
    #[arg(long = "no-retry-for", global = true, value_name = "VERB")]
    pub skip_retry_verbs: Vec<Operation>,

    /// Extended resource name GPUs are requested under
    #[arg(long, global = true, default_value = DEFAULT_GPU_RESOURCE)]
    pub gpu_resource: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or destroy services
    #[command(subcommand)]
    Service(commands::service::ServiceCommands),
    /// Manage routing rule sets
    #[command(subcommand)]
    Ingress(commands::ingress::IngressCommands),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let config = self.manager_config();
        let client = self.connect().await?;

        match self.command {
            Commands::Service(cmd) => commands::service::run(cmd, client, config).await,
            Commands::Ingress(cmd) => commands::ingress::run(cmd, client, config).await,
        }
    }

    /// Manager settings derived from the global flags
    pub fn manager_config(&self) -> ManagerConfig {
        let retry_config = RetryConfig {
            max_retries: self.max_retries,
            wait: Duration::from_millis(self.retry_wait_ms),
        };
        let base = if self.retry_all {
            RetryPolicy::uniform(retry_config)
        } else if self.no_retry {
            RetryPolicy::disabled().with_config(retry_config)
        } else {
            RetryPolicy::default().with_config(retry_config)
        };
        let retry = self
            .retry_verbs
            .iter()
            .fold(base, |policy, op| policy.cover(*op));
        let retry = self
            .skip_retry_verbs
            .iter()
            .fold(retry, |policy, op| policy.uncover(*op));

        ManagerConfig {
            retry,
            gpu_resource: self.gpu_resource.clone(),
            ..Default::default()
        }
    }

    /// In-cluster settings derived from the environment and global flags
    pub fn cluster_settings(&self) -> Result<ClusterSettings> {
        let mut settings = ClusterSettings::from_env()?
            .with_namespace(&self.namespace)
            .with_insecure_skip_tls_verify(self.insecure_skip_tls_verify);
        if let Some(path) = &self.token_path {
            settings = settings.with_token_path(path);
        }
        Ok(settings)
    }

    async fn connect(&self) -> Result<Arc<dyn ClusterClient>> {
        let client = if self.in_cluster {
            let settings = self.cluster_settings()?;
            debug!(endpoint = %settings.endpoint(), "connecting with service-account token");
            KubeClusterClient::connect(&settings).await?
        } else {
            debug!(kubeconfig = ?self.kubeconfig, "connecting with kubeconfig");
            let client = create_client(self.kubeconfig.as_deref()).await?;
            KubeClusterClient::new(client, &self.namespace)
        };
        Ok(Arc::new(client))
    }
}
