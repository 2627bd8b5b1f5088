//! Fixed-interval retry for control-plane calls.
//!
//! A failed call is logged, the caller waits a fixed interval, and the call is
//! issued again, up to `max_retries` more times. There is no exponential
//! backoff and no jitter. Once retries are exhausted the last error is
//! returned exactly as the operation produced it.
//!
//! Which verbs get wrapped is decided per [`Operation`] by a [`RetryPolicy`],
//! so coverage can be tuned without touching the call sites.
//!
//! # Example
//!
//! ```ignore
//! use berth_common::retry::{retry_fixed, RetryConfig};
//!
//! let handle = retry_fixed(
//!     &RetryConfig::default(),
//!     "create workload svc1",
//!     || client.create_workload(&deployment),
//! ).await?;
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tracing::{error, warn};

/// Number of retries after the first failed attempt
pub const RETRY_TIMES: u32 = 5;

/// Wait between attempts
pub const RETRY_WAIT: Duration = Duration::from_secs(1);

/// A mutating control-plane verb that a [`RetryPolicy`] can cover.
///
/// Listing routing rules is deliberately absent: its answer decides between
/// create and replace, so it always fails fast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    /// Create the replica-managed workload
    CreateWorkload,
    /// Delete the replica-managed workload
    DeleteWorkload,
    /// Create the externally reachable network-service
    CreateNetworkService,
    /// Delete the network-service
    DeleteNetworkService,
    /// Create a routing rule set
    CreateRoutingRule,
    /// Replace an existing routing rule set
    ReplaceRoutingRule,
}

impl Operation {
    /// Every coverable verb
    pub const ALL: [Operation; 6] = [
        Operation::CreateWorkload,
        Operation::DeleteWorkload,
        Operation::CreateNetworkService,
        Operation::DeleteNetworkService,
        Operation::CreateRoutingRule,
        Operation::ReplaceRoutingRule,
    ];

    /// Human-readable verb used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateWorkload => "create workload",
            Operation::DeleteWorkload => "delete workload",
            Operation::CreateNetworkService => "create network-service",
            Operation::DeleteNetworkService => "delete network-service",
            Operation::CreateRoutingRule => "create routing rule",
            Operation::ReplaceRoutingRule => "replace routing rule",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the hyphenated verb, e.g. `delete-network-service`
impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(' ', "-");
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().replace(' ', "-") == wanted)
            .ok_or_else(|| {
                let known: Vec<String> = Operation::ALL
                    .iter()
                    .map(|op| op.as_str().replace(' ', "-"))
                    .collect();
                format!("unknown operation '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Retry budget for a single wrapped call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: RETRY_TIMES,
            wait: RETRY_WAIT,
        }
    }
}

impl RetryConfig {
    /// Total number of times the operation may be invoked
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Execute an async operation, retrying on any failure at a fixed interval.
///
/// # Arguments
/// * `config` - Retry budget
/// * `operation_name` - Name for logging purposes
/// * `operation` - The async operation to retry
///
/// # Returns
/// The first successful result, or the last error once the budget is spent.
pub async fn retry_fixed<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    delay_ms = config.wait.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(config.wait).await;
            }
        }
    }
}

/// Per-verb retry coverage.
///
/// The default covers workload and network-service creation only. Deletes
/// and routing-rule writes go straight through unless added explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Budget applied to every covered verb
    pub config: RetryConfig,
    covered: BTreeSet<Operation>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            RetryConfig::default(),
            [Operation::CreateWorkload, Operation::CreateNetworkService],
        )
    }
}

impl RetryPolicy {
    /// Create a policy covering exactly the given verbs
    pub fn new(config: RetryConfig, covered: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            config,
            covered: covered.into_iter().collect(),
        }
    }

    /// Cover every mutating verb with the same budget
    pub fn uniform(config: RetryConfig) -> Self {
        Self::new(config, Operation::ALL)
    }

    /// Cover nothing; every call is attempted once
    pub fn disabled() -> Self {
        Self::new(RetryConfig::default(), [])
    }

    /// Replace the retry budget, keeping coverage
    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a verb to the covered set
    pub fn cover(mut self, operation: Operation) -> Self {
        self.covered.insert(operation);
        self
    }

    /// Remove a verb from the covered set
    pub fn uncover(mut self, operation: Operation) -> Self {
        self.covered.remove(&operation);
        self
    }

    /// Whether the given verb is retried
    pub fn covers(&self, operation: Operation) -> bool {
        self.covered.contains(&operation)
    }

    /// Run `call` for `operation` on `target`, retrying if the verb is covered.
    pub async fn run<F, Fut, T, E>(
        &self,
        operation: Operation,
        target: &str,
        mut call: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if self.covers(operation) {
            let name = format!("{} {}", operation, target);
            retry_fixed(&self.config, &name, call).await
        } else {
            call().await
        }
    }
}
