//! Common types for berth: errors, retry policy, and kube utilities

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::Error;
pub use retry::{Operation, RetryConfig, RetryPolicy};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Label key the workload selector and network-service selector match on
pub const SELECTOR_LABEL: &str = "name";

/// Recommended label carrying the service name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Recommended label marking the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] on every generated object
pub const LABEL_MANAGED_BY_BERTH: &str = "berth";
