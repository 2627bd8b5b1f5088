//! Error types for berth
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the resource name, the control-plane verb, or the
//! namespace involved, plus the underlying cause where there is one.

use thiserror::Error;

use crate::retry::Operation;

/// Main error type for berth operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes client error outside of a resource verb (client construction)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A create, delete, or replace call against the control plane failed
    #[error("remote api error during {operation} of {name}: {message}")]
    RemoteApi {
        /// The verb that failed
        operation: Operation,
        /// Name of the resource the verb targeted
        name: String,
        /// HTTP status code when the control plane answered at all
        code: Option<u16>,
        /// Description of what failed
        message: String,
    },

    /// Listing routing rules failed before the control plane answered
    #[error("routing rule query failed in namespace {namespace}: {message}")]
    RoutingQuery {
        /// Namespace that was queried
        namespace: String,
        /// Description of what failed
        message: String,
    },

    /// Listing routing rules returned a non-success status
    #[error("routing rule listing in namespace {namespace} returned status {code}: {message}")]
    ServiceRequest {
        /// Namespace that was queried
        namespace: String,
        /// HTTP status code returned by the control plane
        code: u16,
        /// Message returned by the control plane
        message: String,
    },

    /// Caller supplied an invalid request
    #[error("validation error for {service}: {message}")]
    Validation {
        /// Name of the service with invalid configuration
        service: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field (e.g., "mounts[1].host_path")
        field: Option<String>,
    },

    /// A multi-resource create failed and rolling back the finished part failed too
    #[error(
        "service {service} partially created (left behind: {}): {cause}; compensation failed: {compensation}",
        created.join(", ")
    )]
    PartiallyCreated {
        /// Name of the logical service
        service: String,
        /// Resources that still exist on the control plane
        created: Vec<String>,
        /// The failure that interrupted the create
        cause: Box<Error>,
        /// The failure of the compensating delete
        compensation: Box<Error>,
    },

    /// Cluster connection configuration is missing or unusable
    #[error("configuration error [{context}]: {message}")]
    Config {
        /// Where the configuration was read (e.g., "token", "env")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },
}

impl Error {
    /// Create a remote API error without an HTTP status
    pub fn remote_api(
        operation: Operation,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::RemoteApi {
            operation,
            name: name.into(),
            code: None,
            message: msg.into(),
        }
    }

    /// Create a remote API error carrying the control plane's status code
    pub fn remote_api_status(
        operation: Operation,
        name: impl Into<String>,
        code: u16,
        msg: impl Into<String>,
    ) -> Self {
        Self::RemoteApi {
            operation,
            name: name.into(),
            code: Some(code),
            message: msg.into(),
        }
    }

    /// Classify a kube-rs error raised by a resource verb
    pub fn from_kube(operation: Operation, name: impl Into<String>, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => Self::remote_api_status(operation, name, ae.code, ae.message),
            other => Self::remote_api(operation, name, other.to_string()),
        }
    }

    /// Classify a kube-rs error raised while listing routing rules
    ///
    /// A status answer from the control plane is a [`Error::ServiceRequest`];
    /// anything else never reached a decision and is a [`Error::RoutingQuery`].
    pub fn from_routing_query(namespace: impl Into<String>, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => Self::ServiceRequest {
                namespace: namespace.into(),
                code: ae.code,
                message: ae.message,
            },
            other => Self::RoutingQuery {
                namespace: namespace.into(),
                message: other.to_string(),
            },
        }
    }

    /// Create a validation error with service context and field path
    pub fn validation_for_field(
        service: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            service: service.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a configuration error with context
    pub fn config(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Whether the control plane reported the target resource as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::RemoteApi { code, .. } => *code == Some(404),
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }
}
