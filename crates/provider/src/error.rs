//! Error types for the provider layer.
//!
//! All fallible operations return [`ProviderError`], a closed taxonomy that
//! separates connection failures, unsupported operations, authorization
//! denials, configuration problems, transient (retryable) faults, integrity
//! violations, and transaction failures. Callers that need to branch on a
//! category should use the `is_*` helpers rather than matching concrete
//! backend error strings.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Cannot establish, health-check, or keep a backend connection.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A provider was asked to do something its backend cannot do.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedError),

    /// Authenticated but not authorized for the requested client or action.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Malformed configuration or input.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Retryable fault: timeout or transient network failure.
    #[error(transparent)]
    Transient(#[from] TransientError),

    /// Constraint or foreign-key violation surfaced by the backend.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Transaction lifecycle errors.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-internal errors that fit no other category.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ProviderError {
    /// Returns `true` if the error is retryable.
    ///
    /// Only transient faults qualify; access denials and integrity
    /// violations are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Returns `true` if the error is an authorization denial.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, ProviderError::Access(_))
    }

    /// Returns `true` if the error reports a capability the provider lacks.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ProviderError::Unsupported(_))
    }

    /// Returns `true` if the error is a constraint violation.
    pub fn is_integrity(&self) -> bool {
        matches!(self, ProviderError::Integrity(_))
    }
}

/// Errors establishing or keeping a backend connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Connection to the backend failed.
    #[error("connection failed to {provider}: {message}")]
    Failed { provider: String, message: String },

    /// The connection pool is exhausted.
    #[error("connection pool exhausted for {provider}")]
    PoolExhausted { provider: String },

    /// The provider has been disconnected and cannot serve requests.
    #[error("provider {provider} is not connected")]
    NotConnected { provider: String },
}

/// A provider was asked for a capability its backend does not expose.
#[derive(Error, Debug)]
pub enum UnsupportedError {
    /// The operation is not supported by this provider.
    ///
    /// Callers can avoid this error up front by checking
    /// `DatabaseProvider::supports` for the relevant capability.
    #[error("operation '{operation}' is not supported by the {provider} provider")]
    Operation {
        provider: String,
        operation: String,
    },
}

impl UnsupportedError {
    /// Convenience constructor for the common case.
    pub fn operation(provider: impl Into<String>, operation: impl Into<String>) -> ProviderError {
        ProviderError::Unsupported(UnsupportedError::Operation {
            provider: provider.into(),
            operation: operation.into(),
        })
    }
}

/// Authorization denials. Never retried, always audit-logged by the caller.
#[derive(Error, Debug)]
pub enum AccessError {
    /// The user is not a member of the requested client.
    #[error("access denied: user {user_id} cannot access client {client_id}")]
    ClientAccessDenied { user_id: String, client_id: String },

    /// The user's role does not meet the action's minimum role.
    #[error("access denied: user {user_id} cannot perform '{action}' in client {client_id}")]
    ActionDenied {
        user_id: String,
        client_id: String,
        action: String,
    },
}

/// Configuration and input validation errors. Raised at construction time,
/// never lazily on first use.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The requested provider kind has no implementation.
    #[error("unsupported provider type: {kind}")]
    UnsupportedProvider { kind: String },

    /// A required credential or connection field is missing.
    #[error("missing credentials for {provider}: {field}")]
    MissingCredentials { provider: String, field: String },

    /// A configuration value failed validation.
    #[error("invalid configuration value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// No environment variables matched a known provider configuration.
    #[error("no provider configuration detected in environment")]
    NoProviderDetected,
}

/// Retryable faults.
#[derive(Error, Debug)]
pub enum TransientError {
    /// The operation exceeded its timeout. The connection is released back
    /// to the pool, never leaked.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// A transient network fault.
    #[error("transient network failure during '{operation}': {message}")]
    Network { operation: String, message: String },
}

/// Constraint violations surfaced by the backend.
#[derive(Error, Debug)]
pub enum IntegrityError {
    /// A foreign-key reference points at a row that does not exist.
    #[error("foreign key violation on {table}: {message}")]
    ForeignKey { table: String, message: String },

    /// A unique constraint was violated.
    #[error("unique violation on {table}: {message}")]
    Unique { table: String, message: String },

    /// A check or not-null constraint was violated.
    #[error("constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },
}

/// Transaction lifecycle errors.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The transaction was already committed or rolled back.
    #[error("transaction is no longer active")]
    Inactive,

    /// The transaction could not be started.
    #[error("failed to begin transaction: {message}")]
    BeginFailed { message: String },

    /// The transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },
}

/// Backend-internal errors.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Query execution failed for a reason that is neither transient nor an
    /// integrity violation. Carries the operation for context; never the
    /// bound parameter values.
    #[error("query failed during '{operation}': {message}")]
    Query {
        operation: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A row addressed by client and id does not exist.
    #[error("row not found in {table}: {id}")]
    RowNotFound { table: String, id: String },

    /// Serialization or deserialization of a row failed.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// An HTTP backend returned an unexpected status.
    #[error("{provider} returned HTTP {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// Internal error in the named provider.
    #[error("internal error in {provider}: {message}")]
    Internal {
        provider: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Backend(BackendError::Serialization {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for ProviderError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                ProviderError::Connection(ConnectionError::PoolExhausted {
                    provider: "postgres".to_string(),
                })
            }
            other => ProviderError::Connection(ConnectionError::Failed {
                provider: "postgres".to_string(),
                message: other.to_string(),
            }),
        }
    }
}

#[cfg(feature = "supabase")]
impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let operation = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "http".to_string());
        if err.is_timeout() {
            ProviderError::Transient(TransientError::Timeout {
                operation,
                timeout_ms: 0,
            })
        } else if err.is_connect() || err.is_request() {
            ProviderError::Transient(TransientError::Network {
                operation,
                message: err.to_string(),
            })
        } else {
            ProviderError::Backend(BackendError::Internal {
                provider: "supabase".to_string(),
                message: err.to_string(),
                source: Some(Box::new(err)),
            })
        }
    }
}
