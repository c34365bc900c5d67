//! Error taxonomy for the text input processor.
//!
//! Decision paths (key sinks) never surface these to the host as failures:
//! they degrade to "not eaten". Activation and factory paths return them
//! directly after rolling back whatever was already registered.

use thiserror::Error;
use uuid::Uuid;

use crate::activation::LifecycleState;
use crate::service::Capability;

/// Errors reported by the service, its facets and the in-memory host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// A required handle or argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A sink subscription or document capability could not be obtained.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// The host could not accept or allocate a request.
    #[error("out of memory")]
    OutOfMemory,

    /// Optional capability that is deliberately not provided.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Capability query for a facet this object does not expose.
    #[error("capability not supported: {0:?}")]
    NoInterface(Capability),

    /// Lifecycle entry point called from the wrong state.
    #[error("invalid lifecycle state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },

    /// The factory was asked to aggregate into an outer object.
    #[error("aggregation is not supported")]
    NoAggregation,

    /// The module does not provide a factory for this service id.
    #[error("class not available: {0}")]
    ClassNotAvailable(Uuid),

    /// Failure reported by the host framework.
    #[error("host failure: {0}")]
    Host(String),
}

impl ServiceError {
    /// Shorthand for [`ServiceError::ResourceUnavailable`].
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::ResourceUnavailable(what.into())
    }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
