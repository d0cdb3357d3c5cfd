//! Error types surfaced by dispatch and handler resolution.
//!
//! Handler failures are carried boxed and unchanged, so a caller can always
//! recover the concrete error a handler produced. Everything else that can
//! go wrong at runtime has a dedicated [`DispatchError`] variant; malformed
//! pipeline or handler shapes are ruled out at compile time by the trait
//! contracts and have no runtime representation.

use std::error::Error as StdError;

use thiserror::Error;

/// A boxed application error produced by a handler or stage.
///
/// Handlers fail with whatever concrete error type suits them; the mediator
/// never rewraps the box, so the original type stays recoverable via
/// [`DispatchError::handler_downcast_ref`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result alias used across dispatch surfaces.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors produced while resolving handler instances.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Nothing is registered for the requested contract.
    #[error("no handler registered for contract '{contract}'")]
    NotFound {
        /// Human-readable contract name.
        contract: &'static str,
    },
}

/// Errors surfaced by command, query, and event dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The resolver had no handler for a command or query contract.
    #[error("no handler registered for contract '{0}'")]
    HandlerNotFound(&'static str),

    /// A resolved instance did not downcast to the expected contract.
    ///
    /// Indicates a defective resolver registration rather than a missing
    /// one: something was stored under the contract's key that is not the
    /// contract's trait object.
    #[error("resolved instance does not implement contract '{0}'")]
    ContractMismatch(&'static str),

    /// The cancellation token fired before or during handling.
    #[error("dispatch was cancelled")]
    Cancelled,

    /// A handler or stage failed; the original error is carried unchanged.
    #[error("{0}")]
    Handler(#[source] BoxError),

    /// The pipeline completed without any stage storing a result.
    ///
    /// Reaching this means a stage short-circuited a result-bearing
    /// dispatch, or a pipeline was assembled without its handling stage.
    #[error("pipeline completed without producing a result")]
    MissingResult,

    /// The stored result was not of the dispatched message's result type.
    #[error("pipeline result is not a '{0}'")]
    ResultMismatch(&'static str),
}

impl DispatchError {
    /// Whether this error wraps a handler failure of concrete type `E`.
    pub fn handler_is<E: StdError + 'static>(&self) -> bool {
        self.handler_downcast_ref::<E>().is_some()
    }

    /// Borrows the wrapped handler failure as an `E`, when that is its type.
    pub fn handler_downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Handler(inner) => inner.downcast_ref(),
            _ => None,
        }
    }

    /// Unwraps the boxed handler failure, if this is one.
    pub fn into_handler(self) -> Option<BoxError> {
        match self {
            Self::Handler(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<ResolveError> for DispatchError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound { contract } => Self::HandlerNotFound(contract),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("record was modified concurrently")]
    struct ConflictError;

    #[test]
    fn test_handler_error_keeps_identity() {
        let err = DispatchError::Handler(Box::new(ConflictError));

        assert!(err.handler_is::<ConflictError>());
        assert!(err.handler_downcast_ref::<ConflictError>().is_some());
        assert_eq!(err.to_string(), "record was modified concurrently");
    }

    #[test]
    fn test_non_handler_variants_do_not_downcast() {
        let err = DispatchError::Cancelled;

        assert!(!err.handler_is::<ConflictError>());
        assert!(err.into_handler().is_none());
    }

    #[test]
    fn test_resolve_error_converts_to_not_found() {
        let err: DispatchError = ResolveError::NotFound { contract: "X" }.into();
        assert!(matches!(err, DispatchError::HandlerNotFound("X")));
    }
}
