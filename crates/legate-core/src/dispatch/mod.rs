//! The three dispatchers and their terminal pipeline stages.
//!
//! Each dispatcher owns one frozen pipeline, a resolver handle, and an
//! invoker cache. Dispatch monomorphizes on the message type at the entry
//! point, wraps the message in a context, and sends the context through the
//! pipeline; the terminal stage (appended after all configured middleware)
//! resolves and invokes the handler.

mod commands;
mod events;
mod queries;

pub use commands::CommandProcessor;
pub use events::EventDispatcher;
pub use queries::QueryService;

use crate::error::{DispatchError, DispatchResult};
use crate::invoker::ErasedResult;

/// Recovers the typed result a terminal stage stored in the context.
///
/// `None` means no stage stored anything, which happens when middleware
/// short-circuits without calling its continuation.
fn take_typed_result<R: Send + 'static>(
    slot: Option<ErasedResult>,
    result_name: &'static str,
) -> DispatchResult<R> {
    let erased = slot.ok_or(DispatchError::MissingResult)?;
    erased
        .downcast::<R>()
        .map(|boxed| *boxed)
        .map_err(|_| DispatchError::ResultMismatch(result_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_result_round_trips() {
        let slot: Option<ErasedResult> = Some(Box::new(7u32));
        let value: u32 = take_typed_result(slot, "u32").unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_empty_slot_is_missing_result() {
        let err = take_typed_result::<u32>(None, "u32").unwrap_err();
        assert!(matches!(err, DispatchError::MissingResult));
    }

    #[test]
    fn test_foreign_type_is_result_mismatch() {
        let slot: Option<ErasedResult> = Some(Box::new("seven"));
        let err = take_typed_result::<u32>(slot, "u32").unwrap_err();
        assert!(matches!(err, DispatchError::ResultMismatch("u32")));
    }
}
