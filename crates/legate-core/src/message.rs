//! Message contracts and the type-erased message envelope.
//!
//! Three kinds of messages flow through the mediator:
//!
//! - **Commands** implement [`Command`]: imperative requests handled by
//!   exactly one handler. A command declares a result type; fire-and-forget
//!   commands use `Result = ()`.
//! - **Queries** implement [`Query`]: interrogative requests handled by
//!   exactly one handler, always for their result.
//! - **Events** are plain `Send + Sync + 'static` values delivered to zero
//!   or more handlers. No marker trait is required.
//!
//! Inside a pipeline the concrete message type is erased. [`BoxedMessage`]
//! carries the value together with its captured [`TypeId`] and type name so
//! stages can test for and recover the static type.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

/// An imperative message dispatched to exactly one handler.
///
/// `Result` is whatever the handler produces for the caller; commands that
/// only cause effects use `()`.
///
/// ```rust,ignore
/// struct Deposit { account: u64, amount: i64 }
///
/// impl Command for Deposit {
///     type Result = i64; // the new balance
/// }
/// ```
pub trait Command: Send + Sync + 'static {
    /// Value produced by handling this command.
    type Result: Send + 'static;
}

/// An interrogative message dispatched to exactly one handler for its result.
pub trait Query: Send + Sync + 'static {
    /// Value produced by handling this query.
    type Result: Send + 'static;
}

/// A type-erased message travelling through a pipeline.
///
/// Cloning is cheap; the payload is shared behind an [`Arc`].
#[derive(Clone)]
pub struct BoxedMessage {
    payload: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl BoxedMessage {
    /// Erases `message`, capturing its type identity.
    pub fn new<M: Send + Sync + 'static>(message: M) -> Self {
        Self {
            payload: Arc::new(message),
            type_id: TypeId::of::<M>(),
            type_name: type_name::<M>(),
        }
    }

    /// Whether the payload is an `M`.
    pub fn is<M: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }

    /// Borrows the payload as an `M`, when that is its static type.
    pub fn downcast_ref<M: 'static>(&self) -> Option<&M> {
        self.payload.downcast_ref()
    }

    /// Clones out a typed shared handle to the payload.
    pub fn downcast_arc<M: Send + Sync + 'static>(&self) -> Option<Arc<M>> {
        Arc::clone(&self.payload).downcast().ok()
    }

    /// `TypeId` of the payload.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Static type name of the payload, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for BoxedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedMessage")
            .field("type", &self.type_name)
            .finish()
    }
}
