//! Handler resolution: the seam between the mediator and instance storage.
//!
//! The mediator never stores handler instances itself. Terminal pipeline
//! stages ask the resolver carried by the handling context for whatever the
//! message's contract requires. Where those instances live, whether in the
//! embedded [`HandlerRegistry`](crate::registry::HandlerRegistry), a DI
//! container, or a test double, is the resolver implementation's business.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::ResolveError;

/// Identifies a handler contract: the `dyn …Handler<…>` trait object type a
/// resolved instance must implement.
///
/// Derived from the message type at dispatch time; derivation is pure, so
/// two dispatches of the same message type always name the same contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractKey {
    id: TypeId,
    name: &'static str,
}

impl ContractKey {
    /// Contract key of the trait object type `T`.
    ///
    /// ```rust,ignore
    /// let key = ContractKey::of::<dyn CommandHandler<Deposit>>();
    /// ```
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// `TypeId` of the contract's trait object type.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Human-readable contract name, for diagnostics and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractKey({})", self.name)
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A resolved handler instance.
///
/// The payload is the handler's `Arc<dyn …Handler<…>>` trait object, erased
/// behind `Any`. Invokers downcast it back to the concrete contract; see
/// [`HandlerRegistry`](crate::registry::HandlerRegistry) for the expected
/// packaging.
pub type HandlerInstance = Arc<dyn Any + Send + Sync>;

/// Supplies handler instances to terminal pipeline stages.
///
/// Contexts carry a resolver handle for the duration of a call; a stage may
/// swap it mid-pipeline to scope resolution (say, to a per-request
/// container) before the terminal stage runs.
pub trait HandlerResolver: Send + Sync + 'static {
    /// Exactly one instance for `contract`.
    fn resolve_one(&self, contract: &ContractKey) -> Result<HandlerInstance, ResolveError>;

    /// All instances for `contract`, in registration order; empty when none.
    fn resolve_many(&self, contract: &ContractKey) -> Vec<HandlerInstance>;
}
