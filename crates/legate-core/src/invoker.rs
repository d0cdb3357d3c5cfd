//! Monomorphized invocation bridges between erased contexts and typed
//! handlers.
//!
//! Dispatch entry points know the concrete message type; pipeline terminals
//! do not. An invoker closes over that knowledge: built once per message
//! type at the entry point and cached, it downcasts the resolved instance to
//! the handler contract, recovers the typed message, awaits the handler, and
//! re-erases the result. Everything a terminal stage does with a message
//! goes through the invoker its context carries.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, DispatchResult};
use crate::handler::{CommandHandler, EventHandler, QueryHandler};
use crate::message::{BoxedMessage, Command, Query};
use crate::resolver::{ContractKey, HandlerInstance};

/// A boxed result travelling back out of a pipeline.
pub(crate) type ErasedResult = Box<dyn Any + Send>;

type ResultingCall = Box<
    dyn Fn(
            HandlerInstance,
            BoxedMessage,
            CancellationToken,
        ) -> BoxFuture<'static, DispatchResult<ErasedResult>>
        + Send
        + Sync,
>;

type VoidCall = Box<
    dyn Fn(
            HandlerInstance,
            BoxedMessage,
            CancellationToken,
        ) -> BoxFuture<'static, DispatchResult<()>>
        + Send
        + Sync,
>;

/// Recovers the typed trait object packed inside a resolved instance.
///
/// Both this and the message downcast below guard the same invariant: the
/// invoker, the context's message, and the resolved instance were all
/// derived from one message type.
fn downcast_instance<T>(instance: &HandlerInstance, contract: ContractKey) -> DispatchResult<Arc<T>>
where
    T: ?Sized + 'static,
{
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or(DispatchError::ContractMismatch(contract.name()))
}

/// Invoker for result-bearing dispatches (commands and queries).
pub(crate) struct HandlerInvoker {
    contract: ContractKey,
    call: ResultingCall,
}

impl HandlerInvoker {
    /// Invoker for command type `C`.
    pub(crate) fn of_command<C: Command>() -> Self {
        let contract = ContractKey::of::<dyn CommandHandler<C>>();
        Self {
            contract,
            call: Box::new(move |instance, message, token| {
                Box::pin(async move {
                    let handler =
                        downcast_instance::<dyn CommandHandler<C>>(&instance, contract)?;
                    let command = message
                        .downcast_arc::<C>()
                        .ok_or(DispatchError::ContractMismatch(contract.name()))?;
                    let result = handler
                        .handle(command.as_ref(), &token)
                        .await
                        .map_err(DispatchError::Handler)?;
                    Ok(Box::new(result) as ErasedResult)
                })
            }),
        }
    }

    /// Invoker for query type `Q`.
    pub(crate) fn of_query<Q: Query>() -> Self {
        let contract = ContractKey::of::<dyn QueryHandler<Q>>();
        Self {
            contract,
            call: Box::new(move |instance, message, token| {
                Box::pin(async move {
                    let handler = downcast_instance::<dyn QueryHandler<Q>>(&instance, contract)?;
                    let query = message
                        .downcast_arc::<Q>()
                        .ok_or(DispatchError::ContractMismatch(contract.name()))?;
                    let result = handler
                        .handle(query.as_ref(), &token)
                        .await
                        .map_err(DispatchError::Handler)?;
                    Ok(Box::new(result) as ErasedResult)
                })
            }),
        }
    }

    pub(crate) fn contract(&self) -> ContractKey {
        self.contract
    }

    /// Invokes `instance` against the typed message inside `message`.
    pub(crate) fn invoke(
        &self,
        instance: HandlerInstance,
        message: BoxedMessage,
        token: CancellationToken,
    ) -> BoxFuture<'static, DispatchResult<ErasedResult>> {
        (self.call)(instance, message, token)
    }
}

/// Invoker for event fan-out; one call per subscribed handler.
pub(crate) struct EventInvoker {
    contract: ContractKey,
    call: VoidCall,
}

impl EventInvoker {
    /// Invoker for event type `E`.
    pub(crate) fn of<E: Send + Sync + 'static>() -> Self {
        let contract = ContractKey::of::<dyn EventHandler<E>>();
        Self {
            contract,
            call: Box::new(move |instance, message, token| {
                Box::pin(async move {
                    let handler = downcast_instance::<dyn EventHandler<E>>(&instance, contract)?;
                    let event = message
                        .downcast_arc::<E>()
                        .ok_or(DispatchError::ContractMismatch(contract.name()))?;
                    handler
                        .handle(event.as_ref(), &token)
                        .await
                        .map_err(DispatchError::Handler)
                })
            }),
        }
    }

    pub(crate) fn contract(&self) -> ContractKey {
        self.contract
    }

    /// Future for one handler invocation; `'static` so fan-out can spawn it.
    pub(crate) fn invoke(
        &self,
        instance: HandlerInstance,
        message: BoxedMessage,
        token: CancellationToken,
    ) -> BoxFuture<'static, DispatchResult<()>> {
        (self.call)(instance, message, token)
    }
}

/// Append-only `TypeId -> invoker` cache, one per dispatcher.
///
/// Read-mostly: after the first dispatch of a message type every later
/// dispatch takes the read path. Concurrent first dispatches may both build
/// an invoker; the first insert wins and the spare is dropped, which is
/// harmless because invokers for the same type are interchangeable.
pub(crate) struct InvokerCache<I> {
    entries: RwLock<HashMap<TypeId, Arc<I>>>,
}

impl<I> InvokerCache<I> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn get_or_insert(&self, key: TypeId, build: impl FnOnce() -> I) -> Arc<I> {
        if let Some(found) = self.entries.read().get(&key) {
            return Arc::clone(found);
        }
        let built = Arc::new(build());
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(key).or_insert(built))
    }
}
