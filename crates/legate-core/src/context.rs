//! Per-call handling contexts threaded through pipelines.
//!
//! A context is built by a dispatcher entry point, owned mutably by the
//! pipeline for the duration of the call, and read back afterwards. Stages
//! see the erased message and the call's side-channel state; typed access is
//! a downcast away. The message itself is never replaceable mid-call.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::invoker::{ErasedResult, EventInvoker, HandlerInvoker};
use crate::message::{BoxedMessage, Command, Query};
use crate::resolver::{ContractKey, HandlerResolver};

/// Context for one command dispatch.
///
/// Carries the erased command, the contract derived from its type, the
/// resolver in effect, the cancellation token, and the pending-result slot
/// the terminal stage fills.
pub struct CommandContext {
    message: BoxedMessage,
    invoker: Arc<HandlerInvoker>,
    resolver: Arc<dyn HandlerResolver>,
    token: CancellationToken,
    result: Option<ErasedResult>,
}

impl CommandContext {
    pub(crate) fn new<C: Command>(
        command: C,
        invoker: Arc<HandlerInvoker>,
        resolver: Arc<dyn HandlerResolver>,
        token: CancellationToken,
    ) -> Self {
        Self {
            message: BoxedMessage::new(command),
            invoker,
            resolver,
            token,
            result: None,
        }
    }

    /// The erased command payload.
    pub fn message(&self) -> &BoxedMessage {
        &self.message
    }

    /// Borrows the command as a `C`, when that is the dispatched type.
    pub fn command_as<C: Command>(&self) -> Option<&C> {
        self.message.downcast_ref()
    }

    /// Contract the terminal stage resolves a handler for.
    pub fn contract(&self) -> ContractKey {
        self.invoker.contract()
    }

    /// Resolver currently in effect for this call.
    pub fn resolver(&self) -> &Arc<dyn HandlerResolver> {
        &self.resolver
    }

    /// Replaces the resolver for the remainder of the call.
    pub fn set_resolver(&mut self, resolver: Arc<dyn HandlerResolver>) {
        self.resolver = resolver;
    }

    /// Cancellation token for this call.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn invoker(&self) -> &Arc<HandlerInvoker> {
        &self.invoker
    }

    /// Stores the handled result. A retried terminal stage overwrites the
    /// value from the failed attempt; only the final write is read back.
    pub(crate) fn set_result(&mut self, result: ErasedResult) {
        self.result = Some(result);
    }

    pub(crate) fn take_result(&mut self) -> Option<ErasedResult> {
        self.result.take()
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("message", &self.message)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}

/// Context for one query dispatch. Same shape as [`CommandContext`].
pub struct QueryContext {
    message: BoxedMessage,
    invoker: Arc<HandlerInvoker>,
    resolver: Arc<dyn HandlerResolver>,
    token: CancellationToken,
    result: Option<ErasedResult>,
}

impl QueryContext {
    pub(crate) fn new<Q: Query>(
        query: Q,
        invoker: Arc<HandlerInvoker>,
        resolver: Arc<dyn HandlerResolver>,
        token: CancellationToken,
    ) -> Self {
        Self {
            message: BoxedMessage::new(query),
            invoker,
            resolver,
            token,
            result: None,
        }
    }

    /// The erased query payload.
    pub fn message(&self) -> &BoxedMessage {
        &self.message
    }

    /// Borrows the query as a `Q`, when that is the dispatched type.
    pub fn query_as<Q: Query>(&self) -> Option<&Q> {
        self.message.downcast_ref()
    }

    /// Contract the terminal stage resolves a handler for.
    pub fn contract(&self) -> ContractKey {
        self.invoker.contract()
    }

    /// Resolver currently in effect for this call.
    pub fn resolver(&self) -> &Arc<dyn HandlerResolver> {
        &self.resolver
    }

    /// Replaces the resolver for the remainder of the call.
    pub fn set_resolver(&mut self, resolver: Arc<dyn HandlerResolver>) {
        self.resolver = resolver;
    }

    /// Cancellation token for this call.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn invoker(&self) -> &Arc<HandlerInvoker> {
        &self.invoker
    }

    /// Stores the handled result. A retried terminal stage overwrites the
    /// value from the failed attempt; only the final write is read back.
    pub(crate) fn set_result(&mut self, result: ErasedResult) {
        self.result = Some(result);
    }

    pub(crate) fn take_result(&mut self) -> Option<ErasedResult> {
        self.result.take()
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("message", &self.message)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}

/// Context for one event dispatch. Events produce no result, so there is no
/// pending-result slot.
pub struct EventContext {
    message: BoxedMessage,
    invoker: Arc<EventInvoker>,
    resolver: Arc<dyn HandlerResolver>,
    token: CancellationToken,
}

impl EventContext {
    pub(crate) fn new<E: Send + Sync + 'static>(
        event: E,
        invoker: Arc<EventInvoker>,
        resolver: Arc<dyn HandlerResolver>,
        token: CancellationToken,
    ) -> Self {
        Self {
            message: BoxedMessage::new(event),
            invoker,
            resolver,
            token,
        }
    }

    /// The erased event payload.
    pub fn message(&self) -> &BoxedMessage {
        &self.message
    }

    /// Borrows the event as an `E`, when that is the dispatched type.
    pub fn event_as<E: Send + Sync + 'static>(&self) -> Option<&E> {
        self.message.downcast_ref()
    }

    /// Contract the terminal stage resolves handlers for.
    pub fn contract(&self) -> ContractKey {
        self.invoker.contract()
    }

    /// Resolver currently in effect for this call.
    pub fn resolver(&self) -> &Arc<dyn HandlerResolver> {
        &self.resolver
    }

    /// Replaces the resolver for the remainder of the call.
    pub fn set_resolver(&mut self, resolver: Arc<dyn HandlerResolver>) {
        self.resolver = resolver;
    }

    /// Cancellation token for this call.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn invoker(&self) -> &Arc<EventInvoker> {
        &self.invoker
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("message", &self.message)
            .finish()
    }
}
