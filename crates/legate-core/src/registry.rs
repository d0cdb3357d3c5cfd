//! Embedded handler storage.
//!
//! [`HandlerRegistry`] is the in-memory [`HandlerResolver`] used by tests,
//! demos, and applications that do not bring a DI container. Registration is
//! interior-mutable, so a registry can be populated after it is shared.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::ResolveError;
use crate::handler::{CommandHandler, EventHandler, QueryHandler};
use crate::message::{Command, Query};
use crate::resolver::{ContractKey, HandlerInstance, HandlerResolver};

/// In-memory handler storage keyed by contract.
///
/// Commands and queries occupy single slots: registering a second handler
/// for the same message type replaces the first. Event handlers accumulate
/// and are resolved in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    single: RwLock<HashMap<TypeId, HandlerInstance>>,
    multi: RwLock<HashMap<TypeId, Vec<HandlerInstance>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for command type `C`, replacing any earlier one.
    pub fn register_command<C, H>(&self, handler: H)
    where
        C: Command,
        H: CommandHandler<C>,
    {
        let contract = ContractKey::of::<dyn CommandHandler<C>>();
        let erased: Arc<dyn CommandHandler<C>> = Arc::new(handler);
        debug!(contract = contract.name(), "registering command handler");
        self.single.write().insert(contract.id(), Arc::new(erased));
    }

    /// Registers the handler for query type `Q`, replacing any earlier one.
    pub fn register_query<Q, H>(&self, handler: H)
    where
        Q: Query,
        H: QueryHandler<Q>,
    {
        let contract = ContractKey::of::<dyn QueryHandler<Q>>();
        let erased: Arc<dyn QueryHandler<Q>> = Arc::new(handler);
        debug!(contract = contract.name(), "registering query handler");
        self.single.write().insert(contract.id(), Arc::new(erased));
    }

    /// Subscribes a handler to event type `E`, after any already subscribed.
    pub fn register_event<E, H>(&self, handler: H)
    where
        E: Send + Sync + 'static,
        H: EventHandler<E>,
    {
        let contract = ContractKey::of::<dyn EventHandler<E>>();
        let erased: Arc<dyn EventHandler<E>> = Arc::new(handler);
        debug!(contract = contract.name(), "registering event handler");
        self.multi
            .write()
            .entry(contract.id())
            .or_default()
            .push(Arc::new(erased));
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve_one(&self, contract: &ContractKey) -> Result<HandlerInstance, ResolveError> {
        self.single
            .read()
            .get(&contract.id())
            .cloned()
            .ok_or(ResolveError::NotFound {
                contract: contract.name(),
            })
    }

    fn resolve_many(&self, contract: &ContractKey) -> Vec<HandlerInstance> {
        self.multi
            .read()
            .get(&contract.id())
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("single_contracts", &self.single.read().len())
            .field("multi_contracts", &self.multi.read().len())
            .finish()
    }
}
