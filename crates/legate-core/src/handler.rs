//! Handler contracts for the three message kinds.
//!
//! Handlers are plain async trait impls. Each receives the typed message and
//! the call's cancellation token; dependencies (repositories, nested
//! dispatchers, clients) arrive through the handler's own constructor, not
//! through the mediator.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::message::{Command, Query};

/// Handles a command, producing its declared result.
///
/// Exactly one handler serves a command type; registering another replaces
/// the first.
///
/// ```rust,ignore
/// struct DepositHandler { accounts: Accounts }
///
/// #[async_trait]
/// impl CommandHandler<Deposit> for DepositHandler {
///     async fn handle(&self, command: &Deposit, _token: &CancellationToken)
///         -> Result<i64, BoxError>
///     {
///         self.accounts.deposit(command.account, command.amount).await
///     }
/// }
/// ```
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    /// Handles `command`, observing `token` for cooperative cancellation.
    async fn handle(&self, command: &C, token: &CancellationToken) -> Result<C::Result, BoxError>;
}

/// Handles a query, producing its declared result.
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync + 'static {
    /// Handles `query`, observing `token` for cooperative cancellation.
    async fn handle(&self, query: &Q, token: &CancellationToken) -> Result<Q::Result, BoxError>;
}

/// Handles an event notification.
///
/// Any number of handlers may subscribe to an event type; they run
/// concurrently and one failing does not stop its siblings.
#[async_trait]
pub trait EventHandler<E: Send + Sync + 'static>: Send + Sync + 'static {
    /// Handles `event`, observing `token` for cooperative cancellation.
    async fn handle(&self, event: &E, token: &CancellationToken) -> Result<(), BoxError>;
}
