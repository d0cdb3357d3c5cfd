//! # Legate Core
//!
//! The dispatch engine of the Legate in-process mediator.
//!
//! This crate provides the building blocks for typed command, query, and
//! event dispatch: message contracts, handler traits, handler resolution,
//! and the middleware pipelines every dispatch flows through.
//!
//! ## Architecture
//!
//! Each dispatcher owns one immutable pipeline ending in a terminal stage
//! that resolves and invokes handlers:
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────────────────┐     ┌───────────────┐
//! │ CommandProcessor │────▶│ stage ▸ stage ▸ route ▸ ... │────▶│ handler stage │──▶ one handler, result
//! │ QueryService     │────▶│        (same shape)         │────▶│ handler stage │──▶ one handler, result
//! │ EventDispatcher  │────▶│        (same shape)         │────▶│ fan-out stage │──▶ all subscribers
//! └──────────────────┘     └─────────────────────────────┘     └───────────────┘
//! ```
//!
//! - **Messages**: plain types; [`Command`] and [`Query`] declare their
//!   result type, events are any `Send + Sync + 'static` type
//! - **Handlers**: async traits ([`CommandHandler`], [`QueryHandler`],
//!   [`EventHandler`]), resolved per dispatch through a [`HandlerResolver`]
//! - **Pipelines**: ordered [`Filter`] stages with strict nesting, plus
//!   type- and predicate-routed branches that tee back into the main chain
//! - **Contexts**: one per dispatch ([`CommandContext`], [`QueryContext`],
//!   [`EventContext`]), carrying the erased message, the resolver, and the
//!   cancellation token to every stage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use legate_core::prelude::*;
//!
//! struct LogInUser {
//!     name: String,
//! }
//!
//! impl Command for LogInUser {
//!     type Result = String;
//! }
//!
//! struct LogInUserHandler;
//!
//! #[async_trait::async_trait]
//! impl CommandHandler<LogInUser> for LogInUserHandler {
//!     async fn handle(
//!         &self,
//!         command: &LogInUser,
//!         _token: &CancellationToken,
//!     ) -> Result<String, BoxError> {
//!         Ok(format!("'{}' was logged in", command.name))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DispatchError> {
//!     let registry = Arc::new(HandlerRegistry::new());
//!     registry.register_command::<LogInUser, _>(LogInUserHandler);
//!
//!     let processor = CommandProcessor::new(registry);
//!     let report = processor.process(LogInUser { name: "alice".into() }).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod message;
pub mod pipeline;
pub mod registry;
pub mod resolver;

mod invoker;

pub use context::{CommandContext, EventContext, QueryContext};
pub use dispatch::{CommandProcessor, EventDispatcher, QueryService};
pub use error::{BoxError, DispatchError, DispatchResult, ResolveError};
pub use handler::{CommandHandler, EventHandler, QueryHandler};
pub use message::{BoxedMessage, Command, Query};
pub use pipeline::{Filter, Pipe, PipeConfigurator, RetryPolicy};
pub use registry::HandlerRegistry;
pub use resolver::{ContractKey, HandlerInstance, HandlerResolver};

/// Cancellation token threaded through every dispatch, re-exported so
/// handler implementations need no direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use super::CancellationToken;
    pub use super::context::{CommandContext, EventContext, QueryContext};
    pub use super::dispatch::{CommandProcessor, EventDispatcher, QueryService};
    pub use super::error::{BoxError, DispatchError, DispatchResult, ResolveError};
    pub use super::handler::{CommandHandler, EventHandler, QueryHandler};
    pub use super::message::{Command, Query};
    pub use super::pipeline::{Filter, Pipe, PipeConfigurator, RetryPolicy};
    pub use super::registry::HandlerRegistry;
    pub use super::resolver::{ContractKey, HandlerInstance, HandlerResolver};
}
