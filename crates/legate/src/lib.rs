//! # Legate
//!
//! An in-process mediator for Rust: typed command, query, and event
//! dispatch through composable middleware pipelines.
//!
//! ## Overview
//!
//! Legate decouples message senders from message handlers. A sender hands a
//! plain message to a dispatcher; Legate derives the handler contract from
//! the message type, resolves the handler, and runs the call through a
//! configurable pipeline of middleware stages:
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────────────────┐     ┌───────────────┐
//! │ CommandProcessor │────▶│ stage ▸ stage ▸ route ▸ ... │────▶│ handler stage │──▶ one handler, result
//! │ QueryService     │────▶│        (same shape)         │────▶│ handler stage │──▶ one handler, result
//! │ EventDispatcher  │────▶│        (same shape)         │────▶│ fan-out stage │──▶ all subscribers
//! └──────────────────┘     └─────────────────────────────┘     └───────────────┘
//! ```
//!
//! - **Commands** change state and have exactly one handler; they may
//!   return a result
//! - **Queries** read state and have exactly one handler returning a result
//! - **Events** notify zero or more subscribers, invoked concurrently
//! - **Pipelines** wrap handling with cross-cutting stages (logging, retry,
//!   validation) and type-filtered sub-pipelines
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use legate::prelude::*;
//!
//! #[derive(Command)]
//! #[command(result = "String")]
//! struct LogInUser {
//!     name: String,
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
//!     let processor = CommandProcessor::with_pipeline(registry, |cfg| {
//!         cfg.use_execute(|ctx| println!("dispatching {:?}", ctx.message()));
//!     });
//!     let report = processor.process(LogInUser { name: "alice".into() }).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `macros`: Enable Command/Query derive macros (default). The derives
//!   expand to impls of the `legate_core` traits, so crates using them
//!   declare a dependency on `legate-core` alongside `legate`.

pub use legate_core as core;

pub use legate_core::{
    BoxError, BoxedMessage, CancellationToken, Command, CommandContext, CommandHandler,
    CommandProcessor, ContractKey, DispatchError, DispatchResult, EventContext, EventDispatcher,
    EventHandler, Filter, HandlerInstance, HandlerRegistry, HandlerResolver, Pipe,
    PipeConfigurator, Query, QueryContext, QueryHandler, QueryService, ResolveError, RetryPolicy,
};

#[cfg(feature = "macros")]
pub use legate_macros::{Command, Query};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use legate::prelude::*;
/// ```
pub mod prelude {
    pub use legate_core::prelude::*;

    #[cfg(feature = "macros")]
    pub use legate_macros::{Command, Query};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use thiserror::Error;

    struct UserWasLoggedIn {
        name: String,
    }

    struct AuditLogin {
        sink: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler<UserWasLoggedIn> for AuditLogin {
        async fn handle(
            &self,
            event: &UserWasLoggedIn,
            _: &CancellationToken,
        ) -> Result<(), BoxError> {
            self.sink.lock().push(format!("'{}' was logged in", event.name));
            Ok(())
        }
    }

    #[derive(Command)]
    struct LogInUser {
        name: String,
    }

    struct LogInUserHandler {
        events: Arc<EventDispatcher>,
    }

    #[async_trait]
    impl CommandHandler<LogInUser> for LogInUserHandler {
        async fn handle(
            &self,
            command: &LogInUser,
            token: &CancellationToken,
        ) -> Result<(), BoxError> {
            let event = UserWasLoggedIn {
                name: command.name.clone(),
            };
            self.events.dispatch_with(event, token.clone()).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_login_command_notifies_subscribers() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_event::<UserWasLoggedIn, _>(AuditLogin {
            sink: Arc::clone(&sink),
        });
        let events = Arc::new(EventDispatcher::new(Arc::clone(&registry)
            as Arc<dyn HandlerResolver>));
        registry.register_command::<LogInUser, _>(LogInUserHandler { events });
        let processor = CommandProcessor::new(registry);

        processor
            .process(LogInUser {
                name: "alice".into(),
            })
            .await
            .unwrap();

        assert_eq!(*sink.lock(), vec!["'alice' was logged in"]);
    }

    #[derive(Command)]
    #[command(result = "u64")]
    struct RegisterUser {
        name: String,
    }

    struct RegisterUserHandler;

    #[async_trait]
    impl CommandHandler<RegisterUser> for RegisterUserHandler {
        async fn handle(
            &self,
            command: &RegisterUser,
            _: &CancellationToken,
        ) -> Result<u64, BoxError> {
            Ok(command.name.len() as u64)
        }
    }

    #[derive(Query)]
    #[query(result = "Vec<String>")]
    struct ListUserNames;

    struct ListUserNamesHandler;

    #[async_trait]
    impl QueryHandler<ListUserNames> for ListUserNamesHandler {
        async fn handle(
            &self,
            _: &ListUserNames,
            _: &CancellationToken,
        ) -> Result<Vec<String>, BoxError> {
            Ok(vec!["alice".into(), "bob".into()])
        }
    }

    #[tokio::test]
    async fn test_derived_result_types_round_trip() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_command::<RegisterUser, _>(RegisterUserHandler);
        registry.register_query::<ListUserNames, _>(ListUserNamesHandler);
        let processor = CommandProcessor::new(Arc::clone(&registry) as Arc<dyn HandlerResolver>);
        let queries = QueryService::new(registry);

        let id = processor
            .process(RegisterUser {
                name: "carol".into(),
            })
            .await
            .unwrap();
        let names = queries.query(ListUserNames).await.unwrap();

        assert_eq!(id, 5);
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn test_middleware_wraps_derived_commands() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (wrap, routed) = (Arc::clone(&log), Arc::clone(&log));
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_command::<RegisterUser, _>(RegisterUserHandler);
        let processor = CommandProcessor::with_pipeline(registry, move |cfg| {
            cfg.use_inline(move |ctx: &mut CommandContext, next: &Pipe<CommandContext>| {
                let log = Arc::clone(&wrap);
                Box::pin(async move {
                    log.lock().push("before");
                    next.send(ctx).await?;
                    log.lock().push("after");
                    Ok(())
                })
            });
            let routed = Arc::clone(&routed);
            cfg.use_for_command::<RegisterUser, _>(move |branch| {
                let log = Arc::clone(&routed);
                branch.use_execute(move |_: &mut CommandContext| {
                    log.lock().push("routed");
                });
            });
        });

        processor
            .process(RegisterUser { name: "dina".into() })
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["before", "routed", "after"]);
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_handler_failures() {
        #[derive(Debug, Error)]
        #[error("directory temporarily offline")]
        struct DirectoryOffline;

        struct FlakyRegistration {
            calls: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl CommandHandler<RegisterUser> for FlakyRegistration {
            async fn handle(
                &self,
                command: &RegisterUser,
                _: &CancellationToken,
            ) -> Result<u64, BoxError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Box::new(DirectoryOffline))
                } else {
                    Ok(command.name.len() as u64)
                }
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_command::<RegisterUser, _>(FlakyRegistration {
            calls: Arc::clone(&calls),
        });
        let processor = CommandProcessor::with_pipeline(registry, |cfg| {
            cfg.use_retry(RetryPolicy::attempts(2).handle::<DirectoryOffline>());
        });

        let id = processor
            .process(RegisterUser { name: "erik".into() })
            .await
            .unwrap();

        assert_eq!(id, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_custom_resolver_decorates_the_registry() {
        struct CountingResolver {
            inner: Arc<HandlerRegistry>,
            resolutions: Arc<AtomicUsize>,
        }

        impl HandlerResolver for CountingResolver {
            fn resolve_one(&self, contract: &ContractKey) -> Result<HandlerInstance, ResolveError> {
                self.resolutions.fetch_add(1, Ordering::SeqCst);
                self.inner.resolve_one(contract)
            }

            fn resolve_many(&self, contract: &ContractKey) -> Vec<HandlerInstance> {
                self.inner.resolve_many(contract)
            }
        }

        let registry = Arc::new(HandlerRegistry::new());
        registry.register_command::<RegisterUser, _>(RegisterUserHandler);
        let resolutions = Arc::new(AtomicUsize::new(0));
        let processor = CommandProcessor::new(Arc::new(CountingResolver {
            inner: registry,
            resolutions: Arc::clone(&resolutions),
        }));

        let id = processor
            .process(RegisterUser { name: "frida".into() })
            .await
            .unwrap();

        assert_eq!(id, 5);
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
    }
}
