//! Getting-started walkthrough for the Legate mediator.
//!
//! Wires one command, one query, and two event subscribers into mediators
//! whose command pipeline carries a timing stage and retry middleware, then
//! runs a small login scenario end to end. The user directory fails its
//! first lookup, so the first login succeeds only through the retry stage.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package getting-started
//! RUST_LOG=debug cargo run --package getting-started
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use legate::prelude::*;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Domain state
// ============================================================================

#[derive(Default)]
struct SessionStore {
    active: Mutex<Vec<String>>,
}

/// Lookup service that is offline for its first call, to show the retry
/// stage recovering a transient failure.
#[derive(Default)]
struct UserDirectory {
    lookups: AtomicUsize,
}

#[derive(Debug, Error)]
#[error("user directory is offline")]
struct DirectoryOffline;

impl UserDirectory {
    fn confirm(&self, name: &str) -> Result<(), DirectoryOffline> {
        if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
            warn!(user = name, "directory lookup failed, dispatch will retry");
            return Err(DirectoryOffline);
        }
        Ok(())
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Command)]
#[command(result = "String")]
struct LogInUser {
    name: String,
}

#[derive(Query)]
#[query(result = "Vec<String>")]
struct ListActiveSessions;

struct UserWasLoggedIn {
    name: String,
}

// ============================================================================
// Handlers
// ============================================================================

struct LogInUserHandler {
    sessions: Arc<SessionStore>,
    directory: Arc<UserDirectory>,
    events: Arc<EventDispatcher>,
}

#[async_trait]
impl CommandHandler<LogInUser> for LogInUserHandler {
    async fn handle(
        &self,
        command: &LogInUser,
        token: &CancellationToken,
    ) -> Result<String, BoxError> {
        self.directory.confirm(&command.name)?;
        self.sessions.active.lock().push(command.name.clone());

        let event = UserWasLoggedIn {
            name: command.name.clone(),
        };
        self.events.dispatch_with(event, token.clone()).await?;

        Ok(format!("'{}' was logged in", command.name))
    }
}

struct ListActiveSessionsHandler {
    sessions: Arc<SessionStore>,
}

#[async_trait]
impl QueryHandler<ListActiveSessions> for ListActiveSessionsHandler {
    async fn handle(
        &self,
        _: &ListActiveSessions,
        _: &CancellationToken,
    ) -> Result<Vec<String>, BoxError> {
        Ok(self.sessions.active.lock().clone())
    }
}

struct AuditSubscriber;

#[async_trait]
impl EventHandler<UserWasLoggedIn> for AuditSubscriber {
    async fn handle(&self, event: &UserWasLoggedIn, _: &CancellationToken) -> Result<(), BoxError> {
        info!(user = %event.name, "audit: session opened");
        Ok(())
    }
}

struct WelcomeMailer;

#[async_trait]
impl EventHandler<UserWasLoggedIn> for WelcomeMailer {
    async fn handle(&self, event: &UserWasLoggedIn, _: &CancellationToken) -> Result<(), BoxError> {
        info!(user = %event.name, "mail: queued welcome message");
        Ok(())
    }
}

// ============================================================================
// Wiring
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), DispatchError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let registry = Arc::new(HandlerRegistry::new());
    let sessions = Arc::new(SessionStore::default());
    let directory = Arc::new(UserDirectory::default());

    registry.register_event::<UserWasLoggedIn, _>(AuditSubscriber);
    registry.register_event::<UserWasLoggedIn, _>(WelcomeMailer);
    let events = Arc::new(EventDispatcher::new(
        Arc::clone(&registry) as Arc<dyn HandlerResolver>
    ));

    registry.register_command::<LogInUser, _>(LogInUserHandler {
        sessions: Arc::clone(&sessions),
        directory,
        events,
    });
    registry.register_query::<ListActiveSessions, _>(ListActiveSessionsHandler { sessions });

    let processor = CommandProcessor::with_pipeline(
        Arc::clone(&registry) as Arc<dyn HandlerResolver>,
        |cfg| {
            cfg.use_inline(|ctx: &mut CommandContext, next: &Pipe<CommandContext>| {
                Box::pin(async move {
                    let started = Instant::now();
                    next.send(ctx).await?;
                    info!(
                        command = ctx.message().type_name(),
                        elapsed = ?started.elapsed(),
                        "command handled"
                    );
                    Ok(())
                })
            });
            cfg.use_retry(
                RetryPolicy::attempts(3)
                    .interval(Duration::from_millis(50))
                    .handle::<DirectoryOffline>(),
            );
        },
    );
    let queries = QueryService::new(registry);

    for name in ["alice", "bob"] {
        let report = processor.process(LogInUser { name: name.into() }).await?;
        println!("{report}");
    }

    let active = queries.query(ListActiveSessions).await?;
    println!("active sessions: {active:?}");
    Ok(())
}
