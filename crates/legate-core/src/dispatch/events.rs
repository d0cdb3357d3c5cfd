//! Event dispatch: zero or more subscribers per event type, invoked
//! concurrently.
//!
//! Each subscriber runs on its own spawned task against a shared handle to
//! the event. Dispatch completes when every subscriber has finished (the
//! first failure, in subscription order, becomes the dispatch error) or
//! as soon as the cancellation token fires. Cancellation abandons the wait,
//! not the work: already-spawned subscribers run to completion detached,
//! and only handlers that watch their token argument stop early.

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, span, trace};

use crate::context::EventContext;
use crate::error::{DispatchError, DispatchResult};
use crate::invoker::{EventInvoker, InvokerCache};
use crate::pipeline::{Filter, Pipe, PipeConfigurator};
use crate::resolver::HandlerResolver;

/// Terminal stage: fans the event out to every subscribed handler.
struct HandleEventFilter;

#[async_trait]
impl Filter<EventContext> for HandleEventFilter {
    async fn send(&self, ctx: &mut EventContext, next: &Pipe<EventContext>) -> DispatchResult<()> {
        if ctx.token().is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        let contract = ctx.contract();
        let instances = ctx.resolver().resolve_many(&contract);
        if instances.is_empty() {
            trace!(event = ctx.message().type_name(), "no handlers subscribed");
            return next.send(ctx).await;
        }
        debug!(
            event = ctx.message().type_name(),
            handlers = instances.len(),
            "dispatching event"
        );

        let invoker = Arc::clone(ctx.invoker());
        let token = ctx.token().clone();
        let mut tasks = Vec::with_capacity(instances.len());
        for instance in instances {
            let call = invoker.invoke(instance, ctx.message().clone(), token.clone());
            tasks.push(tokio::spawn(call));
        }

        let drain = async move {
            let mut first_error = None;
            for task in tasks {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        first_error.get_or_insert(error);
                    }
                    Err(join_error) => {
                        first_error.get_or_insert(DispatchError::Handler(Box::new(join_error)));
                    }
                }
            }
            match first_error {
                None => Ok(()),
                Some(error) => Err(error),
            }
        };

        tokio::select! {
            outcome = drain => outcome?,
            _ = token.cancelled() => return Err(DispatchError::Cancelled),
        }
        next.send(ctx).await
    }

    fn name(&self) -> &'static str {
        "handle-event"
    }
}

/// Dispatches events to all subscribed handlers through a middleware
/// pipeline.
///
/// Any `Send + Sync + 'static` type can be dispatched as an event; types
/// with no subscribers dispatch successfully as no-ops. Must be used from
/// within a tokio runtime, which carries the subscriber tasks.
pub struct EventDispatcher {
    pipe: Pipe<EventContext>,
    resolver: Arc<dyn HandlerResolver>,
    invokers: InvokerCache<EventInvoker>,
}

impl EventDispatcher {
    /// Dispatcher without middleware: events go straight to their
    /// subscribers.
    pub fn new(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self::with_pipeline(resolver, |_| {})
    }

    /// Dispatcher whose pipeline is built by `configure`. The fan-out stage
    /// is appended after everything `configure` registers.
    pub fn with_pipeline<F>(resolver: Arc<dyn HandlerResolver>, configure: F) -> Self
    where
        F: FnOnce(&mut PipeConfigurator<EventContext>),
    {
        let mut cfg = PipeConfigurator::new();
        configure(&mut cfg);
        cfg.use_filter(HandleEventFilter);
        Self {
            pipe: cfg.build(),
            resolver,
            invokers: InvokerCache::new(),
        }
    }

    /// Sends `event` through the pipeline and waits for every subscriber.
    pub async fn dispatch<E: Send + Sync + 'static>(&self, event: E) -> DispatchResult<()> {
        self.dispatch_with(event, CancellationToken::new()).await
    }

    /// [`dispatch`](Self::dispatch) with a caller-supplied cancellation
    /// token.
    pub async fn dispatch_with<E: Send + Sync + 'static>(
        &self,
        event: E,
        token: CancellationToken,
    ) -> DispatchResult<()> {
        let span = span!(Level::DEBUG, "dispatch", event = %type_name::<E>());
        let invoker = self
            .invokers
            .get_or_insert(TypeId::of::<E>(), EventInvoker::of::<E>);
        let mut ctx = EventContext::new(event, invoker, Arc::clone(&self.resolver), token);
        self.pipe.send(&mut ctx).instrument(span).await
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("pipeline", &self.pipe)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::handler::EventHandler;
    use crate::registry::HandlerRegistry;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use thiserror::Error;

    struct UserRegistered {
        name: &'static str,
    }

    struct OrderShipped;

    struct CountingHandler {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler<UserRegistered> for CountingHandler {
        async fn handle(
            &self,
            event: &UserRegistered,
            _: &CancellationToken,
        ) -> Result<(), BoxError> {
            assert!(!event.name.is_empty());
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_runs_once() {
        let seen = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(HandlerRegistry::new());
        for _ in 0..3 {
            registry.register_event::<UserRegistered, _>(CountingHandler {
                seen: Arc::clone(&seen),
            });
        }
        let dispatcher = EventDispatcher::new(registry);

        dispatcher
            .dispatch(UserRegistered { name: "alice" })
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_event_without_subscribers_is_a_no_op() {
        let dispatcher = EventDispatcher::new(Arc::new(HandlerRegistry::new()));

        dispatcher.dispatch(OrderShipped).await.unwrap();
    }

    #[tokio::test]
    async fn test_first_failure_surfaces_without_stopping_others() {
        #[derive(Debug, Error)]
        #[error("audit sink closed")]
        struct AuditSinkClosed;

        struct FailingHandler;

        #[async_trait]
        impl EventHandler<UserRegistered> for FailingHandler {
            async fn handle(
                &self,
                _: &UserRegistered,
                _: &CancellationToken,
            ) -> Result<(), BoxError> {
                Err(Box::new(AuditSinkClosed))
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_event::<UserRegistered, _>(FailingHandler);
        registry.register_event::<UserRegistered, _>(CountingHandler {
            seen: Arc::clone(&seen),
        });
        let dispatcher = EventDispatcher::new(registry);

        let err = dispatcher
            .dispatch(UserRegistered { name: "bob" })
            .await
            .unwrap_err();

        assert!(err.handler_is::<AuditSinkClosed>());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_returns_promptly_and_stragglers_finish() {
        struct SlowHandler {
            done: Arc<AtomicBool>,
        }

        #[async_trait]
        impl EventHandler<UserRegistered> for SlowHandler {
            async fn handle(
                &self,
                _: &UserRegistered,
                _: &CancellationToken,
            ) -> Result<(), BoxError> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                self.done.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let done = Arc::new(AtomicBool::new(false));
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_event::<UserRegistered, _>(SlowHandler {
            done: Arc::clone(&done),
        });
        let dispatcher = EventDispatcher::new(registry);

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = dispatcher
            .dispatch_with(UserRegistered { name: "carol" }, token)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Cancelled));
        assert!(started.elapsed() < Duration::from_millis(150));
        assert!(!done.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_typed_route_runs_for_matching_event_only() {
        let routed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&routed);
        let dispatcher =
            EventDispatcher::with_pipeline(Arc::new(HandlerRegistry::new()), move |cfg| {
                let seen = Arc::clone(&seen);
                cfg.use_for_event::<UserRegistered, _>(move |branch| {
                    let seen = Arc::clone(&seen);
                    branch.use_execute(move |_: &mut EventContext| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    });
                });
            });

        dispatcher
            .dispatch(UserRegistered { name: "dave" })
            .await
            .unwrap();
        dispatcher.dispatch(OrderShipped).await.unwrap();

        assert_eq!(routed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_subscribers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_event::<UserRegistered, _>(CountingHandler {
            seen: Arc::clone(&seen),
        });
        let dispatcher = EventDispatcher::new(registry);

        let token = CancellationToken::new();
        token.cancel();
        let err = dispatcher
            .dispatch_with(UserRegistered { name: "erin" }, token)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Cancelled));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
