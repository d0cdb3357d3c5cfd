//! Pipeline construction.

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::{CommandContext, EventContext, QueryContext};
use crate::error::DispatchResult;
use crate::message::{Command, Query};
use crate::pipeline::filter::{ExecuteFilter, Filter, InlineFilter};
use crate::pipeline::pipe::Pipe;
use crate::pipeline::retry::{RetryFilter, RetryPolicy};
use crate::pipeline::routing::{RouteCache, RouteFilter, RouteKey, TeeFilter};

/// Collects stages for one pipeline, in registration order.
///
/// A configurator is handed to a dispatcher's `with_pipeline` constructor
/// and consumed by the build; pipelines are not reconfigurable afterwards.
/// Branch registrations (`use_for_*`) run their callback against a nested
/// configurator with this same surface, sharing the pipeline's route cache.
pub struct PipeConfigurator<Ctx> {
    filters: Vec<Box<dyn Filter<Ctx>>>,
    routes: Arc<RouteCache<Ctx>>,
}

impl<Ctx: Send + 'static> PipeConfigurator<Ctx> {
    pub(crate) fn new() -> Self {
        Self {
            filters: Vec::new(),
            routes: Arc::new(RouteCache::new()),
        }
    }

    /// Configurator for a branch, sharing the owning pipeline's route cache.
    pub(crate) fn nested(routes: Arc<RouteCache<Ctx>>) -> Self {
        Self {
            filters: Vec::new(),
            routes,
        }
    }

    /// Appends a middleware stage.
    pub fn use_filter<F>(&mut self, filter: F) -> &mut Self
    where
        F: Filter<Ctx> + 'static,
    {
        self.filters.push(Box::new(filter));
        self
    }

    /// Appends a closure stage with full control over `(ctx, next)`.
    ///
    /// The closure decides whether and when the remainder of the pipeline
    /// runs:
    ///
    /// ```rust,ignore
    /// cfg.use_inline(|ctx, next| {
    ///     Box::pin(async move {
    ///         let started = Instant::now();
    ///         next.send(ctx).await?;
    ///         debug!(elapsed = ?started.elapsed(), "handled");
    ///         Ok(())
    ///     })
    /// });
    /// ```
    pub fn use_inline<F>(&mut self, stage: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Ctx, &'a Pipe<Ctx>) -> BoxFuture<'a, DispatchResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.filters
            .push(Box::new(InlineFilter::new(Box::new(stage))));
        self
    }

    /// Appends a synchronous side-effect stage; the chain always continues.
    pub fn use_execute<F>(&mut self, run: F) -> &mut Self
    where
        F: Fn(&mut Ctx) + Send + Sync + 'static,
    {
        self.filters
            .push(Box::new(ExecuteFilter::new(Box::new(run))));
        self
    }

    /// Wraps everything registered after this point in retry per `policy`.
    pub fn use_retry(&mut self, policy: RetryPolicy) -> &mut Self {
        self.filters.push(Box::new(RetryFilter::new(policy)));
        self
    }

    fn push_route<P, F>(&mut self, narrowed: TypeId, narrowed_name: &'static str, matches: P, configure: F)
    where
        P: Fn(&Ctx) -> bool + Send + Sync + 'static,
        F: Fn(&mut PipeConfigurator<Ctx>) + Send + Sync + 'static,
    {
        let filter = RouteFilter::new(
            RouteKey::next(narrowed),
            narrowed_name,
            Arc::new(matches),
            Arc::new(configure),
            Arc::clone(&self.routes),
        );
        self.filters.push(Box::new(filter));
    }

    /// Consumes the configurator into an immutable pipe.
    pub(crate) fn build(self) -> Pipe<Ctx> {
        Pipe::from_filters(self.filters)
    }

    /// Branch build: the last stage tees back into `rejoin`.
    pub(crate) fn build_with_tee(mut self, rejoin: Pipe<Ctx>) -> Pipe<Ctx> {
        self.filters.push(Box::new(TeeFilter::new(rejoin)));
        Pipe::from_filters(self.filters)
    }
}

impl PipeConfigurator<CommandContext> {
    /// Diverts commands of type `C` through their own stage list.
    ///
    /// The branch's tail tees back into the outer pipeline, so stages
    /// registered after this call still run exactly once, after the branch.
    /// Other command types pass by unaffected. `configure` runs lazily, on
    /// the first matching dispatch, and its product is cached for the
    /// pipeline's lifetime.
    pub fn use_for_command<C, F>(&mut self, configure: F) -> &mut Self
    where
        C: Command,
        F: Fn(&mut PipeConfigurator<CommandContext>) + Send + Sync + 'static,
    {
        self.push_route(
            TypeId::of::<C>(),
            std::any::type_name::<C>(),
            |ctx: &CommandContext| ctx.message().is::<C>(),
            configure,
        );
        self
    }

    /// Diverts commands matching `predicate` through their own stage list.
    pub fn use_for_commands<P, F>(&mut self, predicate: P, configure: F) -> &mut Self
    where
        P: Fn(&CommandContext) -> bool + Send + Sync + 'static,
        F: Fn(&mut PipeConfigurator<CommandContext>) + Send + Sync + 'static,
    {
        self.push_route(
            TypeId::of::<CommandContext>(),
            "predicate",
            predicate,
            configure,
        );
        self
    }

    /// Diverts commands whose type is in `types` through their own stage
    /// list.
    pub fn use_for_command_types<I, F>(&mut self, types: I, configure: F) -> &mut Self
    where
        I: IntoIterator<Item = TypeId>,
        F: Fn(&mut PipeConfigurator<CommandContext>) + Send + Sync + 'static,
    {
        let types: HashSet<TypeId> = types.into_iter().collect();
        self.push_route(
            TypeId::of::<CommandContext>(),
            "type-set",
            move |ctx: &CommandContext| types.contains(&ctx.message().type_id()),
            configure,
        );
        self
    }
}

impl PipeConfigurator<QueryContext> {
    /// Query counterpart of
    /// [`use_for_command`](PipeConfigurator::use_for_command).
    pub fn use_for_query<Q, F>(&mut self, configure: F) -> &mut Self
    where
        Q: Query,
        F: Fn(&mut PipeConfigurator<QueryContext>) + Send + Sync + 'static,
    {
        self.push_route(
            TypeId::of::<Q>(),
            std::any::type_name::<Q>(),
            |ctx: &QueryContext| ctx.message().is::<Q>(),
            configure,
        );
        self
    }

    /// Query counterpart of
    /// [`use_for_commands`](PipeConfigurator::use_for_commands).
    pub fn use_for_queries<P, F>(&mut self, predicate: P, configure: F) -> &mut Self
    where
        P: Fn(&QueryContext) -> bool + Send + Sync + 'static,
        F: Fn(&mut PipeConfigurator<QueryContext>) + Send + Sync + 'static,
    {
        self.push_route(
            TypeId::of::<QueryContext>(),
            "predicate",
            predicate,
            configure,
        );
        self
    }

    /// Query counterpart of
    /// [`use_for_command_types`](PipeConfigurator::use_for_command_types).
    pub fn use_for_query_types<I, F>(&mut self, types: I, configure: F) -> &mut Self
    where
        I: IntoIterator<Item = TypeId>,
        F: Fn(&mut PipeConfigurator<QueryContext>) + Send + Sync + 'static,
    {
        let types: HashSet<TypeId> = types.into_iter().collect();
        self.push_route(
            TypeId::of::<QueryContext>(),
            "type-set",
            move |ctx: &QueryContext| types.contains(&ctx.message().type_id()),
            configure,
        );
        self
    }
}

impl PipeConfigurator<EventContext> {
    /// Event counterpart of
    /// [`use_for_command`](PipeConfigurator::use_for_command).
    pub fn use_for_event<E, F>(&mut self, configure: F) -> &mut Self
    where
        E: Send + Sync + 'static,
        F: Fn(&mut PipeConfigurator<EventContext>) + Send + Sync + 'static,
    {
        self.push_route(
            TypeId::of::<E>(),
            std::any::type_name::<E>(),
            |ctx: &EventContext| ctx.message().is::<E>(),
            configure,
        );
        self
    }

    /// Event counterpart of
    /// [`use_for_commands`](PipeConfigurator::use_for_commands).
    pub fn use_for_events<P, F>(&mut self, predicate: P, configure: F) -> &mut Self
    where
        P: Fn(&EventContext) -> bool + Send + Sync + 'static,
        F: Fn(&mut PipeConfigurator<EventContext>) + Send + Sync + 'static,
    {
        self.push_route(
            TypeId::of::<EventContext>(),
            "predicate",
            predicate,
            configure,
        );
        self
    }

    /// Event counterpart of
    /// [`use_for_command_types`](PipeConfigurator::use_for_command_types).
    pub fn use_for_event_types<I, F>(&mut self, types: I, configure: F) -> &mut Self
    where
        I: IntoIterator<Item = TypeId>,
        F: Fn(&mut PipeConfigurator<EventContext>) + Send + Sync + 'static,
    {
        let types: HashSet<TypeId> = types.into_iter().collect();
        self.push_route(
            TypeId::of::<EventContext>(),
            "type-set",
            move |ctx: &EventContext| types.contains(&ctx.message().type_id()),
            configure,
        );
        self
    }
}
