//! Query dispatch. Mirrors command dispatch apart from the context type;
//! the split keeps read and write pipelines independently configurable.

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, span};

use crate::context::QueryContext;
use crate::error::{DispatchError, DispatchResult};
use crate::invoker::{HandlerInvoker, InvokerCache};
use crate::message::Query;
use crate::pipeline::{Filter, Pipe, PipeConfigurator};
use crate::resolver::HandlerResolver;

use super::take_typed_result;

/// Terminal stage: resolves the context's handler contract, invokes the
/// handler, and stores its result in the context.
struct HandleQueryFilter;

#[async_trait]
impl Filter<QueryContext> for HandleQueryFilter {
    async fn send(&self, ctx: &mut QueryContext, next: &Pipe<QueryContext>) -> DispatchResult<()> {
        if ctx.token().is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        let contract = ctx.contract();
        let instance = ctx.resolver().resolve_one(&contract)?;
        debug!(
            query = ctx.message().type_name(),
            contract = contract.name(),
            "handling query"
        );
        let invoker = Arc::clone(ctx.invoker());
        let result = invoker
            .invoke(instance, ctx.message().clone(), ctx.token().clone())
            .await?;
        ctx.set_result(result);
        next.send(ctx).await
    }

    fn name(&self) -> &'static str {
        "handle-query"
    }
}

/// Dispatches queries to their registered handler through a middleware
/// pipeline.
///
/// Construction and call shape match [`CommandProcessor`]; see its docs for
/// a worked example.
///
/// [`CommandProcessor`]: crate::dispatch::CommandProcessor
pub struct QueryService {
    pipe: Pipe<QueryContext>,
    resolver: Arc<dyn HandlerResolver>,
    invokers: InvokerCache<HandlerInvoker>,
}

impl QueryService {
    /// Service without middleware: queries go straight to their handler.
    pub fn new(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self::with_pipeline(resolver, |_| {})
    }

    /// Service whose pipeline is built by `configure`. The handler stage is
    /// appended after everything `configure` registers.
    pub fn with_pipeline<F>(resolver: Arc<dyn HandlerResolver>, configure: F) -> Self
    where
        F: FnOnce(&mut PipeConfigurator<QueryContext>),
    {
        let mut cfg = PipeConfigurator::new();
        configure(&mut cfg);
        cfg.use_filter(HandleQueryFilter);
        Self {
            pipe: cfg.build(),
            resolver,
            invokers: InvokerCache::new(),
        }
    }

    /// Sends `query` through the pipeline and returns its handler's result.
    pub async fn query<Q: Query>(&self, query: Q) -> DispatchResult<Q::Result> {
        self.query_with(query, CancellationToken::new()).await
    }

    /// [`query`](Self::query) with a caller-supplied cancellation token.
    pub async fn query_with<Q: Query>(
        &self,
        query: Q,
        token: CancellationToken,
    ) -> DispatchResult<Q::Result> {
        let span = span!(Level::DEBUG, "query", query = %type_name::<Q>());
        let invoker = self
            .invokers
            .get_or_insert(TypeId::of::<Q>(), HandlerInvoker::of_query::<Q>);
        let mut ctx = QueryContext::new(query, invoker, Arc::clone(&self.resolver), token);
        self.pipe.send(&mut ctx).instrument(span).await?;
        take_typed_result::<Q::Result>(ctx.take_result(), type_name::<Q::Result>())
    }
}

impl fmt::Debug for QueryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryService")
            .field("pipeline", &self.pipe)
            .finish()
    }
}
