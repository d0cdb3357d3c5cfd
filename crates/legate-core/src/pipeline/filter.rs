//! Middleware stages.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::DispatchResult;
use crate::pipeline::pipe::Pipe;

/// A middleware stage in a dispatch pipeline.
///
/// A stage runs logic around the rest of its chain: anything before
/// `next.send(ctx)`, the forward itself (zero or one times), anything
/// after. Not forwarding short-circuits the call; returning an error aborts
/// it, and the error reaches the dispatch caller unchanged.
///
/// ```rust,ignore
/// struct Timing;
///
/// #[async_trait]
/// impl Filter<CommandContext> for Timing {
///     async fn send(&self, ctx: &mut CommandContext, next: &Pipe<CommandContext>)
///         -> DispatchResult<()>
///     {
///         let started = Instant::now();
///         let outcome = next.send(ctx).await;
///         debug!(elapsed = ?started.elapsed(), "command handled");
///         outcome
///     }
/// }
/// ```
#[async_trait]
pub trait Filter<Ctx>: Send + Sync {
    /// Processes `ctx`, forwarding to `next` at the stage's discretion.
    async fn send(&self, ctx: &mut Ctx, next: &Pipe<Ctx>) -> DispatchResult<()>;

    /// Stage name shown in pipe diagnostics.
    fn name(&self) -> &'static str {
        "stage"
    }
}

pub(crate) type InlineSend<Ctx> = Box<
    dyn for<'a> Fn(&'a mut Ctx, &'a Pipe<Ctx>) -> BoxFuture<'a, DispatchResult<()>> + Send + Sync,
>;

/// Closure stage with full `(ctx, next)` control.
pub(crate) struct InlineFilter<Ctx> {
    send: InlineSend<Ctx>,
}

impl<Ctx> InlineFilter<Ctx> {
    pub(crate) fn new(send: InlineSend<Ctx>) -> Self {
        Self { send }
    }
}

#[async_trait]
impl<Ctx: Send + 'static> Filter<Ctx> for InlineFilter<Ctx> {
    async fn send(&self, ctx: &mut Ctx, next: &Pipe<Ctx>) -> DispatchResult<()> {
        (self.send)(ctx, next).await
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Synchronous side-effect stage; the chain always continues.
pub(crate) struct ExecuteFilter<Ctx> {
    run: Box<dyn Fn(&mut Ctx) + Send + Sync>,
}

impl<Ctx> ExecuteFilter<Ctx> {
    pub(crate) fn new(run: Box<dyn Fn(&mut Ctx) + Send + Sync>) -> Self {
        Self { run }
    }
}

#[async_trait]
impl<Ctx: Send + 'static> Filter<Ctx> for ExecuteFilter<Ctx> {
    async fn send(&self, ctx: &mut Ctx, next: &Pipe<Ctx>) -> DispatchResult<()> {
        (self.run)(ctx);
        next.send(ctx).await
    }

    fn name(&self) -> &'static str {
        "execute"
    }
}
