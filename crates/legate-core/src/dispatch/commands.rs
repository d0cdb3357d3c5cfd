//! Command dispatch: exactly one handler per command type, result returned
//! to the caller.

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, span};

use crate::context::CommandContext;
use crate::error::{DispatchError, DispatchResult};
use crate::invoker::{HandlerInvoker, InvokerCache};
use crate::message::Command;
use crate::pipeline::{Filter, Pipe, PipeConfigurator};
use crate::resolver::HandlerResolver;

use super::take_typed_result;

/// Terminal stage: resolves the context's handler contract, invokes the
/// handler, and stores its result in the context.
struct HandleCommandFilter;

#[async_trait]
impl Filter<CommandContext> for HandleCommandFilter {
    async fn send(
        &self,
        ctx: &mut CommandContext,
        next: &Pipe<CommandContext>,
    ) -> DispatchResult<()> {
        if ctx.token().is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        let contract = ctx.contract();
        let instance = ctx.resolver().resolve_one(&contract)?;
        debug!(
            command = ctx.message().type_name(),
            contract = contract.name(),
            "handling command"
        );
        let invoker = Arc::clone(ctx.invoker());
        let result = invoker
            .invoke(instance, ctx.message().clone(), ctx.token().clone())
            .await?;
        ctx.set_result(result);
        next.send(ctx).await
    }

    fn name(&self) -> &'static str {
        "handle-command"
    }
}

/// Dispatches commands to their registered handler through a middleware
/// pipeline.
///
/// The pipeline is configured once, before first use, and shared by every
/// call; the handler stage is always its last stage. Concurrent `process`
/// calls only share immutable state.
///
/// ```
/// use std::sync::Arc;
/// use legate_core::dispatch::CommandProcessor;
/// use legate_core::error::BoxError;
/// use legate_core::handler::CommandHandler;
/// use legate_core::message::Command;
/// use legate_core::registry::HandlerRegistry;
/// use legate_core::CancellationToken;
///
/// struct RenameUser {
///     name: String,
/// }
///
/// impl Command for RenameUser {
///     type Result = ();
/// }
///
/// struct RenameUserHandler;
///
/// #[async_trait::async_trait]
/// impl CommandHandler<RenameUser> for RenameUserHandler {
///     async fn handle(&self, command: &RenameUser, _: &CancellationToken) -> Result<(), BoxError> {
///         println!("renaming to {}", command.name);
///         Ok(())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let registry = Arc::new(HandlerRegistry::new());
/// registry.register_command::<RenameUser, _>(RenameUserHandler);
///
/// let processor = CommandProcessor::new(registry);
/// processor.process(RenameUser { name: "alice".into() }).await?;
/// # Ok::<(), legate_core::error::DispatchError>(())
/// # }).unwrap();
/// ```
pub struct CommandProcessor {
    pipe: Pipe<CommandContext>,
    resolver: Arc<dyn HandlerResolver>,
    invokers: InvokerCache<HandlerInvoker>,
}

impl CommandProcessor {
    /// Processor without middleware: commands go straight to their handler.
    pub fn new(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self::with_pipeline(resolver, |_| {})
    }

    /// Processor whose pipeline is built by `configure`. The handler stage
    /// is appended after everything `configure` registers.
    pub fn with_pipeline<F>(resolver: Arc<dyn HandlerResolver>, configure: F) -> Self
    where
        F: FnOnce(&mut PipeConfigurator<CommandContext>),
    {
        let mut cfg = PipeConfigurator::new();
        configure(&mut cfg);
        cfg.use_filter(HandleCommandFilter);
        Self {
            pipe: cfg.build(),
            resolver,
            invokers: InvokerCache::new(),
        }
    }

    /// Sends `command` through the pipeline and returns its handler's
    /// result.
    pub async fn process<C: Command>(&self, command: C) -> DispatchResult<C::Result> {
        self.process_with(command, CancellationToken::new()).await
    }

    /// [`process`](Self::process) with a caller-supplied cancellation token.
    ///
    /// A token cancelled before the handler stage runs fails the dispatch
    /// with [`DispatchError::Cancelled`]; a running handler observes the
    /// token through its `token` argument.
    pub async fn process_with<C: Command>(
        &self,
        command: C,
        token: CancellationToken,
    ) -> DispatchResult<C::Result> {
        let span = span!(Level::DEBUG, "process", command = %type_name::<C>());
        let invoker = self
            .invokers
            .get_or_insert(TypeId::of::<C>(), HandlerInvoker::of_command::<C>);
        let mut ctx = CommandContext::new(command, invoker, Arc::clone(&self.resolver), token);
        self.pipe.send(&mut ctx).instrument(span).await?;
        take_typed_result::<C::Result>(ctx.take_result(), type_name::<C::Result>())
    }
}

impl fmt::Debug for CommandProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("pipeline", &self.pipe)
            .finish()
    }
}
