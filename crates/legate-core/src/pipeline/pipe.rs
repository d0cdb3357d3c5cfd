//! The immutable filter chain.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::DispatchResult;
use crate::pipeline::filter::Filter;

/// An immutable chain of stages ending in a no-op terminal node.
///
/// Built once by a configurator and never modified; cloning shares the
/// nodes, which is what lets routed branches capture the outer remainder of
/// a pipeline cheaply. Sending walks stages in registration order, each
/// stage deciding whether the remainder runs.
pub struct Pipe<Ctx> {
    node: Arc<Node<Ctx>>,
}

enum Node<Ctx> {
    Stage {
        filter: Box<dyn Filter<Ctx>>,
        next: Pipe<Ctx>,
    },
    End,
}

impl<Ctx> Clone for Pipe<Ctx> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<Ctx: Send + 'static> Pipe<Ctx> {
    /// The empty pipe; sending completes immediately.
    pub(crate) fn end() -> Self {
        Self {
            node: Arc::new(Node::End),
        }
    }

    /// Builds a pipe from filters in registration order.
    pub(crate) fn from_filters(filters: Vec<Box<dyn Filter<Ctx>>>) -> Self {
        let mut pipe = Self::end();
        for filter in filters.into_iter().rev() {
            pipe = Self {
                node: Arc::new(Node::Stage { filter, next: pipe }),
            };
        }
        pipe
    }

    /// Sends `ctx` through the remaining stages.
    pub fn send<'a>(&'a self, ctx: &'a mut Ctx) -> BoxFuture<'a, DispatchResult<()>> {
        match &*self.node {
            Node::Stage { filter, next } => filter.send(ctx, next),
            Node::End => Box::pin(std::future::ready(Ok(()))),
        }
    }

    /// Stage names in execution order, for diagnostics.
    ///
    /// Routed branches report as a single `route` stage; their inner stages
    /// only exist once a matching message has built them.
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut node = &self.node;
        while let Node::Stage { filter, next } = &**node {
            names.push(filter.name());
            node = &next.node;
        }
        names
    }
}

impl<Ctx: Send + 'static> fmt::Debug for Pipe<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}
