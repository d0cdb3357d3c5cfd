//! Type- and predicate-filtered branch stages.
//!
//! A routed branch diverts matching contexts through its own stage list;
//! the branch's tail tees back into the outer pipeline, so stages after the
//! branch point run exactly once whether or not the branch matched. The
//! composed branch pipe is built on the first matching dispatch (running the
//! registration's configure callback against a nested configurator) and
//! memoized in the pipeline's route cache under a key assigned at
//! registration time.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::DispatchResult;
use crate::pipeline::configurator::PipeConfigurator;
use crate::pipeline::filter::Filter;
use crate::pipeline::pipe::Pipe;

static NEXT_ROUTE_ID: AtomicU64 = AtomicU64::new(0);

/// Stable identity of one branch registration.
///
/// `id` is unique for the process lifetime, so a cache entry can never be
/// confused between two registrations; `narrowed` records the typed form's
/// target (or the context type, for predicate and type-set forms).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct RouteKey {
    id: u64,
    narrowed: TypeId,
}

impl RouteKey {
    pub(crate) fn next(narrowed: TypeId) -> Self {
        Self {
            id: NEXT_ROUTE_ID.fetch_add(1, Ordering::Relaxed),
            narrowed,
        }
    }
}

/// Lazily-built branch pipes, shared by every branch filter of one pipeline.
///
/// Append-only and never evicted; bounded by the number of registered
/// routes. Concurrent first matches may build the same branch twice; the
/// first insert wins and the spare is dropped, so configure callbacks must
/// tolerate running more than once (they are `Fn`, not `FnOnce`).
pub(crate) struct RouteCache<Ctx> {
    pipes: RwLock<HashMap<RouteKey, Pipe<Ctx>>>,
}

impl<Ctx: Send + 'static> RouteCache<Ctx> {
    pub(crate) fn new() -> Self {
        Self {
            pipes: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_build(&self, key: RouteKey, build: impl FnOnce() -> Pipe<Ctx>) -> Pipe<Ctx> {
        if let Some(found) = self.pipes.read().get(&key) {
            return found.clone();
        }
        let built = build();
        let mut pipes = self.pipes.write();
        pipes.entry(key).or_insert(built).clone()
    }
}

pub(crate) type RoutePredicate<Ctx> = Arc<dyn Fn(&Ctx) -> bool + Send + Sync>;

pub(crate) type RouteConfigure<Ctx> = Arc<dyn Fn(&mut PipeConfigurator<Ctx>) + Send + Sync>;

/// The branch stage installed by `use_for_*` registrations.
pub(crate) struct RouteFilter<Ctx> {
    key: RouteKey,
    narrowed_name: &'static str,
    matches: RoutePredicate<Ctx>,
    configure: RouteConfigure<Ctx>,
    routes: Arc<RouteCache<Ctx>>,
}

impl<Ctx: Send + 'static> RouteFilter<Ctx> {
    pub(crate) fn new(
        key: RouteKey,
        narrowed_name: &'static str,
        matches: RoutePredicate<Ctx>,
        configure: RouteConfigure<Ctx>,
        routes: Arc<RouteCache<Ctx>>,
    ) -> Self {
        Self {
            key,
            narrowed_name,
            matches,
            configure,
            routes,
        }
    }

    fn branch(&self, next: &Pipe<Ctx>) -> Pipe<Ctx> {
        self.routes.get_or_build(self.key, || {
            debug!(route = self.narrowed_name, "building branch pipe");
            let mut cfg = PipeConfigurator::nested(Arc::clone(&self.routes));
            (self.configure)(&mut cfg);
            cfg.build_with_tee(next.clone())
        })
    }
}

#[async_trait]
impl<Ctx: Send + 'static> Filter<Ctx> for RouteFilter<Ctx> {
    async fn send(&self, ctx: &mut Ctx, next: &Pipe<Ctx>) -> DispatchResult<()> {
        if (self.matches)(ctx) {
            let branch = self.branch(next);
            branch.send(ctx).await
        } else {
            next.send(ctx).await
        }
    }

    fn name(&self) -> &'static str {
        "route"
    }
}

/// Reconnects a branch's tail into the outer pipeline.
pub(crate) struct TeeFilter<Ctx> {
    rejoin: Pipe<Ctx>,
}

impl<Ctx> TeeFilter<Ctx> {
    pub(crate) fn new(rejoin: Pipe<Ctx>) -> Self {
        Self { rejoin }
    }
}

#[async_trait]
impl<Ctx: Send + 'static> Filter<Ctx> for TeeFilter<Ctx> {
    async fn send(&self, ctx: &mut Ctx, _next: &Pipe<Ctx>) -> DispatchResult<()> {
        self.rejoin.send(ctx).await
    }

    fn name(&self) -> &'static str {
        "tee"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RouteCtx {
        tag: &'static str,
        log: Vec<&'static str>,
    }

    fn route_on(
        tag: &'static str,
        configure: impl Fn(&mut PipeConfigurator<RouteCtx>) + Send + Sync + 'static,
    ) -> RouteFilter<RouteCtx> {
        RouteFilter::new(
            RouteKey::next(TypeId::of::<RouteCtx>()),
            "test-route",
            Arc::new(move |ctx: &RouteCtx| ctx.tag == tag),
            Arc::new(configure),
            Arc::new(RouteCache::new()),
        )
    }

    #[tokio::test]
    async fn test_branch_runs_only_for_matching_contexts() {
        let mut cfg: PipeConfigurator<RouteCtx> = PipeConfigurator::new();
        cfg.use_filter(route_on("a", |branch| {
            branch.use_execute(|ctx: &mut RouteCtx| ctx.log.push("branch"));
        }));
        let pipe = cfg.build();

        let mut matching = RouteCtx {
            tag: "a",
            ..Default::default()
        };
        pipe.send(&mut matching).await.unwrap();
        assert_eq!(matching.log, vec!["branch"]);

        let mut other = RouteCtx {
            tag: "b",
            ..Default::default()
        };
        pipe.send(&mut other).await.unwrap();
        assert!(other.log.is_empty());
    }

    #[tokio::test]
    async fn test_branch_tees_back_before_later_stages() {
        let mut cfg: PipeConfigurator<RouteCtx> = PipeConfigurator::new();
        cfg.use_filter(route_on("a", |branch| {
            branch.use_inline(|ctx: &mut RouteCtx, next: &Pipe<RouteCtx>| {
                Box::pin(async move {
                    ctx.log.push("outer-before");
                    next.send(ctx).await?;
                    ctx.log.push("outer-after");
                    Ok(())
                })
            });
            branch.use_execute(|ctx: &mut RouteCtx| ctx.log.push("branch-stage"));
        }));
        cfg.use_execute(|ctx: &mut RouteCtx| ctx.log.push("global-after"));
        let pipe = cfg.build();

        let mut matching = RouteCtx {
            tag: "a",
            ..Default::default()
        };
        pipe.send(&mut matching).await.unwrap();
        assert_eq!(
            matching.log,
            vec!["outer-before", "branch-stage", "global-after", "outer-after"]
        );

        let mut other = RouteCtx {
            tag: "b",
            ..Default::default()
        };
        pipe.send(&mut other).await.unwrap();
        assert_eq!(other.log, vec!["global-after"]);
    }

    #[tokio::test]
    async fn test_branch_configure_runs_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&builds);

        let mut cfg: PipeConfigurator<RouteCtx> = PipeConfigurator::new();
        cfg.use_filter(route_on("a", move |branch| {
            observed.fetch_add(1, Ordering::SeqCst);
            branch.use_execute(|ctx: &mut RouteCtx| ctx.log.push("branch"));
        }));
        let pipe = cfg.build();

        for _ in 0..3 {
            let mut ctx = RouteCtx {
                tag: "a",
                ..Default::default()
            };
            pipe.send(&mut ctx).await.unwrap();
            assert_eq!(ctx.log, vec!["branch"]);
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_route_keys_are_unique_per_registration() {
        let first = RouteKey::next(TypeId::of::<RouteCtx>());
        let second = RouteKey::next(TypeId::of::<RouteCtx>());
        assert_ne!(first, second);
    }
}
