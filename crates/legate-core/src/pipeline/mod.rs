//! Middleware pipelines: ordered stage chains with routed branches.
//!
//! A pipeline is configured once through [`PipeConfigurator`], frozen into
//! an immutable [`Pipe`], and shared by every dispatch that follows. Stages
//! implement [`Filter`] and wrap the continuation they are handed; routed
//! branches divert matching contexts through nested stage lists and tee
//! back into the outer chain.

mod configurator;
mod filter;
mod pipe;
mod retry;
mod routing;

pub use configurator::PipeConfigurator;
pub use filter::Filter;
pub use pipe::Pipe;
pub use retry::RetryPolicy;
