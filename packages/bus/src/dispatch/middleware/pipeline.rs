//! Pipeline composition: combines the middleware layers into the dispatch
//! service stack.

use tower::Layer;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::logging::{LoggingLayer, LoggingService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::config::BusConfig;
use crate::dispatch::executor::CommandExecutor;

/// Concrete middleware stack around the executor. Nameable (the gateway
/// stores one) and `Clone` (one clone per dispatch).
pub(crate) type DispatchPipeline =
    LoadShedService<TimeoutService<LoggingService<CommandExecutor>>>;

/// Build the dispatch pipeline by wrapping the executor with middleware.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `TimeoutLayer` -- bound the caller's wait per command
/// 3. `LoggingLayer` -- span + start/finish lines (closest to the executor)
#[must_use]
pub(crate) fn build_dispatch_pipeline(
    executor: CommandExecutor,
    config: &BusConfig,
) -> DispatchPipeline {
    let logged = LoggingLayer.layer(executor);
    let bounded = TimeoutLayer.layer(logged);
    LoadShedLayer::new(config.max_concurrent_commands).layer(bounded)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
