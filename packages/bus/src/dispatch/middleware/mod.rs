//! Tower middleware layers applied around the command executor.

pub mod load_shed;
pub mod logging;
pub mod timeout;

pub(crate) mod pipeline;

pub use load_shed::{LoadShedLayer, LoadShedService};
pub use logging::{LoggingLayer, LoggingService};
pub use timeout::{TimeoutLayer, TimeoutService};

// ---------------------------------------------------------------------------
// Shared test fixtures
// ---------------------------------------------------------------------------
