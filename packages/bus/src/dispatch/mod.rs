//! Command routing and execution framework.
//!
//! This module implements the dispatch pipeline:
//!
//! 1. **Registry** (`registry`): command type -> handler registration,
//!    frozen at startup
//! 2. **Call** (`call`): the erased dispatch unit and error taxonomy
//! 3. **Middleware** (`middleware`): Tower layers (load-shedding, timeout,
//!    logging)
//! 4. **Executor** (`executor`): context scope + transaction bracket +
//!    commit-then-publish
//! 5. **Gateway** (`gateway`): the public `process` / `process_detached`
//!    entry points

pub mod call;
pub mod executor;
pub mod gateway;
pub mod middleware;
pub mod registry;

// Re-export key types for convenient access.
pub use call::{CommandCall, CommandError, CommandOutcome};
pub use executor::CommandExecutor;
pub use gateway::{CommandGateway, CommandHandle};
pub use registry::{
    AggregateRegistry, CommandLog, HandlerOptions, HandlerRegistration, RegistryBuilder,
    RegistryError,
};
