//! Aggregate registry: command type -> handler registration.
//!
//! Built once at startup from explicit registrations (no reflective
//! scanning), validated eagerly, and immutable thereafter — concurrent
//! lookups are plain reads of a frozen map, no locking involved.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use switchyard_core::{short_type_name, Command, EventDescriptor};

// ---------------------------------------------------------------------------
// Handler metadata
// ---------------------------------------------------------------------------

/// Log level applied at command start and finish.
///
/// Mirrors the per-handler logging policy of the command annotations this
/// design replaces: most handlers log at debug, provisioning-style handlers
/// raise it to info, chatty ones turn it off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLog {
    /// Suppress the start/finish line entirely.
    Off,
    Trace,
    Debug,
    Info,
}

/// Per-registration execution options.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    /// Whether the handler runs inside a transaction (begin before, commit
    /// on success, rollback on error). On by default.
    pub transactional: bool,
    /// Level for the "command started" line.
    pub log_start: CommandLog,
    /// Level for the "command finished" line.
    pub log_finish: CommandLog,
    /// Caller wait timeout override; falls back to the bus default.
    pub timeout_ms: Option<u64>,
    /// Event emitted on success. `None` for commands with no listeners.
    pub emits: Option<EventDescriptor>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            transactional: true,
            log_start: CommandLog::Debug,
            log_finish: CommandLog::Debug,
            timeout_ms: None,
            emits: None,
        }
    }
}

impl HandlerOptions {
    /// Opts this handler out of the transaction bracket.
    #[must_use]
    pub fn without_transaction(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Sets start and finish log levels.
    #[must_use]
    pub fn log(mut self, start: CommandLog, finish: CommandLog) -> Self {
        self.log_start = start;
        self.log_finish = finish;
        self
    }

    /// Overrides the caller wait timeout for this command type.
    #[must_use]
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Declares the event published after a successful commit.
    #[must_use]
    pub fn emits(mut self, descriptor: EventDescriptor) -> Self {
        self.emits = Some(descriptor);
        self
    }
}

// ---------------------------------------------------------------------------
// Erased handler plumbing
// ---------------------------------------------------------------------------

/// Typed handler output after erasure: the value returned to the caller plus
/// the serialized event payload when the registration emits.
pub(crate) struct HandlerOutput {
    pub output: Box<dyn Any + Send>,
    pub payload: Option<Vec<u8>>,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerOutput, anyhow::Error>> + Send>>;
type ErasedHandler = Box<dyn Fn(Box<dyn Any + Send>) -> HandlerFuture + Send + Sync>;

/// One registered handler: erased function plus execution options.
pub struct HandlerRegistration {
    command_name: &'static str,
    options: HandlerOptions,
    handler: ErasedHandler,
}

impl HandlerRegistration {
    /// Short command type name for logs and errors.
    #[must_use]
    pub fn command_name(&self) -> &'static str {
        self.command_name
    }

    /// Execution options declared at registration.
    #[must_use]
    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    /// Invokes the handler with an erased command value.
    pub(crate) fn invoke(&self, command: Box<dyn Any + Send>) -> HandlerFuture {
        (self.handler)(command)
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("command_name", &self.command_name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Startup-time registry configuration fault. Fatal: the service must not
/// come up with an ambiguous command route.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two registrations collide on the same command type.
    #[error("duplicate handler registered for command type {command_name}")]
    DuplicateHandler { command_name: &'static str },
}

/// Collects registrations, then freezes them into an [`AggregateRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(TypeId, Arc<HandlerRegistration>)>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for command type `C` with the given options.
    ///
    /// The handler is an async function of the command value; domain errors
    /// come back as `anyhow::Error` and surface to the caller unchanged.
    /// When the options declare an event descriptor, the handler's output is
    /// serialized (`MsgPack`, named fields) as the event payload.
    #[must_use]
    pub fn register<C, F, Fut>(mut self, options: HandlerOptions, handler: F) -> Self
    where
        C: Command,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C::Output, anyhow::Error>> + Send + 'static,
    {
        let emits = options.emits.is_some();
        let erased: ErasedHandler = Box::new(move |boxed| -> HandlerFuture {
            // Downcast cannot fail for calls routed through the registry
            // (keyed by TypeId), but a mismatch must not take the bus down.
            match boxed.downcast::<C>() {
                Ok(command) => {
                    let fut = handler(*command);
                    Box::pin(async move {
                        let output = fut.await?;
                        let payload = if emits {
                            Some(rmp_serde::to_vec_named(&output)?)
                        } else {
                            None
                        };
                        Ok(HandlerOutput {
                            output: Box::new(output),
                            payload,
                        })
                    })
                }
                Err(_) => Box::pin(async {
                    Err(anyhow::anyhow!("command value does not match registered type"))
                }),
            }
        });

        self.entries.push((
            TypeId::of::<C>(),
            Arc::new(HandlerRegistration {
                command_name: short_type_name::<C>(),
                options,
                handler: erased,
            }),
        ));
        self
    }

    /// Validates and freezes the registrations.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandler`] if two registrations
    /// collide on the same command type. Exactly one handler per type.
    pub fn build(self) -> Result<AggregateRegistry, RegistryError> {
        let mut handlers = HashMap::with_capacity(self.entries.len());
        for (type_id, registration) in self.entries {
            let command_name = registration.command_name;
            if handlers.insert(type_id, registration).is_some() {
                return Err(RegistryError::DuplicateHandler { command_name });
            }
        }
        Ok(AggregateRegistry { handlers })
    }
}

/// Immutable command-type -> handler map. Built once at startup; concurrent
/// resolution needs no locking.
pub struct AggregateRegistry {
    handlers: HashMap<TypeId, Arc<HandlerRegistration>>,
}

impl AggregateRegistry {
    /// Resolves the registration for command type `C`, or `None` if no
    /// handler was registered for it.
    #[must_use]
    pub fn resolve<C: Command>(&self) -> Option<Arc<HandlerRegistration>> {
        self.handlers.get(&TypeId::of::<C>()).cloned()
    }

    /// Number of registered command types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for AggregateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
