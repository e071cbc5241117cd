//! Command execution on top of the replicated store
//!
//! The registry maps operation types to handlers, the dispatcher executes
//! translated envelopes, and [`Storage`] is the facade the rest of the
//! system talks to.

pub mod dispatch;
pub mod errors;
pub mod event;
pub mod handlers;
pub mod registry;
pub mod runtime;
pub mod scanner;

pub use dispatch::Dispatcher;
pub use errors::{Result, StorageError};
pub use event::StorageEvent;
pub use handlers::{default_registry, register_all};
pub use registry::{CommandKind, CommandRegistry, Envelope, Handler, RegistryBuilder};
pub use runtime::Storage;
pub use scanner::WorkflowScanner;
