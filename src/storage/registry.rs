//! Command Dispatch Registry
//!
//! Maps every operation type to its handler and its read/write
//! classification, and translates typed requests into the envelopes the
//! replicated store executes.
//!
//! The table is assembled once with [`RegistryBuilder`] at startup and is
//! immutable afterwards; it is shared through `Arc` with no locking.
//! Wiring mistakes (registering a type twice, dispatching a type nobody
//! registered) are bugs in the build, so they panic instead of returning an
//! error.

use crate::rpc::{MessageType, Request};
use crate::storage::errors::Result;
use crate::store::ShardData;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Whether a command may be served from a read lease or must be committed
/// through the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Read,
    Write,
}

pub type ReadHandler = Arc<dyn Fn(&ShardData, &[u8]) -> Result<Vec<u8>> + Send + Sync>;
pub type WriteHandler = Arc<dyn Fn(&mut ShardData, &[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// A registered handler. The variant fixes the classification.
#[derive(Clone)]
pub enum Handler {
    Read(ReadHandler),
    Write(WriteHandler),
}

impl Handler {
    pub fn kind(&self) -> CommandKind {
        match self {
            Handler::Read(_) => CommandKind::Read,
            Handler::Write(_) => CommandKind::Write,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{:?}", self.kind())
    }
}

/// A command ready for the replicated store.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub message_type: MessageType,
    /// Routing key; decides which shard orders the command
    pub key: Vec<u8>,
    pub kind: CommandKind,
    /// Serialized request body handed to the handler
    pub payload: Vec<u8>,
}

struct Registration {
    name: &'static str,
    handler: Handler,
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<MessageType, Registration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `message_type`.
    ///
    /// # Panics
    /// If a handler is already registered for `message_type`.
    pub fn register(&mut self, message_type: MessageType, name: &'static str, handler: Handler) -> &mut Self {
        if let Some(existing) = self.entries.get(&message_type) {
            panic!(
                "handler for {:?} already registered as '{}', cannot register '{}'",
                message_type, existing.name, name
            );
        }
        self.entries.insert(message_type, Registration { name, handler });
        self
    }

    pub fn register_read<F>(&mut self, message_type: MessageType, name: &'static str, handler: F) -> &mut Self
    where
        F: Fn(&ShardData, &[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.register(message_type, name, Handler::Read(Arc::new(handler)))
    }

    pub fn register_write<F>(&mut self, message_type: MessageType, name: &'static str, handler: F) -> &mut Self
    where
        F: Fn(&mut ShardData, &[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.register(message_type, name, Handler::Write(Arc::new(handler)))
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            entries: self.entries,
        }
    }
}

/// Immutable operation table.
pub struct CommandRegistry {
    entries: HashMap<MessageType, Registration>,
}

impl CommandRegistry {
    /// Translate a typed request into an envelope.
    ///
    /// # Panics
    /// If no handler is registered for the request's type.
    pub fn translate(&self, request: &Request) -> Result<Envelope> {
        let message_type = request.message_type();
        let kind = self.handler(message_type).kind();
        Ok(Envelope {
            message_type,
            key: request.routing_key(),
            kind,
            payload: request.encode_body()?,
        })
    }

    /// Handler registered for `message_type`.
    ///
    /// # Panics
    /// If no handler is registered for `message_type`.
    pub fn handler(&self, message_type: MessageType) -> &Handler {
        match self.entries.get(&message_type) {
            Some(registration) => &registration.handler,
            None => panic!("no handler registered for {:?}", message_type),
        }
    }

    pub fn kind(&self, message_type: MessageType) -> Option<CommandKind> {
        self.entries.get(&message_type).map(|r| r.handler.kind())
    }

    pub fn name(&self, message_type: MessageType) -> Option<&'static str> {
        self.entries.get(&message_type).map(|r| r.name)
    }

    pub fn contains(&self, message_type: MessageType) -> bool {
        self.entries.contains_key(&message_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
