//! Registry event mapping and dispatch.
//!
//! Raw logs from the three registry contracts (agent registry, scanner registry,
//! dispatch) are classified by source address and topic signature, decoded through the
//! generated ABI bindings, converted into typed [`messages`] and routed to the handlers
//! the caller registered for each message kind.

pub mod contracts;
pub mod messages;

mod listener;
mod resolver;

pub use listener::{Handlers, Listener, ListenerConfig};
pub use messages::{
    Action, AgentMessage, AgentSaveMessage, DispatchMessage, ScannerMessage, ScannerSaveMessage,
};
pub use resolver::{RegistryContracts, RegistryResolver, StaticResolver};
