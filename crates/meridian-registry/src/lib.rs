//! Agent Registry and Agent Transport: the directory of known agents and
//! the bidirectional channel abstraction dispatch uses to reach them.

mod registry;
mod transport;

pub use registry::{AgentRegistry, RegistryError};
pub use transport::{AgentTransport, InboundMessage, OutboundMessage, TransportConfig};
