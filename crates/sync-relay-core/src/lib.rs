//! Core abstractions for coordinating a fleet of file-sync agents.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionRegistry` - Tracks reachable agents and resolves identity takeover
//! - `RequestCoordinator` - Correlated request/response exchange over any transport
//! - `OutboundQueue` - Store-and-forward mailbox for polling agents
//! - `CommandEnvelope` - The unit of delivery
//! - `PushDelivery` trait - Capability supplied by push-capable transports

pub mod coordinator;
pub mod envelope;
pub mod queue;
pub mod registry;
pub mod session;
pub mod traits;

pub use coordinator::{CoordinatorConfig, CoordinatorError, RequestCoordinator};
pub use envelope::CommandEnvelope;
pub use queue::OutboundQueue;
pub use registry::SessionRegistry;
pub use session::{AgentIdentity, Session, SessionId, TransportKind};
pub use traits::{DeliveryError, PushDelivery};
