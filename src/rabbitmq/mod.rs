// src/rabbitmq/mod.rs
// Broker plumbing for the streaming worker

pub mod errors;
pub mod connection;
pub mod queue;
pub mod envelope;
pub mod consumer;
pub mod publisher;
pub mod request_response;
pub mod requester;
pub mod in_memory;

// Re-export specific items to simplify imports elsewhere
pub use connection::BrokerConnection;
pub use consumer::{DeliverySource, Subscription};
pub use envelope::{Envelope, EnvelopeProperties};
pub use errors::{
    ConnectionError, DeclarationError, ProtocolError, PublishError, RequestError, WorkerError,
};
pub use in_memory::{InMemoryQueue, InMemoryReplies};
pub use publisher::{OutboundMessage, ReplyPublisher, ReplySink};
pub use queue::{declare_queue, QueueName};
pub use requester::Requester;
pub use request_response::{ConsumeLoop, Dispatch, Emit, Handler, HandlerError, LoopState};
