// src/rabbitmq/errors.rs

use std::time::Duration;

use lapin::Error as LapinError;
use thiserror::Error;

use crate::codec::CodecError;
use crate::rabbitmq::request_response::HandlerError;

/// Failure while opening the socket, logging in or opening the channel.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to RabbitMQ at {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: LapinError,
    },

    #[error("Connection to RabbitMQ at {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("Broker refused to open a channel")]
    ChannelOpen(#[source] LapinError),

    #[error("Failed to close connection")]
    Close(#[source] LapinError),
}

#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("Failed to declare queue '{queue}'")]
    Rejected {
        queue: String,
        #[source]
        source: LapinError,
    },

    #[error("Broker returned an empty name for queue declaration '{queue}'")]
    EmptyName { queue: String },
}

/// Abnormal broker reply after setup. Always terminates the consume loop.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Broker rejected basic.consume on '{queue}'")]
    ConsumeRejected {
        queue: String,
        #[source]
        source: LapinError,
    },

    #[error("Broker error while waiting for deliveries")]
    Broker(#[from] LapinError),

    #[error("Delivery stream closed: {reason}")]
    Closed { reason: String },

    #[error("Delivery source was polled before consumption was registered")]
    NotConsuming,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Reply destination is empty")]
    EmptyDestination,

    #[error("Failed to encode reply")]
    Encode(#[from] CodecError),

    #[error("Failed to publish reply to '{destination}'")]
    Broker {
        destination: String,
        #[source]
        source: LapinError,
    },

    #[error("Broker nacked reply to '{destination}'")]
    Nacked { destination: String },

    #[error("Reply channel closed: {0}")]
    ChannelClosed(String),
}

/// Failure on the requesting side. Request encoding failures arrive as
/// `PublishError::Encode`.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Failed to decode reply {delivery_tag}")]
    Decode {
        delivery_tag: u64,
        #[source]
        source: CodecError,
    },
}

/// Everything that can stop a worker. There is no per-request isolation:
/// every variant is fatal.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Failed to decode request {delivery_tag}")]
    Decode {
        delivery_tag: u64,
        #[source]
        source: CodecError,
    },

    #[error("Request {delivery_tag} has no reply-to address")]
    MissingReplyTo { delivery_tag: u64 },

    #[error("Handler failed on request {delivery_tag}")]
    Handler {
        delivery_tag: u64,
        #[source]
        source: HandlerError,
    },

    #[error("Consume loop is closed")]
    LoopClosed,
}
