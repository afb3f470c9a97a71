//! Streaming request/reply over a single queue.
//!
//! [`ConsumeLoop`] pulls one [`Envelope`] at a time from a [`DeliverySource`],
//! decodes the request with a [`Codec`] and hands it to a [`Handler`] together
//! with an [`Emit`] port. Every result the handler emits is encoded and
//! published to the envelope's `reply-to`, tagged with its `correlation-id`.
//!
//! The handler runs to completion before the next delivery is fetched, so
//! replies of two requests never interleave. Any error ends the loop.

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::consumer::DeliverySource;
use super::envelope::Envelope;
use super::errors::{ProtocolError, PublishError, WorkerError};
use super::publisher::{OutboundMessage, ReplySink};
use crate::codec::Codec;
use crate::config::MissingReplyTo;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// The computation behind the queue.
///
/// `handle` owns everything it allocates for a request; it must release those
/// resources before returning, whether or not an emit failed.
#[async_trait]
pub trait Handler: Send {
    type Request: Send + 'static;
    type Reply: Send + Sync + 'static;

    async fn handle(
        &mut self,
        request: Self::Request,
        emit: &mut Emit<'_, Self::Reply>,
    ) -> Result<(), HandlerError>;
}

enum ReplyRoute {
    To {
        destination: String,
        correlation_id: Option<String>,
    },
    Discard,
}

/// Reply port for one request.
pub struct Emit<'a, R> {
    sink: &'a dyn ReplySink,
    codec: &'a dyn Codec<R>,
    route: ReplyRoute,
    sent: usize,
    discarded: usize,
}

impl<'a, R> Emit<'a, R> {
    pub fn new(
        sink: &'a dyn ReplySink,
        codec: &'a dyn Codec<R>,
        destination: &str,
        correlation_id: Option<&str>,
    ) -> Self {
        Self {
            sink,
            codec,
            route: ReplyRoute::To {
                destination: destination.to_owned(),
                correlation_id: correlation_id.map(str::to_owned),
            },
            sent: 0,
            discarded: 0,
        }
    }

    /// A port that accepts results and publishes nothing.
    pub fn discarding(sink: &'a dyn ReplySink, codec: &'a dyn Codec<R>) -> Self {
        Self {
            sink,
            codec,
            route: ReplyRoute::Discard,
            sent: 0,
            discarded: 0,
        }
    }

    /// Encodes and publishes `reply`, returning once the publish completed.
    pub async fn emit(&mut self, reply: &R) -> Result<(), PublishError> {
        let (destination, correlation_id) = match &self.route {
            ReplyRoute::Discard => {
                self.discarded += 1;
                return Ok(());
            }
            ReplyRoute::To {
                destination,
                correlation_id,
            } => (destination.clone(), correlation_id.clone()),
        };

        let payload = self.codec.encode(reply)?;
        let message = OutboundMessage {
            destination,
            correlation_id,
            reply_to: None,
            content_type: self.codec.content_type().map(str::to_owned),
            payload,
        };
        self.sink.publish(message).await?;
        self.sent += 1;
        Ok(())
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Waiting,
    Dispatching,
    Closed,
}

/// Outcome of one handled delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub delivery_tag: u64,
    pub replies: usize,
    pub discarded: usize,
}

pub struct ConsumeLoop<S, P, C, H> {
    source: S,
    sink: P,
    codec: C,
    handler: H,
    missing_reply_to: MissingReplyTo,
    state: LoopState,
}

impl<S, P, C, H> ConsumeLoop<S, P, C, H>
where
    S: DeliverySource,
    P: ReplySink,
    H: Handler,
    C: Codec<H::Request> + Codec<H::Reply>,
{
    pub fn new(source: S, sink: P, codec: C, handler: H) -> Self {
        Self {
            source,
            sink,
            codec,
            handler,
            missing_reply_to: MissingReplyTo::default(),
            state: LoopState::Idle,
        }
    }

    pub fn with_missing_reply_to(mut self, policy: MissingReplyTo) -> Self {
        self.missing_reply_to = policy;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Waits for one delivery and handles it.
    pub async fn run_once(&mut self) -> Result<Dispatch, WorkerError> {
        self.ensure_started().await?;
        let received = self.source.next_envelope().await;
        let envelope = self.on_received(received)?;
        self.dispatch(envelope).await
    }

    /// Handles deliveries until an error occurs. Never returns `Ok`.
    pub async fn run(&mut self) -> Result<(), WorkerError> {
        self.run_until(std::future::pending()).await
    }

    /// Handles deliveries until `shutdown` resolves or an error occurs.
    ///
    /// `shutdown` is only observed while waiting for a delivery; a request
    /// that is being handled always runs to completion.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), WorkerError>
    where
        F: Future<Output = ()>,
    {
        self.ensure_started().await?;
        tokio::pin!(shutdown);

        loop {
            let received = tokio::select! {
                biased;
                () = &mut shutdown => None,
                received = self.source.next_envelope() => Some(received),
            };

            let Some(received) = received else {
                info!("Shutdown requested, leaving consume loop");
                self.state = LoopState::Closed;
                return Ok(());
            };

            let envelope = self.on_received(received)?;
            self.dispatch(envelope).await?;
        }
    }

    async fn ensure_started(&mut self) -> Result<(), WorkerError> {
        match self.state {
            LoopState::Idle => {
                if let Err(err) = self.source.start().await {
                    return Err(self.close(err.into()));
                }
                self.state = LoopState::Waiting;
                Ok(())
            }
            LoopState::Closed => Err(WorkerError::LoopClosed),
            LoopState::Waiting | LoopState::Dispatching => Ok(()),
        }
    }

    fn on_received(
        &mut self,
        received: Result<Envelope, ProtocolError>,
    ) -> Result<Envelope, WorkerError> {
        received.map_err(|err| self.close(err.into()))
    }

    async fn dispatch(&mut self, envelope: Envelope) -> Result<Dispatch, WorkerError> {
        self.state = LoopState::Dispatching;
        log_delivery(&envelope);

        match self.handle_envelope(&envelope).await {
            Ok(dispatch) => {
                self.state = LoopState::Waiting;
                Ok(dispatch)
            }
            Err(err) => Err(self.close(err)),
        }
    }

    async fn handle_envelope(&mut self, envelope: &Envelope) -> Result<Dispatch, WorkerError> {
        let delivery_tag = envelope.delivery_tag();
        let reply_to = envelope.reply_to().filter(|destination| !destination.is_empty());

        if reply_to.is_none() && self.missing_reply_to == MissingReplyTo::Reject {
            return Err(WorkerError::MissingReplyTo { delivery_tag });
        }

        let request = Codec::<H::Request>::decode(&self.codec, envelope.payload())
            .map_err(|source| WorkerError::Decode {
                delivery_tag,
                source,
            })?;

        let reply_codec: &dyn Codec<H::Reply> = &self.codec;
        let mut emit = match reply_to {
            Some(destination) => Emit::new(
                &self.sink,
                reply_codec,
                destination,
                envelope.correlation_id(),
            ),
            None => Emit::discarding(&self.sink, reply_codec),
        };

        let outcome = self.handler.handle(request, &mut emit).await;
        let (replies, discarded) = (emit.sent(), emit.discarded());

        if discarded > 0 {
            warn!(
                delivery_tag,
                discarded, "Request had no reply-to address, results were dropped"
            );
        }

        match outcome {
            Ok(()) => {
                debug!(delivery_tag, replies, "Request handled");
                Ok(Dispatch {
                    delivery_tag,
                    replies,
                    discarded,
                })
            }
            Err(HandlerError::Publish(err)) => Err(WorkerError::Publish(err)),
            Err(source) => Err(WorkerError::Handler {
                delivery_tag,
                source,
            }),
        }
    }

    fn close(&mut self, err: WorkerError) -> WorkerError {
        error!(
            error = &err as &(dyn std::error::Error + 'static),
            "Consume loop closed"
        );
        self.state = LoopState::Closed;
        err
    }
}

fn log_delivery(envelope: &Envelope) {
    info!(
        delivery_tag = envelope.delivery_tag(),
        exchange = envelope.exchange(),
        routing_key = envelope.routing_key(),
        content_type = ?envelope.content_type(),
        correlation_id = ?envelope.correlation_id(),
        reply_to = ?envelope.reply_to(),
        bytes = envelope.payload().len(),
        "Delivery received"
    );
}
