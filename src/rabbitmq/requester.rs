//! The requesting side of a streaming exchange.
//!
//! A [`Requester`] publishes a request carrying a fresh correlation id and
//! its own reply queue, then yields the replies that carry that id. Replies
//! tagged for another request are skipped. The stream has no terminal
//! marker: callers take as many replies as they asked for.

use futures::stream::{self, LocalBoxStream, StreamExt};
use lapin::Channel;
use tracing::{debug, info};
use uuid::Uuid;

use super::consumer::{DeliverySource, Subscription};
use super::errors::{DeclarationError, PublishError, RequestError};
use super::publisher::{OutboundMessage, ReplyPublisher, ReplySink};
use super::queue::declare_queue;
use crate::codec::{Codec, JsonCodec};

const REQUESTER_TAG_PREFIX: &str = "fluid-requester";

pub struct Requester<S, P, C> {
    replies: S,
    sink: P,
    codec: C,
    request_queue: String,
    reply_to: String,
    listening: bool,
}

impl Requester<Subscription, ReplyPublisher, JsonCodec> {
    /// Declares a broker-named reply queue on `channel` and sends requests
    /// to `request_queue` through the default exchange.
    pub async fn on_channel(channel: &Channel, request_queue: &str) -> Result<Self, DeclarationError> {
        let reply_queue = declare_queue(channel, "").await?;
        let reply_to = reply_queue.to_string();
        let replies = Subscription::new(channel.clone(), reply_queue, REQUESTER_TAG_PREFIX);
        let sink = ReplyPublisher::new(channel.clone(), false);
        Ok(Self::new(replies, sink, JsonCodec, request_queue, &reply_to))
    }
}

impl<S, P, C> Requester<S, P, C>
where
    S: DeliverySource,
    P: ReplySink,
{
    pub fn new(replies: S, sink: P, codec: C, request_queue: &str, reply_to: &str) -> Self {
        Self {
            replies,
            sink,
            codec,
            request_queue: request_queue.to_owned(),
            reply_to: reply_to.to_owned(),
            listening: false,
        }
    }

    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    /// Publishes `request` under a new UUID correlation id.
    pub async fn request<Req, Rep>(
        &mut self,
        request: &Req,
    ) -> Result<LocalBoxStream<'_, Result<Rep, RequestError>>, RequestError>
    where
        C: Codec<Req> + Codec<Rep>,
        Rep: 'static,
    {
        self.request_correlated(Uuid::new_v4().to_string(), request)
            .await
    }

    /// Publishes `request` under `correlation_id` and returns its replies.
    ///
    /// A receive error is yielded once and ends the stream; an undecodable
    /// reply is yielded and the stream goes on.
    pub async fn request_correlated<Req, Rep>(
        &mut self,
        correlation_id: String,
        request: &Req,
    ) -> Result<LocalBoxStream<'_, Result<Rep, RequestError>>, RequestError>
    where
        C: Codec<Req> + Codec<Rep>,
        Rep: 'static,
    {
        // Listen before publishing so no reply can outrun the consumer.
        if !self.listening {
            self.replies.start().await?;
            self.listening = true;
        }

        let payload = Codec::<Req>::encode(&self.codec, request).map_err(PublishError::from)?;
        let message = OutboundMessage {
            destination: self.request_queue.clone(),
            correlation_id: Some(correlation_id.clone()),
            reply_to: Some(self.reply_to.clone()),
            content_type: Codec::<Req>::content_type(&self.codec).map(str::to_owned),
            payload,
        };
        self.sink.publish(message).await?;
        info!(
            queue = %self.request_queue,
            reply_to = %self.reply_to,
            correlation_id = %correlation_id,
            "Request published"
        );

        Ok(self.replies_for(correlation_id))
    }

    fn replies_for<Rep>(&mut self, correlation_id: String) -> LocalBoxStream<'_, Result<Rep, RequestError>>
    where
        C: Codec<Rep>,
        Rep: 'static,
    {
        stream::unfold(Some(self), move |state| {
            let correlation_id = correlation_id.clone();
            async move {
                let Some(this) = state else {
                    return None;
                };
                loop {
                    let envelope = match this.replies.next_envelope().await {
                        Ok(envelope) => envelope,
                        Err(err) => return Some((Err(RequestError::from(err)), None)),
                    };
                    if envelope.correlation_id() != Some(correlation_id.as_str()) {
                        debug!(
                            delivery_tag = envelope.delivery_tag(),
                            correlation_id = ?envelope.correlation_id(),
                            "Skipping reply for another request"
                        );
                        continue;
                    }

                    let reply = Codec::<Rep>::decode(&this.codec, envelope.payload()).map_err(
                        |source| RequestError::Decode {
                            delivery_tag: envelope.delivery_tag(),
                            source,
                        },
                    );
                    return Some((reply, Some(this)));
                }
            }
        })
        .boxed_local()
    }
}
