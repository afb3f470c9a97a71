use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, BasicProperties, Channel};
use tracing::debug;

use super::errors::PublishError;

/// A message for the default exchange: a reply built for one `emit` call,
/// or a request carrying the queue its replies should go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub destination: String,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub content_type: Option<String>,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn check_destination(&self) -> Result<(), PublishError> {
        if self.destination.is_empty() {
            return Err(PublishError::EmptyDestination);
        }
        Ok(())
    }
}

/// Where replies go. Calls complete in order: a second `publish` is only
/// issued after the first one returned.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<(), PublishError>;
}

/// Publishes replies through the default exchange, using the destination as
/// routing key.
pub struct ReplyPublisher {
    channel: Channel,
    confirms: bool,
}

impl ReplyPublisher {
    /// `confirms` must match whether `confirm.select` was issued on `channel`.
    pub fn new(channel: Channel, confirms: bool) -> Self {
        Self { channel, confirms }
    }

    fn properties(message: &OutboundMessage) -> BasicProperties {
        let mut properties =
            BasicProperties::default().with_timestamp(chrono::Utc::now().timestamp() as u64);

        if let Some(correlation_id) = &message.correlation_id {
            properties = properties.with_correlation_id(correlation_id.clone().into());
        }
        if let Some(reply_to) = &message.reply_to {
            properties = properties.with_reply_to(reply_to.clone().into());
        }
        if let Some(content_type) = &message.content_type {
            properties = properties.with_content_type(content_type.clone().into());
        }
        properties
    }
}

#[async_trait]
impl ReplySink for ReplyPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<(), PublishError> {
        message.check_destination()?;

        if !self.channel.status().connected() {
            return Err(PublishError::ChannelClosed(format!(
                "channel {} is not connected",
                self.channel.id()
            )));
        }

        let properties = Self::properties(&message);
        let confirm = self
            .channel
            .basic_publish(
                "",
                &message.destination,
                BasicPublishOptions::default(),
                &message.payload,
                properties,
            )
            .await
            .map_err(|source| PublishError::Broker {
                destination: message.destination.clone(),
                source,
            })?;

        if self.confirms {
            let confirmation = confirm.await.map_err(|source| PublishError::Broker {
                destination: message.destination.clone(),
                source,
            })?;
            if confirmation.is_nack() {
                return Err(PublishError::Nacked {
                    destination: message.destination,
                });
            }
        }

        debug!(
            destination = %message.destination,
            correlation_id = ?message.correlation_id,
            bytes = message.payload.len(),
            "Published reply"
        );
        Ok(())
    }
}
