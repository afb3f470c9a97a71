use async_trait::async_trait;
use futures::StreamExt;
use lapin::{options::BasicConsumeOptions, types::FieldTable, Channel, Consumer};
use tracing::info;
use uuid::Uuid;

use super::envelope::Envelope;
use super::errors::ProtocolError;
use super::queue::QueueName;

/// Where the consume loop pulls deliveries from.
#[async_trait]
pub trait DeliverySource: Send {
    /// Registers the consumer. Called once, before the first `next_envelope`.
    async fn start(&mut self) -> Result<(), ProtocolError>;

    /// Waits for the next delivery. An error means the source is unusable.
    async fn next_envelope(&mut self) -> Result<Envelope, ProtocolError>;
}

/// `basic.consume` on the worker's queue, with auto-ack.
pub struct Subscription {
    channel: Channel,
    queue: QueueName,
    consumer_tag: String,
    consumer: Option<Consumer>,
}

impl Subscription {
    pub fn new(channel: Channel, queue: QueueName, consumer_tag_prefix: &str) -> Self {
        let consumer_tag = format!("{}-{}", consumer_tag_prefix, Uuid::new_v4());
        Self {
            channel,
            queue,
            consumer_tag,
            consumer: None,
        }
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    fn consume_options() -> BasicConsumeOptions {
        BasicConsumeOptions {
            no_local: false,
            no_ack: true,
            exclusive: false,
            nowait: false,
        }
    }
}

#[async_trait]
impl DeliverySource for Subscription {
    async fn start(&mut self) -> Result<(), ProtocolError> {
        let consumer = self
            .channel
            .basic_consume(
                self.queue.as_str(),
                &self.consumer_tag,
                Self::consume_options(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| ProtocolError::ConsumeRejected {
                queue: self.queue.to_string(),
                source,
            })?;

        info!(
            queue = %self.queue,
            consumer_tag = %self.consumer_tag,
            "Started consuming"
        );
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn next_envelope(&mut self) -> Result<Envelope, ProtocolError> {
        let consumer = self.consumer.as_mut().ok_or(ProtocolError::NotConsuming)?;

        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Envelope::decode(delivery)),
            Some(Err(err)) => Err(ProtocolError::Broker(err)),
            None => {
                let reason = if self.channel.status().connected() {
                    format!("consumer {} was cancelled by the broker", self.consumer_tag)
                } else {
                    format!("channel {} was closed", self.channel.id())
                };
                Err(ProtocolError::Closed { reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_options_auto_ack_without_exclusivity() {
        let options = Subscription::consume_options();
        assert!(options.no_ack);
        assert!(!options.exclusive);
        assert!(!options.no_local);
    }
}
