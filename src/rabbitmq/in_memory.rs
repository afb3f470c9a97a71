use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use lapin::BasicProperties;
use tokio::sync::Mutex;

use super::consumer::DeliverySource;
use super::envelope::Envelope;
use super::errors::{ProtocolError, PublishError};
use super::publisher::{OutboundMessage, ReplySink};

/// Scripted delivery source for tests and local pipelines.
///
/// Yields the queued items in order; once drained it behaves like a broker
/// that closed the channel.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    items: VecDeque<Result<Envelope, ProtocolError>>,
    next_tag: u64,
    starts: usize,
    polls: usize,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request, assigning the next delivery tag.
    pub fn push_request(&mut self, properties: BasicProperties, payload: Vec<u8>) -> u64 {
        self.next_tag += 1;
        let envelope = Envelope::from_parts(self.next_tag, "", "in-memory", &properties, payload);
        self.items.push_back(Ok(envelope));
        self.next_tag
    }

    pub fn push_error(&mut self, err: ProtocolError) {
        self.items.push_back(Err(err));
    }

    pub fn starts(&self) -> usize {
        self.starts
    }

    /// How many times the consumer asked for a delivery.
    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl DeliverySource for InMemoryQueue {
    async fn start(&mut self) -> Result<(), ProtocolError> {
        self.starts += 1;
        Ok(())
    }

    async fn next_envelope(&mut self) -> Result<Envelope, ProtocolError> {
        if self.starts == 0 {
            return Err(ProtocolError::NotConsuming);
        }
        self.polls += 1;
        self.items.pop_front().unwrap_or_else(|| {
            Err(ProtocolError::Closed {
                reason: "in-memory queue drained".to_string(),
            })
        })
    }
}

#[derive(Debug, Default)]
struct Published {
    messages: Vec<OutboundMessage>,
    attempts: usize,
}

/// Records replies instead of sending them. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReplies {
    published: Arc<Mutex<Published>>,
    fail_after: Option<usize>,
}

impl InMemoryReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `count` replies, then fails every publish as if the channel
    /// had been closed.
    pub fn failing_after(count: usize) -> Self {
        Self {
            published: Arc::default(),
            fail_after: Some(count),
        }
    }

    pub async fn published(&self) -> Vec<OutboundMessage> {
        self.published.lock().await.messages.clone()
    }

    /// Publish calls that reached this sink, successful or not.
    pub async fn attempts(&self) -> usize {
        self.published.lock().await.attempts
    }
}

#[async_trait]
impl ReplySink for InMemoryReplies {
    #[tracing::instrument(skip_all, fields(destination = %message.destination))]
    async fn publish(&self, message: OutboundMessage) -> Result<(), PublishError> {
        let mut published = self.published.lock().await;
        published.attempts += 1;
        message.check_destination()?;

        if let Some(limit) = self.fail_after {
            if published.messages.len() >= limit {
                return Err(PublishError::ChannelClosed(
                    "in-memory channel closed".to_string(),
                ));
            }
        }

        tracing::debug!(
            correlation_id = ?message.correlation_id,
            bytes = message.payload.len(),
            "Reply recorded"
        );
        published.messages.push(message);
        Ok(())
    }
}
