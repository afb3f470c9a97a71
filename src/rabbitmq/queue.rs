use std::fmt;

use lapin::{options::QueueDeclareOptions, types::FieldTable, Channel};
use tracing::info;

use super::errors::DeclarationError;

/// Name of a declared queue, as confirmed by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueName(String);

impl QueueName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flags for the worker's inbound queue: lives with the connection, gone
/// once unused.
pub fn declare_options() -> QueueDeclareOptions {
    QueueDeclareOptions {
        passive: false,
        durable: false,
        exclusive: false,
        auto_delete: true,
        nowait: false,
    }
}

/// Declares `name` on `channel`, or a broker-named queue when `name` is empty.
///
/// The queue is reachable through the default exchange with its name as
/// routing key, so no explicit bind is issued.
pub async fn declare_queue(channel: &Channel, name: &str) -> Result<QueueName, DeclarationError> {
    let queue = channel
        .queue_declare(name, declare_options(), FieldTable::default())
        .await
        .map_err(|source| DeclarationError::Rejected {
            queue: name.to_string(),
            source,
        })?;

    let declared = confirmed_name(name, queue.name().as_str())?;
    info!(
        queue = %declared,
        messages = queue.message_count(),
        consumers = queue.consumer_count(),
        "Declared queue"
    );
    Ok(declared)
}

/// The broker's answer wins over the requested name; for an anonymous
/// declaration it is the only name the queue has.
fn confirmed_name(requested: &str, declared: &str) -> Result<QueueName, DeclarationError> {
    if declared.is_empty() {
        return Err(DeclarationError::EmptyName {
            queue: requested.to_string(),
        });
    }
    Ok(QueueName(declared.to_string()))
}
