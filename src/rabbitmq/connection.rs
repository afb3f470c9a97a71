use lapin::{options::ConfirmSelectOptions, Channel, Connection, ConnectionProperties};
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use super::errors::ConnectionError;
use crate::config::ConnectionConfig;

/// AMQP `reply-success`.
const REPLY_SUCCESS: u16 = 200;

/// One broker connection owning exactly one channel.
///
/// Setup is all-or-nothing: if any step fails the partial connection is
/// dropped and the caller has to call [`BrokerConnection::connect`] again.
pub struct BrokerConnection {
    connection: Connection,
    channel: Channel,
    endpoint: String,
}

impl BrokerConnection {
    /// Socket open and login, then channel open. Optionally switches the
    /// channel into publisher-confirm mode.
    #[instrument(skip_all, fields(endpoint = %config.endpoint()))]
    pub async fn connect(
        config: &ConnectionConfig,
        publisher_confirms: bool,
    ) -> Result<Self, ConnectionError> {
        let endpoint = config.endpoint();
        let connect_timeout = config.connect_timeout();
        info!("Connecting to RabbitMQ at {}", endpoint);

        let connection = timeout(
            connect_timeout,
            Connection::connect_uri(config.amqp_uri(), connection_properties()),
        )
        .await
        .map_err(|_| ConnectionError::Timeout {
            endpoint: endpoint.clone(),
            timeout: connect_timeout,
        })?
        .map_err(|source| ConnectionError::Connect {
            endpoint: endpoint.clone(),
            source,
        })?;

        debug!("Logged in, opening channel");
        let channel = connection
            .create_channel()
            .await
            .map_err(ConnectionError::ChannelOpen)?;

        if publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(ConnectionError::ChannelOpen)?;
            debug!(channel_id = channel.id(), "Publisher confirms enabled");
        }

        info!(channel_id = channel.id(), "Connected to RabbitMQ");
        Ok(Self {
            connection,
            channel,
            endpoint,
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    /// Closes the channel, then the connection.
    pub async fn close(self) -> Result<(), ConnectionError> {
        info!("Closing RabbitMQ connection to {}", self.endpoint);
        if self.channel.status().connected() {
            self.channel
                .close(REPLY_SUCCESS, "worker shutting down")
                .await
                .map_err(ConnectionError::Close)?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(REPLY_SUCCESS, "worker shutting down")
                .await
                .map_err(ConnectionError::Close)?;
        }
        Ok(())
    }
}

fn connection_properties() -> ConnectionProperties {
    ConnectionProperties::default().with_connection_name("fluid-stream-worker".into())
}
