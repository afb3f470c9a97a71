use lapin::{message::Delivery, BasicProperties};

/// The subset of AMQP basic properties the worker routes on.
///
/// Absent properties stay `None`; nothing is defaulted to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeProperties {
    pub content_type: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
}

impl From<&BasicProperties> for EnvelopeProperties {
    fn from(properties: &BasicProperties) -> Self {
        Self {
            content_type: properties
                .content_type()
                .as_ref()
                .map(|value| value.as_str().to_owned()),
            correlation_id: properties
                .correlation_id()
                .as_ref()
                .map(|value| value.as_str().to_owned()),
            reply_to: properties
                .reply_to()
                .as_ref()
                .map(|value| value.as_str().to_owned()),
        }
    }
}

/// One decoded delivery. Immutable once built; the payload is handed to the
/// request codec and dropped after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    delivery_tag: u64,
    exchange: String,
    routing_key: String,
    redelivered: bool,
    properties: EnvelopeProperties,
    payload: Vec<u8>,
}

impl Envelope {
    /// Decode a raw lapin delivery. Total: malformed frames never reach here.
    pub fn decode(delivery: Delivery) -> Self {
        let Delivery {
            delivery_tag,
            exchange,
            routing_key,
            redelivered,
            properties,
            data,
            ..
        } = delivery;

        let mut envelope = Self::from_parts(
            delivery_tag,
            exchange.as_str(),
            routing_key.as_str(),
            &properties,
            data,
        );
        envelope.redelivered = redelivered;
        envelope
    }

    pub fn from_parts(
        delivery_tag: u64,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            delivery_tag,
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            redelivered: false,
            properties: properties.into(),
            payload,
        }
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub fn properties(&self) -> &EnvelopeProperties {
        &self.properties
    }

    pub fn content_type(&self) -> Option<&str> {
        self.properties.content_type.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.properties.correlation_id.as_deref()
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.properties.reply_to.as_deref()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}
