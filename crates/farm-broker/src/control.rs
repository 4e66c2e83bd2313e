use farm_model::ControlMessage;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Consumer,
    options::{BasicConsumeOptions, BasicPublishOptions},
    types::{FieldTable, ShortString},
};
use tracing::trace;

use crate::{BrokerError, topology};

/// Publishes control messages on the control exchange.
#[derive(Clone)]
pub struct ControlPublisher {
    channel: Channel,
    exchange: String,
}

impl ControlPublisher {
    pub async fn declare(channel: Channel, exchange: impl Into<String>) -> Result<Self, BrokerError> {
        let exchange = exchange.into();
        topology::declare_control_exchange(&channel, &exchange).await?;
        Ok(Self { channel, exchange })
    }

    pub async fn send(&self, routing_key: &str, msg: &ControlMessage) -> Result<(), BrokerError> {
        let body = msg.to_bytes()?;
        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type(ShortString::from("application/json")),
            )
            .await?
            .await?;
        trace!(target: "farm.broker.control", routing_key, kind = msg.kind(), "control message sent");
        Ok(())
    }
}

/// Consumer of one control queue. Control messages are consumed without acknowledgment.
pub struct ControlQueue {
    name: String,
    consumer: Consumer,
}

impl ControlQueue {
    /// Declares `queue` (empty for a server-named exclusive queue), binds it to `keys` and
    /// starts consuming.
    pub async fn open(
        channel: &Channel,
        exchange: &str,
        queue: &str,
        keys: &[String],
        consumer_tag: &str,
    ) -> Result<Self, BrokerError> {
        let name = topology::declare_control_queue(channel, exchange, queue, keys).await?;
        let consumer = channel
            .basic_consume(
                &name,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(Self { name, consumer })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next control message; `None` once the consumer is closed.
    pub async fn next(&mut self) -> Option<Result<ControlMessage, BrokerError>> {
        let delivery = match self.consumer.next().await? {
            Ok(d) => d,
            Err(e) => return Some(Err(e.into())),
        };
        Some(ControlMessage::from_bytes(&delivery.data).map_err(BrokerError::from))
    }
}
