use async_trait::async_trait;
use farm_core::{AckError, Acker};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
};

use crate::BrokerError;

/// Acknowledges one delivery on the channel it arrived on.
pub struct DeliveryAcker(lapin::acker::Acker);

impl DeliveryAcker {
    pub fn new(acker: lapin::acker::Acker) -> Self {
        Self(acker)
    }
}

#[async_trait]
impl Acker for DeliveryAcker {
    async fn ack(&self) -> Result<(), AckError> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| AckError::Transport(e.to_string()))
    }
}

/// Hands a delivery back to the broker for redelivery.
pub async fn requeue(delivery: &Delivery) -> Result<(), BrokerError> {
    delivery
        .acker
        .nack(BasicNackOptions {
            requeue: true,
            ..Default::default()
        })
        .await?;
    Ok(())
}
