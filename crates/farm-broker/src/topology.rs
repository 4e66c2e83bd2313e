//! Queue and exchange declarations.
use lapin::{
    Channel, ExchangeKind,
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
};

use crate::BrokerError;

pub fn supervisor_key(manager_id: &str) -> String {
    format!("supervisor.{manager_id}")
}

pub fn worker_key(worker_id: &str) -> String {
    format!("worker.{worker_id}")
}

pub fn broadcast_key(manager_id: &str) -> String {
    format!("workers.{manager_id}")
}

pub fn supervisor_queue(manager_id: &str) -> String {
    format!("farm.control.supervisor.{manager_id}")
}

/// Declares the durable job queue; returns its current depth.
pub async fn declare_jobs_queue(channel: &Channel, name: &str) -> Result<u32, BrokerError> {
    let queue = channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(queue.message_count())
}

/// Reads the job queue depth without creating or altering the queue.
pub async fn queue_depth(channel: &Channel, name: &str) -> Result<u32, BrokerError> {
    let queue = channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                passive: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(queue.message_count())
}

pub async fn declare_control_exchange(channel: &Channel, name: &str) -> Result<(), BrokerError> {
    channel
        .exchange_declare(
            name,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// Declares a queue bound to `keys` on the control exchange.
///
/// An empty `queue` name asks the broker for an exclusive, server-named queue.
pub async fn declare_control_queue(
    channel: &Channel,
    exchange: &str,
    queue: &str,
    keys: &[String],
) -> Result<String, BrokerError> {
    declare_control_exchange(channel, exchange).await?;
    let options = if queue.is_empty() {
        QueueDeclareOptions {
            exclusive: true,
            auto_delete: true,
            ..Default::default()
        }
    } else {
        QueueDeclareOptions {
            auto_delete: true,
            ..Default::default()
        }
    };
    let declared = channel
        .queue_declare(queue, options, FieldTable::default())
        .await?;
    let name = declared.name().as_str().to_string();
    for key in keys {
        channel
            .queue_bind(
                &name,
                exchange,
                key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_keys() {
        assert_eq!(supervisor_key("manager_1_2"), "supervisor.manager_1_2");
        assert_eq!(worker_key("worker_3_4"), "worker.worker_3_4");
        assert_eq!(broadcast_key("manager_1_2"), "workers.manager_1_2");
        assert_eq!(supervisor_queue("m"), "farm.control.supervisor.m");
    }
}
