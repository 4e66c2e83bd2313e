use std::time::Duration;

use farm_core::{EncodedJob, FarmConfig, JobCodec, JobRequest};
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{BrokerError, BrokerLink, job_properties, topology};

/// Sends jobs to the durable job queue.
///
/// Each publish opens its own connection and closes it before returning, whatever the outcome.
#[derive(Clone, Debug)]
pub struct Publisher {
    url: String,
    queue: String,
    ttl: Duration,
    codec: JobCodec,
}

impl Publisher {
    pub fn new(cfg: &FarmConfig) -> Self {
        Self {
            url: cfg.broker_url.clone(),
            queue: cfg.jobs_queue.clone(),
            ttl: cfg.task_ttl,
            codec: JobCodec::from_config(cfg),
        }
    }

    /// Validates and encodes `req` without sending it.
    pub fn prepare(&self, req: &JobRequest) -> Result<EncodedJob, BrokerError> {
        Ok(self.codec.encode(req)?)
    }

    /// Encodes and publishes `req`, waiting for the broker's confirmation.
    pub async fn publish(&self, req: &JobRequest) -> Result<(), BrokerError> {
        let job = self.prepare(req)?;
        self.send(job).await
    }

    /// Validates `req` now and publishes it in the background.
    ///
    /// Validation errors are returned immediately; the publish outcome is only observable
    /// through the returned handle.
    pub fn enqueue(&self, req: &JobRequest) -> Result<JoinHandle<Result<(), BrokerError>>, BrokerError> {
        let job = self.prepare(req)?;
        let this = self.clone();
        Ok(tokio::spawn(async move {
            let reference = job.callable_reference.clone();
            let res = this.send(job).await;
            if let Err(e) = &res {
                warn!(target: "farm.broker.publisher", callable = %reference, error = %e, "enqueue failed");
            }
            res
        }))
    }

    async fn send(&self, job: EncodedJob) -> Result<(), BrokerError> {
        let link = BrokerLink::connect(&self.url, "publisher").await?;
        let res = self.send_on(&link, &job).await;
        link.close().await;
        res
    }

    async fn send_on(&self, link: &BrokerLink, job: &EncodedJob) -> Result<(), BrokerError> {
        let channel = link.channel();
        topology::declare_jobs_queue(channel, &self.queue).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        let message_id = uuid::Uuid::new_v4().to_string();
        let props = job_properties(&job.headers, self.ttl, &message_id);
        let confirm = channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &job.body,
                props,
            )
            .await?
            .await?;
        if confirm.is_nack() {
            return Err(BrokerError::Nacked);
        }

        debug!(target: "farm.broker.publisher", callable = %job.callable_reference, message_id = %message_id, size = job.body.len(), "job published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use farm_core::CoreError;

    use super::*;

    #[test]
    fn validation_happens_before_any_connection() {
        let cfg = FarmConfig {
            broker_url: "amqp://nobody@127.0.0.1:1/%2f".into(),
            max_payload_bytes: 64,
            ..FarmConfig::default()
        };
        let publisher = Publisher::new(&cfg);

        let err = publisher
            .prepare(&JobRequest::new("jobs::x").arg("y".repeat(128)))
            .unwrap_err();
        assert!(matches!(err, BrokerError::Core(CoreError::PayloadTooLarge { .. })));

        let err = publisher.prepare(&JobRequest::new("")).unwrap_err();
        assert!(matches!(err, BrokerError::Core(CoreError::UnresolvableCallable(_))));
    }

    #[tokio::test]
    async fn enqueue_rejects_synchronously() {
        let cfg = FarmConfig {
            max_payload_bytes: 64,
            ..FarmConfig::default()
        };
        let publisher = Publisher::new(&cfg);
        assert!(publisher
            .enqueue(&JobRequest::new("jobs::x").arg("y".repeat(128)))
            .is_err());
    }
}
