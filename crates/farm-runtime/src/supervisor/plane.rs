use async_trait::async_trait;
use farm_broker::{BrokerError, BrokerLink, ControlPublisher, ControlQueue, topology};
use farm_core::FarmConfig;
use farm_model::ControlMessage;
use lapin::Channel;
use tracing::{info, trace};

/// Where the supervisor sends control messages.
#[async_trait]
pub trait ControlSink: Send + Sync {
    async fn send(&self, routing_key: &str, msg: &ControlMessage) -> Result<(), BrokerError>;
}

#[async_trait]
impl ControlSink for ControlPublisher {
    async fn send(&self, routing_key: &str, msg: &ControlMessage) -> Result<(), BrokerError> {
        ControlPublisher::send(self, routing_key, msg).await
    }
}

/// The supervisor's inbound control queue.
#[async_trait]
pub(crate) trait ControlSource: ControlSink {
    /// Next message addressed to the supervisor; [`BrokerError::Closed`] while the queue is gone.
    async fn next(&mut self) -> Result<ControlMessage, BrokerError>;

    /// Redeclares the queue, reconnecting first when the connection itself is gone.
    async fn recover(&mut self) -> Result<(), BrokerError>;
}

/// Where the scaling check reads the job backlog.
#[async_trait]
pub(crate) trait DepthSource: Send {
    async fn depth(&mut self) -> Result<u32, BrokerError>;
}

/// The supervisor's control connection: its own queue for worker messages and a publisher for
/// messages to workers. Lost queues and connections are re-established through
/// [`ControlSource::recover`].
pub(crate) struct ControlPlane {
    url: String,
    exchange: String,
    manager_id: String,
    link: BrokerLink,
    publisher: ControlPublisher,
    queue: Option<(Channel, ControlQueue)>,
}

impl ControlPlane {
    pub async fn connect(cfg: &FarmConfig, manager_id: &str) -> Result<Self, BrokerError> {
        let link = BrokerLink::connect(&cfg.broker_url, "supervisor").await?;
        let depth = topology::declare_jobs_queue(link.channel(), &cfg.jobs_queue).await?;
        let publisher = ControlPublisher::declare(link.channel().clone(), cfg.control_exchange.as_str()).await?;
        let queue = Self::open_queue(&link, &cfg.control_exchange, manager_id).await?;
        info!(
            target: "farm.supervisor",
            manager_id,
            jobs_queue = %cfg.jobs_queue,
            depth,
            control_queue = queue.1.name(),
            "control plane ready"
        );
        Ok(Self {
            url: cfg.broker_url.clone(),
            exchange: cfg.control_exchange.clone(),
            manager_id: manager_id.to_string(),
            link,
            publisher,
            queue: Some(queue),
        })
    }

    async fn open_queue(
        link: &BrokerLink,
        exchange: &str,
        manager_id: &str,
    ) -> Result<(Channel, ControlQueue), BrokerError> {
        let channel = link.open_channel().await?;
        let queue = ControlQueue::open(
            &channel,
            exchange,
            &topology::supervisor_queue(manager_id),
            &[topology::supervisor_key(manager_id)],
            &format!("{manager_id}.control"),
        )
        .await?;
        Ok((channel, queue))
    }

    pub async fn close(self) {
        if let Some((channel, _)) = &self.queue
            && let Err(e) = channel.close(200, "bye").await
        {
            trace!(target: "farm.supervisor", error = %e, "control channel close failed");
        }
        self.link.close().await;
    }
}

#[async_trait]
impl ControlSink for ControlPlane {
    async fn send(&self, routing_key: &str, msg: &ControlMessage) -> Result<(), BrokerError> {
        self.publisher.send(routing_key, msg).await
    }
}

#[async_trait]
impl ControlSource for ControlPlane {
    async fn next(&mut self) -> Result<ControlMessage, BrokerError> {
        let Some((_, queue)) = self.queue.as_mut() else {
            return Err(BrokerError::Closed);
        };
        match queue.next().await {
            Some(msg) => msg,
            None => {
                self.queue = None;
                Err(BrokerError::Closed)
            }
        }
    }

    async fn recover(&mut self) -> Result<(), BrokerError> {
        if !self.link.is_connected() {
            let link = BrokerLink::connect(&self.url, "supervisor").await?;
            let publisher = ControlPublisher::declare(link.channel().clone(), self.exchange.as_str()).await?;
            self.link.close().await;
            self.link = link;
            self.publisher = publisher;
        }
        self.queue = Some(Self::open_queue(&self.link, &self.exchange, &self.manager_id).await?);
        Ok(())
    }
}

/// Dedicated connection for reading the job queue depth. A failed passive declare closes its
/// channel, so the probe reconnects lazily on the next read.
pub(crate) struct DepthProbe {
    url: String,
    queue: String,
    link: Option<BrokerLink>,
}

impl DepthProbe {
    pub fn new(cfg: &FarmConfig) -> Self {
        Self {
            url: cfg.broker_url.clone(),
            queue: cfg.jobs_queue.clone(),
            link: None,
        }
    }

    pub async fn close(self) {
        if let Some(link) = self.link {
            link.close().await;
        }
    }
}

#[async_trait]
impl DepthSource for DepthProbe {
    async fn depth(&mut self) -> Result<u32, BrokerError> {
        if let Some(link) = &self.link
            && !link.is_connected()
        {
            link.close().await;
            self.link = None;
        }
        let link = match self.link.take() {
            Some(link) => link,
            None => BrokerLink::connect(&self.url, "supervisor-probe").await?,
        };
        match topology::queue_depth(link.channel(), &self.queue).await {
            Ok(depth) => {
                self.link = Some(link);
                Ok(depth)
            }
            Err(e) => {
                link.close().await;
                Err(e)
            }
        }
    }
}
