use lapin::{Channel, Connection, ConnectionProperties};
use tracing::{debug, trace};

use crate::BrokerError;

const REPLY_SUCCESS: u16 = 200;

/// One broker connection with a primary channel, owned by the component that opened it.
///
/// Closing is explicit and idempotent; callers close on every exit path.
pub struct BrokerLink {
    name: &'static str,
    conn: Connection,
    channel: Channel,
}

impl BrokerLink {
    pub async fn connect(url: &str, name: &'static str) -> Result<Self, BrokerError> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        debug!(target: "farm.broker.link", link = name, "connected");
        Ok(Self {
            name,
            conn,
            channel,
        })
    }

    #[inline]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Opens an additional channel on the same connection.
    pub async fn open_channel(&self) -> Result<Channel, BrokerError> {
        Ok(self.conn.create_channel().await?)
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.conn.status().connected() && self.channel.status().connected()
    }

    /// Closes the channel and the connection; errors are logged, not returned.
    pub async fn close(&self) {
        if self.channel.status().connected()
            && let Err(e) = self.channel.close(REPLY_SUCCESS, "bye").await
        {
            trace!(target: "farm.broker.link", link = self.name, error = %e, "channel close failed");
        }
        if self.conn.status().connected()
            && let Err(e) = self.conn.close(REPLY_SUCCESS, "bye").await
        {
            trace!(target: "farm.broker.link", link = self.name, error = %e, "connection close failed");
        }
        debug!(target: "farm.broker.link", link = self.name, "closed");
    }
}
