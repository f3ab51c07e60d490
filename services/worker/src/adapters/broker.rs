//! AMQP publisher — identical reconnect-on-failure shape to the gateway's
//! `LapinPublisher`; kept as a separate copy per service rather than shared
//! through `control-core`, since each service owns its own broker plumbing
//! around the transport-agnostic dispatch loop (§4.4/§5).

use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::RwLock;

use crate::ports::{BrokerError, BrokerPublisher};

pub struct LapinPublisher {
    uri: String,
    connection: RwLock<Connection>,
    channel: RwLock<Channel>,
}

impl LapinPublisher {
    pub async fn connect(uri: impl Into<String>) -> Result<Self, BrokerError> {
        let uri = uri.into();
        let connection = open_connection(&uri).await?;
        let channel = connection.create_channel().await.map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(LapinPublisher {
            uri,
            connection: RwLock::new(connection),
            channel: RwLock::new(channel),
        })
    }

    async fn reconnect(&self) -> Result<(), BrokerError> {
        tracing::warn!("broker channel closed, reconnecting");
        let connection = open_connection(&self.uri).await?;
        let channel = connection.create_channel().await.map_err(|e| BrokerError::Publish(e.to_string()))?;
        *self.connection.write().await = connection;
        *self.channel.write().await = channel;
        Ok(())
    }
}

async fn open_connection(uri: &str) -> Result<Connection, BrokerError> {
    Connection::connect(uri, ConnectionProperties::default())
        .await
        .map_err(|e| BrokerError::Publish(e.to_string()))
}

#[async_trait::async_trait]
impl BrokerPublisher for LapinPublisher {
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        let attempt = {
            let channel = self.channel.read().await;
            if !channel.status().connected() {
                None
            } else {
                channel
                    .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
                    .await
                    .ok();
                channel
                    .basic_publish(
                        "",
                        queue,
                        BasicPublishOptions::default(),
                        body,
                        BasicProperties::default().with_delivery_mode(1),
                    )
                    .await
                    .ok()
            }
        };

        if attempt.is_some() {
            return Ok(());
        }

        self.reconnect().await?;
        let channel = self.channel.read().await;
        channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        channel
            .basic_publish("", queue, BasicPublishOptions::default(), body, BasicProperties::default().with_delivery_mode(1))
            .await
            .map_err(|_| BrokerError::ChannelClosed)?;
        Ok(())
    }
}
