//! Wraps `control_core::process_delivery` with the worker's AMQP consume
//! loop (§4.4: the transport-agnostic algorithm lives in `control-core`;
//! each service only owns the broker plumbing around it).

use control_core::router::Router;
use control_core::{process_delivery, DeliveryOutcome};
use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};

use crate::deps::WorkerDeps;

pub async fn run(amqp_uri: &str, queue: &str, router: &Router<WorkerDeps>, deps: WorkerDeps, mut shutdown: control_core::shutdown::ShutdownToken) -> anyhow::Result<()> {
    let connection = Connection::connect(amqp_uri, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;
    channel.queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default()).await?;

    let mut consumer = channel
        .basic_consume(queue, "worker-consumer", BasicConsumeOptions::default(), FieldTable::default())
        .await?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(queue, "shutdown requested, stopping consumer");
                return Ok(());
            }
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    tracing::warn!(queue, "consumer stream ended");
                    return Ok(());
                };
                let delivery = delivery?;
                match process_delivery(&delivery.data, router, deps.clone()).await {
                    DeliveryOutcome::Ack => {
                        delivery.ack(BasicAckOptions::default()).await?;
                    }
                    DeliveryOutcome::Drop { reason } => {
                        tracing::warn!(reason, "dropping delivery");
                        delivery.ack(BasicAckOptions::default()).await?;
                    }
                    DeliveryOutcome::Fatal { reason } => {
                        tracing::error!(reason, "fatal delivery outcome, nacking and aborting");
                        delivery.nack(BasicNackOptions { requeue: true, ..Default::default() }).await?;
                        anyhow::bail!("fatal delivery outcome: {reason}");
                    }
                }
            }
        }
    }
}
