// src/worker.rs
// Wires the broker plumbing to the fluid handler

use std::future::Future;

use futures::{StreamExt, TryStreamExt};
use tracing::{info, warn};

use crate::codec::JsonCodec;
use crate::config::WorkerConfig;
use crate::message::{FluidRequest, Frame};
use crate::processing::FluidHandler;
use crate::rabbitmq::{
    declare_queue, BrokerConnection, ConsumeLoop, ReplyPublisher, Requester, Subscription,
    WorkerError,
};

/// Connects, declares the request queue and serves it until `shutdown`
/// resolves or the first error.
///
/// The connection is closed on a clean shutdown only; after an error the
/// broker session is already unusable and is just dropped.
pub async fn run_worker<F>(config: &WorkerConfig, shutdown: F) -> Result<(), WorkerError>
where
    F: Future<Output = ()>,
{
    let settings = &config.worker;
    let connection =
        BrokerConnection::connect(&config.connection, settings.publisher_confirms).await?;
    let channel = connection.channel().clone();

    let queue = declare_queue(&channel, &settings.queue).await?;
    let subscription = Subscription::new(channel.clone(), queue, &settings.consumer_tag_prefix);
    let publisher = ReplyPublisher::new(channel, settings.publisher_confirms);

    let mut consume_loop = ConsumeLoop::new(subscription, publisher, JsonCodec, FluidHandler::new())
        .with_missing_reply_to(settings.missing_reply_to);

    consume_loop.run_until(shutdown).await?;
    info!(
        requests = consume_loop.handler().requests(),
        "Worker stopped"
    );

    if let Err(e) = connection.close().await {
        warn!("Failed to close connection cleanly: {}", e);
    }
    Ok(())
}

/// Sends `request` to the worker queue and waits for its `frames` replies.
///
/// There is no end-of-stream marker, so a worker that dies mid-request
/// leaves this waiting; callers bound it with their own timeout.
pub async fn request_frames(
    config: &WorkerConfig,
    request: &FluidRequest,
) -> Result<Vec<Frame>, WorkerError> {
    let connection = BrokerConnection::connect(&config.connection, false).await?;
    let mut requester = Requester::on_channel(connection.channel(), &config.worker.queue).await?;

    let frames: Vec<Frame> = requester
        .request::<FluidRequest, Frame>(request)
        .await?
        .take(request.frames as usize)
        .inspect_ok(|frame| info!(frame_id = frame.frame_id, "Received frame"))
        .try_collect()
        .await?;
    drop(requester);

    if let Err(e) = connection.close().await {
        warn!("Failed to close connection cleanly: {}", e);
    }
    Ok(frames)
}
