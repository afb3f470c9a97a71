use std::time::Duration;

use fluid_stream_worker::config::WorkerConfig;
use fluid_stream_worker::message::{FluidRequest, Frame};
use fluid_stream_worker::rabbitmq::{BrokerConnection, Requester};
use futures::StreamExt;
use tokio::time::timeout;

fn broker_config() -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.apply_env().unwrap();
    config.worker.queue = format!("fluid-test-{}", uuid::Uuid::new_v4());
    config
}

fn request(frames: u32) -> FluidRequest {
    FluidRequest {
        width: 32,
        height: 32,
        frames,
        sources: vec![],
    }
}

// Needs a broker reachable with the AMQP_* environment settings.
#[tokio::test]
#[ignore]
async fn test_worker_streams_frames_through_broker() {
    let config = broker_config();
    let worker_config = config.clone();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let worker = tokio::spawn(async move {
        fluid_stream_worker::run_worker(&worker_config, async {
            stopped.await.ok();
        })
        .await
    });

    // The worker declares the request queue once it is connected.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let client = BrokerConnection::connect(&config.connection, false)
        .await
        .unwrap();
    let mut requester = Requester::on_channel(client.channel(), &config.worker.queue)
        .await
        .unwrap();
    assert!(requester.reply_to().starts_with("amq.gen-"));

    let frames: Vec<Frame> = {
        let replies = requester
            .request::<FluidRequest, Frame>(&request(3))
            .await
            .unwrap()
            .take(3)
            .map(Result::unwrap)
            .collect::<Vec<_>>();
        timeout(Duration::from_secs(10), replies).await.unwrap()
    };
    let ids: Vec<u32> = frames.iter().map(|f| f.frame_id).collect();
    assert_eq!(ids, [0, 1, 2]);
    assert!(frames.iter().all(|f| (f.width, f.height) == (32, 32)));

    stop.send(()).unwrap();
    worker.await.unwrap().unwrap();
    drop(requester);
    client.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_request_frames_collects_requested_count() {
    let config = broker_config();
    let worker_config = config.clone();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let worker = tokio::spawn(async move {
        fluid_stream_worker::run_worker(&worker_config, async {
            stopped.await.ok();
        })
        .await
    });
    tokio::time::sleep(Duration::from_millis(500)).await;

    let frames = timeout(
        Duration::from_secs(10),
        fluid_stream_worker::request_frames(&config, &request(2)),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].frame_id, 1);

    stop.send(()).unwrap();
    worker.await.unwrap().unwrap();
}
