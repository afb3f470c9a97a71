use fluid_stream_worker::codec::JsonCodec;
use fluid_stream_worker::config::MissingReplyTo;
use fluid_stream_worker::message::{FluidRequest, Frame};
use fluid_stream_worker::processing::FluidHandler;
use fluid_stream_worker::rabbitmq::{
    ConsumeLoop, InMemoryQueue, InMemoryReplies, LoopState, ProtocolError, WorkerError,
};
use lapin::BasicProperties;

fn properties(correlation_id: &str, reply_to: &str) -> BasicProperties {
    BasicProperties::default()
        .with_correlation_id(correlation_id.into())
        .with_reply_to(reply_to.into())
}

fn request_bytes(width: u32, height: u32, frames: u32) -> Vec<u8> {
    serde_json::to_vec(&FluidRequest {
        width,
        height,
        frames,
        sources: vec![],
    })
    .unwrap()
}

fn worker(
    queue: InMemoryQueue,
    replies: &InMemoryReplies,
) -> ConsumeLoop<InMemoryQueue, InMemoryReplies, JsonCodec, FluidHandler> {
    ConsumeLoop::new(queue, replies.clone(), JsonCodec, FluidHandler::new())
}

#[tokio::test]
async fn test_three_frames_stream_back_to_reply_queue() {
    let mut queue = InMemoryQueue::new();
    queue.push_request(
        properties("abc", "replyQ"),
        br#"{"width":100,"height":100,"frames":3}"#.to_vec(),
    );
    let replies = InMemoryReplies::new();
    let mut worker = worker(queue, &replies);

    let dispatch = worker.run_once().await.unwrap();
    assert_eq!(dispatch.replies, 3);
    assert_eq!(worker.state(), LoopState::Waiting);

    let published = replies.published().await;
    assert_eq!(published.len(), 3);
    for (i, message) in published.iter().enumerate() {
        assert_eq!(message.destination, "replyQ");
        assert_eq!(message.correlation_id.as_deref(), Some("abc"));
        assert_eq!(message.content_type.as_deref(), Some("application/json"));

        let frame: Frame = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(frame.frame_id, i as u32);
        assert_eq!((frame.width, frame.height), (100, 100));
        assert_eq!(frame.pixels.len(), 100 * 100);
    }
}

#[tokio::test]
async fn test_zero_frames_publishes_nothing_and_serves_next_request() {
    let mut queue = InMemoryQueue::new();
    queue.push_request(properties("empty", "replyQ"), request_bytes(10, 10, 0));
    queue.push_request(properties("next", "replyQ"), request_bytes(10, 10, 2));
    let replies = InMemoryReplies::new();
    let mut worker = worker(queue, &replies);

    let dispatch = worker.run_once().await.unwrap();

    assert_eq!(dispatch.replies, 0);
    assert_eq!(replies.attempts().await, 0);
    assert_eq!(worker.state(), LoopState::Waiting);

    let dispatch = worker.run_once().await.unwrap();

    assert_eq!(dispatch.delivery_tag, 2);
    assert_eq!(dispatch.replies, 2);
    let published = replies.published().await;
    assert_eq!(published.len(), 2);
    assert!(published
        .iter()
        .all(|m| m.correlation_id.as_deref() == Some("next")));
    assert_eq!(worker.state(), LoopState::Waiting);
}

#[tokio::test]
async fn test_requests_are_answered_one_after_another() {
    let mut queue = InMemoryQueue::new();
    queue.push_request(properties("first", "replyA"), request_bytes(8, 8, 2));
    queue.push_request(properties("second", "replyB"), request_bytes(4, 4, 3));
    let replies = InMemoryReplies::new();
    let mut worker = worker(queue, &replies);

    // Drained queue reports a closed channel, which ends the run.
    let err = worker.run().await.unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Protocol(ProtocolError::Closed { .. })
    ));

    let routed: Vec<(String, Option<String>, u32)> = replies
        .published()
        .await
        .iter()
        .map(|m| {
            let frame: Frame = serde_json::from_slice(&m.payload).unwrap();
            (m.destination.clone(), m.correlation_id.clone(), frame.frame_id)
        })
        .collect();
    let expected = [
        ("replyA", "first", 0),
        ("replyA", "first", 1),
        ("replyB", "second", 0),
        ("replyB", "second", 1),
        ("replyB", "second", 2),
    ];
    assert_eq!(routed.len(), expected.len());
    for ((destination, correlation_id, frame_id), (d, c, f)) in routed.iter().zip(expected) {
        assert_eq!(destination, d);
        assert_eq!(correlation_id.as_deref(), Some(c));
        assert_eq!(*frame_id, f);
    }
    assert_eq!(worker.handler().requests(), 2);
    assert_eq!(worker.state(), LoopState::Closed);
}

#[tokio::test]
async fn test_invalid_dimensions_close_the_loop() {
    let mut queue = InMemoryQueue::new();
    queue.push_request(properties("abc", "replyQ"), request_bytes(0, 10, 3));
    let replies = InMemoryReplies::new();
    let mut worker = worker(queue, &replies);

    let err = worker.run_once().await.unwrap_err();

    assert!(matches!(err, WorkerError::Handler { delivery_tag: 1, .. }));
    assert_eq!(replies.attempts().await, 0);
    assert!(matches!(
        worker.run_once().await,
        Err(WorkerError::LoopClosed)
    ));
}

#[tokio::test]
async fn test_reject_policy_refuses_request_without_reply_to() {
    let mut queue = InMemoryQueue::new();
    queue.push_request(BasicProperties::default(), request_bytes(10, 10, 2));
    let replies = InMemoryReplies::new();
    let mut worker = worker(queue, &replies).with_missing_reply_to(MissingReplyTo::Reject);

    let err = worker.run_once().await.unwrap_err();

    assert!(matches!(err, WorkerError::MissingReplyTo { delivery_tag: 1 }));
    assert_eq!(worker.handler().requests(), 0);
}

#[tokio::test]
async fn test_lost_reply_channel_stops_the_stream() {
    let mut queue = InMemoryQueue::new();
    queue.push_request(properties("abc", "replyQ"), request_bytes(10, 10, 5));
    let replies = InMemoryReplies::failing_after(2);
    let mut worker = worker(queue, &replies);

    let err = worker.run_once().await.unwrap_err();

    assert!(matches!(err, WorkerError::Publish(_)));
    assert_eq!(replies.published().await.len(), 2);
    assert_eq!(replies.attempts().await, 3);
    assert_eq!(worker.state(), LoopState::Closed);
}
