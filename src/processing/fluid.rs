use async_trait::async_trait;
use tracing::{debug, info};

use super::simulation::Simulation;
use crate::message::{FluidRequest, Frame, Source};
use crate::rabbitmq::{Emit, Handler, HandlerError};

pub const MAX_DIMENSION: u32 = 4096;

/// Streams one [`Frame`] per simulated step back to the requester.
#[derive(Debug, Default)]
pub struct FluidHandler {
    requests: u64,
}

impl FluidHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests accepted so far.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    fn validate(request: &FluidRequest) -> Result<(), HandlerError> {
        let in_range = |value: u32| (1..=MAX_DIMENSION).contains(&value);
        if !in_range(request.width) || !in_range(request.height) {
            return Err(HandlerError::InvalidRequest(format!(
                "dimensions {}x{} outside 1..={}",
                request.width, request.height, MAX_DIMENSION
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Handler for FluidHandler {
    type Request = FluidRequest;
    type Reply = Frame;

    async fn handle(
        &mut self,
        request: FluidRequest,
        emit: &mut Emit<'_, Frame>,
    ) -> Result<(), HandlerError> {
        Self::validate(&request)?;
        self.requests += 1;
        info!(
            width = request.width,
            height = request.height,
            frames = request.frames,
            "Requested {} frames",
            request.frames
        );

        let FluidRequest {
            width,
            height,
            frames,
            sources,
        } = request;
        let sources = if sources.is_empty() {
            vec![Source::default()]
        } else {
            sources
        };

        // Dropped on every exit path, including a failed emit.
        let mut simulation = Simulation::new(width, height, sources);

        for frame_id in 0..frames {
            simulation.step();
            let frame = Frame {
                width,
                height,
                frame_id,
                pixels: simulation.pixels(),
            };
            debug!(frame_id, "Sending frame");
            emit.emit(&frame).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::rabbitmq::{InMemoryReplies, PublishError};

    fn request(width: u32, height: u32, frames: u32) -> FluidRequest {
        FluidRequest {
            width,
            height,
            frames,
            sources: vec![],
        }
    }

    #[tokio::test]
    async fn test_emits_one_frame_per_step_in_order() {
        let replies = InMemoryReplies::new();
        let mut emit: Emit<'_, Frame> =
            Emit::new(&replies, &JsonCodec, "replyQ", Some("abc"));
        let mut handler = FluidHandler::new();

        handler.handle(request(16, 8, 3), &mut emit).await.unwrap();

        let frames: Vec<Frame> = replies
            .published()
            .await
            .iter()
            .map(|m| serde_json::from_slice(&m.payload).unwrap())
            .collect();
        let ids: Vec<u32> = frames.iter().map(|f| f.frame_id).collect();
        assert_eq!(ids, [0, 1, 2]);
        assert!(frames.iter().all(|f| f.width == 16 && f.height == 8));
        assert!(frames.iter().all(|f| f.pixels.len() == 128));
        assert_eq!(emit.sent(), 3);
        assert_eq!(handler.requests(), 1);
    }

    #[tokio::test]
    async fn test_rejects_degenerate_dimensions() {
        let replies = InMemoryReplies::new();
        let mut emit: Emit<'_, Frame> =
            Emit::new(&replies, &JsonCodec, "replyQ", None);
        let mut handler = FluidHandler::new();

        let bad_requests = [
            request(0, 10, 1),
            request(10, 0, 1),
            request(MAX_DIMENSION + 1, 10, 1),
        ];
        for bad in bad_requests {
            let err = handler.handle(bad, &mut emit).await.unwrap_err();
            assert!(matches!(err, HandlerError::InvalidRequest(_)));
        }
        assert_eq!(replies.attempts().await, 0);
        assert_eq!(handler.requests(), 0);
    }

    #[tokio::test]
    async fn test_failed_emit_stops_the_request() {
        let replies = InMemoryReplies::failing_after(2);
        let mut emit: Emit<'_, Frame> =
            Emit::new(&replies, &JsonCodec, "replyQ", Some("abc"));

        let err = FluidHandler::new()
            .handle(request(8, 8, 10), &mut emit)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HandlerError::Publish(PublishError::ChannelClosed(_))
        ));
        assert_eq!(replies.attempts().await, 3);
    }
}
