use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::future::BoxFuture;
use layra_model::{ErrorKind, ReplyStream, StreamEvent};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::{self, StreamPayload};

type NextEvent = Result<(Option<StreamEvent>, Sse), Error>;

pin_project! {
    /// A reply streamed over server-sent events.
    pub struct SseReply {
        next_event_fut: Option<BoxFuture<'static, NextEvent>>,
    }
}

impl SseReply {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        Self {
            next_event_fut: Some(Box::pin(next_event(sse))),
        }
    }
}

impl ReplyStream for SseReply {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, sse) = match ready!(next_event_fut.as_mut().poll(cx)) {
            Ok((Some(event), sse)) => (event, sse),
            Ok((None, _)) => {
                *this.next_event_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_event_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        // The stream may still have more data to pull, create a new future
        // for the next event.
        *this.next_event_fut = Some(Box::pin(next_event(sse)));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut sse: Sse) -> NextEvent {
    loop {
        let data = match sse.next_event().await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok((None, sse)),
            Err(SseError::InvalidPayload) => {
                return Err(Error::new(
                    "invalid event stream",
                    ErrorKind::InvalidResponse,
                ));
            }
            Err(SseError::ChunksError(err)) => {
                return Err(Error::new(err.0, ErrorKind::Other));
            }
        };
        trace!("got sse event: {data}");

        let payload = serde_json::from_str::<StreamPayload>(&data).map_err(
            |err| Error::new(format!("{err}"), ErrorKind::InvalidResponse),
        )?;
        match proto::create_event(payload) {
            Some(event) => return Ok((Some(event), sse)),
            None => debug!("skipped an unknown payload: {data}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use layra_model::{BackendError, TokenUsage};

    use super::*;
    use crate::io::Chunks;

    fn reply(chunks: Vec<Bytes>) -> SseReply {
        SseReply::from_sse(Sse::new(Chunks::from_vec_deque(chunks.into())))
    }

    async fn collect(
        reply: SseReply,
    ) -> (Vec<StreamEvent>, Result<(), crate::Error>) {
        let mut reply = pin!(reply);
        let mut events = Vec::new();
        loop {
            match poll_fn(|cx| reply.as_mut().poll_next_event(cx)).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => return (events, Ok(())),
                Err(err) => return (events, Err(err)),
            }
        }
    }

    #[tokio::test]
    async fn test_simple_events() {
        let (events, result) =
            collect(reply(vec![Bytes::from_static(include_bytes!(
                "../fixtures/test_reply.txt"
            ))]))
            .await;
        result.unwrap();

        assert_eq!(events.len(), 5);
        let text: String = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Text { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "It is a cat.");
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Usage(TokenUsage {
                total_tokens: 9,
                completion_tokens: 4,
                prompt_tokens: 5,
            }))
        );
    }

    #[tokio::test]
    async fn test_invalid_payload() {
        let (events, result) = collect(reply(vec![
            Bytes::from_static(
                br#"data: {"type": "text", "data": "Hi", "message_id": "m1"}"#,
            ),
            Bytes::from_static(b"\n\ndata: not json\n\n"),
        ]))
        .await;
        assert_eq!(events.len(), 1);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }
}
