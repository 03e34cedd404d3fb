//! A local fake backend for testing purpose.

mod preset;

use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use layra_model::{
    BackendError, ChatBackend, ChatRequest, ErrorKind, HistoryTurn,
    ReplyStream, StreamEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    #[allow(dead_code)]
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestReply {
    events: VecDeque<StreamEvent>,
    ending: PresetEnding,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ReplyStream for TestReply {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>> {
        let this = self.get_mut();

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            if let Some(event) = this.events.pop_front() {
                return Poll::Ready(Ok(Some(event)));
            }
            return match this.ending {
                PresetEnding::Complete => Poll::Ready(Ok(None)),
                PresetEnding::Fail => Poll::Ready(Err(Error {
                    message: "stream broken",
                    kind: ErrorKind::Other,
                })),
                // Never woken up again.
                PresetEnding::Hang => Poll::Pending,
            };
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Default)]
struct Script {
    histories: HashMap<String, PresetHistory>,
    replies: VecDeque<PresetReply>,
    requests: Vec<ChatRequest>,
}

/// A local fake backend for testing purpose.
///
/// Before sending requests, you need to setup the script: histories are
/// looked up by conversation id, and replies are consumed in the order
/// they were added, one per sent message. If there is no reply left, an
/// error will be returned.
///
/// Clones share the same script.
///
/// # Note
///
/// This type is not optimized for production use, you should only use it
/// for testing.
#[derive(Clone, Default)]
pub struct TestBackend {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestBackend {
    #[inline]
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|err| err.into_inner())
    }

    #[inline]
    pub fn set_history<S: Into<String>>(
        &self,
        conversation_id: S,
        preset: PresetHistory,
    ) {
        self.script().histories.insert(conversation_id.into(), preset);
    }

    #[inline]
    pub fn add_reply(&self, preset: PresetReply) {
        self.script().replies.push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the requests sent so far.
    #[inline]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.script().requests.clone()
    }
}

impl ChatBackend for TestBackend {
    type Error = crate::Error;
    type Reply = TestReply;

    fn fetch_history(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<HistoryTurn>, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        let result = match script.histories.get_mut(conversation_id) {
            None => Err(Error {
                message: "no such conversation",
                kind: ErrorKind::NotFound,
            }),
            Some(preset) if preset.failures > 0 => {
                preset.failures -= 1;
                Err(Error {
                    message: "temporarily unavailable",
                    kind: ErrorKind::Other,
                })
            }
            Some(preset) => Ok(preset.turns.clone()),
        };
        ready(result)
    }

    fn send_message(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Reply, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        script.requests.push(req.clone());
        let result = match script.replies.pop_front() {
            Some(preset) => Ok(TestReply {
                events: preset.events.into(),
                ending: preset.ending,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
            None => Err(Error {
                message: "no enough replies",
                kind: ErrorKind::Other,
            }),
        };
        ready(result)
    }
}
