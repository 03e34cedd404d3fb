//! A chat backend talking to the LAYRA HTTP API.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use layra_model::{
    BackendError, ChatBackend, ChatRequest, ErrorKind, HistoryTurn,
};
use mime::Mime;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};

pub use config::{ClientConfig, ClientConfigBuilder};
use io::{Chunks, Sse};
use proto::ConversationContent;
pub use response::SseReply;

/// Error type for [`LayraClient`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = match err.status() {
            Some(status) => kind_of_status(status),
            None if err.is_decode() => ErrorKind::InvalidResponse,
            None => ErrorKind::Other,
        };
        Error::new(format!("{err}"), kind)
    }
}

fn kind_of_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ErrorKind::Unauthorized
        }
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        _ => ErrorKind::Other,
    }
}

/// LAYRA chat backend.
#[derive(Clone, Debug)]
pub struct LayraClient {
    client: Client,
    config: Arc<ClientConfig>,
}

impl LayraClient {
    /// Creates a new `LayraClient` with the given configuration.
    #[inline]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl ChatBackend for LayraClient {
    type Error = Error;
    type Reply = SseReply;

    fn fetch_history(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<HistoryTurn>, Self::Error>> + Send + 'static
    {
        let url = self
            .config
            .endpoint(&format!("/chat/conversations/{conversation_id}"));
        debug!("fetching history from {url}");
        let resp_fut = self
            .authorize(self.client.get(url))
            .header(header::ACCEPT, "application/json")
            .send();

        async move {
            let resp = resp_fut.await.and_then(Response::error_for_status)?;
            let content = resp.json::<ConversationContent>().await?;
            Ok(proto::create_history(content))
        }
    }

    fn send_message(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Reply, Self::Error>> + Send + 'static
    {
        let sse_req = proto::create_request(req);
        let resp_fut = self
            .authorize(self.client.post(self.config.endpoint("/sse/chat")))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .json(&sse_req)
            .send();

        async move {
            let resp = resp_fut.await.and_then(Response::error_for_status)?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| {
                    m.type_() == mime::TEXT && m.subtype() == "event-stream"
                })
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::InvalidResponse,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(SseReply::from_sse(sse))
        }
    }
}
