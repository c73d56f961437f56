//! Chat client and error types.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::http::{add_extra_headers, add_session_cookie, build_http_client};
use crate::model::{ChatRequest, ErrorBody};
use crate::options::TransportOptions;
use crate::stream::{DeltaStream, SseResponseExt};

/// Path of the streaming chat endpoint.
pub const CHAT_PATH: &str = "/api/chat";

const EVENT_STREAM: &str = "text/event-stream";

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the request before streaming began.
    #[error("{detail}")]
    Api { status: StatusCode, detail: String },

    #[error("Unreadable response: the server sent no body")]
    UnreadableResponse,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(err) => err.status(),
            _ => None,
        }
    }
}

/// Client for the streaming chat endpoint.
///
/// Every call opens an independent stream with its own decoder state, so
/// several turns can be in flight at once.
///
/// # Example
/// ```no_run
/// use deltastream::client::ChatClient;
/// use deltastream::options::TransportOptions;
/// use futures::StreamExt;
///
/// # async fn run() -> Result<(), deltastream::ClientError> {
/// let client = ChatClient::new(TransportOptions::from_env())?;
/// let mut deltas = client.stream_message("What is Rust?").await?;
/// while let Some(delta) = deltas.next().await {
///     print!("{}", delta?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    options: TransportOptions,
}

impl ChatClient {
    /// Create a client with the given transport options.
    pub fn new(options: TransportOptions) -> Result<Self, ClientError> {
        reqwest::Url::parse(&options.endpoint(CHAT_PATH)).map_err(|err| {
            ClientError::Config(format!("invalid base URL {:?}: {err}", options.base_url))
        })?;
        let http = build_http_client(&options)?;
        Ok(Self { http, options })
    }

    /// Create a client configured from the environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(TransportOptions::from_env())
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Ask a question outside of any conversation.
    pub async fn stream_message(
        &self,
        question: impl Into<String>,
    ) -> Result<DeltaStream, ClientError> {
        self.send(ChatRequest::new(question)).await
    }

    /// Ask a question within an existing conversation.
    pub async fn stream_message_in(
        &self,
        conversation_id: impl Into<String>,
        question: impl Into<String>,
    ) -> Result<DeltaStream, ClientError> {
        self.send(ChatRequest::new(question).with_conversation(conversation_id))
            .await
    }

    /// Send a chat request and start decoding its event stream.
    ///
    /// Non-2xx responses are turned into [`ClientError::Api`] without touching
    /// the decoder. A response without a body fails with
    /// [`ClientError::UnreadableResponse`].
    pub async fn send(&self, request: ChatRequest) -> Result<DeltaStream, ClientError> {
        let url = self.options.endpoint(CHAT_PATH);
        debug!(
            url = %url,
            conversation_id = ?request.conversation_id,
            "sending chat request"
        );

        let mut req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, EVENT_STREAM);

        req = add_session_cookie(req, &self.options.session_cookie);
        req = add_extra_headers(req, &self.options.extra_headers);

        let response = req.json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "chat request rejected");
            return Err(error_from_response(status, &body));
        }

        // Null-body statuses have nothing to stream. Any other 2xx is decoded,
        // even when empty.
        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
            return Err(ClientError::UnreadableResponse);
        }

        Ok(response.deltas())
    }
}

/// Build the error for a rejected chat request.
///
/// Prefers the `detail` field of a JSON body, then the raw body text, then
/// the status reason.
pub fn error_from_response(status: StatusCode, body: &str) -> ClientError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|error| error.message())
        .unwrap_or_else(|| {
            let text = body.trim();
            if text.is_empty() {
                format!(
                    "HTTP {}",
                    status.canonical_reason().unwrap_or(status.as_str())
                )
            } else {
                text.to_string()
            }
        });

    ClientError::Api { status, detail }
}
