//! Server-Sent Events (SSE) frame decoding.
//!
//! The chat endpoint streams frames separated by a blank line:
//! ```text
//! data: {"type":"delta","content":"Hel"}
//!
//! data: {"type":"delta","content":"lo"}
//!
//! data: [DONE]
//! ```
//!
//! Decoding is a pure state transition: [`process_chunk`] takes the current
//! [`DecoderState`] and one chunk of text and returns the next state together
//! with the events completed by that chunk. Transports drive it from
//! [`crate::stream`]; tests drive it directly.

use crate::model::WireEvent;

/// Separator between two frames.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Prefix of a frame carrying a payload.
pub const DATA_PREFIX: &str = "data: ";

/// Payload marking the end of the stream.
pub const DONE_MARKER: &str = "[DONE]";

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A fragment of assistant output to append.
    Delta { content: String },

    /// The stream finished normally.
    Done,

    /// A `data: ` frame whose payload is not valid JSON. Never surfaced to the
    /// consumer of deltas, only counted.
    Malformed { payload: String },
}

/// Decoder state for a single stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderState {
    /// Received text not yet resolved into complete frames.
    pub buffer: String,

    /// Set once [`DONE_MARKER`] has been seen. No further input is accepted.
    pub terminated: bool,
}

impl DecoderState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Feed one chunk of text into the decoder.
///
/// The buffer is split on [`FRAME_DELIMITER`]; every piece but the last is a
/// complete frame and is parsed in order. The last piece becomes the new
/// buffer, even when it looks like a whole frame.
///
/// On `[DONE]` the text left in the buffer is emitted as one last
/// [`Event::Delta`] (when non-empty), followed by [`Event::Done`], and the
/// state is terminated. Frames after the marker are ignored, as is any chunk
/// fed to a terminated state.
///
/// # Example
/// ```
/// use deltastream::sse::{process_chunk, DecoderState, Event};
///
/// let (state, events) = process_chunk(DecoderState::new(), "data: {\"type\":\"delta\",\"con");
/// assert!(events.is_empty());
///
/// let (state, events) = process_chunk(state, "tent\":\"Hi\"}\n\ndata: [DONE]\n\n");
/// assert_eq!(
///     events,
///     vec![Event::Delta { content: "Hi".to_string() }, Event::Done]
/// );
/// assert!(state.terminated);
/// ```
pub fn process_chunk(mut state: DecoderState, text: &str) -> (DecoderState, Vec<Event>) {
    let mut events = Vec::new();
    if state.terminated {
        return (state, events);
    }

    let mut buffer = std::mem::take(&mut state.buffer);
    buffer.push_str(text);

    let mut frames: Vec<&str> = buffer.split(FRAME_DELIMITER).collect();
    let remainder = frames.pop().unwrap_or_default();

    for frame in frames {
        match parse_frame(frame) {
            Some(Event::Done) => {
                if !remainder.is_empty() {
                    events.push(Event::Delta {
                        content: remainder.to_string(),
                    });
                }
                events.push(Event::Done);
                state.terminated = true;
                return (state, events);
            }
            Some(event) => events.push(event),
            None => {}
        }
    }

    state.buffer = remainder.to_string();
    (state, events)
}

/// Parse a single complete frame (without its delimiter).
///
/// Returns `None` for frames without the `data: ` prefix and for well-formed
/// payloads whose `type` is not `delta`.
///
/// # Example
/// ```
/// use deltastream::sse::{parse_frame, Event};
///
/// assert_eq!(parse_frame("data: [DONE]"), Some(Event::Done));
/// assert_eq!(parse_frame(": keep-alive"), None);
/// assert_eq!(parse_frame("data: {\"type\":\"status\"}"), None);
/// ```
pub fn parse_frame(frame: &str) -> Option<Event> {
    let payload = data_payload(frame)?;
    if is_done_marker(payload) {
        return Some(Event::Done);
    }

    match serde_json::from_str::<WireEvent>(payload) {
        Ok(WireEvent::Delta { content }) => Some(Event::Delta { content }),
        Ok(WireEvent::Other) => None,
        Err(_) => Some(Event::Malformed {
            payload: payload.to_string(),
        }),
    }
}

/// Strip the `data: ` prefix from a frame.
///
/// The payload is returned as-is; no whitespace is trimmed.
pub fn data_payload(frame: &str) -> Option<&str> {
    frame.strip_prefix(DATA_PREFIX)
}

/// Check if a payload is the end-of-stream marker.
///
/// # Example
/// ```
/// use deltastream::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker(" [DONE]"));
/// assert!(!is_done_marker("{\"type\":\"delta\"}"));
/// ```
pub fn is_done_marker(payload: &str) -> bool {
    payload == DONE_MARKER
}

/// Close out a stream whose transport ended.
///
/// Returns the unresolved text still buffered, if any. That text never formed
/// a complete frame and is not emitted.
pub fn finish(state: DecoderState) -> Option<String> {
    if state.terminated || state.buffer.is_empty() {
        None
    } else {
        Some(state.buffer)
    }
}
