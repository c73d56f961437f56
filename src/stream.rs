//! Pull-based delta streams over an HTTP response body.
//!
//! [`decode_byte_stream`] drives the pure decoder in [`crate::sse`] from any
//! byte stream, one read at a time, and yields the text deltas in order.
//! The returned [`DeltaStream`] owns the transport: it is dropped as soon as
//! the stream terminates (`[DONE]`, end of body, transport error) or is
//! cancelled, and no read is issued after that.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream, FusedStream, Stream, StreamExt, TryStreamExt};
use futures::task::AtomicWaker;
use tracing::{debug, trace};

use crate::client::ClientError;
use crate::sse::{self, DecoderState, Event};
use crate::text::Utf8Decoder;

/// Counters describing how a stream was decoded.
///
/// Malformed frames are dropped silently; these counters make the drops
/// observable without changing what the consumer receives.
#[derive(Debug, Default)]
pub struct DecodeStats {
    chunks: AtomicU64,
    deltas: AtomicU64,
    discarded_frames: AtomicU64,
    residual_bytes: AtomicU64,
    done: AtomicBool,
}

impl DecodeStats {
    /// Body chunks read from the transport.
    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    /// Deltas handed to the consumer's queue.
    pub fn deltas(&self) -> u64 {
        self.deltas.load(Ordering::Relaxed)
    }

    /// `data: ` frames dropped because their payload was not valid JSON.
    pub fn discarded_frames(&self) -> u64 {
        self.discarded_frames.load(Ordering::Relaxed)
    }

    /// Bytes of unterminated text left in the buffer when the body ended.
    pub fn residual_bytes(&self) -> u64 {
        self.residual_bytes.load(Ordering::Relaxed)
    }

    /// Whether the `[DONE]` marker was received.
    pub fn saw_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    waker: AtomicWaker,
}

/// Handle used to stop a [`DeltaStream`] from outside the consuming task.
///
/// Cancelling wakes the consumer, which then observes the end of the
/// stream. The transport is released on that poll.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.waker.wake();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

/// Ordered stream of assistant text deltas for one chat turn.
///
/// Yields `Ok(delta)` for every `delta` frame (and for the buffer flushed on
/// `[DONE]`), at most one `Err` for a transport failure, then ends.
pub struct DeltaStream {
    inner: Option<BoxStream<'static, Result<String, ClientError>>>,
    cancel: CancelHandle,
    stats: Arc<DecodeStats>,
}

impl DeltaStream {
    /// Handle that cancels this stream from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Shared decode counters for this stream.
    pub fn stats(&self) -> Arc<DecodeStats> {
        Arc::clone(&self.stats)
    }

    /// Stop reading and release the transport.
    ///
    /// Equivalent to cancelling through a [`CancelHandle`].
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.release();
    }

    /// Drain the stream and concatenate every delta into the full message.
    pub async fn collect_message(self) -> Result<String, ClientError> {
        self.try_fold(String::new(), |mut message, delta| async move {
            message.push_str(&delta);
            Ok(message)
        })
        .await
    }

    fn release(&mut self) {
        if self.inner.take().is_some() {
            debug!("delta stream cancelled, transport released");
        }
    }
}

impl std::fmt::Debug for DeltaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaStream")
            .field("active", &self.inner.is_some())
            .field("cancel", &self.cancel)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Stream for DeltaStream {
    type Item = Result<String, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.cancel.state.waker.register(cx.waker());
        if self.cancel.is_cancelled() {
            self.release();
            return Poll::Ready(None);
        }

        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl FusedStream for DeltaStream {
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

/// Per-stream read loop state.
struct Reader {
    body: Option<BoxStream<'static, Result<Bytes, ClientError>>>,
    utf8: Utf8Decoder,
    state: DecoderState,
    ready: VecDeque<String>,
    stats: Arc<DecodeStats>,
}

impl Reader {
    fn feed(&mut self, text: &str) {
        let (state, events) = sse::process_chunk(std::mem::take(&mut self.state), text);
        self.state = state;

        for event in events {
            match event {
                Event::Delta { content } => {
                    self.stats.deltas.fetch_add(1, Ordering::Relaxed);
                    self.ready.push_back(content);
                }
                Event::Done => {
                    self.stats.done.store(true, Ordering::Relaxed);
                    debug!("received [DONE], closing stream");
                }
                Event::Malformed { payload } => {
                    self.stats.discarded_frames.fetch_add(1, Ordering::Relaxed);
                    debug!(payload = %payload, "discarding malformed frame");
                }
            }
        }

        if self.state.terminated {
            self.body = None;
        }
    }

    fn end_of_body(&mut self) {
        if let Some(tail) = self.utf8.finish() {
            self.feed(&tail);
        }
        if let Some(residual) = sse::finish(std::mem::take(&mut self.state)) {
            self.stats
                .residual_bytes
                .fetch_add(residual.len() as u64, Ordering::Relaxed);
            debug!(residual = %residual, "body ended with an unterminated frame");
        }
        self.state.terminated = true;
        self.body = None;
    }
}

/// Decode a stream of body chunks into a [`DeltaStream`].
///
/// Each chunk is read only after every delta produced by the previous one has
/// been consumed.
///
/// # Example
/// ```
/// use bytes::Bytes;
/// use deltastream::client::ClientError;
/// use deltastream::stream::decode_byte_stream;
/// use futures::stream;
///
/// let chunks = vec![
///     Ok::<_, ClientError>(Bytes::from_static(b"data: {\"type\":\"delta\",\"content\":\"Hi\"}\n\n")),
///     Ok(Bytes::from_static(b"data: [DONE]\n\n")),
/// ];
/// let deltas = decode_byte_stream(stream::iter(chunks));
/// let message = futures::executor::block_on(deltas.collect_message()).unwrap();
/// assert_eq!(message, "Hi");
/// ```
pub fn decode_byte_stream<S, E>(body: S) -> DeltaStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + 'static,
{
    let stats = Arc::new(DecodeStats::default());
    let reader = Reader {
        body: Some(body.map_err(Into::<ClientError>::into).boxed()),
        utf8: Utf8Decoder::new(),
        state: DecoderState::new(),
        ready: VecDeque::new(),
        stats: Arc::clone(&stats),
    };

    let deltas = stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(delta) = reader.ready.pop_front() {
                return Some((Ok(delta), reader));
            }

            let next = match reader.body.as_mut() {
                Some(body) => body.next().await,
                None => return None,
            };
            match next {
                Some(Ok(chunk)) => {
                    reader.stats.chunks.fetch_add(1, Ordering::Relaxed);
                    trace!(len = chunk.len(), "read body chunk");
                    let text = reader.utf8.decode(&chunk);
                    reader.feed(&text);
                }
                Some(Err(err)) => {
                    debug!(error = %err, "transport failed mid-stream");
                    reader.body = None;
                    reader.ready.clear();
                    return Some((Err(err), reader));
                }
                None => reader.end_of_body(),
            }
        }
    });

    DeltaStream {
        inner: Some(deltas.boxed()),
        cancel: CancelHandle::default(),
        stats,
    }
}

/// Extension trait turning a `reqwest::Response` into a [`DeltaStream`].
///
/// # Example
/// ```ignore
/// use deltastream::stream::SseResponseExt;
/// use futures::StreamExt;
///
/// let response = http.post(url).json(&request).send().await?;
/// let mut deltas = response.deltas();
/// while let Some(delta) = deltas.next().await {
///     print!("{}", delta?);
/// }
/// ```
pub trait SseResponseExt {
    fn deltas(self) -> DeltaStream;
}

impl SseResponseExt for reqwest::Response {
    fn deltas(self) -> DeltaStream {
        decode_byte_stream(self.bytes_stream())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Transport double that counts reads and records when it is dropped.
    struct TrackedBody {
        chunks: VecDeque<Bytes>,
        reads: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    }

    impl TrackedBody {
        fn new(chunks: &[&str]) -> (Self, Arc<AtomicUsize>, Arc<AtomicBool>) {
            let reads = Arc::new(AtomicUsize::new(0));
            let dropped = Arc::new(AtomicBool::new(false));
            let body = Self {
                chunks: chunks
                    .iter()
                    .map(|chunk| Bytes::copy_from_slice(chunk.as_bytes()))
                    .collect(),
                reads: Arc::clone(&reads),
                dropped: Arc::clone(&dropped),
            };
            (body, reads, dropped)
        }
    }

    impl Stream for TrackedBody {
        type Item = Result<Bytes, ClientError>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(self.chunks.pop_front().map(Ok))
        }
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn delta_frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "type": "delta", "content": content })
        )
    }

    fn byte_chunks(
        wire: &[u8],
        splits: &[usize],
    ) -> impl Stream<Item = Result<Bytes, ClientError>> + Send + 'static {
        let mut chunks = Vec::new();
        let mut start = 0;
        for &end in splits.iter().chain(std::iter::once(&wire.len())) {
            chunks.push(Ok(Bytes::copy_from_slice(&wire[start..end])));
            start = end;
        }
        stream::iter(chunks)
    }

    async fn collect(deltas: DeltaStream) -> Vec<String> {
        deltas.try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_example_scenario() {
        let (body, _, dropped) = TrackedBody::new(&[
            "data: {\"typ",
            "e\":\"delta\",\"content\":\"Hel",
            "lo\"}\n\ndata: {\"type\":\"delta\",\"content\":\" world\"}\n\n",
            "data: [DONE]\n\n",
        ]);
        let deltas = decode_byte_stream(body);
        let stats = deltas.stats();

        assert_eq!(collect(deltas).await, vec!["Hello", " world"]);
        assert!(stats.saw_done());
        assert_eq!(stats.chunks(), 4);
        assert_eq!(stats.discarded_frames(), 0);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_byte_split_invariance() {
        let mut wire = String::new();
        for part in ["Grüße", ", ", "世界", " 🦀"] {
            wire.push_str(&delta_frame(part));
        }
        wire.push_str("data: [DONE]\n\n");
        let wire = wire.into_bytes();

        let expected = vec!["Grüße", ", ", "世界", " 🦀"];
        assert_eq!(collect(decode_byte_stream(byte_chunks(&wire, &[]))).await, expected);

        for split in 1..wire.len() {
            let deltas = decode_byte_stream(byte_chunks(&wire, &[split]));
            assert_eq!(collect(deltas).await, expected, "split at byte {split}");
        }

        let every_byte: Vec<usize> = (1..wire.len()).collect();
        let deltas = decode_byte_stream(byte_chunks(&wire, &every_byte));
        assert_eq!(collect(deltas).await, expected);
    }

    #[tokio::test]
    async fn test_stops_reading_after_done() {
        let first = format!("{}data: [DONE]\n\n", delta_frame("only"));
        let late = delta_frame("late");
        let (body, reads, dropped) = TrackedBody::new(&[first.as_str(), late.as_str()]);
        let mut deltas = decode_byte_stream(body);

        assert_eq!(deltas.next().await.unwrap().unwrap(), "only");
        assert!(dropped.load(Ordering::SeqCst));
        assert!(deltas.next().await.is_none());
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(deltas.is_terminated());
    }

    #[tokio::test]
    async fn test_cancel_handle_releases_transport() {
        let frames: Vec<String> = ["a", "b", "c"].iter().map(|c| delta_frame(c)).collect();
        let chunks: Vec<&str> = frames.iter().map(String::as_str).collect();
        let (body, reads, dropped) = TrackedBody::new(&chunks);
        let mut deltas = decode_byte_stream(body);
        let handle = deltas.cancel_handle();

        assert_eq!(deltas.next().await.unwrap().unwrap(), "a");
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(deltas.next().await.is_none());
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_in_place_releases_transport() {
        let frame = delta_frame("a");
        let (body, reads, dropped) = TrackedBody::new(&[frame.as_str(), frame.as_str()]);
        let mut deltas = decode_byte_stream(body);

        assert_eq!(deltas.next().await.unwrap().unwrap(), "a");
        deltas.cancel();

        assert!(deltas.is_terminated());
        assert!(dropped.load(Ordering::SeqCst));
        assert!(deltas.next().await.is_none());
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(deltas.cancel_handle().is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_releases_transport() {
        let frame = delta_frame("a");
        let (body, reads, dropped) = TrackedBody::new(&[frame.as_str(), frame.as_str()]);
        let mut deltas = decode_byte_stream(body);

        assert_eq!(deltas.next().await.unwrap().unwrap(), "a");
        drop(deltas);
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_wakes_pending_consumer() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, ClientError>>();
        let mut deltas = decode_byte_stream(rx);
        let handle = deltas.cancel_handle();

        let consumer = tokio::spawn(async move { deltas.next().await.is_none() });
        tokio::task::yield_now().await;
        handle.cancel();

        assert!(consumer.await.unwrap());
        drop(tx);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_counted_not_surfaced() {
        let wire = format!(
            "data: not-json\n\n{}data: {{\"type\":\"delta\"}}\n\n{}data: [DONE]\n\n",
            delta_frame("a"),
            delta_frame("b")
        );
        let deltas = decode_byte_stream(byte_chunks(wire.as_bytes(), &[]));
        let stats = deltas.stats();

        assert_eq!(collect(deltas).await, vec!["a", "b"]);
        assert_eq!(stats.discarded_frames(), 2);
        assert_eq!(stats.deltas(), 2);
    }

    #[tokio::test]
    async fn test_body_end_without_done() {
        let wire = format!("{}data: {{\"type\":\"delta\",\"con", delta_frame("a"));
        let deltas = decode_byte_stream(byte_chunks(wire.as_bytes(), &[]));
        let stats = deltas.stats();

        assert_eq!(collect(deltas).await, vec!["a"]);
        assert!(!stats.saw_done());
        assert_eq!(stats.residual_bytes(), "data: {\"type\":\"delta\",\"con".len() as u64);
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let chunks = vec![
            Ok(Bytes::from(delta_frame("a"))),
            Err(ClientError::Config("connection reset".to_string())),
            Ok(Bytes::from(delta_frame("never"))),
        ];
        let mut deltas = decode_byte_stream(stream::iter(chunks));

        assert_eq!(deltas.next().await.unwrap().unwrap(), "a");
        assert!(matches!(deltas.next().await, Some(Err(ClientError::Config(_)))));
        assert!(deltas.next().await.is_none());
    }

    #[tokio::test]
    async fn test_collect_message() {
        let wire = format!(
            "{}{}data: [DONE]\n\n",
            delta_frame("Hello"),
            delta_frame(" world")
        );
        let deltas = decode_byte_stream(byte_chunks(wire.as_bytes(), &[7, 30]));
        assert_eq!(deltas.collect_message().await.unwrap(), "Hello world");
    }

    #[tokio::test]
    async fn test_independent_streams_do_not_share_state() {
        let a = format!("{}data: [DONE]\n\n", delta_frame("first"));
        let b = format!("{}data: [DONE]\n\n", delta_frame("second"));
        let (left, right) = tokio::join!(
            decode_byte_stream(byte_chunks(a.as_bytes(), &[10])).collect_message(),
            decode_byte_stream(byte_chunks(b.as_bytes(), &[3])).collect_message(),
        );
        assert_eq!(left.unwrap(), "first");
        assert_eq!(right.unwrap(), "second");
    }
}
