//! # deltastream - streaming chat replies over Server-Sent Events
//!
//! A small client for chat backends that stream the assistant's reply as
//! SSE frames. The response body is decoded incrementally into text deltas
//! that the caller appends to the message being displayed.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Chunk-boundary safe decoding (split UTF-8 characters, split JSON, split
//!   frame delimiters)
//! - Pure, network-free decoder core in [`sse`]
//! - Explicit cancellation that releases the connection
//! - Decode counters for frames dropped as malformed
//!
//! ## Wire format
//! ```text
//! data: {"type":"delta","content":"Hel"}
//!
//! data: {"type":"delta","content":"lo"}
//!
//! data: [DONE]
//! ```
//!
//! ## Example
//! ```no_run
//! use deltastream::{ChatClient, TransportOptions};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = TransportOptions::new("http://localhost:8000")
//!         .with_session_cookie("fastapiusersauth=...");
//!     let client = ChatClient::new(options)?;
//!
//!     let mut deltas = client.stream_message("Hello!").await?;
//!     let mut message = String::new();
//!     while let Some(delta) = deltas.next().await {
//!         message.push_str(&delta?);
//!     }
//!     println!("{message}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod model;
pub mod options;
pub mod sse;
pub mod stream;
pub mod text;

// Re-exports for convenience
pub use client::{ChatClient, ClientError};
pub use model::ChatRequest;
pub use options::{SecretString, TransportOptions};
pub use sse::{process_chunk, DecoderState, Event};
pub use stream::{CancelHandle, DecodeStats, DeltaStream, SseResponseExt};
